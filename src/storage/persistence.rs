//! File-backed archive store and atomic file helpers

use super::memory::EventTable;
use super::{ArchiveStore, EventStore};
use crate::core::{ArchiveError, ArchiveRecord, Event, EventId, NewEvent, Result, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Archive Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub version: u32,
    pub records: Vec<ArchiveRecord>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub saved_at: DateTime<Utc>,
    pub record_count: usize,
    pub document_count: usize,
}

impl ArchiveSnapshot {
    pub fn new(records: Vec<ArchiveRecord>) -> Self {
        let record_count = records.len();
        let document_count = records.iter().map(|r| r.documents_count).sum();
        Self {
            version: SNAPSHOT_VERSION,
            records,
            metadata: SnapshotMetadata {
                saved_at: Utc::now(),
                record_count,
                document_count,
            },
        }
    }
}

// ============================================================================
// File Archive Store
// ============================================================================

/// Archive store persisted as a single MessagePack snapshot.
///
/// Every upsert rewrites the snapshot through a temp file and a rename, and
/// the in-memory view only changes once the file is on disk. A failed write
/// therefore leaves neither a record nor a torn file behind.
pub struct FileArchiveStore {
    path: PathBuf,
    records: RwLock<BTreeMap<UserId, ArchiveRecord>>,
}

impl FileArchiveStore {
    /// Open the store at `path`, loading an existing snapshot if present
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match load_snapshot(&path).await? {
            Some(snapshot) => {
                if snapshot.version > SNAPSHOT_VERSION {
                    return Err(ArchiveError::StoreConnection(format!(
                        "archive snapshot '{}' has version {} (supported: {})",
                        path.display(),
                        snapshot.version,
                        SNAPSHOT_VERSION
                    )));
                }
                snapshot
                    .records
                    .into_iter()
                    .map(|record| (record.user_id, record))
                    .collect()
            }
            None => BTreeMap::new(),
        };
        debug!(path = %path.display(), records = records.len(), "archive store opened");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArchiveStore for FileArchiveStore {
    async fn health_check(&self) -> Result<()> {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };
        fs::create_dir_all(parent).await.map_err(|err| {
            ArchiveError::StoreConnection(format!(
                "archive directory '{}' is not usable: {}",
                parent.display(),
                err
            ))
        })
    }

    async fn upsert_archive_record(&self, record: ArchiveRecord) -> Result<()> {
        let user_id = record.user_id;
        let mut records = self.records.write().await;

        let mut next = records.clone();
        next.insert(user_id, record);
        let snapshot = ArchiveSnapshot::new(next.values().cloned().collect());
        let bytes = rmp_serde::to_vec(&snapshot)
            .map_err(|err| ArchiveError::archive_write(user_id, err.to_string()))?;
        atomic_write(&self.path, &bytes)
            .await
            .map_err(|err| ArchiveError::archive_write(user_id, err.to_string()))?;

        *records = next;
        Ok(())
    }

    async fn get_archive_record(&self, user_id: UserId) -> Result<Option<ArchiveRecord>> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn list_archive_records(&self) -> Result<Vec<ArchiveRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

// ============================================================================
// File Event Store
// ============================================================================

/// On-disk form of the live event log.
///
/// `next_event_id` is kept so ids of deleted events are never handed out
/// again. Archived documents are merged by event id.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventLog {
    pub next_event_id: u64,
    pub events: Vec<Event>,
}

/// A log file is either a saved `EventLog` or a plain JSON array of events
/// awaiting ingest, which get ids in file order.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventLogFile {
    Log(EventLog),
    Ingest(Vec<NewEvent>),
}

struct LiveEvents {
    table: EventTable,
    next_id: u64,
}

/// Live event store persisted as a JSON event log.
///
/// Each insert or delete rewrites the log atomically, and the in-memory table
/// only changes once the file is on disk.
pub struct FileEventStore {
    path: PathBuf,
    live: RwLock<LiveEvents>,
}

impl FileEventStore {
    /// Open the log at `path`. The file must exist.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).await.map_err(|err| {
            ArchiveError::StoreConnection(format!(
                "Failed to read event log '{}': {}",
                path.display(),
                err
            ))
        })?;
        let file: EventLogFile = serde_json::from_str(&raw).map_err(|err| {
            ArchiveError::StoreConnection(format!(
                "Failed to decode event log '{}': {}",
                path.display(),
                err
            ))
        })?;

        let live = match file {
            EventLogFile::Log(log) => {
                let table = EventTable::from_rows(log.events);
                let after_max = table.max_id().map_or(1, |id| id.0 + 1);
                LiveEvents {
                    table,
                    next_id: log.next_event_id.max(after_max),
                }
            }
            EventLogFile::Ingest(events) => {
                let (table, next_id) = EventTable::ingest(events);
                LiveEvents { table, next_id }
            }
        };
        debug!(path = %path.display(), events = live.table.len(), "event log opened");
        Ok(Self {
            path,
            live: RwLock::new(live),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.table.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, table: &EventTable, next_id: u64) -> Result<()> {
        let log = EventLog {
            next_event_id: next_id,
            events: table.events(),
        };
        let bytes = serde_json::to_vec_pretty(&log)?;
        atomic_write(&self.path, &bytes).await
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn health_check(&self) -> Result<()> {
        fs::metadata(&self.path).await.map(|_| ()).map_err(|err| {
            ArchiveError::StoreConnection(format!(
                "event log '{}' is not reachable: {}",
                self.path.display(),
                err
            ))
        })
    }

    async fn insert_event(&self, event: NewEvent) -> Result<EventId> {
        let mut live = self.live.write().await;
        let event_id = EventId(live.next_id);
        let mut next = live.table.clone();
        next.insert(event.into_event(event_id));
        self.persist(&next, live.next_id + 1).await?;

        live.table = next;
        live.next_id += 1;
        Ok(event_id)
    }

    async fn scan_events(&self) -> Result<Vec<Event>> {
        Ok(self.live.read().await.table.events())
    }

    async fn count_for_user(&self, user_id: UserId) -> Result<usize> {
        Ok(self.live.read().await.table.count_for(user_id))
    }

    async fn delete_events_for_user(&self, user_id: UserId) -> Result<usize> {
        let mut live = self.live.write().await;
        let mut next = live.table.clone();
        let deleted = next.remove_user(user_id);
        if deleted > 0 {
            self.persist(&next, live.next_id)
                .await
                .map_err(|err| ArchiveError::delete(user_id, err.to_string()))?;
            live.table = next;
        }
        Ok(deleted)
    }

    async fn delete_events(&self, user_id: UserId, event_ids: &[EventId]) -> Result<usize> {
        let mut live = self.live.write().await;
        let mut next = live.table.clone();
        let deleted = next.remove_listed(user_id, event_ids);
        if deleted > 0 {
            self.persist(&next, live.next_id)
                .await
                .map_err(|err| ArchiveError::delete(user_id, err.to_string()))?;
            live.table = next;
        }
        Ok(deleted)
    }
}

async fn load_snapshot(path: &Path) -> Result<Option<ArchiveSnapshot>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ArchiveError::StoreConnection(format!(
                "Failed to read archive snapshot '{}': {}",
                path.display(),
                err
            )));
        }
    };
    let snapshot = rmp_serde::from_slice(&data).map_err(|err| {
        ArchiveError::StoreConnection(format!(
            "Failed to decode archive snapshot '{}': {}",
            path.display(),
            err
        ))
    })?;
    Ok(Some(snapshot))
}

/// Write `bytes` to `path` via a synced temp file and a rename.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| {
            ArchiveError::IoError(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await.map_err(|err| {
        ArchiveError::IoError(format!(
            "Failed to create temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await.map_err(|err| {
        ArchiveError::IoError(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;
    Ok(())
}
