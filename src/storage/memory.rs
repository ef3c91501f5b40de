use super::{ArchiveStore, EventStore};
use crate::core::{ArchiveRecord, Event, EventId, NewEvent, Result, UserId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub(crate) struct EventTable {
    /// Rows keyed by id
    rows: BTreeMap<EventId, Event>,
    /// user_id -> event ids
    by_user: HashMap<UserId, BTreeSet<EventId>>,
}

impl EventTable {
    pub(crate) fn from_rows(events: impl IntoIterator<Item = Event>) -> Self {
        let mut table = Self::default();
        for event in events {
            table.insert(event);
        }
        table
    }

    /// Assign ids from 1 in input order; returns the table and the next free id
    pub(crate) fn ingest(events: impl IntoIterator<Item = NewEvent>) -> (Self, u64) {
        let mut table = Self::default();
        let mut next_id = 1;
        for event in events {
            table.insert(event.into_event(EventId(next_id)));
            next_id += 1;
        }
        (table, next_id)
    }

    pub(crate) fn insert(&mut self, event: Event) {
        self.by_user
            .entry(event.user_id)
            .or_default()
            .insert(event.event_id);
        self.rows.insert(event.event_id, event);
    }

    fn remove(&mut self, user_id: UserId, event_id: EventId) -> bool {
        let Some(ids) = self.by_user.get_mut(&user_id) else {
            return false;
        };
        if !ids.remove(&event_id) {
            return false;
        }
        if ids.is_empty() {
            self.by_user.remove(&user_id);
        }
        self.rows.remove(&event_id).is_some()
    }

    pub(crate) fn remove_user(&mut self, user_id: UserId) -> usize {
        let Some(ids) = self.by_user.remove(&user_id) else {
            return 0;
        };
        ids.into_iter()
            .filter(|id| self.rows.remove(id).is_some())
            .count()
    }

    pub(crate) fn remove_listed(&mut self, user_id: UserId, event_ids: &[EventId]) -> usize {
        event_ids
            .iter()
            .filter(|id| self.remove(user_id, **id))
            .count()
    }

    pub(crate) fn count_for(&self, user_id: UserId) -> usize {
        self.by_user.get(&user_id).map_or(0, BTreeSet::len)
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.rows.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn max_id(&self) -> Option<EventId> {
        self.rows.keys().next_back().copied()
    }
}

/// Event store held entirely in memory, with a per-user index.
pub struct InMemoryEventStore {
    table: RwLock<EventTable>,
    next_id: AtomicU64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(EventTable::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a store pre-loaded with events, assigning ids in input order
    pub fn from_events(events: impl IntoIterator<Item = NewEvent>) -> Self {
        let (table, next_id) = EventTable::ingest(events);
        Self {
            table: RwLock::new(table),
            next_id: AtomicU64::new(next_id),
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn user_ids(&self) -> Vec<UserId> {
        let table = self.table.read().await;
        let mut ids: Vec<UserId> = table.by_user.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<EventId> {
        let event_id = EventId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.table.write().await.insert(event.into_event(event_id));
        Ok(event_id)
    }

    async fn scan_events(&self) -> Result<Vec<Event>> {
        Ok(self.table.read().await.events())
    }

    async fn count_for_user(&self, user_id: UserId) -> Result<usize> {
        Ok(self.table.read().await.count_for(user_id))
    }

    async fn delete_events_for_user(&self, user_id: UserId) -> Result<usize> {
        Ok(self.table.write().await.remove_user(user_id))
    }

    async fn delete_events(&self, user_id: UserId, event_ids: &[EventId]) -> Result<usize> {
        Ok(self.table.write().await.remove_listed(user_id, event_ids))
    }
}

/// Archive store held in memory. Useful for tests and dry runs.
#[derive(Default)]
pub struct InMemoryArchiveStore {
    records: RwLock<BTreeMap<UserId, ArchiveRecord>>,
    writes: AtomicUsize,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total successful upserts, including overwrites
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_archive_record(&self, record: ArchiveRecord) -> Result<()> {
        self.records.write().await.insert(record.user_id, record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_archive_record(&self, user_id: UserId) -> Result<Option<ArchiveRecord>> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn list_archive_records(&self) -> Result<Vec<ArchiveRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
