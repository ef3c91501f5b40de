#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dormant_archive::{
    ArchiveError, ArchiveRecord, ArchiveStore, Event, EventId, EventStore, EventType,
    InMemoryArchiveStore, InMemoryEventStore, NewEvent, Result, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn ts(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// Evaluation instant used throughout the fixture scenarios
pub fn fixture_now() -> DateTime<Utc> {
    ts(2024, 2, 25, 0, 0)
}

/// Ten users registered in December 2023 with one event each in January 2024
pub fn ten_user_fixture() -> Vec<NewEvent> {
    let rows = [
        (123, EventType::Purchase, ts(2024, 1, 20, 10, 0), ts(2023, 12, 1, 10, 0)),
        (124, EventType::Login, ts(2024, 1, 21, 9, 30), ts(2023, 12, 2, 12, 0)),
        (125, EventType::Signup, ts(2024, 1, 19, 14, 15), ts(2023, 12, 3, 11, 45)),
        (126, EventType::Purchase, ts(2024, 1, 20, 16, 0), ts(2023, 12, 4, 9, 0)),
        (127, EventType::Login, ts(2024, 1, 22, 10, 0), ts(2023, 12, 5, 10, 0)),
        (128, EventType::Signup, ts(2024, 1, 22, 11, 30), ts(2023, 12, 6, 13, 0)),
        (129, EventType::Purchase, ts(2024, 1, 23, 15, 0), ts(2023, 12, 7, 8, 0)),
        (130, EventType::Login, ts(2024, 1, 23, 16, 45), ts(2023, 12, 8, 10, 0)),
        (131, EventType::Purchase, ts(2024, 1, 24, 12, 0), ts(2023, 12, 9, 14, 0)),
        (132, EventType::Signup, ts(2024, 1, 24, 18, 30), ts(2023, 12, 10, 10, 0)),
    ];

    rows.into_iter()
        .enumerate()
        .map(|(i, (user_id, event_type, event_time, registered))| {
            NewEvent::new(
                user_id,
                event_type,
                event_time,
                format!("user{}@example.com", i + 1),
                registered,
            )
        })
        .collect()
}

pub fn event(user_id: UserId, time: DateTime<Utc>, registered: DateTime<Utc>) -> NewEvent {
    NewEvent::new(
        user_id,
        EventType::Login,
        time,
        format!("user{user_id}@example.com"),
        registered,
    )
}

/// Archive store that rejects writes for selected users
pub struct FlakyArchiveStore {
    inner: InMemoryArchiveStore,
    failing: HashSet<UserId>,
}

impl FlakyArchiveStore {
    pub fn failing_for(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            inner: InMemoryArchiveStore::new(),
            failing: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ArchiveStore for FlakyArchiveStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_archive_record(&self, record: ArchiveRecord) -> Result<()> {
        if self.failing.contains(&record.user_id) {
            return Err(ArchiveError::archive_write(record.user_id, "injected write failure"));
        }
        self.inner.upsert_archive_record(record).await
    }

    async fn get_archive_record(&self, user_id: UserId) -> Result<Option<ArchiveRecord>> {
        self.inner.get_archive_record(user_id).await
    }

    async fn list_archive_records(&self) -> Result<Vec<ArchiveRecord>> {
        self.inner.list_archive_records().await
    }
}

/// Event store wrapper with switchable faults and a hook that runs between
/// the archive write and the delete of a chosen user.
pub struct FaultyEventStore {
    pub inner: InMemoryEventStore,
    failing_deletes: std::sync::Mutex<HashSet<UserId>>,
    pub unreachable: AtomicBool,
    pub broken_scan: AtomicBool,
    pub delete_calls: AtomicUsize,
    late_event: std::sync::Mutex<Option<NewEvent>>,
}

impl FaultyEventStore {
    pub fn new(events: Vec<NewEvent>) -> Self {
        Self {
            inner: InMemoryEventStore::from_events(events),
            failing_deletes: std::sync::Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            broken_scan: AtomicBool::new(false),
            delete_calls: AtomicUsize::new(0),
            late_event: std::sync::Mutex::new(None),
        }
    }

    pub fn fail_deletes_for(&self, users: impl IntoIterator<Item = UserId>) {
        self.failing_deletes.lock().unwrap().extend(users);
    }

    pub fn heal_deletes(&self) {
        self.failing_deletes.lock().unwrap().clear();
    }

    /// Insert `event` just before the first delete for its user runs
    pub fn insert_before_delete(&self, event: NewEvent) {
        *self.late_event.lock().unwrap() = Some(event);
    }

    async fn before_delete(&self, user_id: UserId) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let late = {
            let mut slot = self.late_event.lock().unwrap();
            if slot.as_ref().is_some_and(|event| event.user_id == user_id) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(event) = late {
            self.inner.insert_event(event).await?;
        }
        if self.failing_deletes.lock().unwrap().contains(&user_id) {
            return Err(ArchiveError::delete(user_id, "injected delete failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FaultyEventStore {
    async fn health_check(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ArchiveError::StoreConnection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<EventId> {
        self.inner.insert_event(event).await
    }

    async fn scan_events(&self) -> Result<Vec<Event>> {
        if self.broken_scan.load(Ordering::SeqCst) {
            return Err(ArchiveError::IoError("cursor lost".to_string()));
        }
        self.inner.scan_events().await
    }

    async fn count_for_user(&self, user_id: UserId) -> Result<usize> {
        self.inner.count_for_user(user_id).await
    }

    async fn delete_events_for_user(&self, user_id: UserId) -> Result<usize> {
        self.before_delete(user_id).await?;
        self.inner.delete_events_for_user(user_id).await
    }

    async fn delete_events(&self, user_id: UserId, event_ids: &[EventId]) -> Result<usize> {
        self.before_delete(user_id).await?;
        self.inner.delete_events(user_id, event_ids).await
    }
}

pub fn stores(
    events: Vec<NewEvent>,
) -> (Arc<InMemoryEventStore>, Arc<InMemoryArchiveStore>) {
    (
        Arc::new(InMemoryEventStore::from_events(events)),
        Arc::new(InMemoryArchiveStore::new()),
    )
}
