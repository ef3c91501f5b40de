use crate::core::{ArchiveRecord, Event, EventId, NewEvent, Result, UserAggregate, UserId};
use crate::pipeline::aggregator;
use async_trait::async_trait;

/// Live activity store - allows pluggable backends
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Verify the store is reachable before a run touches it
    async fn health_check(&self) -> Result<()>;

    /// Ingest a single event, returning the id the store assigned to it
    async fn insert_event(&self, event: NewEvent) -> Result<EventId>;

    /// Scan every stored event
    async fn scan_events(&self) -> Result<Vec<Event>>;

    /// Number of events currently held for a user
    async fn count_for_user(&self, user_id: UserId) -> Result<usize>;

    /// Delete every event currently matching `user_id`.
    ///
    /// Deleting an empty match set succeeds and returns 0.
    async fn delete_events_for_user(&self, user_id: UserId) -> Result<usize>;

    /// Delete only the listed events of `user_id`. Ids that no longer exist,
    /// or that belong to another user, are ignored.
    async fn delete_events(&self, user_id: UserId, event_ids: &[EventId]) -> Result<usize>;

    /// Per-user aggregates over the whole population, ascending by user id
    async fn grouped_aggregates(&self) -> Result<Vec<UserAggregate>> {
        let events = self.scan_events().await?;
        Ok(aggregator::group_events(events))
    }
}

/// Durable sink for archive records
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    /// Insert or overwrite the record keyed by its `user_id`
    async fn upsert_archive_record(&self, record: ArchiveRecord) -> Result<()>;

    async fn get_archive_record(&self, user_id: UserId) -> Result<Option<ArchiveRecord>>;

    /// All records, ascending by user id
    async fn list_archive_records(&self) -> Result<Vec<ArchiveRecord>>;
}
