use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type UserId = i64;

/// Store-assigned identifier of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Purchase,
    Login,
    Signup,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Purchase => "purchase",
            Self::Login => "login",
            Self::Signup => "signup",
        };
        write!(f, "{label}")
    }
}

/// An event as submitted for ingest, before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub user_id: UserId,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub email: String,
    pub registration_date: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(
        user_id: UserId,
        event_type: EventType,
        event_time: DateTime<Utc>,
        email: impl Into<String>,
        registration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            event_type,
            event_time,
            email: email.into(),
            registration_date,
        }
    }

    pub(crate) fn into_event(self, event_id: EventId) -> Event {
        Event {
            event_id,
            user_id: self.user_id,
            event_type: self.event_type,
            event_time: self.event_time,
            email: self.email,
            registration_date: self.registration_date,
        }
    }
}

/// A stored activity record. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub user_id: UserId,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub email: String,
    pub registration_date: DateTime<Utc>,
}

/// Per-user summary computed once per run and discarded afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    pub user_id: UserId,
    pub last_event_time: DateTime<Utc>,
    pub registration_date: DateTime<Utc>,
    pub email: String,
    /// Never empty; ordered by `(event_time, event_id)`.
    pub documents: Vec<Event>,
    /// False when the user's events disagree on email or registration date.
    pub consistent: bool,
}

impl UserAggregate {
    pub fn document_ids(&self) -> Vec<EventId> {
        self.documents.iter().map(|event| event.event_id).collect()
    }

    pub fn documents_count(&self) -> usize {
        self.documents.len()
    }
}

/// Archived copy of a user's full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub user_id: UserId,
    pub archived_date: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub registration_date: DateTime<Utc>,
    pub email: String,
    pub documents_count: usize,
    pub documents: Vec<Event>,
}

impl ArchiveRecord {
    pub fn from_aggregate(aggregate: &UserAggregate, archived_date: DateTime<Utc>) -> Self {
        Self {
            user_id: aggregate.user_id,
            archived_date,
            last_activity: aggregate.last_event_time,
            registration_date: aggregate.registration_date,
            email: aggregate.email.clone(),
            documents_count: aggregate.documents.len(),
            documents: aggregate.documents.clone(),
        }
    }

    pub fn document_ids(&self) -> Vec<EventId> {
        self.documents.iter().map(|event| event.event_id).collect()
    }

    /// Fold `previous` into this record so earlier archived history survives
    /// a re-archive. Documents are unioned by event id and identity follows
    /// the earliest document.
    pub fn merge_previous(mut self, previous: ArchiveRecord) -> Self {
        let mut by_id: BTreeMap<EventId, Event> = previous
            .documents
            .into_iter()
            .map(|event| (event.event_id, event))
            .collect();
        for event in self.documents {
            by_id.insert(event.event_id, event);
        }

        let mut documents: Vec<Event> = by_id.into_values().collect();
        documents.sort_by_key(|event| (event.event_time, event.event_id));

        if let Some(earliest) = documents.first() {
            self.email = earliest.email.clone();
            self.registration_date = earliest.registration_date;
        }
        if let Some(latest) = documents.iter().map(|event| event.event_time).max() {
            self.last_activity = latest;
        }
        self.documents_count = documents.len();
        self.documents = documents;
        self
    }
}
