pub mod error;
pub mod types;

pub use error::{ArchiveError, Result};
pub use types::{ArchiveRecord, Event, EventId, EventType, NewEvent, UserAggregate, UserId};
