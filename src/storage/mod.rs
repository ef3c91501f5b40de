pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{ArchiveStore, EventStore};
pub use memory::{InMemoryArchiveStore, InMemoryEventStore};
pub use persistence::{ArchiveSnapshot, EventLog, FileArchiveStore, FileEventStore};
