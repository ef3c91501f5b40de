// ============================================================================
// Dormant Archive Library
// ============================================================================

pub mod config;
pub mod core;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod storage;

// Re-export main types for convenience
pub use self::core::{
    ArchiveError, ArchiveRecord, Event, EventId, EventType, NewEvent, Result, UserAggregate,
    UserId,
};
pub use config::RetentionConfig;
pub use pipeline::{DeleteScope, DormancyPolicy, RetentionEnforcer, RetentionState, UserOutcome};
pub use report::{FileReportSink, MemoryReportSink, Report, ReportSink, render_text};
pub use run::{CancellationFlag, RetentionRun, RunOutcome, RunSummary};
pub use storage::{
    ArchiveStore, EventLog, EventStore, FileArchiveStore, FileEventStore, InMemoryArchiveStore,
    InMemoryEventStore,
};
