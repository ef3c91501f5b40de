use crate::config::RetentionConfig;
use crate::core::{ArchiveError, Result, UserAggregate, UserId};
use crate::pipeline::{RetentionEnforcer, UserOutcome, classify};
use crate::report::{Report, ReportSink};
use crate::storage::{ArchiveStore, EventStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Cooperative cancellation shared between a run and its controller.
///
/// Checked only between users, so a user whose archive write has started
/// always finishes its archive/delete pair.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-run counts of user outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub classified: usize,
    pub completed: usize,
    pub archive_failed: usize,
    pub delete_pending: usize,
    pub skipped: usize,
    /// Live events removed across all completed users
    pub deleted_events: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[UserOutcome]) -> Self {
        let mut summary = Self {
            classified: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                UserOutcome::Completed { deleted_count, .. } => {
                    summary.completed += 1;
                    summary.deleted_events += deleted_count;
                }
                UserOutcome::ArchiveFailed { .. } => summary.archive_failed += 1,
                UserOutcome::DeletePending { .. } => summary.delete_pending += 1,
                UserOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.archive_failed == 0 && self.delete_pending == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    pub report: Report,
    /// In classifier order
    pub outcomes: Vec<UserOutcome>,
    pub summary: RunSummary,
    /// Where the report artifact was written, if a sink is attached
    pub report_location: Option<String>,
}

impl RunOutcome {
    pub fn outcome_for(&self, user_id: UserId) -> Option<&UserOutcome> {
        self.outcomes.iter().find(|outcome| outcome.user_id() == user_id)
    }
}

/// One classify -> archive -> delete -> report pass over an event store.
pub struct RetentionRun {
    events: Arc<dyn EventStore>,
    archive: Arc<dyn ArchiveStore>,
    sink: Option<Arc<dyn ReportSink>>,
    config: RetentionConfig,
    cancel: CancellationFlag,
}

impl RetentionRun {
    pub fn new(
        events: Arc<dyn EventStore>,
        archive: Arc<dyn ArchiveStore>,
        config: RetentionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            events,
            archive,
            sink: None,
            config,
            cancel: CancellationFlag::new(),
        })
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Dormant users at `now`, in processing order. Touches nothing.
    pub async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<UserAggregate>> {
        self.events.health_check().await.map_err(as_connection_error)?;
        self.archive.health_check().await.map_err(as_connection_error)?;

        let aggregates = self
            .events
            .grouped_aggregates()
            .await
            .map_err(as_query_error)?;
        let population = aggregates.len();
        let dormant = classify(aggregates, now, &self.config.policy());
        info!(population, dormant = dormant.len(), "users classified");
        Ok(dormant)
    }

    /// Run the full pipeline at the configured evaluation instant
    pub async fn execute(&self) -> Result<RunOutcome> {
        let now = self.config.evaluation_instant();
        let run_id = Uuid::new_v4();
        let span = info_span!("retention_run", %run_id, %now);
        self.execute_at(run_id, now).instrument(span).await
    }

    async fn execute_at(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<RunOutcome> {
        let candidates = self.plan(now).await?;
        let enforcer = RetentionEnforcer::new(self.events.clone(), self.archive.clone(), now)
            .with_delete_scope(self.config.delete_scope);

        let outcomes = self.enforce_all(&enforcer, &candidates).await?;
        let summary = RunSummary::from_outcomes(&outcomes);
        let report = Report::generate(
            now.date_naive(),
            outcomes
                .iter()
                .filter(|outcome| outcome.is_completed())
                .map(UserOutcome::user_id),
        );

        if !summary.is_clean() {
            warn!(
                archive_failed = summary.archive_failed,
                delete_pending = summary.delete_pending,
                skipped = summary.skipped,
                "run finished with users left for the next run"
            );
        }

        let report_location = match &self.sink {
            Some(sink) => Some(sink.write_report(&report).await.map_err(|err| {
                ArchiveError::ReportWrite(format!(
                    "{err}; {} users archived and deleted before the failure remain so",
                    summary.completed
                ))
            })?),
            None => None,
        };

        info!(
            archived = summary.completed,
            deleted_events = summary.deleted_events,
            report = report_location.as_deref().unwrap_or("-"),
            "retention run complete"
        );

        Ok(RunOutcome {
            run_id,
            now,
            report,
            outcomes,
            summary,
            report_location,
        })
    }

    async fn enforce_all(
        &self,
        enforcer: &RetentionEnforcer,
        candidates: &[UserAggregate],
    ) -> Result<Vec<UserOutcome>> {
        let concurrency = self.config.concurrency.max(1);
        let mut indexed: Vec<(usize, Result<UserOutcome>)> =
            stream::iter(candidates.iter().enumerate())
                .map(|(index, aggregate)| async move {
                    (index, self.enforce_one(enforcer, aggregate).await)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        // Collector: restore classifier order before reporting.
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn enforce_one(
        &self,
        enforcer: &RetentionEnforcer,
        aggregate: &UserAggregate,
    ) -> Result<UserOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(UserOutcome::Skipped {
                user_id: aggregate.user_id,
            });
        }
        enforcer.enforce(aggregate).await
    }
}

fn as_connection_error(err: ArchiveError) -> ArchiveError {
    match err {
        ArchiveError::StoreConnection(_) => err,
        other => ArchiveError::StoreConnection(other.to_string()),
    }
}

fn as_query_error(err: ArchiveError) -> ArchiveError {
    match err {
        ArchiveError::StoreConnection(_) | ArchiveError::AggregationQuery(_) => err,
        other => ArchiveError::AggregationQuery(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_each_outcome() {
        let outcomes = vec![
            UserOutcome::Completed { user_id: 1, deleted_count: 2 },
            UserOutcome::Completed { user_id: 2, deleted_count: 1 },
            UserOutcome::ArchiveFailed { user_id: 3, error: "disk".into() },
            UserOutcome::DeletePending { user_id: 4, error: "timeout".into() },
            UserOutcome::Skipped { user_id: 5 },
        ];
        let summary = RunSummary::from_outcomes(&outcomes);
        assert_eq!(summary.classified, 5);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.deleted_events, 3);
        assert_eq!(summary.archive_failed, 1);
        assert_eq!(summary.delete_pending, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_error_mapping_keeps_connection_errors() {
        let mapped = as_query_error(ArchiveError::StoreConnection("down".into()));
        assert!(matches!(mapped, ArchiveError::StoreConnection(_)));
        let mapped = as_query_error(ArchiveError::IoError("bad read".into()));
        assert!(matches!(mapped, ArchiveError::AggregationQuery(_)));
    }
}
