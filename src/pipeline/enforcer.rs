// ============================================================================
// Retention Enforcement
// ============================================================================
//
// Each dormant user moves through its own state machine:
//
//   Pending -> Archiving -> Archived -> Deleting -> Completed
//      |           |           |           |
//      +-----------+           +-----------+
//            v                       v
//      ArchiveFailed           DeletePending
//
// The archive upsert always precedes deletion. A user is only reported as
// archived once both steps succeed. The upsert folds in any record left by an
// earlier run, so documents archived before stay archived.
//
// ============================================================================

use crate::core::{ArchiveError, ArchiveRecord, Result, UserAggregate, UserId};
use crate::storage::{ArchiveStore, EventStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which live events a completed archive write removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    /// Only the events captured in the archived snapshot
    #[default]
    Snapshot,
    /// Every event matching the user id at delete time, including events
    /// that arrived after aggregation and were never archived
    AllForUser,
}

impl FromStr for DeleteScope {
    type Err = ArchiveError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "all" | "all_for_user" => Ok(Self::AllForUser),
            other => Err(ArchiveError::Config(format!(
                "unknown delete scope '{other}' (expected 'snapshot' or 'all')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetentionState {
    Pending,
    Archiving,
    Archived,
    Deleting,
    Completed,
    ArchiveFailed,
    DeletePending,
}

impl RetentionState {
    pub fn can_transition_to(self, next: RetentionState) -> bool {
        use RetentionState::*;
        matches!(
            (self, next),
            (Pending, Archiving)
                | (Pending, ArchiveFailed)
                | (Archiving, Archived)
                | (Archiving, ArchiveFailed)
                | (Archived, Deleting)
                | (Archived, DeletePending)
                | (Deleting, Completed)
                | (Deleting, DeletePending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RetentionState::Completed
                | RetentionState::ArchiveFailed
                | RetentionState::DeletePending
        )
    }
}

impl fmt::Display for RetentionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RetentionState::Pending => "PENDING",
            RetentionState::Archiving => "ARCHIVING",
            RetentionState::Archived => "ARCHIVED",
            RetentionState::Deleting => "DELETING",
            RetentionState::Completed => "COMPLETED",
            RetentionState::ArchiveFailed => "ARCHIVE_FAILED",
            RetentionState::DeletePending => "DELETE_PENDING",
        };
        write!(f, "{label}")
    }
}

/// State tracker for a single user within one run.
#[derive(Debug, Clone)]
pub struct UserRetention {
    user_id: UserId,
    state: RetentionState,
}

impl UserRetention {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: RetentionState::Pending,
        }
    }

    pub fn state(&self) -> RetentionState {
        self.state
    }

    pub fn transition(&mut self, next: RetentionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ArchiveError::InvalidTransition(format!(
                "user {}: {} -> {}",
                self.user_id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Result of processing one classified user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UserOutcome {
    Completed { user_id: UserId, deleted_count: usize },
    ArchiveFailed { user_id: UserId, error: String },
    /// Archived but still present in the live store
    DeletePending { user_id: UserId, error: String },
    /// Not started because the run was cancelled
    Skipped { user_id: UserId },
}

impl UserOutcome {
    pub fn user_id(&self) -> UserId {
        match self {
            UserOutcome::Completed { user_id, .. }
            | UserOutcome::ArchiveFailed { user_id, .. }
            | UserOutcome::DeletePending { user_id, .. }
            | UserOutcome::Skipped { user_id } => *user_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, UserOutcome::Completed { .. })
    }

    /// Final state machine position, `None` for users never started
    pub fn state(&self) -> Option<RetentionState> {
        match self {
            UserOutcome::Completed { .. } => Some(RetentionState::Completed),
            UserOutcome::ArchiveFailed { .. } => Some(RetentionState::ArchiveFailed),
            UserOutcome::DeletePending { .. } => Some(RetentionState::DeletePending),
            UserOutcome::Skipped { .. } => None,
        }
    }
}

pub struct RetentionEnforcer {
    events: Arc<dyn EventStore>,
    archive: Arc<dyn ArchiveStore>,
    archived_date: DateTime<Utc>,
    delete_scope: DeleteScope,
}

impl RetentionEnforcer {
    pub fn new(
        events: Arc<dyn EventStore>,
        archive: Arc<dyn ArchiveStore>,
        archived_date: DateTime<Utc>,
    ) -> Self {
        Self {
            events,
            archive,
            archived_date,
            delete_scope: DeleteScope::default(),
        }
    }

    pub fn with_delete_scope(mut self, delete_scope: DeleteScope) -> Self {
        self.delete_scope = delete_scope;
        self
    }

    /// Upsert the user's record, merged with any record an earlier run left.
    /// Returns the number of documents now archived for the user.
    async fn write_archive(&self, aggregate: &UserAggregate) -> Result<usize> {
        let mut record = ArchiveRecord::from_aggregate(aggregate, self.archived_date);
        if let Some(previous) = self.archive.get_archive_record(aggregate.user_id).await? {
            record = record.merge_previous(previous);
        }
        let documents_count = record.documents_count;
        self.archive.upsert_archive_record(record).await?;
        Ok(documents_count)
    }

    /// Archive then delete one user.
    ///
    /// Store failures become outcomes. `Err` is only returned for an illegal
    /// state transition.
    pub async fn enforce(&self, aggregate: &UserAggregate) -> Result<UserOutcome> {
        let user_id = aggregate.user_id;
        let mut retention = UserRetention::new(user_id);

        retention.transition(RetentionState::Archiving)?;
        let archived = self.write_archive(aggregate).await;
        let documents_count = match archived {
            Ok(documents_count) => documents_count,
            Err(err) => {
                retention.transition(RetentionState::ArchiveFailed)?;
                warn!(user_id, error = %err, "archive write failed; user left for next run");
                return Ok(UserOutcome::ArchiveFailed {
                    user_id,
                    error: err.to_string(),
                });
            }
        };
        retention.transition(RetentionState::Archived)?;
        info!(user_id, documents_count, "user archived");

        retention.transition(RetentionState::Deleting)?;
        let deleted = match self.delete_scope {
            DeleteScope::Snapshot => {
                self.events
                    .delete_events(user_id, &aggregate.document_ids())
                    .await
            }
            DeleteScope::AllForUser => self.events.delete_events_for_user(user_id).await,
        };

        match deleted {
            Ok(deleted_count) => {
                retention.transition(RetentionState::Completed)?;
                info!(user_id, deleted_count, "user removed from live store");
                Ok(UserOutcome::Completed {
                    user_id,
                    deleted_count,
                })
            }
            Err(err) => {
                retention.transition(RetentionState::DeletePending)?;
                error!(
                    user_id,
                    error = %err,
                    "delete failed after archive write; user is archived but not removed"
                );
                Ok(UserOutcome::DeletePending {
                    user_id,
                    error: err.to_string(),
                })
            }
        }
    }
}
