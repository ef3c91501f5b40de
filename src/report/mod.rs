pub mod render;
pub mod sink;

pub use render::render_text;
pub use sink::{FileReportSink, MemoryReportSink, ReportSink};

use crate::core::{Result, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Audit report of a single run.
///
/// Serialized form is exactly
/// `{"date": "YYYY-MM-DD", "archived_users_count": n, "archived_user_ids": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub date: NaiveDate,
    pub archived_users_count: usize,
    /// Strictly ascending
    pub archived_user_ids: Vec<UserId>,
}

impl Report {
    /// Build a report from the ids of users that completed, in any order
    pub fn generate(date: NaiveDate, completed: impl IntoIterator<Item = UserId>) -> Self {
        let mut archived_user_ids: Vec<UserId> = completed.into_iter().collect();
        archived_user_ids.sort_unstable();
        archived_user_ids.dedup();
        Self {
            date,
            archived_users_count: archived_user_ids.len(),
            archived_user_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.archived_user_ids.is_empty()
    }

    pub fn file_name(&self) -> String {
        format!("archive_report_{}.json", self.date.format("%Y-%m-%d"))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
