use super::Report;
use crate::run::RunSummary;
use std::fmt::Write;

const RULE: &str = "==================================================";

/// Operator-facing text form of a report. Not a compatibility surface.
pub fn render_text(report: &Report, summary: Option<&RunSummary>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "ARCHIVE REPORT:");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "\"date\": \"{}\",", report.date.format("%Y-%m-%d"));
    let _ = writeln!(out, "\"archived_users_count\": {},", report.archived_users_count);
    let _ = writeln!(out, "\"archived_user_ids\": [");

    let last = report.archived_user_ids.len().saturating_sub(1);
    for (i, user_id) in report.archived_user_ids.iter().enumerate() {
        if i == last {
            let _ = writeln!(out, "{user_id}");
        } else {
            let _ = writeln!(out, "{user_id},");
        }
    }

    let _ = writeln!(out, "]");
    let _ = writeln!(out, "{RULE}");

    if let Some(summary) = summary {
        let _ = writeln!(out, "   - Classified dormant: {}", summary.classified);
        let _ = writeln!(out, "   - Archived: {}", summary.completed);
        let _ = writeln!(out, "   - Removed from live store: {}", summary.deleted_events);
        if summary.archive_failed > 0 {
            let _ = writeln!(
                out,
                "   - Archive failed (retry next run): {}",
                summary.archive_failed
            );
        }
        if summary.delete_pending > 0 {
            let _ = writeln!(
                out,
                "   - Archived, delete pending (retry next run): {}",
                summary.delete_pending
            );
        }
        if summary.skipped > 0 {
            let _ = writeln!(out, "   - Skipped (cancelled): {}", summary.skipped);
        }
    }

    out
}
