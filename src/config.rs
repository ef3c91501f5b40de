use crate::core::{ArchiveError, Result};
use crate::pipeline::classifier::{DEFAULT_ACTIVITY_AGE_DAYS, DEFAULT_REGISTRATION_AGE_DAYS};
use crate::pipeline::{DeleteScope, DormancyPolicy};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::PathBuf;

/// Retention run configuration
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Evaluation instant; wall-clock at run start when unset
    pub now: Option<DateTime<Utc>>,

    /// Minimum account age before a user can be dormant
    pub registration_age_threshold: Duration,

    /// Minimum time since last activity before a user can be dormant
    pub activity_age_threshold: Duration,

    /// Which events a completed archive removes
    pub delete_scope: DeleteScope,

    /// Users processed at once during enforcement
    pub concurrency: usize,

    /// Directory for report artifacts
    pub reports_dir: PathBuf,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            now: None,
            registration_age_threshold: Duration::days(DEFAULT_REGISTRATION_AGE_DAYS),
            activity_age_threshold: Duration::days(DEFAULT_ACTIVITY_AGE_DAYS),
            delete_scope: DeleteScope::Snapshot,
            concurrency: 1,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl RetentionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the evaluation instant
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn registration_age_threshold(mut self, threshold: Duration) -> Self {
        self.registration_age_threshold = threshold;
        self
    }

    pub fn activity_age_threshold(mut self, threshold: Duration) -> Self {
        self.activity_age_threshold = threshold;
        self
    }

    pub fn delete_scope(mut self, scope: DeleteScope) -> Self {
        self.delete_scope = scope;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    /// Read overrides from `DORMANT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = env_var("DORMANT_NOW") {
            config.now = Some(parse_instant(&raw)?);
        }
        if let Some(raw) = env_var("DORMANT_REGISTRATION_DAYS") {
            let days = parse_number("DORMANT_REGISTRATION_DAYS", &raw)?;
            config.registration_age_threshold = threshold_days("DORMANT_REGISTRATION_DAYS", days)?;
        }
        if let Some(raw) = env_var("DORMANT_ACTIVITY_DAYS") {
            let days = parse_number("DORMANT_ACTIVITY_DAYS", &raw)?;
            config.activity_age_threshold = threshold_days("DORMANT_ACTIVITY_DAYS", days)?;
        }
        if let Some(raw) = env_var("DORMANT_CONCURRENCY") {
            let concurrency = parse_number("DORMANT_CONCURRENCY", &raw)?;
            config.concurrency = usize::try_from(concurrency).map_err(|_| {
                ArchiveError::Config("DORMANT_CONCURRENCY must be positive".to_string())
            })?;
        }
        if let Some(raw) = env_var("DORMANT_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("DORMANT_DELETE_SCOPE") {
            config.delete_scope = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.registration_age_threshold < Duration::zero() {
            return Err(ArchiveError::Config(
                "registration_age_threshold cannot be negative".to_string(),
            ));
        }
        if self.activity_age_threshold < Duration::zero() {
            return Err(ArchiveError::Config(
                "activity_age_threshold cannot be negative".to_string(),
            ));
        }
        if let Some(now) = self.now {
            for (name, threshold) in [
                ("registration_age_threshold", self.registration_age_threshold),
                ("activity_age_threshold", self.activity_age_threshold),
            ] {
                if now.checked_sub_signed(threshold).is_none() {
                    return Err(ArchiveError::Config(format!(
                        "{name} reaches before the earliest representable instant"
                    )));
                }
            }
        }
        if self.concurrency == 0 {
            return Err(ArchiveError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> DormancyPolicy {
        DormancyPolicy::new(self.registration_age_threshold, self.activity_age_threshold)
    }

    /// Resolve the evaluation instant for a run starting now
    pub fn evaluation_instant(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// Parse an RFC 3339 timestamp, or a bare `YYYY-MM-DD` as midnight UTC
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            ArchiveError::Config(format!(
                "invalid instant '{raw}' (expected RFC 3339 or YYYY-MM-DD)"
            ))
        })
}

/// Whole days as a threshold, rejecting counts outside the `Duration` range
pub fn threshold_days(key: &str, days: i64) -> Result<Duration> {
    Duration::try_days(days)
        .ok_or_else(|| ArchiveError::Config(format!("{key} is out of range: {days} days")))
}

fn parse_number(key: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ArchiveError::Config(format!("{key} must be an integer, got '{raw}'")))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
