use crate::core::{UserAggregate, UserId};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

pub const DEFAULT_REGISTRATION_AGE_DAYS: i64 = 30;
pub const DEFAULT_ACTIVITY_AGE_DAYS: i64 = 14;

/// Dual-threshold dormancy policy.
///
/// A user is dormant when registered longer ago than
/// `registration_age_threshold` AND last active longer ago than
/// `activity_age_threshold`. Both comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DormancyPolicy {
    pub registration_age_threshold: Duration,
    pub activity_age_threshold: Duration,
}

impl Default for DormancyPolicy {
    fn default() -> Self {
        Self {
            registration_age_threshold: Duration::days(DEFAULT_REGISTRATION_AGE_DAYS),
            activity_age_threshold: Duration::days(DEFAULT_ACTIVITY_AGE_DAYS),
        }
    }
}

/// Instants a user's timestamps must fall strictly before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub registered_before: DateTime<Utc>,
    pub active_before: DateTime<Utc>,
}

/// Classification result for one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct DormancyDecision {
    pub user_id: UserId,
    pub dormant: bool,
    pub registered_long_enough: bool,
    pub inactive_long_enough: bool,
    pub reason: String,
}

impl DormancyPolicy {
    pub fn new(registration_age_threshold: Duration, activity_age_threshold: Duration) -> Self {
        Self {
            registration_age_threshold,
            activity_age_threshold,
        }
    }

    /// Cutoff instants at `now`. A threshold reaching past the earliest
    /// representable instant clamps to it, which no timestamp is before.
    pub fn cutoffs(&self, now: DateTime<Utc>) -> Cutoffs {
        let back = |threshold: Duration| {
            now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        Cutoffs {
            registered_before: back(self.registration_age_threshold),
            active_before: back(self.activity_age_threshold),
        }
    }

    pub fn evaluate(&self, aggregate: &UserAggregate, now: DateTime<Utc>) -> DormancyDecision {
        let cutoffs = self.cutoffs(now);
        let registered_long_enough = aggregate.registration_date < cutoffs.registered_before;
        let inactive_long_enough = aggregate.last_event_time < cutoffs.active_before;
        let dormant = registered_long_enough && inactive_long_enough;

        let reason = match (registered_long_enough, inactive_long_enough) {
            (true, true) => format!(
                "registered {} and last active {}, both before cutoffs",
                aggregate.registration_date, aggregate.last_event_time
            ),
            (false, _) => format!(
                "registered {} is not before {}",
                aggregate.registration_date, cutoffs.registered_before
            ),
            (true, false) => format!(
                "last active {} is not before {}",
                aggregate.last_event_time, cutoffs.active_before
            ),
        };

        DormancyDecision {
            user_id: aggregate.user_id,
            dormant,
            registered_long_enough,
            inactive_long_enough,
            reason,
        }
    }
}

/// Keep the dormant aggregates, oldest activity first, ties by user id.
pub fn classify(
    aggregates: impl IntoIterator<Item = UserAggregate>,
    now: DateTime<Utc>,
    policy: &DormancyPolicy,
) -> Vec<UserAggregate> {
    let mut dormant: Vec<UserAggregate> = aggregates
        .into_iter()
        .filter(|aggregate| {
            let decision = policy.evaluate(aggregate, now);
            if !decision.dormant {
                debug!(user_id = decision.user_id, reason = %decision.reason, "user kept live");
            }
            decision.dormant
        })
        .collect();
    sort_for_processing(&mut dormant);
    dormant
}

pub fn sort_for_processing(aggregates: &mut [UserAggregate]) {
    aggregates.sort_by(|left, right| {
        left.last_event_time
            .cmp(&right.last_event_time)
            .then(left.user_id.cmp(&right.user_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 25, 0, 0, 0).unwrap()
    }

    fn aggregate(
        user_id: UserId,
        registered: DateTime<Utc>,
        last: DateTime<Utc>,
    ) -> UserAggregate {
        UserAggregate {
            user_id,
            last_event_time: last,
            registration_date: registered,
            email: format!("user{user_id}@example.com"),
            documents: Vec::new(),
            consistent: true,
        }
    }

    #[test]
    fn test_both_thresholds_required() {
        let policy = DormancyPolicy::default();
        let old = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();

        let candidates = vec![
            aggregate(1, old, stale),
            aggregate(2, old, recent),
            aggregate(3, recent, stale),
            aggregate(4, recent, recent),
        ];
        let dormant = classify(candidates, now(), &policy);
        assert_eq!(dormant.iter().map(|a| a.user_id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_cutoffs_are_strict() {
        let policy = DormancyPolicy::default();
        let cutoffs = policy.cutoffs(now());
        let exact = aggregate(1, cutoffs.registered_before, cutoffs.active_before);
        assert!(!policy.evaluate(&exact, now()).dormant);

        let just_before = aggregate(
            2,
            cutoffs.registered_before - Duration::seconds(1),
            cutoffs.active_before - Duration::seconds(1),
        );
        assert!(policy.evaluate(&just_before, now()).dormant);
    }

    #[test]
    fn test_threshold_past_representable_range_selects_nobody() {
        let policy = DormancyPolicy::new(Duration::days(100_000_000), Duration::days(14));
        let cutoffs = policy.cutoffs(now());
        assert_eq!(cutoffs.registered_before, DateTime::<Utc>::MIN_UTC);

        let ancient = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let dormant = classify(vec![aggregate(1, ancient, ancient)], now(), &policy);
        assert!(dormant.is_empty());
    }

    #[test]
    fn test_sorted_oldest_activity_first_then_user_id() {
        let old = Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap();
        let jan5 = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let jan9 = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();

        let dormant = classify(
            vec![aggregate(30, old, jan9), aggregate(20, old, jan5), aggregate(10, old, jan9)],
            now(),
            &DormancyPolicy::default(),
        );
        assert_eq!(
            dormant.iter().map(|a| a.user_id).collect::<Vec<_>>(),
            vec![20, 10, 30]
        );
    }

    #[test]
    fn test_evaluate_explains_rejection() {
        let policy = DormancyPolicy::new(Duration::days(30), Duration::days(14));
        let old = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();

        let decision = policy.evaluate(&aggregate(5, old, recent), now());
        assert!(!decision.dormant);
        assert!(decision.registered_long_enough);
        assert!(!decision.inactive_long_enough);
        assert!(decision.reason.starts_with("last active"));
    }
}
