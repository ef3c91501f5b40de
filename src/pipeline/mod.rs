// ============================================================================
// Retention Pipeline
// ============================================================================
//
// GroupBy -> Filter -> Sort over a user-keyed map, then per-user enforcement:
//
//   aggregator::group_events   one UserAggregate per user id
//   classifier::classify       dual-threshold filter, oldest activity first
//   enforcer::RetentionEnforcer archive upsert, then scoped delete
//
// ============================================================================

pub mod aggregator;
pub mod classifier;
pub mod enforcer;

pub use aggregator::group_events;
pub use classifier::{Cutoffs, DormancyDecision, DormancyPolicy, classify};
pub use enforcer::{DeleteScope, RetentionEnforcer, RetentionState, UserOutcome, UserRetention};
