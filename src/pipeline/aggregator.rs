use crate::core::{Event, UserAggregate, UserId};
use std::collections::HashMap;
use tracing::warn;

/// Group raw events into one aggregate per user, ascending by user id.
///
/// Documents inside each aggregate are ordered by `(event_time, event_id)`.
/// `email` and `registration_date` come from the earliest event; if any other
/// event disagrees the aggregate is marked inconsistent.
pub fn group_events(events: impl IntoIterator<Item = Event>) -> Vec<UserAggregate> {
    let mut groups: HashMap<UserId, Vec<Event>> = HashMap::new();
    for event in events {
        groups.entry(event.user_id).or_default().push(event);
    }

    let mut aggregates: Vec<UserAggregate> = groups
        .into_iter()
        .filter_map(|(user_id, documents)| summarize(user_id, documents))
        .collect();
    aggregates.sort_by_key(|aggregate| aggregate.user_id);
    aggregates
}

fn summarize(user_id: UserId, mut documents: Vec<Event>) -> Option<UserAggregate> {
    documents.sort_by(|left, right| {
        left.event_time
            .cmp(&right.event_time)
            .then(left.event_id.cmp(&right.event_id))
    });

    let earliest = documents.first()?;
    let email = earliest.email.clone();
    let registration_date = earliest.registration_date;
    let last_event_time = documents.iter().map(|event| event.event_time).max()?;

    let consistent = documents
        .iter()
        .all(|event| event.email == email && event.registration_date == registration_date);
    if !consistent {
        warn!(
            user_id,
            events = documents.len(),
            "events disagree on email or registration date; using earliest event"
        );
    }

    Some(UserAggregate {
        user_id,
        last_event_time,
        registration_date,
        email,
        documents,
        consistent,
    })
}
