use crate::model::Event;

/// Time-ordered copy of `events`. Equal times keep insertion order.
pub fn sort_timeline(events: &[Event]) -> Vec<Event> {
    let mut sorted = events.to_vec();
    // slice::sort_by is stable
    sorted.sort_by(|a, b| a.time().total_cmp(&b.time()));
    sorted
}
