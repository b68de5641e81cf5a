//! Event collection helpers

use genjob::Event;
use tokio::sync::broadcast::Receiver;

/// Drain every event already delivered to `events`
pub fn drain(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Number of poll attempts announced
pub fn poll_attempts(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::PollAttempted { .. }))
        .count()
}
