use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbolic name of an actuation, resolved by the
/// [`PatternLibrary`](crate::PatternLibrary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single actuation scheduled at an offset from the start of the track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(rename = "at_ms")]
    pub deadline_ms: u64,
    pub action: ActionId,
}

impl ScheduledEvent {
    pub fn new(deadline_ms: u64, action: impl Into<ActionId>) -> Self {
        Self {
            deadline_ms,
            action: action.into(),
        }
    }

    /// Key used to remember that this event has already been dispatched.
    pub fn key(&self) -> (u64, ActionId) {
        (self.deadline_ms, self.action.clone())
    }
}

/// Immutable, deadline-ordered list of events.
///
/// Events sharing a deadline keep the order they were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<ScheduledEvent>,
}

impl Timeline {
    pub fn builder() -> TimelineBuilder {
        TimelineBuilder::default()
    }

    pub fn from_events(mut events: Vec<ScheduledEvent>) -> Self {
        // stable sort, so equal deadlines stay in insertion order
        events.sort_by_key(|event| event.deadline_ms);
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScheduledEvent> {
        self.events.iter()
    }

    /// Deadline of the final event, if any.
    pub fn last_deadline_ms(&self) -> Option<u64> {
        self.events.last().map(|event| event.deadline_ms)
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a ScheduledEvent;
    type IntoIter = std::slice::Iter<'a, ScheduledEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collects `(ms, action)` pairs in any order and produces a sorted [`Timeline`].
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    events: Vec<ScheduledEvent>,
}

impl TimelineBuilder {
    /// Registers `action` to fire `ms` milliseconds into the track.
    pub fn at(mut self, ms: u64, action: impl Into<ActionId>) -> Self {
        self.events.push(ScheduledEvent::new(ms, action));
        self
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    pub fn build(self) -> Timeline {
        Timeline::from_events(self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(timeline: &Timeline) -> Vec<(u64, &str)> {
        timeline
            .iter()
            .map(|event| (event.deadline_ms, event.action.as_str()))
            .collect()
    }

    #[test]
    fn sorts_by_deadline_keeping_insertion_order_on_ties() {
        let timeline = Timeline::builder()
            .at(150, "A")
            .at(100, "B")
            .at(20, "C")
            .at(100, "A")
            .build();

        assert_eq!(
            actions(&timeline),
            vec![(20, "C"), (100, "B"), (100, "A"), (150, "A")]
        );
        assert_eq!(timeline.last_deadline_ms(), Some(150));
    }

    #[test]
    fn empty_builder_gives_empty_timeline() {
        let timeline = Timeline::builder().build();
        assert!(timeline.is_empty());
        assert_eq!(timeline.len(), 0);
        assert_eq!(timeline.last_deadline_ms(), None);
    }

    #[test]
    fn deserializes_events_with_at_ms_field() {
        let event: ScheduledEvent =
            serde_json::from_str(r#"{ "at_ms": 1400, "action": "lamp-1" }"#).unwrap();
        assert_eq!(event, ScheduledEvent::new(1400, "lamp-1"));
    }
}
