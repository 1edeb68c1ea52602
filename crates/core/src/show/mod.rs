use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LampShowError, Result, ScheduledEvent, Timeline};

const STOMP_CLAP: &str = include_str!("../../shows/stomp-clap.json");

/// A named list of `(at_ms, action)` pairs as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    /// Length of the accompanying track, when known.
    #[serde(default)]
    pub length_ms: Option<u64>,
    pub events: Vec<ScheduledEvent>,
}

impl Schedule {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let schedule: Self = serde_json::from_str(raw)?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// The three-lamp stomp/clap routine shipped with the application.
    pub fn builtin() -> Result<Self> {
        Self::from_json(STOMP_CLAP)
    }

    pub fn timeline(&self) -> Timeline {
        Timeline::from_events(self.events.clone())
    }

    fn validate(&self) -> Result<()> {
        if let Some(event) = self.events.iter().find(|event| event.action.as_str().trim().is_empty()) {
            return Err(LampShowError::InvalidSchedule(format!(
                "event at {} ms has an empty action",
                event.deadline_ms
            )));
        }
        if let (Some(length), Some(last)) = (self.length_ms, self.timeline().last_deadline_ms()) {
            if last > length {
                return Err(LampShowError::InvalidSchedule(format!(
                    "event at {last} ms is past the end of the {length} ms track"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PatternLibrary;

    #[test]
    fn builtin_show_uses_standard_patterns() {
        let schedule = Schedule::builtin().unwrap();
        let timeline = schedule.timeline();

        assert_eq!(schedule.name, "stomp-clap");
        assert_eq!(timeline.len(), 109);
        assert_eq!(timeline.events()[0], ScheduledEvent::new(1400, "lamp-1"));
        assert_eq!(timeline.last_deadline_ms(), Some(36_200));
        assert!(PatternLibrary::standard().check(&timeline).is_ok());
    }

    #[test]
    fn unsorted_file_yields_sorted_timeline() {
        let schedule = Schedule::from_json(
            r#"{ "name": "t", "events": [ { "at_ms": 30, "action": "b" }, { "at_ms": 10, "action": "a" } ] }"#,
        )
        .unwrap();

        let deadlines: Vec<_> = schedule.timeline().iter().map(|e| e.deadline_ms).collect();
        assert_eq!(deadlines, vec![10, 30]);
        assert_eq!(schedule.length_ms, None);
    }

    #[test]
    fn rejects_empty_action_names() {
        let err = Schedule::from_json(r#"{ "name": "t", "events": [ { "at_ms": 5, "action": " " } ] }"#)
            .unwrap_err();
        assert!(matches!(err, LampShowError::InvalidSchedule(_)));
    }

    #[test]
    fn rejects_events_past_track_end() {
        let err = Schedule::from_json(
            r#"{ "name": "t", "length_ms": 100, "events": [ { "at_ms": 150, "action": "a" } ] }"#,
        )
        .unwrap_err();
        assert!(format!("{err}").contains("150"));
    }

    #[test]
    fn empty_schedule_is_allowed() {
        let schedule = Schedule::from_json(r#"{ "name": "quiet", "events": [] }"#).unwrap();
        assert!(schedule.timeline().is_empty());
    }

    #[test]
    fn negative_deadlines_are_rejected_by_the_parser() {
        assert!(Schedule::from_json(r#"{ "name": "t", "events": [ { "at_ms": -5, "action": "a" } ] }"#).is_err());
    }
}
