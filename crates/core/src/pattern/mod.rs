use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ActionId, LampShowError, Result, Timeline};

/// Coil address of lamp 1 on the standard rig; lamps 2 and 3 follow it.
pub const LAMP_1: u16 = 0x0004;
pub const LAMP_2: u16 = 0x0005;
pub const LAMP_3: u16 = 0x0006;

const SHORT_HOLD_MS: u64 = 50;
const LONG_HOLD_MS: u64 = 80;

/// Low-level pulse: write `pattern` starting at `address`, hold, then clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCommand {
    #[serde(rename = "address")]
    pub base_address: u16,
    #[serde(rename = "pattern")]
    pub bit_pattern: Vec<bool>,
    pub hold_ms: u64,
}

impl OutputCommand {
    pub fn new(base_address: u16, bit_pattern: Vec<bool>, hold_ms: u64) -> Self {
        Self {
            base_address,
            bit_pattern,
            hold_ms,
        }
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// All-off pattern covering the same outputs.
    pub fn off_pattern(&self) -> Vec<bool> {
        vec![false; self.bit_pattern.len()]
    }
}

/// Named pattern as it appears in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub action: ActionId,
    pub commands: Vec<OutputCommand>,
}

/// Maps symbolic actions to the output commands that realise them.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    patterns: HashMap<ActionId, Vec<OutputCommand>>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single lamps, the three pairs and the all-lamps pulse of the
    /// three-lamp rig.
    pub fn standard() -> Self {
        let mut library = Self::new();
        let short = |address, pattern: &[bool]| OutputCommand::new(address, pattern.to_vec(), SHORT_HOLD_MS);

        library.insert("lamp-1", vec![short(LAMP_1, &[true])]);
        library.insert("lamp-2", vec![short(LAMP_2, &[true])]);
        library.insert("lamp-3", vec![short(LAMP_3, &[true])]);
        library.insert("pair-12", vec![short(LAMP_1, &[true, true])]);
        library.insert("pair-23", vec![short(LAMP_2, &[true, true])]);
        library.insert("pair-13", vec![short(LAMP_1, &[true, false, true])]);
        library.insert(
            "all-3",
            vec![OutputCommand::new(LAMP_1, vec![true; 3], LONG_HOLD_MS)],
        );
        library
    }

    /// Standard library with configured patterns layered on top.
    pub fn with_overrides(specs: &[PatternSpec]) -> Self {
        let mut library = Self::standard();
        for spec in specs {
            library.insert(spec.action.clone(), spec.commands.clone());
        }
        library
    }

    pub fn insert(&mut self, action: impl Into<ActionId>, commands: Vec<OutputCommand>) {
        self.patterns.insert(action.into(), commands);
    }

    pub fn resolve(&self, action: &ActionId) -> Option<&[OutputCommand]> {
        self.patterns.get(action).map(Vec::as_slice)
    }

    pub fn contains(&self, action: &ActionId) -> bool {
        self.patterns.contains_key(action)
    }

    /// Fails on the first timeline entry that names an unknown action or an
    /// action whose pattern cannot be written.
    pub fn check(&self, timeline: &Timeline) -> Result<()> {
        for event in timeline {
            let commands = self
                .resolve(&event.action)
                .ok_or_else(|| LampShowError::UnknownAction(event.action.to_string()))?;
            validate(&event.action, commands)?;
        }
        Ok(())
    }

    /// All known patterns sorted by action name.
    pub fn entries(&self) -> Vec<(&ActionId, &[OutputCommand])> {
        let mut entries: Vec<_> = self
            .patterns
            .iter()
            .map(|(action, commands)| (action, commands.as_slice()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn validate(action: &ActionId, commands: &[OutputCommand]) -> Result<()> {
    let invalid = |reason: &str| LampShowError::InvalidPattern {
        action: action.to_string(),
        reason: reason.to_string(),
    };
    if commands.is_empty() {
        return Err(invalid("no output commands"));
    }
    if commands.iter().any(|command| command.bit_pattern.is_empty()) {
        return Err(invalid("empty bit pattern"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pair_13_skips_middle_lamp() {
        let library = PatternLibrary::standard();
        let commands = library.resolve(&"pair-13".into()).unwrap();

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].base_address, LAMP_1);
        assert_eq!(commands[0].bit_pattern, vec![true, false, true]);
        assert_eq!(commands[0].off_pattern(), vec![false; 3]);
        assert_eq!(commands[0].hold(), Duration::from_millis(50));
    }

    #[test]
    fn all_lamps_hold_longer() {
        let library = PatternLibrary::standard();
        let commands = library.resolve(&"all-3".into()).unwrap();
        assert_eq!(commands[0].hold_ms, 80);
    }

    #[test]
    fn overrides_replace_and_extend() {
        let specs: Vec<PatternSpec> = serde_json::from_str(
            r#"[
                { "action": "lamp-1", "commands": [ { "address": 10, "pattern": [true], "hold_ms": 20 } ] },
                { "action": "strobe", "commands": [ { "address": 4, "pattern": [true, true, true], "hold_ms": 10 } ] }
            ]"#,
        )
        .unwrap();

        let library = PatternLibrary::with_overrides(&specs);
        assert_eq!(library.len(), 8);
        assert_eq!(library.resolve(&"lamp-1".into()).unwrap()[0].base_address, 10);
        assert!(library.contains(&"strobe".into()));
    }

    #[test]
    fn check_reports_unknown_action() {
        let library = PatternLibrary::standard();
        let timeline = Timeline::builder().at(10, "lamp-1").at(20, "lamp-9").build();

        let err = library.check(&timeline).unwrap_err();
        assert!(format!("{err}").contains("lamp-9"));
    }

    #[test]
    fn check_rejects_empty_bit_patterns() {
        let specs: Vec<PatternSpec> = serde_json::from_str(
            r#"[ { "action": "blank", "commands": [ { "address": 4, "pattern": [], "hold_ms": 50 } ] } ]"#,
        )
        .unwrap();
        let library = PatternLibrary::with_overrides(&specs);
        let timeline = Timeline::builder().at(10, "lamp-1").at(20, "blank").build();

        let err = library.check(&timeline).unwrap_err();
        assert!(matches!(err, LampShowError::InvalidPattern { ref action, .. } if action == "blank"));
    }

    #[test]
    fn check_rejects_actions_without_commands() {
        let mut library = PatternLibrary::standard();
        library.insert("nothing", Vec::new());
        let timeline = Timeline::builder().at(10, "nothing").build();

        assert!(library.check(&timeline).is_err());
    }

    #[test]
    fn entries_are_sorted() {
        let library = PatternLibrary::standard();
        let names: Vec<_> = library.entries().iter().map(|(a, _)| a.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
