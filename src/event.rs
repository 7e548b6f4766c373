use serde::{Deserialize, Serialize};

/// Record of one evaluated keystroke.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypingEntry {
    pub index: usize,
    pub expected: char,
    pub actual: char,
    pub correct: bool,
}

/// The single channel through which all derived state (stats,
/// recordings, UI) observes a session. Timestamps come from the
/// session's clock, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TypingEvent {
    SessionStart {
        timestamp: u64,
    },
    SessionComplete {
        timestamp: u64,
    },
    SessionReset {
        timestamp: u64,
    },
    InputEvaluate {
        timestamp: u64,
        #[serde(flatten)]
        entry: TypingEntry,
    },
    InputUndo {
        timestamp: u64,
        #[serde(flatten)]
        entry: TypingEntry,
    },
}

impl TypingEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            TypingEvent::SessionStart { timestamp }
            | TypingEvent::SessionComplete { timestamp }
            | TypingEvent::SessionReset { timestamp }
            | TypingEvent::InputEvaluate { timestamp, .. }
            | TypingEvent::InputUndo { timestamp, .. } => *timestamp,
        }
    }

    /// The keystroke record, for the two input-carrying variants.
    pub fn entry(&self) -> Option<&TypingEntry> {
        match self {
            TypingEvent::InputEvaluate { entry, .. } | TypingEvent::InputUndo { entry, .. } => {
                Some(entry)
            }
            _ => None,
        }
    }
}
