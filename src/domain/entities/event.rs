//! Notification published around the save of every clone.

use super::record::Record;

/// Which side of the save an event was published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClonePhase {
    /// Published before the clone is persisted.
    Cloning,
    /// Published after the clone is persisted.
    Cloned,
}

impl ClonePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloning => "cloning",
            Self::Cloned => "cloned",
        }
    }
}

/// A `cloning:<type>` / `cloned:<type>` notification.
///
/// Carries the clone as it was at publish time (unsaved for `Cloning`,
/// persisted for `Cloned`) and the source of that branch of the duplication.
#[derive(Debug, Clone)]
pub struct CloneEvent {
    pub name: String,
    pub phase: ClonePhase,
    pub clone: Record,
    pub source: Record,
}

impl CloneEvent {
    pub fn new(phase: ClonePhase, clone: Record, source: Record) -> Self {
        Self {
            name: Self::event_name(phase, &source.entity_type),
            phase,
            clone,
            source,
        }
    }

    /// Formats the event name, e.g. `cloning:post`.
    pub fn event_name(phase: ClonePhase, entity_type: &str) -> String {
        format!("{}:{}", phase.as_str(), entity_type)
    }
}
