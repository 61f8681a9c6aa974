use serde::{Deserialize, Serialize};

/// Lifecycle state of a planning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanningState {
    #[default]
    Idle,
    Clarifying,
    Review,
    Confirmed,
}

impl PlanningState {
    /// Lenient parse for values read back from storage — anything
    /// unrecognised collapses to `Idle`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "idle" => PlanningState::Idle,
            "clarifying" => PlanningState::Clarifying,
            "review" => PlanningState::Review,
            "confirmed" => PlanningState::Confirmed,
            _ => PlanningState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanningState::Idle => "idle",
            PlanningState::Clarifying => "clarifying",
            PlanningState::Review => "review",
            PlanningState::Confirmed => "confirmed",
        }
    }

    /// `Confirmed` ends the clarification dialogue (reopening is a
    /// distinct edge handled by the state machine).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanningState::Confirmed)
    }
}

impl std::fmt::Display for PlanningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
