use chrono::{DateTime, Utc};

use compass_planning::{PlanningState, SlotCompletion};

/// A bot user, keyed by the platform chat ID.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub telegram_chat_id: i64,
    pub language: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a goal. At most one non-terminal (`Draft`/`Active`)
/// goal exists per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalStatus {
    #[default]
    Draft,
    Active,
    Confirmed,
    Archived,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Draft => "draft",
            GoalStatus::Active => "active",
            GoalStatus::Confirmed => "confirmed",
            GoalStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(GoalStatus::Draft),
            "active" => Ok(GoalStatus::Active),
            "confirmed" => Ok(GoalStatus::Confirmed),
            "archived" => Ok(GoalStatus::Archived),
            other => Err(format!("unknown goal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent state of the clarification dialogue for one goal.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningSession {
    pub id: String,
    pub goal_id: String,
    pub state: PlanningState,
    pub slots: SlotCompletion,
    pub turn_count: i64,
    /// Tag of the most recent routed intent, e.g. "clarify_goal".
    pub last_intent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

/// One appended message of the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub intent: Option<String>,
    pub intent_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}
