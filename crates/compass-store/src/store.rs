use crate::error::Result;
use crate::types::{ConversationTurn, Goal, PlanningSession, User};

/// Capability surface the polling worker consumes.
///
/// Production uses [`crate::SqliteStore`]; tests use [`crate::MemoryStore`].
/// Calls are synchronous and bounded (the SQLite backend sets a busy
/// timeout), so they are safe to issue from async tasks.
pub trait Store: Send + Sync {
    /// Cheap connectivity probe for the readiness endpoint.
    fn ping(&self) -> Result<()>;

    /// Last acknowledged update ID, 0 when never saved. Reads the canonical
    /// runtime-state key first and falls back to the legacy key written by
    /// earlier deployments.
    fn load_last_update_id(&self) -> Result<i64>;

    /// Upserts the offset under both the canonical and the legacy key.
    fn save_last_update_id(&self, last_update_id: i64) -> Result<()>;

    /// Records `update_id` as seen. Returns `true` iff this is the first
    /// sighting; a replay resolves to `false` without error.
    fn mark_message_dedup(&self, update_id: i64, chat_id: i64) -> Result<bool>;

    /// Returns the user for `chat_id`, creating one with default locale
    /// settings on first contact. The flag is `true` when a row was created.
    fn find_or_create_user(&self, chat_id: i64) -> Result<(User, bool)>;

    /// The single non-terminal goal of the user, `active` preferred over
    /// `draft`, most recently updated first.
    fn get_active_goal(&self, user_id: &str) -> Result<Option<Goal>>;

    /// Inserts a fresh goal with empty title and `draft` status.
    fn create_goal_draft(&self, user_id: &str) -> Result<Goal>;

    /// Returns the session for `goal_id`, creating one in `idle` state when
    /// absent. The flag is `true` when a row was created.
    fn get_or_create_planning_session(&self, goal_id: &str) -> Result<(PlanningSession, bool)>;

    /// Atomic `turn_count := turn_count + 1`; returns the new count.
    fn increment_planning_session_turn(&self, session_id: &str) -> Result<i64>;

    /// Overwrites state, slot completion, turn count and last intent; bumps
    /// `updated_at`.
    fn update_planning_session(&self, session: &PlanningSession) -> Result<()>;

    /// Append-only conversation log.
    fn save_conversation_turn(&self, turn: ConversationTurn) -> Result<()>;
}
