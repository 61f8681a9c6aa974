//! SQLite-backed [`Store`].
//!
//! A single connection guarded by a `Mutex` is sufficient for the
//! strictly-sequential polling worker; the unique constraints on
//! `telegram_chat_id`, `goal_id` and `update_id` provide the atomicity the
//! upsert operations rely on.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tracing::instrument;
use uuid::Uuid;

use compass_planning::{PlanningState, SlotCompletion};

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{ConversationTurn, Goal, GoalStatus, PlanningSession, User};

const RUNTIME_OFFSET_KEY: &str = "telegram_last_update_id";
const LEGACY_RUNTIME_OFFSET_KEY: &str = "last_update_id";

const DEFAULT_LANGUAGE: &str = "zh-CN";
const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another store call panicked mid-statement;
        // the connection itself is still usable.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for SqliteStore {
    fn ping(&self) -> Result<()> {
        let db = self.lock();
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn load_last_update_id(&self) -> Result<i64> {
        let db = self.lock();
        let value = match load_runtime_value(&db, RUNTIME_OFFSET_KEY)? {
            Some(value) => value,
            None => match load_runtime_value(&db, LEGACY_RUNTIME_OFFSET_KEY)? {
                Some(value) => value,
                None => return Ok(0),
            },
        };
        parse_offset(&value)
    }

    fn save_last_update_id(&self, last_update_id: i64) -> Result<()> {
        let value = last_update_id.to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.lock();
        // Transitional dual-write: old deployments still read the legacy key.
        upsert_runtime_value(&db, RUNTIME_OFFSET_KEY, &value, &now)?;
        upsert_runtime_value(&db, LEGACY_RUNTIME_OFFSET_KEY, &value, &now)?;
        Ok(())
    }

    #[instrument(skip(self, chat_id))]
    fn mark_message_dedup(&self, update_id: i64, chat_id: i64) -> Result<bool> {
        let db = self.lock();
        let inserted = db.execute(
            "INSERT INTO message_dedup (update_id, chat_id, received_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (update_id) DO NOTHING",
            rusqlite::params![update_id, chat_id, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn find_or_create_user(&self, chat_id: i64) -> Result<(User, bool)> {
        let now = Utc::now().to_rfc3339();
        let db = self.lock();
        let inserted = db.execute(
            "INSERT INTO users (id, telegram_chat_id, language, timezone, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (telegram_chat_id) DO NOTHING",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                chat_id,
                DEFAULT_LANGUAGE,
                DEFAULT_TIMEZONE,
                now
            ],
        )?;

        let user = db.query_row(
            "SELECT id, telegram_chat_id, language, timezone, created_at
             FROM users WHERE telegram_chat_id = ?1",
            rusqlite::params![chat_id],
            row_to_user,
        )?;

        Ok((user, inserted == 1))
    }

    fn get_active_goal(&self, user_id: &str) -> Result<Option<Goal>> {
        let db = self.lock();
        match db.query_row(
            "SELECT id, user_id, title, status, created_at, updated_at
             FROM goals
             WHERE user_id = ?1 AND status IN ('active', 'draft')
             ORDER BY CASE status WHEN 'active' THEN 0 ELSE 1 END, updated_at DESC
             LIMIT 1",
            rusqlite::params![user_id],
            row_to_goal,
        ) {
            Ok(goal) => Ok(Some(goal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn create_goal_draft(&self, user_id: &str) -> Result<Goal> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.lock();
        db.execute(
            "INSERT INTO goals (id, user_id, title, status, created_at, updated_at)
             VALUES (?1, ?2, '', 'draft', ?3, ?3)",
            rusqlite::params![id, user_id, now],
        )?;

        db.query_row(
            "SELECT id, user_id, title, status, created_at, updated_at
             FROM goals WHERE id = ?1",
            rusqlite::params![id],
            row_to_goal,
        )
        .map_err(StoreError::Database)
    }

    #[instrument(skip(self))]
    fn get_or_create_planning_session(&self, goal_id: &str) -> Result<(PlanningSession, bool)> {
        let now = Utc::now().to_rfc3339();
        let db = self.lock();
        let inserted = db.execute(
            "INSERT INTO planning_sessions
                 (id, goal_id, state, slot_completion, turn_count, created_at, updated_at)
             VALUES (?1, ?2, 'idle', ?3, 0, ?4, ?4)
             ON CONFLICT (goal_id) DO NOTHING",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                goal_id,
                SlotCompletion::default().to_json(),
                now
            ],
        )?;

        let session = db.query_row(
            "SELECT id, goal_id, state, slot_completion, turn_count, last_intent,
                    created_at, updated_at
             FROM planning_sessions WHERE goal_id = ?1",
            rusqlite::params![goal_id],
            row_to_session,
        )?;

        Ok((session, inserted == 1))
    }

    fn increment_planning_session_turn(&self, session_id: &str) -> Result<i64> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE planning_sessions SET turn_count = turn_count + 1 WHERE id = ?1",
            rusqlite::params![session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::SessionNotFound {
                id: session_id.to_string(),
            });
        }

        let count = db.query_row(
            "SELECT turn_count FROM planning_sessions WHERE id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    fn update_planning_session(&self, session: &PlanningSession) -> Result<()> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE planning_sessions
             SET state = ?1,
                 slot_completion = ?2,
                 turn_count = ?3,
                 last_intent = ?4,
                 updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                session.state.as_str(),
                session.slots.to_json(),
                session.turn_count,
                session.last_intent,
                Utc::now().to_rfc3339(),
                session.id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::SessionNotFound {
                id: session.id.clone(),
            });
        }
        Ok(())
    }

    fn save_conversation_turn(&self, turn: ConversationTurn) -> Result<()> {
        let db = self.lock();
        db.execute(
            "INSERT INTO conversation_turns
                 (session_id, role, content, intent, intent_confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                turn.session_id,
                turn.role.as_str(),
                turn.content,
                turn.intent,
                turn.intent_confidence,
                turn.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn load_runtime_value(db: &Connection, key: &str) -> Result<Option<String>> {
    match db.query_row(
        "SELECT value FROM bot_runtime_states WHERE key = ?1",
        rusqlite::params![key],
        |row| row.get(0),
    ) {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

fn upsert_runtime_value(db: &Connection, key: &str, value: &str, now: &str) -> Result<()> {
    db.execute(
        "INSERT INTO bot_runtime_states (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (key) DO UPDATE
         SET value = excluded.value,
             updated_at = excluded.updated_at",
        rusqlite::params![key, value, now],
    )?;
    Ok(())
}

fn parse_offset(value: &str) -> Result<i64> {
    let parsed: i64 = value.parse().map_err(|_| StoreError::InvalidOffset {
        value: value.to_string(),
    })?;
    if parsed < 0 {
        return Err(StoreError::InvalidOffset {
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

/// Map a SELECT row (column order as in the queries above) to a `User`.
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_chat_id: row.get(1)?,
        language: row.get(2)?,
        timezone: row.get(3)?,
        created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
    })
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Goal> {
    let status = GoalStatus::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        status,
        created_at: parse_ts(4, &row.get::<_, String>(4)?)?,
        updated_at: parse_ts(5, &row.get::<_, String>(5)?)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlanningSession> {
    Ok(PlanningSession {
        id: row.get(0)?,
        goal_id: row.get(1)?,
        state: PlanningState::parse(&row.get::<_, String>(2)?),
        slots: SlotCompletion::from_json(&row.get::<_, String>(3)?),
        turn_count: row.get(4)?,
        last_intent: row.get(5)?,
        created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::types::TurnRole;

    fn open_store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        SqliteStore::new(conn)
    }

    #[test]
    fn offset_round_trips_and_defaults_to_zero() {
        let store = open_store();
        assert_eq!(store.load_last_update_id().unwrap(), 0);

        store.save_last_update_id(42).unwrap();
        assert_eq!(store.load_last_update_id().unwrap(), 42);

        store.save_last_update_id(100).unwrap();
        assert_eq!(store.load_last_update_id().unwrap(), 100);
    }

    #[test]
    fn offset_falls_back_to_legacy_key() {
        let store = open_store();
        {
            let db = store.lock();
            upsert_runtime_value(&db, LEGACY_RUNTIME_OFFSET_KEY, "7", "2025-01-01T00:00:00Z")
                .unwrap();
        }
        assert_eq!(store.load_last_update_id().unwrap(), 7);
    }

    #[test]
    fn canonical_key_wins_over_legacy() {
        let store = open_store();
        {
            let db = store.lock();
            upsert_runtime_value(&db, RUNTIME_OFFSET_KEY, "10", "2025-01-01T00:00:00Z").unwrap();
            upsert_runtime_value(&db, LEGACY_RUNTIME_OFFSET_KEY, "3", "2025-01-01T00:00:00Z")
                .unwrap();
        }
        assert_eq!(store.load_last_update_id().unwrap(), 10);
    }

    #[test]
    fn save_writes_both_keys() {
        let store = open_store();
        store.save_last_update_id(55).unwrap();
        let db = store.lock();
        let canonical = load_runtime_value(&db, RUNTIME_OFFSET_KEY).unwrap();
        let legacy = load_runtime_value(&db, LEGACY_RUNTIME_OFFSET_KEY).unwrap();
        assert_eq!(canonical.as_deref(), Some("55"));
        assert_eq!(legacy.as_deref(), Some("55"));
    }

    #[test]
    fn negative_stored_offset_is_rejected() {
        let store = open_store();
        {
            let db = store.lock();
            upsert_runtime_value(&db, RUNTIME_OFFSET_KEY, "-1", "2025-01-01T00:00:00Z").unwrap();
        }
        assert!(matches!(
            store.load_last_update_id(),
            Err(StoreError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn dedup_reports_first_sighting_only() {
        let store = open_store();
        assert!(store.mark_message_dedup(100, 1).unwrap());
        assert!(!store.mark_message_dedup(100, 1).unwrap());
        assert!(store.mark_message_dedup(101, 1).unwrap());
    }

    #[test]
    fn find_or_create_user_applies_locale_defaults() {
        let store = open_store();
        let (user, is_new) = store.find_or_create_user(10003).unwrap();
        assert!(is_new);
        assert_eq!(user.language, "zh-CN");
        assert_eq!(user.timezone, "Asia/Shanghai");

        let (again, is_new) = store.find_or_create_user(10003).unwrap();
        assert!(!is_new);
        assert_eq!(again.id, user.id);
    }

    #[test]
    fn active_goal_prefers_active_over_draft() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(1).unwrap();
        let draft = store.create_goal_draft(&user.id).unwrap();
        let second = store.create_goal_draft(&user.id).unwrap();
        {
            let db = store.lock();
            db.execute(
                "UPDATE goals SET status = 'active' WHERE id = ?1",
                rusqlite::params![second.id],
            )
            .unwrap();
        }

        let found = store.get_active_goal(&user.id).unwrap().unwrap();
        assert_eq!(found.id, second.id);
        assert_eq!(found.status, GoalStatus::Active);
        assert_ne!(found.id, draft.id);
    }

    #[test]
    fn no_goal_yields_none() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(2).unwrap();
        assert!(store.get_active_goal(&user.id).unwrap().is_none());
    }

    #[test]
    fn planning_session_is_unique_per_goal() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(3).unwrap();
        let goal = store.create_goal_draft(&user.id).unwrap();

        let (session, is_new) = store.get_or_create_planning_session(&goal.id).unwrap();
        assert!(is_new);
        assert_eq!(session.state, PlanningState::Idle);
        assert_eq!(session.turn_count, 0);

        let (again, is_new) = store.get_or_create_planning_session(&goal.id).unwrap();
        assert!(!is_new);
        assert_eq!(again.id, session.id);
    }

    #[test]
    fn turn_increment_is_sequential() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(4).unwrap();
        let goal = store.create_goal_draft(&user.id).unwrap();
        let (session, _) = store.get_or_create_planning_session(&goal.id).unwrap();

        assert_eq!(store.increment_planning_session_turn(&session.id).unwrap(), 1);
        assert_eq!(store.increment_planning_session_turn(&session.id).unwrap(), 2);
        assert_eq!(store.increment_planning_session_turn(&session.id).unwrap(), 3);
    }

    #[test]
    fn increment_on_missing_session_fails() {
        let store = open_store();
        assert!(matches!(
            store.increment_planning_session_turn("no-such-id"),
            Err(StoreError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn update_persists_state_and_normalized_slots() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(5).unwrap();
        let goal = store.create_goal_draft(&user.id).unwrap();
        let (mut session, _) = store.get_or_create_planning_session(&goal.id).unwrap();

        session.state = PlanningState::Review;
        session.slots.main_goal = true;
        session.turn_count = 2;
        session.last_intent = Some("clarify_goal".to_string());
        store.update_planning_session(&session).unwrap();

        let (read_back, _) = store.get_or_create_planning_session(&goal.id).unwrap();
        assert_eq!(read_back.state, PlanningState::Review);
        assert!(read_back.slots.main_goal);
        assert_eq!(read_back.turn_count, 2);
        assert_eq!(read_back.last_intent.as_deref(), Some("clarify_goal"));
    }

    #[test]
    fn update_on_missing_session_fails() {
        let store = open_store();
        let session = PlanningSession {
            id: "ghost".into(),
            goal_id: "ghost-goal".into(),
            state: PlanningState::Clarifying,
            slots: SlotCompletion::default(),
            turn_count: 1,
            last_intent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            store.update_planning_session(&session),
            Err(StoreError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn conversation_turns_append() {
        let store = open_store();
        let (user, _) = store.find_or_create_user(6).unwrap();
        let goal = store.create_goal_draft(&user.id).unwrap();
        let (session, _) = store.get_or_create_planning_session(&goal.id).unwrap();

        for (role, content) in [(TurnRole::User, "你好"), (TurnRole::Assistant, "收到")] {
            store
                .save_conversation_turn(ConversationTurn {
                    session_id: session.id.clone(),
                    role,
                    content: content.to_string(),
                    intent: Some("clarify_goal".into()),
                    intent_confidence: Some(0.78),
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let db = store.lock();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM conversation_turns WHERE session_id = ?1",
                rusqlite::params![session.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
