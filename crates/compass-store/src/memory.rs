//! In-memory [`Store`] used by the worker tests.
//!
//! Mirrors the SQLite implementation's observable behaviour (conflict
//! semantics, ordering, timestamps) without any I/O, and exposes a few
//! read-side inspection helpers the tests rely on.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use compass_planning::{PlanningState, SlotCompletion};

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{ConversationTurn, Goal, GoalStatus, PlanningSession, User};

#[derive(Default)]
struct Inner {
    last_update_id: i64,
    dedup: HashSet<i64>,
    users_by_chat: HashMap<i64, User>,
    goals: Vec<Goal>,
    sessions_by_goal: HashMap<String, PlanningSession>,
    turns: Vec<ConversationTurn>,
    goal_create_count: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn last_update_id(&self) -> i64 {
        self.lock().last_update_id
    }

    pub fn user_by_chat_id(&self, chat_id: i64) -> Option<User> {
        self.lock().users_by_chat.get(&chat_id).cloned()
    }

    pub fn session_by_goal_id(&self, goal_id: &str) -> Option<PlanningSession> {
        self.lock().sessions_by_goal.get(goal_id).cloned()
    }

    pub fn conversation_turns(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.lock()
            .turns
            .iter()
            .filter(|turn| turn.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn goal_create_count(&self) -> usize {
        self.lock().goal_create_count
    }

    /// Test hook: backdate a session so timeout paths can be exercised.
    pub fn force_session_updated_at(&self, goal_id: &str, updated_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions_by_goal.get_mut(goal_id) {
            session.updated_at = updated_at;
        }
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn load_last_update_id(&self) -> Result<i64> {
        Ok(self.lock().last_update_id)
    }

    fn save_last_update_id(&self, last_update_id: i64) -> Result<()> {
        self.lock().last_update_id = last_update_id;
        Ok(())
    }

    fn mark_message_dedup(&self, update_id: i64, _chat_id: i64) -> Result<bool> {
        Ok(self.lock().dedup.insert(update_id))
    }

    fn find_or_create_user(&self, chat_id: i64) -> Result<(User, bool)> {
        let mut inner = self.lock();
        if let Some(user) = inner.users_by_chat.get(&chat_id) {
            return Ok((user.clone(), false));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            telegram_chat_id: chat_id,
            language: "zh-CN".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            created_at: Utc::now(),
        };
        inner.users_by_chat.insert(chat_id, user.clone());
        Ok((user, true))
    }

    fn get_active_goal(&self, user_id: &str) -> Result<Option<Goal>> {
        let inner = self.lock();
        let mut candidates: Vec<&Goal> = inner
            .goals
            .iter()
            .filter(|goal| {
                goal.user_id == user_id
                    && matches!(goal.status, GoalStatus::Active | GoalStatus::Draft)
            })
            .collect();
        candidates.sort_by_key(|goal| {
            let rank = match goal.status {
                GoalStatus::Active => 0,
                _ => 1,
            };
            (rank, std::cmp::Reverse(goal.updated_at))
        });
        Ok(candidates.first().map(|goal| (*goal).clone()))
    }

    fn create_goal_draft(&self, user_id: &str) -> Result<Goal> {
        let now = Utc::now();
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: String::new(),
            status: GoalStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.lock();
        inner.goals.push(goal.clone());
        inner.goal_create_count += 1;
        Ok(goal)
    }

    fn get_or_create_planning_session(&self, goal_id: &str) -> Result<(PlanningSession, bool)> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions_by_goal.get(goal_id) {
            return Ok((session.clone(), false));
        }

        let now = Utc::now();
        let session = PlanningSession {
            id: Uuid::new_v4().to_string(),
            goal_id: goal_id.to_string(),
            state: PlanningState::Idle,
            slots: SlotCompletion::default(),
            turn_count: 0,
            last_intent: None,
            created_at: now,
            updated_at: now,
        };
        inner
            .sessions_by_goal
            .insert(goal_id.to_string(), session.clone());
        Ok((session, true))
    }

    fn increment_planning_session_turn(&self, session_id: &str) -> Result<i64> {
        let mut inner = self.lock();
        let session = inner
            .sessions_by_goal
            .values_mut()
            .find(|session| session.id == session_id)
            .ok_or_else(|| StoreError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        session.turn_count += 1;
        Ok(session.turn_count)
    }

    fn update_planning_session(&self, updated: &PlanningSession) -> Result<()> {
        let mut inner = self.lock();
        let session = inner
            .sessions_by_goal
            .values_mut()
            .find(|session| session.id == updated.id)
            .ok_or_else(|| StoreError::SessionNotFound {
                id: updated.id.clone(),
            })?;
        session.state = updated.state;
        session.slots = updated.slots;
        session.turn_count = updated.turn_count;
        session.last_intent = updated.last_intent.clone();
        session.updated_at = Utc::now();
        Ok(())
    }

    fn save_conversation_turn(&self, turn: ConversationTurn) -> Result<()> {
        self.lock().turns.push(turn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_matches_sqlite_contract() {
        let store = MemoryStore::new();
        assert!(store.mark_message_dedup(1, 9).unwrap());
        assert!(!store.mark_message_dedup(1, 9).unwrap());
    }

    #[test]
    fn active_goal_prefers_active_status() {
        let store = MemoryStore::new();
        let (user, _) = store.find_or_create_user(1).unwrap();
        let _draft = store.create_goal_draft(&user.id).unwrap();
        let promoted = store.create_goal_draft(&user.id).unwrap();
        {
            let mut inner = store.lock();
            let goal = inner
                .goals
                .iter_mut()
                .find(|g| g.id == promoted.id)
                .unwrap();
            goal.status = GoalStatus::Active;
        }

        let found = store.get_active_goal(&user.id).unwrap().unwrap();
        assert_eq!(found.id, promoted.id);
    }

    #[test]
    fn session_updates_are_visible_to_readers() {
        let store = MemoryStore::new();
        let (user, _) = store.find_or_create_user(2).unwrap();
        let goal = store.create_goal_draft(&user.id).unwrap();
        let (mut session, _) = store.get_or_create_planning_session(&goal.id).unwrap();

        session.state = PlanningState::Clarifying;
        session.turn_count = store.increment_planning_session_turn(&session.id).unwrap();
        store.update_planning_session(&session).unwrap();

        let read_back = store.session_by_goal_id(&goal.id).unwrap();
        assert_eq!(read_back.state, PlanningState::Clarifying);
        assert_eq!(read_back.turn_count, 1);
    }
}
