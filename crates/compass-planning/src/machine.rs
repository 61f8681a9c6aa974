//! The planning state machine.
//!
//! `advance` is a pure function over an immutable session snapshot: the
//! caller owns reading the snapshot from storage and writing the returned
//! one back. The 24 h timeout reset is part of the dialogue protocol but is
//! applied by the caller *before* routing the message, using the helpers at
//! the bottom of this module.

use chrono::{DateTime, Duration, Utc};

use crate::command::Command;
use crate::intent::{Intent, IntentResult};
use crate::replies::{
    CONFIRMED_REOPEN_ACK, REPLY_FALLBACK_GUIDANCE, REPLY_GOAL, REPLY_NATURAL_MESSAGE,
    REPLY_PLAN_CONFIRMED, REPLY_REVIEW_FALLBACK, REPLY_REVIEW_READY, REVIEW_MODIFY_ACK,
    SUMMARY_MARKER,
};
use crate::slots::{build_follow_up, format_follow_up, progress_summary, SlotCompletion};
use crate::state::PlanningState;

/// A session becomes stale after a day of silence.
pub const SESSION_TIMEOUT_HOURS: i64 = 24;

/// Summary cadence: every third user turn gets a progress recap appended.
const SUMMARY_EVERY_TURNS: i64 = 3;

/// Immutable view of a planning session, as consumed and produced by
/// [`advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlanningState,
    pub slots: SlotCompletion,
    pub turn_count: i64,
    pub last_intent: Option<Intent>,
}

/// Result of one dialogue turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub session: SessionSnapshot,
}

/// True when the session has been idle past the timeout and is not yet
/// confirmed.
pub fn is_timed_out(last_updated: DateTime<Utc>, now: DateTime<Utc>, state: PlanningState) -> bool {
    if state.is_terminal() {
        return false;
    }
    now - last_updated >= Duration::hours(SESSION_TIMEOUT_HOURS)
}

/// Reset a stale session back to the start of clarification. The slot map
/// is kept: information already gathered stays gathered.
pub fn timeout_reset(snapshot: &SessionSnapshot) -> SessionSnapshot {
    SessionSnapshot {
        state: PlanningState::Clarifying,
        slots: snapshot.slots,
        turn_count: 0,
        last_intent: None,
    }
}

/// Drive one turn of the clarification dialogue.
pub fn advance(snapshot: &SessionSnapshot, text: &str, intent: IntentResult) -> TurnOutcome {
    let mut next = snapshot.clone();

    if next.state == PlanningState::Idle {
        next.state = PlanningState::Clarifying;
    }
    let entry_state = next.state;
    next.last_intent = Some(intent.intent);

    // /goal always restarts clarification, whatever state we are in.
    if let Some(command) = Command::parse(text) {
        if command.name == "goal" {
            next.state = PlanningState::Clarifying;
            return TurnOutcome {
                reply: REPLY_GOAL.to_string(),
                session: next,
            };
        }
    }

    if intent.intent == Intent::ClarifyGoal {
        next.slots = next.slots.absorb(text);
    }

    let mut reply = match entry_state {
        PlanningState::Review => match intent.intent {
            Intent::ConfirmPlan => {
                next.state = PlanningState::Confirmed;
                REPLY_PLAN_CONFIRMED.to_string()
            }
            Intent::ClarifyGoal => {
                next.state = PlanningState::Clarifying;
                let questions = build_follow_up(&next.slots.missing(), 2);
                let mut reply = String::from(REVIEW_MODIFY_ACK);
                if questions.is_empty() {
                    reply.push_str("\n收到，我会基于你的最新意见调整计划。");
                } else {
                    reply.push('\n');
                    reply.push_str(&format_follow_up(&questions));
                }
                reply
            }
            Intent::FallbackUnknown => REPLY_REVIEW_FALLBACK.to_string(),
        },
        PlanningState::Confirmed => match intent.intent {
            Intent::ClarifyGoal => {
                next.state = PlanningState::Clarifying;
                let questions = build_follow_up(&next.slots.missing(), 1);
                let mut reply = String::from(CONFIRMED_REOPEN_ACK);
                if !questions.is_empty() {
                    reply.push('\n');
                    reply.push_str(&format_follow_up(&questions));
                }
                reply
            }
            _ => REPLY_PLAN_CONFIRMED.to_string(),
        },
        _ => {
            // Clarifying (and the idle state we just promoted).
            if intent.intent == Intent::FallbackUnknown {
                REPLY_FALLBACK_GUIDANCE.to_string()
            } else if next.slots.is_complete() {
                next.state = PlanningState::Review;
                format!(
                    "{REPLY_REVIEW_READY}\n\n{}",
                    progress_summary(&next.slots)
                )
            } else {
                let questions = build_follow_up(&next.slots.missing(), 2);
                if questions.is_empty() {
                    REPLY_NATURAL_MESSAGE.to_string()
                } else {
                    format_follow_up(&questions)
                }
            }
        }
    };

    if next.turn_count > 0
        && next.turn_count % SUMMARY_EVERY_TURNS == 0
        && !next.state.is_terminal()
        && !reply.contains(SUMMARY_MARKER)
    {
        reply.push_str("\n\n");
        reply.push_str(&progress_summary(&next.slots));
    }

    TurnOutcome {
        reply,
        session: next,
    }
}
