//! End-to-end clarification flows through the worker: slot completion,
//! review, confirmation, modification, summary cadence and timeout reset.

mod common;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use compass_planning::replies::{
    REPLY_FALLBACK_GUIDANCE, REPLY_PLAN_CONFIRMED, REPLY_REVIEW_READY, REPLY_SESSION_TIMEOUT,
    SUMMARY_MARKER,
};
use compass_planning::PlanningState;
use compass_store::types::TurnRole;
use compass_store::{MemoryStore, Store};

use common::{run_worker_until_send_count, text_update, ScriptedClient};

const FULL_SIGNAL_TEXT: &str =
    "我想在3个月内通过Go面试，成功标准是1.完成3个项目 2.刷100题 3.通过面试，\
     我是零基础，每周10小时，工作日晚上学习，限制是经常加班，风险是容易拖延。";

#[tokio::test]
async fn goal_command_moves_session_to_clarifying_and_saves_turns() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![text_update(1, 21, 20001, "/goal")]]);

    run_worker_until_send_count(client.clone(), store.clone(), 1)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20001).expect("user created");
    let goal = store
        .get_active_goal(&user.id)
        .unwrap()
        .expect("active goal");
    let session = store.session_by_goal_id(&goal.id).expect("session");
    assert_eq!(session.state, PlanningState::Clarifying);
    assert_eq!(session.turn_count, 1);
    assert_eq!(session.last_intent.as_deref(), Some("clarify_goal"));

    let turns = store.conversation_turns(&session.id);
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[1].role, TurnRole::Assistant);
    assert_eq!(turns[0].intent.as_deref(), Some("clarify_goal"));
    assert_eq!(turns[0].intent_confidence, Some(1.0));
}

#[tokio::test]
async fn complete_slot_signals_move_session_to_review() {
    let store = Arc::new(MemoryStore::new());
    let client =
        ScriptedClient::with_batches(vec![vec![text_update(1, 22, 20002, FULL_SIGNAL_TEXT)]]);

    run_worker_until_send_count(client.clone(), store.clone(), 1)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20002).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(session.state, PlanningState::Review);
    assert!(session.slots.is_complete());

    let sent = client.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains(REPLY_REVIEW_READY), "reply: {}", sent[0].text);
}

#[tokio::test]
async fn confirmation_in_review_terminates_the_session() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 23, 20003, FULL_SIGNAL_TEXT),
        text_update(2, 24, 20003, "确认"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 2)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20003).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(session.state, PlanningState::Confirmed);

    let sent = client.sent_messages();
    assert_eq!(sent.last().unwrap().text, REPLY_PLAN_CONFIRMED);
}

#[tokio::test]
async fn modification_in_review_returns_to_clarifying() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 25, 20004, FULL_SIGNAL_TEXT),
        text_update(2, 26, 20004, "我想修改成每周6小时，继续优化"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 2)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20004).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(session.state, PlanningState::Clarifying);

    let sent = client.sent_messages();
    assert!(
        sent.last().unwrap().text.contains("已收到修改意见"),
        "reply: {}",
        sent.last().unwrap().text
    );
}

#[tokio::test]
async fn follow_up_questions_are_limited_to_two() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![text_update(1, 27, 20005, "我想学Go")]]);

    run_worker_until_send_count(client.clone(), store.clone(), 1)
        .await
        .unwrap();

    let reply = client.sent_messages()[0].text.clone();
    let numbered = reply
        .lines()
        .filter(|line| {
            line.chars().next().is_some_and(|c| c.is_ascii_digit()) && line.contains(')')
        })
        .count();
    assert!(numbered <= 2, "follow-up question count={numbered}, reply: {reply}");
}

#[tokio::test]
async fn every_third_turn_carries_a_progress_summary() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 28, 20006, "/goal"),
        text_update(2, 29, 20006, "我是零基础"),
        text_update(3, 30, 20006, "每周5小时，工作日晚上学习"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 3)
        .await
        .unwrap();

    let sent = client.sent_messages();
    let third = &sent[2].text;
    assert!(third.contains(SUMMARY_MARKER), "third reply: {third}");
    assert!(third.contains("继续优化"), "third reply: {third}");
}

#[tokio::test]
async fn stale_review_session_resets_with_a_timeout_notice() {
    let store = Arc::new(MemoryStore::new());

    // Seed a review-stage session whose last activity is 25 h in the past.
    let (user, _) = store.find_or_create_user(20007).unwrap();
    let goal = store.create_goal_draft(&user.id).unwrap();
    let (mut session, _) = store.get_or_create_planning_session(&goal.id).unwrap();
    session.state = PlanningState::Review;
    store.update_planning_session(&session).unwrap();
    store.force_session_updated_at(&goal.id, Utc::now() - ChronoDuration::hours(25));

    let client = ScriptedClient::with_batches(vec![vec![text_update(1, 31, 20007, "继续")]]);
    run_worker_until_send_count(client.clone(), store.clone(), 1)
        .await
        .unwrap();

    let reply = &client.sent_messages()[0].text;
    assert!(reply.contains(REPLY_SESSION_TIMEOUT), "reply: {reply}");

    let updated = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(updated.state, PlanningState::Clarifying);
}

#[tokio::test]
async fn fallback_intent_keeps_slots_and_state() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 32, 20008, "我想3个月学会Go并完成项目"),
        text_update(2, 33, 20008, "嗯"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 2)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20008).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(session.state, PlanningState::Clarifying);
    assert!(session.slots.main_goal, "main_goal must survive the fallback");

    let second_reply = &client.sent_messages()[1].text;
    assert_eq!(second_reply, REPLY_FALLBACK_GUIDANCE);
}

#[tokio::test]
async fn confirm_command_behaves_like_a_confirm_signal() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 34, 20009, FULL_SIGNAL_TEXT),
        text_update(2, 35, 20009, "/confirm"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 2)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20009).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();
    assert_eq!(session.state, PlanningState::Confirmed);
    assert_eq!(client.sent_messages().last().unwrap().text, REPLY_PLAN_CONFIRMED);
}

#[tokio::test]
async fn turn_count_matches_persisted_user_turns() {
    let store = Arc::new(MemoryStore::new());
    let client = ScriptedClient::with_batches(vec![vec![
        text_update(1, 36, 20010, "/goal"),
        text_update(2, 37, 20010, "我是零基础"),
        text_update(3, 38, 20010, "每周5小时"),
        text_update(4, 39, 20010, "经常加班"),
    ]]);

    run_worker_until_send_count(client.clone(), store.clone(), 4)
        .await
        .unwrap();

    let user = store.user_by_chat_id(20010).unwrap();
    let goal = store.get_active_goal(&user.id).unwrap().unwrap();
    let session = store.session_by_goal_id(&goal.id).unwrap();

    let user_turns = store
        .conversation_turns(&session.id)
        .into_iter()
        .filter(|turn| turn.role == TurnRole::User)
        .count() as i64;
    assert_eq!(session.turn_count, user_turns);
    assert_eq!(session.turn_count, 4);
}
