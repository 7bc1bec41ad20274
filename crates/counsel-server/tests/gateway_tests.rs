mod common;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use common::*;
use counsel_agent::Inference;
use counsel_core::{store::ContentStore, NewChatMessage, MAX_MESSAGE_CHARS};
use serde_json::json;
use tokio::{sync::Notify, time::Instant};

fn offline() -> Harness {
    Harness::new(Inference::unavailable("none"))
}

async fn seed_messages(h: &Harness, case_id: &str, n: usize) {
    for i in 0..n {
        h.store
            .insert_chat_message(NewChatMessage::user(case_id, OWNER, &format!("m{i}")))
            .await
            .unwrap();
    }
}

// =============================================================================
// connect / join / leave
// =============================================================================

#[tokio::test]
async fn test_connect_greets_with_client_id_and_agents() {
    let h = offline();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let id = h.gateway.connect(Some(OWNER.into()), "test", tx).await;

    let raw = rx.recv().await.unwrap();
    let frame: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(frame["event"], "connected");
    assert_eq!(frame["data"]["status"], "connected");
    assert_eq!(frame["data"]["clientId"], id.as_str());
    assert_eq!(frame["data"]["availableAgents"].as_array().unwrap().len(), 4);
    assert_eq!(h.gateway.registry().counts().await, (1, 0));
}

#[tokio::test]
async fn test_join_returns_case_info_and_history() {
    let h = offline();
    seed_messages(&h, "c1", 3).await;
    let mut a = h.client(OWNER).await;

    let joined = h.join(&mut a, "c1").await;
    assert_eq!(joined["caseId"], "c1");
    assert_eq!(joined["caseInfo"]["title"], "Smith v. Jones");
    assert_eq!(joined["caseInfo"]["type"], "contract");
    assert_eq!(joined["caseInfo"]["documentCount"], 1);
    assert_eq!(joined["chatHistory"].as_array().unwrap().len(), 3);
    assert_eq!(joined["chatHistory"][0]["message"], "m0");
    assert_eq!(joined["activeChat"]["clientCount"], 1);

    let actions: Vec<String> = h.store.activities("c1").into_iter().map(|a| a.action).collect();
    assert!(actions.contains(&"chat_joined".to_string()));
}

#[tokio::test]
async fn test_rejoining_same_case_is_quiet() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    let again = h.join(&mut b, "c1").await;
    assert_eq!(again["activeChat"]["clientCount"], 2);
    assert!(a.pending().is_empty());

    let joins = h
        .store
        .activities("c1")
        .into_iter()
        .filter(|a| a.action == "chat_joined")
        .count();
    assert_eq!(joins, 2);
}

#[tokio::test]
async fn test_join_announces_to_existing_members() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;

    let joined = h.join(&mut b, "c1").await;
    assert_eq!(joined["activeChat"]["clientCount"], 2);

    let seen = a.expect("user_joined").await;
    assert_eq!(seen["userId"], OWNER);
    assert_eq!(seen["caseId"], "c1");
    assert!(b.pending().is_empty());
}

#[tokio::test]
async fn test_join_denied_for_non_owner_and_unknown_case() {
    let h = offline();
    let mut a = h.client(OWNER).await;

    h.send(&a, "join_case", json!({ "caseId": "c3", "userId": OWNER })).await;
    let err = a.expect("error").await;
    assert_eq!(err["code"], "access_denied");

    h.send(&a, "join_case", json!({ "caseId": "nope", "userId": OWNER })).await;
    assert_eq!(a.expect("error").await["code"], "access_denied");

    assert_eq!(h.gateway.registry().counts().await, (1, 0));
}

#[tokio::test]
async fn test_joining_second_case_leaves_the_first() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.join(&mut a, "c2").await;
    let left = b.expect("user_left").await;
    assert_eq!(left["caseId"], "c1");

    let registry = h.gateway.registry();
    assert_eq!(registry.active_chat("c1").await.unwrap().client_count, 1);
    assert_eq!(registry.active_chat("c2").await.unwrap().client_count, 1);
}

#[tokio::test]
async fn test_leave_and_disconnect_update_the_room() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.send(&b, "leave_case", json!({ "caseId": "c1", "userId": OWNER })).await;
    assert_eq!(b.expect("case_left").await["caseId"], "c1");
    assert_eq!(a.expect("user_left").await["caseId"], "c1");
    assert_eq!(h.gateway.registry().counts().await, (2, 1));

    h.gateway.disconnect(&a.id).await;
    assert_eq!(h.gateway.registry().counts().await, (1, 0));
    assert!(h.gateway.registry().active_chat("c1").await.is_none());
}

#[tokio::test]
async fn test_disconnect_tells_the_room() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.gateway.disconnect(&b.id).await;
    assert_eq!(a.expect("user_left").await["userId"], OWNER);
    assert_eq!(h.gateway.registry().active_chat("c1").await.unwrap().client_count, 1);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_unparseable_frames_are_validation_errors() {
    let h = offline();
    let mut a = h.client(OWNER).await;

    for raw in ["not json", r#"{"event":"reboot","data":{}}"#, r#"{"data":{}}"#] {
        h.gateway.handle_frame(&a.id, raw).await;
        let err = a.expect("error").await;
        assert_eq!(err["code"], "validation_error", "{raw}");
    }
}

#[tokio::test]
async fn test_missing_ids_are_validation_errors() {
    let h = offline();
    let mut a = h.client(OWNER).await;

    h.send(&a, "join_case", json!({})).await;
    let err = a.expect("error").await;
    assert_eq!(err["code"], "validation_error");
    assert_eq!(err["error"], "caseId and userId are required");

    h.send(&a, "send_message", json!({ "caseId": "c1", "message": "hi" })).await;
    assert_eq!(a.expect("error").await["code"], "validation_error");
}

#[tokio::test]
async fn test_oversized_message_has_no_side_effects() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    let too_long = "a".repeat(MAX_MESSAGE_CHARS + 1);
    h.say(&a, "c1", &too_long).await;

    let err = a.expect("error").await;
    assert_eq!(err["code"], "validation_error");
    assert!(b.pending().is_empty());
    assert!(a.pending().is_empty());
    assert_eq!(h.store.chat_len("c1"), 0);
    assert_eq!(h.gateway.registry().active_chat("c1").await.unwrap().message_count, 0);
}

#[tokio::test]
async fn test_length_limit_counts_characters() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    h.join(&mut a, "c1").await;

    // Multi-byte characters: 4000 of them is within the limit.
    let at_limit = "é".repeat(MAX_MESSAGE_CHARS);
    h.say(&a, "c1", &at_limit).await;
    let saved = a.expect("message_received").await;
    assert_eq!(saved["type"], "user");
    assert!(h.store.chat_len("c1") >= 1);
}

#[tokio::test]
async fn test_blank_message_rejected() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    h.join(&mut a, "c1").await;

    h.say(&a, "c1", "  \n\t ").await;
    let err = a.expect("error").await;
    assert_eq!(err["error"], "Message cannot be empty");
    assert_eq!(h.store.chat_len("c1"), 0);
}

#[tokio::test]
async fn test_send_to_foreign_case_is_denied() {
    let h = offline();
    let mut a = h.client(OWNER).await;

    h.say(&a, "c3", "let me in").await;
    assert_eq!(a.expect("error").await["code"], "access_denied");
    assert_eq!(h.store.chat_len("c3"), 0);
}

// =============================================================================
// send_message flow
// =============================================================================

#[tokio::test]
async fn test_user_message_precedes_ai_reply() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.say(&a, "c1", "find the supply agreement").await;

    let mut events = Vec::new();
    let mut messages = Vec::new();
    while messages.len() < 2 {
        let (event, data) = b.next().await;
        if event == "message_received" {
            messages.push(data);
        }
        events.push(event);
    }
    assert_eq!(
        events,
        ["message_received", "ai_thinking", "ai_thinking_stop", "message_received"]
    );

    let (user, ai) = (&messages[0], &messages[1]);
    assert_eq!(user["type"], "user");
    assert_eq!(user["message"], "find the supply agreement");
    assert_eq!(ai["type"], "ai");
    assert_eq!(ai["agent"], "evidence");
    let confidence = ai["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(ai["metadata"]["replyTo"], user["id"]);
    assert_eq!(ai["metadata"]["agent"], "evidence");

    let user_ts: DateTime<Utc> = serde_json::from_value(user["timestamp"].clone()).unwrap();
    let ai_ts: DateTime<Utc> = serde_json::from_value(ai["timestamp"].clone()).unwrap();
    assert!(user_ts < ai_ts);

    let stored = h.store.all_chat_messages("c1").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].timestamp < stored[1].timestamp);
    assert_eq!(h.gateway.registry().active_chat("c1").await.unwrap().message_count, 2);

    let actions: Vec<String> = h.store.activities("c1").into_iter().map(|a| a.action).collect();
    assert!(actions.contains(&"chat_message_sent".to_string()));
}

#[tokio::test]
async fn test_slow_agent_does_not_block_the_room() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(with_backend(Arc::new(GatedBackend { gate: gate.clone() })));
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.say(&a, "c1", "what is our strategy").await;
    a.expect("message_received").await;
    a.expect("ai_thinking").await;
    b.expect("message_received").await;
    b.expect("ai_thinking").await;

    // The agent is still waiting; the room keeps working.
    h.send(&b, "typing_start", json!({ "caseId": "c1", "userId": OWNER })).await;
    assert_eq!(a.expect("typing_start").await["userId"], OWNER);

    gate.notify_one();
    a.expect("ai_thinking_stop").await;
    let reply = a.expect("message_received").await;
    assert_eq!(reply["type"], "ai");
    assert!(reply["message"].as_str().unwrap().contains("Released answer."));
}

#[tokio::test]
async fn test_agent_panic_ends_in_error_and_stops_thinking() {
    let h = Harness::new(with_backend(Arc::new(PanickingBackend)));
    let mut a = h.client(OWNER).await;
    h.join(&mut a, "c1").await;

    h.say(&a, "c1", "what is our strategy").await;
    a.expect("message_received").await;
    a.expect("ai_thinking").await;
    a.expect("ai_thinking_stop").await;
    let err = a.expect("error").await;
    assert_eq!(err["code"], "internal_error");
    assert_eq!(err["error"], "An unexpected error occurred");

    assert_eq!(h.store.chat_len("c1"), 1);
}

#[tokio::test]
async fn test_failed_save_yields_placeholder_ids() {
    let h = offline();
    h.store.set_fail_writes(true);
    let mut a = h.client(OWNER).await;
    h.join(&mut a, "c1").await;

    h.say(&a, "c1", "find the supply agreement").await;
    let user = a.expect("message_received").await;
    assert!(user["id"].as_str().unwrap().starts_with("error_"));
    assert_eq!(user["message"], "find the supply agreement");

    a.expect("ai_thinking").await;
    a.expect("ai_thinking_stop").await;
    let ai = a.expect("message_received").await;
    assert!(ai["id"].as_str().unwrap().starts_with("error_"));
    assert_ne!(ai["id"], user["id"]);
    assert_eq!(ai["metadata"]["replyTo"], user["id"]);
    assert_eq!(ai["type"], "ai");
    assert_eq!(h.store.chat_len("c1"), 0);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_limit_is_clamped() {
    let h = offline();
    seed_messages(&h, "c1", 120).await;
    let mut a = h.client(OWNER).await;

    h.send(
        &a,
        "get_chat_history",
        json!({ "caseId": "c1", "userId": OWNER, "limit": 500 }),
    )
    .await;
    let page = a.expect("chat_history").await;
    let messages = page["messages"].as_array().unwrap();
    assert_eq!(page["limit"], 100);
    assert_eq!(messages.len(), 100);
    assert_eq!(messages[0]["message"], "m20");
    assert_eq!(messages[99]["message"], "m119");
    assert_eq!(page["hasMore"], true);

    h.send(
        &a,
        "get_chat_history",
        json!({ "caseId": "c1", "userId": OWNER, "limit": 50, "offset": 100 }),
    )
    .await;
    let page = a.expect("chat_history").await;
    assert_eq!(page["messages"].as_array().unwrap().len(), 20);
    assert_eq!(page["hasMore"], false);
}

#[tokio::test]
async fn test_clear_history_is_owner_only() {
    let h = offline();
    seed_messages(&h, "c1", 3).await;
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    let mut intruder = h.client("intruder").await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.send(
        &intruder,
        "clear_chat_history",
        json!({ "caseId": "c1", "userId": "intruder" }),
    )
    .await;
    assert_eq!(intruder.expect("error").await["code"], "access_denied");
    assert_eq!(h.store.chat_len("c1"), 3);
    assert!(a.pending().is_empty());

    h.send(&a, "clear_chat_history", json!({ "caseId": "c1", "userId": OWNER })).await;
    for client in [&mut a, &mut b] {
        let cleared = client.expect("chat_history_cleared").await;
        assert_eq!(cleared["deletedCount"], 3);
        assert_eq!(cleared["clearedBy"], OWNER);
    }
    assert_eq!(h.store.chat_len("c1"), 0);
}

// =============================================================================
// Typing
// =============================================================================

#[tokio::test]
async fn test_typing_is_relayed_to_others_only() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    let mut outsider = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    h.send(&a, "typing_start", json!({ "caseId": "c1", "userId": OWNER })).await;
    let typing = b.expect("typing_start").await;
    assert_eq!(typing["caseId"], "c1");
    assert!(a.pending().is_empty());

    h.send(&a, "typing_stop", json!({ "caseId": "c1", "userId": OWNER })).await;
    b.expect("typing_stop").await;

    // Not joined: nothing is relayed.
    h.send(&outsider, "typing_start", json!({ "caseId": "c1", "userId": OWNER })).await;
    assert!(a.pending().is_empty());
    assert!(b.pending().is_empty());
    assert!(outsider.pending().is_empty());
}

// =============================================================================
// Idle sweep
// =============================================================================

#[tokio::test]
async fn test_sweep_closes_evicted_clients() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    let later = Instant::now() + Duration::from_secs(2 * 3600);
    let report = h.gateway.sweep_at(later, Duration::from_secs(3600)).await;
    assert_eq!(report.connections.len(), 2);
    assert_eq!(h.gateway.registry().counts().await, (0, 0));

    // Both senders are gone, so each transport sees its stream end.
    for client in [&mut a, &mut b] {
        assert!(client.pending().is_empty());
        assert!(client.rx.recv().await.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweep_tells_clients_their_room_went_idle() {
    let h = offline();
    let mut a = h.client(OWNER).await;
    let mut b = h.client(OWNER).await;
    h.join(&mut a, "c1").await;
    h.join(&mut b, "c1").await;
    a.expect("user_joined").await;

    // B keeps its connection busy; nobody talks in the room.
    for _ in 0..2 {
        tokio::time::advance(Duration::from_secs(40 * 60)).await;
        h.send(&b, "typing_start", json!({ "caseId": "c1", "userId": OWNER })).await;
        a.expect("typing_start").await;
    }

    let report = h.gateway.sweep(Duration::from_secs(3600)).await;
    assert_eq!(report.connections, vec![a.id.clone()]);
    assert_eq!(report.chats, vec!["c1".to_string()]);

    let left = b.expect("case_left").await;
    assert_eq!(left["caseId"], "c1");
    assert_eq!(left["reason"], "idle");
    assert!(b.pending().is_empty());
    assert!(a.pending().is_empty());
    assert!(a.rx.recv().await.is_none());

    // B is still connected and can join again.
    assert_eq!(h.gateway.registry().counts().await, (1, 0));
    let joined = h.join(&mut b, "c1").await;
    assert_eq!(joined["activeChat"]["clientCount"], 1);
}
