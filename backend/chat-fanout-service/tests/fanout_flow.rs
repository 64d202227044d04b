mod common;

use chat_fanout_service::models::{ConversationKind, MessageDraft, User};
use chat_fanout_service::repository::ChatRepository;
use common::{drain, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

fn frame(destination: String, payload: Value) -> String {
    json!({ "destination": destination, "payload": payload }).to_string()
}

fn send_frame(conversation_id: Uuid, content: &str) -> String {
    frame(
        format!("chat/{conversation_id}/send"),
        json!({ "type": "TEXT", "content": content }),
    )
}

#[tokio::test]
async fn send_broadcasts_to_participants_and_acks_sender() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();

    let (alice_phone, mut rx_alice_phone) = app.connect(&alice).await;
    let (_alice_laptop, mut rx_alice_laptop) = app.connect(&alice).await;
    let (_bob_session, mut rx_bob) = app.connect(&bob).await;

    app.state
        .router
        .handle_text(&alice_phone, &send_frame(chat.id, "hi"))
        .await;

    let bob_frames = drain(&mut rx_bob);
    assert_eq!(bob_frames.len(), 1);
    assert_eq!(bob_frames[0]["destination"], format!("topic/chat/{}", chat.id));
    assert_eq!(bob_frames[0]["body"]["type"], "message.created");
    assert_eq!(bob_frames[0]["body"]["message"]["senderId"], alice.id.to_string());
    assert_eq!(bob_frames[0]["body"]["message"]["content"], "hi");
    let message_id = bob_frames[0]["body"]["message"]["id"].clone();

    // Each of alice's devices sees the broadcast once and the ack once.
    for rx in [&mut rx_alice_phone, &mut rx_alice_laptop] {
        let frames = drain(rx);
        let broadcasts: Vec<_> = frames
            .iter()
            .filter(|f| f["body"]["type"] == "message.created")
            .collect();
        let acks: Vec<_> = frames
            .iter()
            .filter(|f| f["destination"] == format!("user/{}/queue/message-sent", alice.id))
            .collect();
        let errors: Vec<_> = frames
            .iter()
            .filter(|f| f["destination"] == format!("user/{}/queue/errors", alice.id))
            .collect();

        assert_eq!(broadcasts.len(), 1);
        assert_eq!(acks.len(), 1);
        assert!(errors.is_empty());
        assert_eq!(acks[0]["body"]["messageId"], message_id);
        assert_eq!(acks[0]["body"]["status"], "sent");
    }
}

#[tokio::test]
async fn outsider_send_is_rejected_privately() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let carol = app.user("carol").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();

    let (_bob_session, mut rx_bob) = app.connect(&bob).await;
    let (carol_session, mut rx_carol) = app.connect(&carol).await;

    app.state
        .router
        .handle_text(&carol_session, &send_frame(chat.id, "let me in"))
        .await;

    assert!(drain(&mut rx_bob).is_empty());
    let carol_frames = drain(&mut rx_carol);
    assert_eq!(carol_frames.len(), 1);
    assert_eq!(
        carol_frames[0]["destination"],
        format!("user/{}/queue/errors", carol.id)
    );
    assert_eq!(carol_frames[0]["body"]["status"], "error");
    assert_eq!(carol_frames[0]["body"]["code"], "NOT_A_PARTICIPANT");
}

#[tokio::test]
async fn edit_is_broadcast_with_history() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();
    let message = app
        .state
        .router
        .send(alice.id, chat.id, MessageDraft::text("hi"))
        .await
        .unwrap();

    let (alice_session, mut rx_alice) = app.connect(&alice).await;
    let (bob_session, mut rx_bob) = app.connect(&bob).await;

    // Bob cannot edit alice's message and nobody hears about the attempt.
    app.state
        .router
        .handle_text(
            &bob_session,
            &frame(format!("message/{}/edit", message.id), json!({"content": "pwned"})),
        )
        .await;
    assert!(drain(&mut rx_alice).is_empty());
    let bob_frames = drain(&mut rx_bob);
    assert_eq!(bob_frames.len(), 1);
    assert_eq!(bob_frames[0]["body"]["code"], "NOT_AUTHORIZED");

    app.state
        .router
        .handle_text(
            &alice_session,
            &frame(format!("message/{}/edit", message.id), json!({"content": "hello"})),
        )
        .await;

    for rx in [&mut rx_alice, &mut rx_bob] {
        let frames = drain(rx);
        assert_eq!(frames.len(), 1);
        let body = &frames[0]["body"];
        assert_eq!(body["type"], "message.edited");
        assert_eq!(body["message"]["content"], "hello");
        assert!(!body["message"]["editedAt"].is_null());
        assert_eq!(body["message"]["editHistory"], json!(["hi"]));
    }
}

#[tokio::test]
async fn delete_then_mutations_fail_not_found() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();
    let message = app
        .state
        .router
        .send(alice.id, chat.id, MessageDraft::text("oops"))
        .await
        .unwrap();

    let (alice_session, mut rx_alice) = app.connect(&alice).await;
    let (bob_session, mut rx_bob) = app.connect(&bob).await;

    app.state
        .router
        .handle_text(
            &alice_session,
            &frame(format!("message/{}/delete", message.id), Value::Null),
        )
        .await;
    let bob_frames = drain(&mut rx_bob);
    assert_eq!(bob_frames.len(), 1);
    assert_eq!(bob_frames[0]["body"]["type"], "message.deleted");
    assert_eq!(bob_frames[0]["body"]["messageId"], message.id.to_string());
    drain(&mut rx_alice);

    app.state
        .router
        .handle_text(
            &bob_session,
            &frame(format!("message/{}/react", message.id), json!({"reaction": "LIKE"})),
        )
        .await;
    let bob_frames = drain(&mut rx_bob);
    assert_eq!(bob_frames.len(), 1);
    assert_eq!(bob_frames[0]["body"]["code"], "NOT_FOUND");
    assert!(drain(&mut rx_alice).is_empty());

    // The conversation still reads fine with a dangling last message.
    let view = app.state.conversations.get(chat.id, bob.id).await.unwrap();
    assert!(view.last_message.is_none());
}

#[tokio::test]
async fn reactions_replace_and_remove_idempotently() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();
    let message = app
        .state
        .router
        .send(alice.id, chat.id, MessageDraft::text("joke"))
        .await
        .unwrap();

    let (bob_session, mut rx_bob) = app.connect(&bob).await;
    let react = |kind: &str| {
        frame(
            format!("message/{}/react", message.id),
            json!({ "reaction": kind }),
        )
    };

    app.state.router.handle_text(&bob_session, &react("LIKE")).await;
    app.state.router.handle_text(&bob_session, &react("LAUGH")).await;

    let frames = drain(&mut rx_bob);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f["body"]["type"] == "reaction.added"));
    let reactions = &frames[1]["body"]["message"]["reactions"];
    assert_eq!(reactions.as_object().unwrap().len(), 1);
    assert_eq!(reactions[bob.id.to_string()], "LAUGH");

    let stored = app.repo.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.reactions.len(), 1);

    let unreact = frame(format!("message/{}/unreact", message.id), Value::Null);
    app.state.router.handle_text(&bob_session, &unreact).await;
    app.state.router.handle_text(&bob_session, &unreact).await;

    let frames = drain(&mut rx_bob);
    assert_eq!(frames.len(), 1, "second removal is a silent no-op");
    assert_eq!(frames[0]["body"]["type"], "reaction.removed");
}

#[tokio::test]
async fn forward_creates_new_message_in_target() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let carol = app.user("carol").await;
    let seven = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();
    let nine = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Group, Some("nine".into()), [carol.id])
        .await
        .unwrap();
    let original = app
        .state
        .router
        .send(alice.id, seven.id, MessageDraft::text("fyi"))
        .await
        .unwrap();

    let (alice_session, _rx_alice) = app.connect(&alice).await;
    let (bob_session, mut rx_bob) = app.connect(&bob).await;
    let (_carol_session, mut rx_carol) = app.connect(&carol).await;

    let forward = frame(
        format!("message/{}/forward", original.id),
        json!({ "targetConversationId": nine.id }),
    );

    app.state.router.handle_text(&bob_session, &forward).await;
    assert!(drain(&mut rx_carol).is_empty());
    assert_eq!(drain(&mut rx_bob)[0]["body"]["code"], "NOT_A_PARTICIPANT");

    app.state.router.handle_text(&alice_session, &forward).await;
    let frames = drain(&mut rx_carol);
    assert_eq!(frames.len(), 1);
    let body = &frames[0]["body"];
    assert_eq!(body["type"], "message.forwarded");
    assert_eq!(body["message"]["isForwarded"], true);
    assert_eq!(body["message"]["conversationId"], nine.id.to_string());
    assert_ne!(body["message"]["id"], original.id.to_string());
    assert!(drain(&mut rx_bob).is_empty());

    let untouched = app.repo.find_message(original.id).await.unwrap().unwrap();
    assert_eq!(untouched, original);
}

#[tokio::test]
async fn typing_heartbeat_and_presence() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let chat = app
        .state
        .conversations
        .create(alice.id, ConversationKind::Direct, None, [bob.id])
        .await
        .unwrap();

    let (alice_session, mut rx_alice) = app.connect(&alice).await;
    let (bob_session, mut rx_bob) = app.connect(&bob).await;

    app.state
        .router
        .handle_text(&alice_session, &frame(format!("chat/{}/typing", chat.id), Value::Null))
        .await;
    assert!(drain(&mut rx_alice).is_empty());
    let typing = drain(&mut rx_bob);
    assert_eq!(typing[0]["destination"], format!("topic/chat/{}/typing", chat.id));
    assert_eq!(typing[0]["body"]["userId"], alice.id.to_string());

    app.state
        .router
        .handle_text(&alice_session, &frame("heartbeat".into(), Value::Null))
        .await;
    let pong = drain(&mut rx_alice);
    assert_eq!(pong[0]["destination"], format!("user/{}/queue/heartbeat", alice.id));
    assert_eq!(pong[0]["body"]["status"], "pong");
    assert!(drain(&mut rx_bob).is_empty());

    let status_topic = format!("topic/user/{}/status", alice.id);
    app.state
        .router
        .handle_text(&bob_session, &frame("subscribe".into(), json!({ "topic": status_topic })))
        .await;
    app.state
        .router
        .handle_text(&alice_session, &frame("user/status".into(), json!("away")))
        .await;
    let presence = drain(&mut rx_bob);
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0]["destination"], status_topic);
    assert_eq!(presence[0]["body"]["status"], "away");
}

#[tokio::test]
async fn garbage_frames_get_validation_errors() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let (session, mut rx) = app.connect(&alice).await;

    app.state.router.handle_text(&session, "{not json").await;
    app.state
        .router
        .handle_text(&session, &frame("nowhere".into(), Value::Null))
        .await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);
    assert!(frames
        .iter()
        .all(|f| f["body"]["code"] == "VALIDATION_ERROR"));
}

#[tokio::test]
async fn unsubscribe_accepts_the_same_topic_spelling_as_subscribe() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let (alice_session, _rx_alice) = app.connect(&alice).await;
    let (bob_session, mut rx_bob) = app.connect(&bob).await;

    let topic = format!("/topic/user/{}/status", alice.id);
    let router = &app.state.router;
    router
        .handle_text(&bob_session, &frame("subscribe".into(), json!({ "topic": topic })))
        .await;
    router
        .handle_text(&alice_session, &frame("user/status".into(), json!("online")))
        .await;
    assert_eq!(drain(&mut rx_bob).len(), 1);

    router
        .handle_text(&bob_session, &frame("unsubscribe".into(), json!({ "topic": topic })))
        .await;
    router
        .handle_text(&alice_session, &frame("user/status".into(), json!("away")))
        .await;
    let frames = drain(&mut rx_bob);
    assert!(frames.is_empty(), "still subscribed: {frames:?}");
}

async fn crowd(app: &TestApp, size: usize) -> (User, Vec<User>, Uuid) {
    let owner = app.user("owner").await;
    let mut members = Vec::new();
    for i in 0..size {
        members.push(app.user(&format!("member{i}")).await);
    }
    let group = app
        .state
        .conversations
        .create(
            owner.id,
            ConversationKind::Group,
            Some("crowd".into()),
            members.iter().map(|m| m.id),
        )
        .await
        .unwrap();
    (owner, members, group.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reactions_are_serialized_per_conversation() {
    let app = TestApp::new();
    let (owner, members, group_id) = crowd(&app, 16).await;
    let message = app
        .state
        .router
        .send(owner.id, group_id, MessageDraft::text("vote"))
        .await
        .unwrap();

    let (_owner_session, mut rx_owner) = app.connect(&owner).await;

    let mut tasks = Vec::new();
    for member in &members {
        let (session, _rx) = app.connect(member).await;
        let router = app.state.router.clone();
        let payload = frame(
            format!("message/{}/react", message.id),
            json!({ "reaction": "HEART" }),
        );
        tasks.push(tokio::spawn(async move {
            router.handle_text(&session, &payload).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = app.repo.find_message(message.id).await.unwrap().unwrap();
    assert_eq!(stored.reactions.len(), members.len());

    // Each broadcast carries the state right after its own mutation, in
    // the order the mutations were applied.
    let sizes: Vec<usize> = drain(&mut rx_owner)
        .iter()
        .map(|f| {
            assert_eq!(f["body"]["type"], "reaction.added");
            f["body"]["message"]["reactions"].as_object().unwrap().len()
        })
        .collect();
    assert_eq!(sizes, (1..=members.len()).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_keep_last_message_in_broadcast_order() {
    let app = TestApp::new();
    let (owner, members, group_id) = crowd(&app, 12).await;
    let (_owner_session, mut rx_owner) = app.connect(&owner).await;

    let mut tasks = Vec::new();
    for member in &members {
        let (session, _rx) = app.connect(member).await;
        let router = app.state.router.clone();
        let payload = send_frame(group_id, &format!("from {}", member.username));
        tasks.push(tokio::spawn(async move {
            router.handle_text(&session, &payload).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let created: Vec<Value> = drain(&mut rx_owner)
        .into_iter()
        .filter(|f| f["body"]["type"] == "message.created")
        .collect();
    assert_eq!(created.len(), members.len());
    let last_seen = created.last().unwrap()["body"]["message"]["id"].clone();

    let stored = app.repo.find_conversation(group_id).await.unwrap().unwrap();
    assert_eq!(
        stored.last_message_id.map(|id| id.to_string()),
        last_seen.as_str().map(str::to_string)
    );
}
