//! End-to-end flows through the in-memory relay.

use std::sync::Arc;

use sealchat_core::transport::RelayInbox;
use sealchat_core::{
    ChannelStatus, Direction, Error, InboundEvent, MemoryRelay, MessageEnvelope, OsCryptoProvider,
    SessionConfig, SessionEvent, SessionOrchestrator, WirePayload,
};

fn login(relay: &MemoryRelay, id: &str) -> (Arc<SessionOrchestrator>, RelayInbox) {
    let (endpoint, inbox) = relay.register(id);
    let session = SessionOrchestrator::new(
        id,
        Arc::new(endpoint),
        Arc::new(OsCryptoProvider),
        SessionConfig::default(),
    )
    .unwrap();
    (Arc::new(session), inbox)
}

async fn pump(session: &SessionOrchestrator, inbox: &mut RelayInbox) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Some(event) = inbox.try_recv() {
        if let Some(e) = session.handle_event(event.unwrap()).await.unwrap() {
            out.push(e);
        }
    }
    out
}

#[tokio::test]
async fn test_conversation_over_relay() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;

    alice.send_to_active("hi").await.unwrap();
    bob.select_peer("alice").await.unwrap();
    pump(&bob, &mut bob_in).await;
    bob.send_to_active("hey alice").await.unwrap();
    pump(&alice, &mut alice_in).await;

    let at_alice: Vec<(Direction, String)> = alice
        .messages_for("bob")
        .into_iter()
        .map(|e| (e.direction, e.text))
        .collect();
    assert_eq!(
        at_alice,
        vec![
            (Direction::Sent, "hi".to_string()),
            (Direction::Received, "hey alice".to_string()),
        ]
    );
    assert_eq!(bob.messages_for("alice").len(), 2);
}

#[tokio::test]
async fn test_simultaneous_selection_settles() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    // Both start an exchange before seeing the other's offer
    alice.select_peer("bob").await.unwrap();
    bob.select_peer("alice").await.unwrap();

    for _ in 0..3 {
        pump(&alice, &mut alice_in).await;
        pump(&bob, &mut bob_in).await;
    }

    assert_eq!(alice.channel_status("bob").await, ChannelStatus::Established);
    assert_eq!(bob.channel_status("alice").await, ChannelStatus::Established);
    assert!(alice_in.try_recv().is_none());
    assert!(bob_in.try_recv().is_none());

    alice.send_message("bob", "ping").await.unwrap();
    let events = pump(&bob, &mut bob_in).await;
    assert!(matches!(&events[..], [SessionEvent::MessageReceived(e)] if e.text == "ping"));
}

#[tokio::test]
async fn test_relay_only_sees_ciphertext() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");
    let (_eve, _eve_in) = login(&relay, "eve");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;

    alice.send_message("bob", "the password is swordfish").await.unwrap();

    let envelope = loop {
        match bob_in.try_recv().unwrap().unwrap() {
            InboundEvent::EnvelopeReceived { envelope, .. } => break envelope,
            _ => continue,
        }
    };

    let wire = WirePayload::Envelope(envelope.clone()).to_json().unwrap();
    assert!(!wire.contains("swordfish"));

    // Wire copy decodes to the same envelope and still verifies
    let decoded = match WirePayload::from_json(&wire).unwrap() {
        WirePayload::Envelope(env) => env,
        other => panic!("unexpected payload: {:?}", other),
    };
    let as_bytes = MessageEnvelope::from_bytes(&decoded.to_bytes().unwrap()).unwrap();
    assert_eq!(as_bytes, envelope);

    let event = InboundEvent::EnvelopeReceived {
        from: "alice".into(),
        envelope: as_bytes,
    };
    assert!(matches!(
        bob.handle_event(event).await.unwrap(),
        Some(SessionEvent::MessageReceived(_))
    ));
}

#[tokio::test]
async fn test_reconnect_after_peer_restart() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;
    let old_key = bob.public_key();

    // Bob restarts with a new ephemeral identity
    relay.unregister("bob");
    drop(bob);
    pump(&alice, &mut alice_in).await;
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::NoKey);

    let (bob, mut bob_in) = login(&relay, "bob");
    assert_ne!(bob.public_key(), old_key);
    pump(&alice, &mut alice_in).await;

    assert!(matches!(
        alice.send_message("bob", "are you back?").await,
        Err(Error::ChannelNotReady(_))
    ));
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;

    alice.send_message("bob", "are you back?").await.unwrap();
    let events = pump(&bob, &mut bob_in).await;
    assert!(matches!(&events[..], [SessionEvent::MessageReceived(e)] if e.text == "are you back?"));
}

#[tokio::test]
async fn test_sessions_shared_across_tasks() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let alice = alice.clone();
        tasks.push(tokio::spawn(async move {
            alice.send_message("bob", &format!("msg {}", i)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let received = pump(&bob, &mut bob_in).await;
    assert_eq!(received.len(), 8);
    assert_eq!(bob.messages_for("alice").len(), 8);
}

#[tokio::test]
async fn test_reconnect_without_unregister() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::Established);

    // Bob's client restarts and reconnects under the same id
    let old_key = bob.public_key();
    drop(bob);
    let (bob, mut bob_in) = login(&relay, "bob");
    assert_ne!(bob.public_key(), old_key);

    let events = pump(&alice, &mut alice_in).await;
    assert_eq!(
        events,
        vec![
            SessionEvent::PeerDisconnected("bob".into()),
            SessionEvent::PeerConnected("bob".into()),
        ]
    );
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::NoKey);

    bob.select_peer("alice").await.unwrap();
    pump(&alice, &mut alice_in).await;
    pump(&bob, &mut bob_in).await;
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::Established);
    assert_eq!(bob.channel_status("alice").await, ChannelStatus::Established);

    alice.send_message("bob", "welcome back").await.unwrap();
    let events = pump(&bob, &mut bob_in).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::MessageReceived(m) if m.text == "welcome back")));
}

#[tokio::test]
async fn test_reselect_after_peer_comes_online() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");

    // Bob is not online yet; the first offer is lost
    alice.select_peer("bob").await.unwrap();
    assert_eq!(
        pump(&alice, &mut alice_in).await,
        vec![SessionEvent::PeerUnreachable("bob".into())]
    );
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::ExchangeInitiated);

    let (bob, mut bob_in) = login(&relay, "bob");
    alice.select_peer("bob").await.unwrap();

    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;
    assert_eq!(alice.channel_status("bob").await, ChannelStatus::Established);
    assert_eq!(bob.channel_status("alice").await, ChannelStatus::Established);

    alice.send_to_active("finally").await.unwrap();
    let events = pump(&bob, &mut bob_in).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::MessageReceived(m) if m.text == "finally")));
}

#[tokio::test]
async fn test_logout_from_shared_session() {
    let relay = MemoryRelay::new();
    let (alice, mut alice_in) = login(&relay, "alice");
    let (bob, mut bob_in) = login(&relay, "bob");

    alice.select_peer("bob").await.unwrap();
    pump(&bob, &mut bob_in).await;
    pump(&alice, &mut alice_in).await;

    let ui = alice.clone();
    tokio::spawn(async move { ui.logout().await }).await.unwrap();
    relay.unregister("alice");

    assert!(alice.is_closed());
    assert!(alice.established_peers().await.is_empty());
    assert!(matches!(
        alice.send_message("bob", "still there?").await,
        Err(Error::SessionClosed)
    ));

    // Bob hears about it and drops his side too
    pump(&bob, &mut bob_in).await;
    assert_eq!(bob.channel_status("alice").await, ChannelStatus::NoKey);
}
