//! Tests for Session
//!
//! These tests verify:
//! - Version negotiation and initialisation failures
//! - Lifecycle state machine (Running → ShuttingDown → Closed)
//! - get_message timeout bounds and wakeups
//! - Single-consumer enforcement
//! - Shutdown releasing pending messages

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use switchboard::{
    params, CallId, InitError, Message, MessageType, Session, SessionState, StateError,
    SwitchboardError, Timeout, API_VERSION, INFINITE_TIMEOUT,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_session() -> Session {
    Session::initialise(20, "").unwrap()
}

fn call_setup(party_b: &str) -> Message {
    Message::command("call-setup", params! { "party-b" => party_b })
}

/// Wait for the next event with `tag` (and `call_id`, if given)
fn wait_for(session: &Session, tag: MessageType, call_id: Option<&CallId>) -> Message {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "timed out waiting for {}", tag);

        if let Some(message) = session.get_message(Timeout::After(remaining)).unwrap() {
            let call_matches = call_id.map_or(true, |id| message.call_id().as_ref() == Some(id));
            if message.tag() == &tag && call_matches {
                return message;
            }
        }
    }
}

// =============================================================================
// Initialisation Tests
// =============================================================================

#[test]
fn test_initialise_negotiates_requested_version() {
    let session = Session::initialise(20, "").unwrap();

    assert_eq!(session.api_version(), 20);
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn test_initialise_never_upgrades_past_request() {
    for requested in 1..=(API_VERSION + 10) {
        let session = Session::initialise(requested, "sip").unwrap();
        assert!(
            session.api_version() <= requested,
            "negotiated {} for request {}",
            session.api_version(),
            requested
        );
        assert!(session.api_version() <= API_VERSION);
        session.shutdown().unwrap();
    }
}

#[test]
fn test_initialise_caps_at_engine_version() {
    let session = Session::initialise(API_VERSION + 100, "").unwrap();
    assert_eq!(session.api_version(), API_VERSION);
}

#[test]
fn test_initialise_rejects_version_below_minimum() {
    let result = Session::initialise(0, "");

    match result {
        Err(SwitchboardError::Init(InitError::UnsupportedVersion { requested, .. })) => {
            assert_eq!(requested, 0)
        }
        other => panic!("Expected UnsupportedVersion, got {:?}", other.map(|s| s.state())),
    }
}

#[test]
fn test_initialise_rejects_bad_options() {
    let result = Session::initialise(20, "sip carrier-pigeon");

    assert!(matches!(
        result,
        Err(SwitchboardError::Init(InitError::BadOptions(_)))
    ));
}

#[test]
fn test_initialise_enables_only_listed_protocols() {
    let session = Session::initialise(20, "sip pc").unwrap();

    let protocols: Vec<&str> = session.protocols().iter().map(|p| p.as_str()).collect();
    assert_eq!(protocols, vec!["sip", "pc"]);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_shutdown_closes_session() {
    let session = setup_session();

    session.shutdown().unwrap();

    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_get_message_after_shutdown_is_state_error() {
    let session = setup_session();
    session.shutdown().unwrap();

    let result = session.get_message(Timeout::Poll);

    assert!(matches!(
        result,
        Err(SwitchboardError::State(StateError::NotRunning(SessionState::Closed)))
    ));
}

#[test]
fn test_send_message_after_shutdown_is_state_error() {
    let session = setup_session();
    session.shutdown().unwrap();

    let result = session.send_message(&call_setup("sip:alice@example.com"));

    assert!(matches!(result, Err(SwitchboardError::State(_))));
}

#[test]
fn test_second_shutdown_is_reported() {
    let session = setup_session();
    session.shutdown().unwrap();

    assert!(matches!(
        session.shutdown(),
        Err(SwitchboardError::State(StateError::NotRunning(SessionState::Closed)))
    ));
}

#[test]
fn test_shutdown_releases_pending_messages() {
    let session = setup_session();
    session
        .send_message(&call_setup("sip:alice@example.com"))
        .unwrap();

    // Give the worker time to emit its events
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.pending_events() < 4 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(session.pending_events() >= 4);

    session.shutdown().unwrap();

    assert_eq!(session.pending_events(), 0);
}

#[test]
fn test_drop_shuts_down_running_session() {
    let session = setup_session();
    session
        .send_message(&call_setup("sip:alice@example.com"))
        .unwrap();

    // Must not hang or panic
    drop(session);
}

// =============================================================================
// get_message Timing Tests
// =============================================================================

#[test]
fn test_poll_on_empty_queue_returns_immediately() {
    let session = setup_session();

    let start = Instant::now();
    let result = session.get_message(Timeout::from_millis(0)).unwrap();

    assert!(result.is_none());
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_timed_wait_on_empty_queue_waits_full_timeout() {
    let session = setup_session();

    let start = Instant::now();
    let result = session.get_message(Timeout::from_millis(200)).unwrap();

    assert!(result.is_none());
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_timed_wait_returns_as_soon_as_event_arrives() {
    let session = Arc::new(setup_session());

    let sender = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            session
                .send_message(&call_setup("sip:alice@example.com"))
                .unwrap()
        })
    };

    let start = Instant::now();
    let event = session.get_message(Timeout::from_millis(5000)).unwrap();

    assert!(event.is_some());
    assert!(start.elapsed() < Duration::from_millis(5000));
    sender.join().unwrap();
}

#[test]
fn test_infinite_sentinel_maps_to_blocking_wait() {
    assert_eq!(Timeout::from_millis(INFINITE_TIMEOUT), Timeout::Infinite);
    assert_eq!(Timeout::from_millis(0), Timeout::Poll);
    assert_eq!(
        Timeout::from_millis(250),
        Timeout::After(Duration::from_millis(250))
    );
}

#[test]
fn test_shutdown_wakes_blocked_consumer() {
    let session = Arc::new(setup_session());

    let consumer = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.get_message(Timeout::Infinite))
    };

    thread::sleep(Duration::from_millis(100));
    session.shutdown().unwrap();

    let result = consumer.join().unwrap();
    assert!(matches!(result, Err(SwitchboardError::State(_))));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_consumer_is_rejected() {
    let session = Arc::new(setup_session());

    let consumer = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.get_message(Timeout::from_millis(1000)))
    };
    thread::sleep(Duration::from_millis(100));

    let second = session.get_message(Timeout::Poll);

    assert!(matches!(
        second,
        Err(SwitchboardError::State(StateError::ConcurrentConsumer))
    ));
    consumer.join().unwrap().unwrap();
}

#[test]
fn test_send_from_many_threads_while_consuming() {
    let session = Arc::new(Session::initialise(20, "sip").unwrap());

    let senders: Vec<_> = (0..8)
        .map(|i| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                let ack = session
                    .send_message(&call_setup(&format!("sip:user{}@example.com", i)))
                    .unwrap();
                ack.call_id().unwrap()
            })
        })
        .collect();
    let call_ids: Vec<CallId> = senders.into_iter().map(|h| h.join().unwrap()).collect();

    for call_id in &call_ids {
        let event = wait_for(&session, MessageType::MediaStreamState, Some(call_id));
        assert_eq!(event.text("state"), Some("open"));
    }
}

#[test]
fn test_sessions_are_independent() {
    let first = setup_session();
    let second = setup_session();

    first
        .send_message(&call_setup("sip:alice@example.com"))
        .unwrap();
    wait_for(&first, MessageType::CallStateChanged, None);

    assert!(second.get_message(Timeout::from_millis(100)).unwrap().is_none());
    first.shutdown().unwrap();
    assert_eq!(second.state(), SessionState::Running);
}

// =============================================================================
// Message Ownership Tests
// =============================================================================

#[test]
fn test_released_messages_are_never_redelivered() {
    let session = setup_session();
    let mut seen = HashSet::new();

    for i in 0..5 {
        session
            .send_message(&call_setup(&format!("sip:user{}@example.com", i)))
            .unwrap();
    }

    while let Some(message) = session.get_message(Timeout::from_millis(200)).unwrap() {
        assert!(seen.insert(message.id()), "message {} delivered twice", message.id());
        message.release();
    }

    assert_eq!(seen.len(), 5 * 4);
}

// =============================================================================
// End-to-End Scenario
// =============================================================================

#[test]
fn test_call_setup_scenario() {
    let session = Session::initialise(20, "").unwrap();
    assert!(session.api_version() <= 20);

    let ack = session
        .send_message(&call_setup("sip:alice@example.com"))
        .unwrap();
    assert_eq!(ack.tag(), &MessageType::CommandAck);
    let call_id = ack.call_id().expect("ack carries a call id");

    let event = wait_for(&session, MessageType::CallStateChanged, Some(&call_id));
    assert_eq!(event.call_id(), Some(call_id));

    session.shutdown().unwrap();
    assert!(matches!(
        session.get_message(Timeout::from_millis(5000)),
        Err(SwitchboardError::State(_))
    ));
}
