//! Tests for command routing and protocol handlers
//!
//! These tests verify:
//! - Synchronous rejections (unknown tag, version gate, no endpoint)
//! - Call-scoped routing through the call table
//! - Per-family call behaviour (signalling, loopback, service)
//! - Asynchronous rejections carrying the command id
//! - Registrations and event packages
//! - Settings with previous values

use std::sync::Arc;
use std::time::{Duration, Instant};

use switchboard::message::{CallState, MessageId};
use switchboard::queue::{EventQueue, EventSink, Pop, Timeout};
use switchboard::router::{
    Job, LoopbackHandler, ProtocolHandler, ServiceHandler, SignallingHandler, Worker,
    LOCAL_CLEAR_REASON, REMOTE_CLEAR_REASON,
};
use switchboard::{
    params, CallId, Command, CommandError, Event, Message, MessageType, Params, Prefix, Session,
    SwitchboardError, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_session(version: u32) -> Session {
    Session::initialise(version, "").unwrap()
}

fn send(session: &Session, tag: &str, params: Params) -> Message {
    session.send_message(&Message::command(tag, params)).unwrap()
}

fn place_call(session: &Session, party_b: &str) -> CallId {
    let ack = send(session, "call-setup", params! { "party-b" => party_b });
    assert_eq!(ack.tag(), &MessageType::CommandAck, "call-setup rejected: {:?}", ack.text("reason"));
    ack.call_id().unwrap()
}

/// Next event matching `pred`, skipping others
fn wait_for(session: &Session, pred: impl Fn(&Message) -> bool) -> Message {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "timed out waiting for event");
        if let Some(message) = session.get_message(Timeout::After(remaining)).unwrap() {
            if pred(&message) {
                return message;
            }
        }
    }
}

fn wait_state(session: &Session, call_id: &CallId, state: &str) -> Message {
    wait_for(session, |m| {
        m.tag() == &MessageType::CallStateChanged
            && m.call_id().as_ref() == Some(call_id)
            && m.text("state") == Some(state)
    })
}

fn wait_error_for(session: &Session, command: &Message) -> Message {
    let id = command.id().0 as i64;
    wait_for(session, |m| m.is_error() && m.integer("command-id") == Some(id))
}

fn connected_sip_call(session: &Session) -> CallId {
    let call_id = place_call(session, "sip:alice@example.com");
    wait_state(session, &call_id, "connected");
    wait_for(session, |m| {
        m.tag() == &MessageType::MediaStreamState && m.call_id().as_ref() == Some(&call_id)
    });
    call_id
}

/// Handler harness: a queue, a sink, and a way to read back events
struct Harness {
    queue: Arc<EventQueue>,
    sink: EventSink,
}

impl Harness {
    fn new() -> Self {
        let queue = Arc::new(EventQueue::new(0));
        let sink = EventSink::new(Arc::clone(&queue));
        Self { queue, sink }
    }

    fn events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Pop::Message(message) = self.queue.pop(Timeout::Poll) {
            events.push(message.to_event().unwrap());
        }
        events
    }
}

fn job(command: Command, call_id: Option<CallId>) -> Job {
    Job {
        command_id: MessageId(1),
        command,
        call_id,
    }
}

// =============================================================================
// Synchronous Rejection Tests
// =============================================================================

#[test]
fn test_unknown_tag_yields_command_error() {
    let session = setup_session(20);
    let command = Message::command("call-teleport", params! {});

    let reply = session.send_message(&command).unwrap();

    assert!(reply.is_error());
    assert!(reply.text("reason").unwrap().contains("call-teleport"));
    assert_eq!(reply.integer("command-id"), Some(command.id().0 as i64));
}

#[test]
fn test_hold_gated_below_version_10() {
    let session = setup_session(5);

    let reply = send(&session, "call-hold", params! { "call-id" => "call-1" });

    assert!(reply.is_error());
    assert!(reply.text("reason").unwrap().contains("requires API version 10"));
}

#[test]
fn test_media_stream_gated_below_version_18() {
    let session = setup_session(17);

    let reply = send(
        &session,
        "media-stream",
        params! { "call-id" => "call-1", "state" => "open" },
    );

    assert!(reply.is_error());
    assert!(reply.text("reason").unwrap().contains("18"));
}

#[test]
fn test_call_setup_to_disabled_protocol() {
    let session = Session::initialise(20, "sip").unwrap();

    let reply = send(&session, "call-setup", params! { "party-b" => "h323:bob@gk" });

    assert!(reply.is_error());
    assert_eq!(reply.text("reason"), Some("no endpoint for protocol 'h323'"));
}

#[test]
fn test_call_setup_unknown_scheme() {
    let session = setup_session(20);

    let reply = send(&session, "call-setup", params! { "party-b" => "xmpp:bob@jabber" });

    assert!(reply.is_error());
    assert_eq!(reply.text("reason"), Some("no endpoint for protocol 'xmpp'"));
}

#[test]
fn test_call_scoped_command_for_unknown_call() {
    let session = setup_session(20);

    let reply = send(&session, "call-clear", params! { "call-id" => "call-does-not-exist" });

    assert!(reply.is_error());
    assert_eq!(reply.text("reason"), Some("unknown call 'call-does-not-exist'"));
}

#[test]
fn test_registration_on_non_signalling_protocol() {
    let session = setup_session(20);

    let reply = send(
        &session,
        "registration",
        params! { "protocol" => "pc", "identifier" => "handset" },
    );

    assert!(reply.is_error());
    assert!(reply.text("reason").unwrap().contains("does not support registration"));
}

// =============================================================================
// Routing Tests
// =============================================================================

#[test]
fn test_scheme_less_party_uses_default_protocol() {
    let session = Session::initialise(20, "iax2 sip default-protocol=iax2").unwrap();

    let call_id = place_call(&session, "bob@pbx.example.com");
    wait_state(&session, &call_id, "connected");

    assert_eq!(session.active_calls(), 1);
}

#[test]
fn test_scheme_less_party_with_port_uses_default_protocol() {
    let session = setup_session(20);

    for party in ["alice@example.com:5060", "192.168.1.10:1720", "pbx:5060"] {
        let ack = send(&session, "call-setup", params! { "party-b" => party });
        assert_eq!(ack.tag(), &MessageType::CommandAck, "{} rejected: {:?}", party, ack.text("reason"));
        wait_state(&session, &ack.call_id().unwrap(), "connected");
    }

    assert_eq!(session.active_calls(), 3);
}

#[test]
fn test_scheme_with_invalid_characters_is_not_a_scheme() {
    assert_eq!(Prefix::of_uri("alice@example.com:5060"), None);
    assert_eq!(Prefix::of_uri("192.168.1.10:1720"), None);
    assert_eq!(Prefix::of_uri(":5060"), None);
    assert_eq!(Prefix::of_uri("sip:alice@example.com:5060"), Some(Ok(Prefix::Sip)));
    assert_eq!(Prefix::of_uri("h323s:gk"), Some(Ok(Prefix::H323S)));
    assert_eq!(Prefix::of_uri("carrier-pigeon:bob"), Some(Err("carrier-pigeon".to_string())));
}

#[test]
fn test_signalling_call_progresses_to_connected() {
    let session = setup_session(20);
    let call_id = place_call(&session, "sip:alice@example.com");

    let states: Vec<String> = (0..3)
        .map(|_| {
            let event = wait_for(&session, |m| m.tag() == &MessageType::CallStateChanged);
            assert_eq!(event.call_id().as_ref(), Some(&call_id));
            event.text("state").unwrap().to_string()
        })
        .collect();
    assert_eq!(states, vec!["proceeding", "alerting", "connected"]);

    let media = wait_for(&session, |m| m.tag() == &MessageType::MediaStreamState);
    assert_eq!(media.text("media"), Some("audio"));
    assert_eq!(media.text("state"), Some("open"));
}

#[test]
fn test_clear_removes_call_from_router() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    let ack = send(&session, "call-clear", params! { "call-id" => call_id.as_str() });
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    let cleared = wait_for(&session, |m| m.tag() == &MessageType::CallCleared);
    assert_eq!(cleared.text("reason"), Some(LOCAL_CLEAR_REASON));
    assert_eq!(session.active_calls(), 0);

    let again = send(&session, "call-clear", params! { "call-id" => call_id.as_str() });
    assert!(again.is_error());
}

#[test]
fn test_service_call_connects_without_alerting() {
    let session = setup_session(20);
    let call_id = place_call(&session, "ivr:welcome.vxml");

    let first = wait_for(&session, |m| m.tag() == &MessageType::CallStateChanged);
    let second = wait_for(&session, |m| m.tag() == &MessageType::CallStateChanged);

    assert_eq!(first.text("state"), Some("proceeding"));
    assert_eq!(second.text("state"), Some("connected"));
    assert_eq!(second.call_id(), Some(call_id));
}

// =============================================================================
// Loopback Tests
// =============================================================================

#[test]
fn test_loopback_call_answer_connects_both_legs() {
    let session = setup_session(20);
    let outgoing = place_call(&session, "local:bob");

    let incoming = wait_for(&session, |m| m.tag() == &MessageType::IncomingCall);
    assert_eq!(incoming.text("protocol"), Some("local"));
    assert_eq!(incoming.text("party-b"), Some("local:bob"));
    let incoming_id = incoming.call_id().unwrap();
    assert_ne!(incoming_id, outgoing);

    let ack = send(&session, "call-answer", params! { "call-id" => incoming_id.as_str() });
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    wait_state(&session, &incoming_id, "connected");
    wait_state(&session, &outgoing, "connected");
    assert_eq!(session.active_calls(), 2);
}

#[test]
fn test_loopback_user_input_reaches_peer() {
    let session = setup_session(20);
    let outgoing = place_call(&session, "pc:*");
    let incoming = wait_for(&session, |m| m.tag() == &MessageType::IncomingCall)
        .call_id()
        .unwrap();
    send(&session, "call-answer", params! { "call-id" => incoming.as_str() });
    wait_state(&session, &outgoing, "connected");

    send(
        &session,
        "send-user-input",
        params! { "call-id" => outgoing.as_str(), "user-input" => "1234#" },
    );

    let input = wait_for(&session, |m| m.tag() == &MessageType::UserInput);
    assert_eq!(input.call_id(), Some(incoming));
    assert_eq!(input.text("user-input"), Some("1234#"));
}

#[test]
fn test_loopback_clear_clears_both_legs() {
    let session = setup_session(20);
    let outgoing = place_call(&session, "local:bob");
    let incoming = wait_for(&session, |m| m.tag() == &MessageType::IncomingCall)
        .call_id()
        .unwrap();

    send(&session, "call-clear", params! { "call-id" => outgoing.as_str() });

    let peer = wait_for(&session, |m| {
        m.tag() == &MessageType::CallCleared && m.call_id().as_ref() == Some(&incoming)
    });
    assert_eq!(peer.text("reason"), Some(REMOTE_CLEAR_REASON));
    assert_eq!(session.active_calls(), 0);
}

#[test]
fn test_answer_outgoing_leg_is_async_error() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    let answer = Message::command("call-answer", params! { "call-id" => call_id.as_str() });
    let ack = session.send_message(&answer).unwrap();
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    let error = wait_error_for(&session, &answer);
    assert!(error.text("reason").unwrap().contains("cannot answer"));
}

// =============================================================================
// Hold / Media Tests
// =============================================================================

#[test]
fn test_hold_and_retrieve() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    send(&session, "call-hold", params! { "call-id" => call_id.as_str() });
    wait_state(&session, &call_id, "held");

    send(&session, "call-retrieve", params! { "call-id" => call_id.as_str() });
    wait_state(&session, &call_id, "connected");
}

#[test]
fn test_retrieve_connected_call_is_async_error() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    let retrieve = Message::command("call-retrieve", params! { "call-id" => call_id.as_str() });
    let ack = session.send_message(&retrieve).unwrap();
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    let error = wait_error_for(&session, &retrieve);
    assert_eq!(error.text("command"), Some("call-retrieve"));
    assert!(error.text("reason").unwrap().contains("is connected"));
}

#[test]
fn test_media_stream_pause_resume() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    for (action, expected) in [("pause", "paused"), ("resume", "open"), ("close", "closed")] {
        send(
            &session,
            "media-stream",
            params! { "call-id" => call_id.as_str(), "state" => action },
        );
        let event = wait_for(&session, |m| m.tag() == &MessageType::MediaStreamState);
        assert_eq!(event.text("state"), Some(expected), "after {}", action);
    }
}

#[test]
fn test_media_stream_invalid_transition() {
    let session = setup_session(20);
    let call_id = connected_sip_call(&session);

    let resume = Message::command(
        "media-stream",
        params! { "call-id" => call_id.as_str(), "media" => "video", "state" => "resume" },
    );
    session.send_message(&resume).unwrap();

    let error = wait_error_for(&session, &resume);
    assert!(error.text("reason").unwrap().contains("video"));
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_registration_with_message_waiting() {
    let session = setup_session(20);

    let ack = send(
        &session,
        "registration",
        params! {
            "protocol" => "sip",
            "identifier" => "alice@example.com",
            "event-package" => "message-summary",
        },
    );
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    let registering = wait_for(&session, |m| m.tag() == &MessageType::RegistrationStatus);
    assert_eq!(registering.text("status"), Some("registering"));
    let registered = wait_for(&session, |m| m.tag() == &MessageType::RegistrationStatus);
    assert_eq!(registered.text("status"), Some("registered"));

    let mwi = wait_for(&session, |m| m.tag() == &MessageType::MessageWaiting);
    assert_eq!(mwi.text("party"), Some("alice@example.com"));
    assert_eq!(mwi.integer("new-messages"), Some(0));
}

#[test]
fn test_line_appearance_gated_below_version_22() {
    let session = setup_session(20);

    let reply = send(
        &session,
        "registration",
        params! {
            "protocol" => "sip",
            "identifier" => "line1@example.com",
            "event-package" => "dialog;sla;ma",
        },
    );

    assert!(reply.is_error());
    assert!(reply.text("reason").unwrap().contains("requires API version 22"));
}

#[test]
fn test_line_appearance_at_current_version() {
    let session = setup_session(24);

    send(
        &session,
        "registration",
        params! {
            "protocol" => "sip",
            "identifier" => "line1@example.com",
            "event-package" => "dialog;sla;ma",
        },
    );

    let line = wait_for(&session, |m| m.tag() == &MessageType::LineAppearance);
    assert_eq!(line.text("line"), Some("line1@example.com"));
    assert_eq!(line.text("state"), Some("idle"));
}

#[test]
fn test_unregister_requires_registration() {
    let session = setup_session(20);

    let unregister = Message::command(
        "registration",
        params! { "protocol" => "sip", "identifier" => "alice@example.com", "time-to-live" => 0i64 },
    );
    let ack = session.send_message(&unregister).unwrap();
    assert_eq!(ack.tag(), &MessageType::CommandAck);

    let error = wait_error_for(&session, &unregister);
    assert!(error.text("reason").unwrap().contains("not registered"));
}

// =============================================================================
// Settings Tests
// =============================================================================

#[test]
fn test_general_params_return_previous_values() {
    let session = setup_session(20);

    let first = send(&session, "set-general-params", params! { "stun-server" => "stun.example.com" });
    let previous = first.param("previous").and_then(Value::as_fields).unwrap();
    assert!(previous.is_empty());

    let second = send(&session, "set-general-params", params! { "stun-server" => "stun2.example.com" });
    let previous = second.param("previous").and_then(Value::as_fields).unwrap();
    assert_eq!(previous.get("stun-server"), Some(&Value::from("stun.example.com")));

    let query = send(&session, "set-general-params", params! {});
    let current = query.param("previous").and_then(Value::as_fields).unwrap();
    assert_eq!(current.get("stun-server"), Some(&Value::from("stun2.example.com")));
}

#[test]
fn test_protocol_user_name_becomes_calling_party() {
    let session = setup_session(20);
    send(
        &session,
        "set-protocol-params",
        params! { "protocol" => "local", "user-name" => "operator" },
    );

    place_call(&session, "local:bob");

    let incoming = wait_for(&session, |m| m.tag() == &MessageType::IncomingCall);
    assert_eq!(incoming.text("party-a"), Some("local:operator"));
}

// =============================================================================
// Handler-level Tests
// =============================================================================

#[test]
fn test_signalling_handler_registrar_required() {
    let harness = Harness::new();
    let mut handler = SignallingHandler::new(Prefix::Sip);

    let result = handler.handle(
        job(
            Command::Registration {
                protocol: Prefix::Sip,
                identifier: "alice".to_string(),
                host: None,
                password: None,
                time_to_live: 300,
                event_package: None,
            },
            None,
        ),
        &harness.sink,
    );

    assert!(matches!(
        result,
        Err(CommandError::InvalidParameter { ref name, .. }) if name == "host"
    ));
    assert!(harness.events().is_empty());
}

#[test]
fn test_loopback_handler_rejects_second_answer() {
    let harness = Harness::new();
    let mut handler = LoopbackHandler::new(Prefix::Local);
    let outgoing = CallId::next();

    handler
        .handle(
            job(
                Command::CallSetup {
                    party_a: Some("local:me".to_string()),
                    party_b: "local:you".to_string(),
                },
                Some(outgoing.clone()),
            ),
            &harness.sink,
        )
        .unwrap();
    let incoming = harness
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::IncomingCall { call_id, .. } => Some(call_id),
            _ => None,
        })
        .unwrap();

    handler
        .handle(job(Command::CallAnswer { call_id: incoming.clone() }, None), &harness.sink)
        .unwrap();
    let second = handler.handle(job(Command::CallAnswer { call_id: incoming }, None), &harness.sink);

    assert!(matches!(second, Err(CommandError::InvalidCallState { .. })));
}

#[test]
fn test_service_handler_hold_before_connect_fails() {
    let harness = Harness::new();
    let mut handler = ServiceHandler::new(Prefix::Ivr);

    let result = handler.handle(
        job(Command::CallHold { call_id: CallId::from("call-unknown") }, None),
        &harness.sink,
    );

    assert_eq!(result, Err(CommandError::UnknownCall("call-unknown".to_string())));
}

#[test]
fn test_service_handler_events_in_order() {
    let harness = Harness::new();
    let mut handler = ServiceHandler::new(Prefix::Mixer);
    let call_id = CallId::next();

    handler
        .handle(
            job(
                Command::CallSetup {
                    party_a: None,
                    party_b: "mcu:room1".to_string(),
                },
                Some(call_id.clone()),
            ),
            &harness.sink,
        )
        .unwrap();

    let states: Vec<CallState> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::CallStateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![CallState::Proceeding, CallState::Connected]);
}

// =============================================================================
// Worker Tests
// =============================================================================

struct PanickingHandler;

impl ProtocolHandler for PanickingHandler {
    fn prefix(&self) -> Prefix {
        Prefix::Sip
    }

    fn handle(&mut self, _job: Job, _sink: &EventSink) -> Result<(), CommandError> {
        panic!("handler failure");
    }
}

fn setup_job() -> Job {
    job(
        Command::CallSetup {
            party_a: None,
            party_b: "sip:alice@example.com".to_string(),
        },
        Some(CallId::next()),
    )
}

#[test]
fn test_worker_panic_rejects_later_jobs() {
    let harness = Harness::new();
    let mut worker = Worker::spawn(Box::new(PanickingHandler), harness.sink.clone()).unwrap();

    worker.submit(setup_job()).unwrap();

    // The receiver goes away once the thread unwinds
    let deadline = Instant::now() + Duration::from_secs(5);
    let reason = loop {
        assert!(Instant::now() < deadline, "worker never exited");
        match worker.submit(setup_job()) {
            Ok(()) => std::thread::sleep(Duration::from_millis(10)),
            Err(CommandError::Rejected(reason)) => break reason,
            Err(other) => panic!("Expected Rejected, got {:?}", other),
        }
    };
    assert_eq!(reason, "sip worker has exited");

    match worker.stop() {
        Err(SwitchboardError::Worker(reason)) => assert_eq!(reason, "sip worker panicked"),
        other => panic!("Expected Worker error, got {:?}", other),
    }
}

#[test]
fn test_stopped_worker_rejects_jobs() {
    let harness = Harness::new();
    let mut worker =
        Worker::spawn(Box::new(SignallingHandler::new(Prefix::Sip)), harness.sink.clone()).unwrap();

    worker.stop().unwrap();

    match worker.submit(setup_job()) {
        Err(CommandError::Rejected(reason)) => assert_eq!(reason, "sip worker is stopped"),
        other => panic!("Expected Rejected, got {:?}", other),
    }
    assert!(worker.stop().is_ok());
}
