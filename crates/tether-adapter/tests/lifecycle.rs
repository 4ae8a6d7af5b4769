//! Connection open/close negotiation and event dispatch layering.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{accepted, container, log_all, CaptureSink};
use std::sync::Arc;
use tether_adapter::{ContainerOptions, Event, EventType, IdSequence};
use tether_engine::{EngineConnection, EngineSession, EventKind};
use tether_testkit::{EventLog, ScriptedEvent};

#[test]
fn accepted_connection_answers_remote_open() {
    let (engine, container) = container("server");
    let log = log_all(&container);
    let sink = CaptureSink::default();
    let connection = container.accept(sink.boxed());
    let conn = engine.last_connection().unwrap();
    assert!(conn.state().is_local_uninit());

    conn.remote_open();
    connection.process();

    assert_eq!(log.entries(), vec![EventType::ConnectionOpening]);
    assert!(conn.state().is_local_active());
}

#[test]
fn close_negotiation_releases_engine_resources() {
    let peer = accepted("server");
    let log = log_all(&peer.container);

    peer.connection.close();
    assert!(peer.conn.state().is_local_closed());

    peer.conn.remote_close();
    peer.connection.process();

    // The opening event predates the listener; only the close shows up.
    assert_eq!(log.entries(), vec![EventType::ConnectionClosed]);
    assert!(peer.conn.was_freed());
    assert!(peer.transport.was_unbound());
    assert!(peer.transport.was_freed());
    assert!(peer.sink.ended());
}

#[test]
fn peer_initiated_close_is_answered() {
    let peer = accepted("server");
    let log = log_all(&peer.container);

    peer.conn.remote_close();
    peer.connection.process();

    assert!(log.entries().contains(&EventType::ConnectionClosing));
    assert!(peer.conn.state().is_fully_closed());

    // Both directions done: the engine reports transport closure and the
    // adapter ends the byte stream.
    peer.conn.transport_closed();
    peer.connection.process();
    assert!(peer.sink.ended());
}

#[test]
fn connection_listener_preempts_container_backstop() {
    let (engine, container) = container("server");
    let container_log = log_all(&container);
    let sink = CaptureSink::default();
    let connection = container.accept(sink.boxed());

    let connection_log: EventLog<EventType> = EventLog::new();
    {
        let log = connection_log.clone();
        connection.on(EventType::ConnectionOpening, move |event| {
            log.push(event.event_type());
        });
    }

    engine.last_connection().unwrap().remote_open();
    connection.process();

    assert_eq!(connection_log.entries(), vec![EventType::ConnectionOpening]);
    assert!(container_log.is_empty());
}

#[test]
fn handlers_may_register_more_handlers() {
    let (engine, container) = container("server");
    let sink = CaptureSink::default();
    let connection = container.accept(sink.boxed());
    let conn = engine.last_connection().unwrap();

    let log: EventLog<&'static str> = EventLog::new();
    {
        let log = log.clone();
        let inner_target = connection.clone();
        connection.on(EventType::ConnectionOpening, move |_| {
            log.push("opening");
            let log = log.clone();
            inner_target.on(EventType::ConnectionClosing, move |_| log.push("closing"));
        });
    }

    conn.remote_open();
    connection.process();
    conn.remote_close();
    connection.process();

    assert_eq!(log.entries(), vec!["opening", "closing"]);
}

#[test]
fn only_the_first_remote_session_is_adopted() {
    let peer = accepted("server");

    let first = peer.conn.remote_session_open();
    peer.connection.process();
    assert!(first.state().is_local_active());

    let second = peer.conn.remote_session_open();
    peer.connection.process();
    assert!(second.state().is_local_uninit());
}

#[test]
fn unmapped_event_kinds_are_drained() {
    let peer = accepted("server");
    let log = log_all(&peer.container);
    let before = log.len();

    peer.conn.push_event(ScriptedEvent::new(EventKind::Transport));
    peer.conn
        .push_event(ScriptedEvent::new(EventKind::SessionRemoteClose));
    peer.connection.process();

    assert_eq!(log.len(), before);
    assert_eq!(peer.conn.collector().unwrap().pending(), 0);
}

#[test]
fn concurrent_processing_drains_late_events() {
    let peer = accepted("server");
    let conn = peer.conn.clone();
    let connection = peer.connection.clone();
    let pusher = std::thread::spawn(move || {
        for _ in 0..500 {
            conn.push_event(ScriptedEvent::new(EventKind::Transport));
            connection.process();
        }
    });
    for _ in 0..500 {
        peer.connection.process();
    }
    pusher.join().unwrap();

    // Every push was followed by a process call. If that call lost the
    // flag race, the pass that held the loop re-checks after releasing
    // it, so nothing may stay queued once both threads return.
    assert_eq!(peer.conn.collector().unwrap().pending(), 0);
}

#[test]
fn connection_ids_come_from_the_container_sequence() {
    let engine = tether_testkit::ScriptedEngine::new();
    let container = tether_adapter::Container::with_options(
        Arc::new(engine.clone()),
        ContainerOptions {
            id: Some("server".to_string()),
            id_sequence: Some(IdSequence::starting_at(7)),
        },
    );
    let first = container.accept(CaptureSink::default().boxed());
    let second = container.accept(CaptureSink::default().boxed());
    assert_eq!(first.id(), "connection-7");
    assert_eq!(second.id(), "connection-8");
}

#[test]
fn disconnected_carries_the_socket_error() {
    let peer = accepted("server");
    let errors: EventLog<Option<String>> = EventLog::new();
    {
        let errors = errors.clone();
        peer.container.on(EventType::Disconnected, move |event| {
            if let Event::Disconnected { error, .. } = event {
                errors.push(error.clone());
            }
        });
    }

    peer.connection.eof(Some("connection reset".to_string()));

    assert_eq!(errors.entries(), vec![Some("connection reset".to_string())]);
    assert!(peer.transport.is_head_closed());
    assert!(peer.transport.is_tail_closed());
    // No reconnect policy on accepted connections, and no clean close
    // either: the connection stays inspectable.
    assert!(!peer.conn.was_freed());
}

#[test]
fn eof_after_clean_close_is_silent() {
    let peer = accepted("server");
    peer.connection.close();
    peer.conn.remote_close();
    peer.connection.process();
    assert!(peer.conn.was_freed());

    let log = log_all(&peer.container);
    peer.connection.eof(None);
    assert!(log.is_empty());
}
