//! Socket lifecycle over real loopback TCP: connect, listen, disconnect
//! detection, and reconnect with backoff.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use assert_matches::assert_matches;
use common::{container, wait_until};
use std::time::Duration;
use tether_adapter::{
    ConnectOptions, Event, EventType, ListenOptions, ReconnectConfig, TetherError,
};
use tether_engine::EngineConnection;
use tether_testkit::EventLog;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn quick_backoff() -> ReconnectConfig {
    ReconnectConfig {
        max_attempts: 4,
        base_delay: Duration::from_millis(25),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn client_open_completes_negotiation() {
    let (engine, container) = container("client");
    let log = common::log_all(&container);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let connection = container
        .connect(ConnectOptions::new("127.0.0.1", port))
        .await
        .unwrap();
    let _socket = listener.accept().await.unwrap();

    let conn = engine.last_connection().unwrap();
    assert!(conn.state().is_local_active());
    assert_eq!(conn.container_id(), "client");

    conn.remote_open();
    connection.process();
    assert!(log.entries().contains(&EventType::ConnectionOpened));
}

#[tokio::test]
async fn credentials_reach_the_engine() {
    let (engine, container) = container("client");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut options = ConnectOptions::new("127.0.0.1", port);
    options.username = Some("user".to_string());
    options.password = Some("secret".to_string());
    options.container_id = Some("override".to_string());
    let _connection = container.connect(options).await.unwrap();
    let _socket = listener.accept().await.unwrap();

    let conn = engine.last_connection().unwrap();
    assert_eq!(
        conn.credentials(),
        Some(("user".to_string(), "secret".to_string()))
    );
    assert_eq!(conn.container_id(), "override");
}

#[tokio::test]
async fn outbound_bytes_reach_the_socket() {
    let (engine, container) = container("client");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let connection = container
        .connect(ConnectOptions::new("127.0.0.1", port))
        .await
        .unwrap();
    let (mut socket, _) = listener.accept().await.unwrap();

    engine.last_transport().unwrap().queue_output(b"ping");
    connection.process();

    let mut buf = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(2), socket.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn inbound_bytes_reach_the_transport() {
    let (engine, container) = container("client");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let _connection = container
        .connect(ConnectOptions::new("127.0.0.1", port))
        .await
        .unwrap();
    let (mut socket, _) = listener.accept().await.unwrap();

    socket.write_all(b"pong").await.unwrap();
    let transport = engine.last_transport().unwrap();
    wait_until("bytes pumped into the transport", || {
        transport.pushed_bytes() == b"pong"
    })
    .await;
}

#[tokio::test]
async fn reconnects_after_socket_loss() {
    let (engine, container) = container("client");
    let disconnects: EventLog<()> = EventLog::new();
    {
        let disconnects = disconnects.clone();
        container.on(EventType::Disconnected, move |_| disconnects.push(()));
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Failover list with two entries; both resolve to the same listener.
    let mut options = ConnectOptions::new("127.0.0.1, 127.0.0.1", port);
    options.reconnect = true;
    options.reconnect_config = quick_backoff();
    let connection = container.connect(options).await.unwrap();

    let (first_socket, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engine.transports().len(), 1);

    drop(first_socket);

    // The retry lands on the listener again with a fresh transport bound
    // to the same engine connection.
    let (_second_socket, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_until("replacement transport bound", || {
        engine.transports().len() == 2
    })
    .await;

    assert!(engine.transports()[0].was_freed());
    assert!(engine.transports()[1].is_bound());
    assert_eq!(engine.connections().len(), 1);
    assert!(disconnects.len() >= 1);
    assert_eq!(connection.id(), "connection-1");
}

#[tokio::test]
async fn initial_connect_failure_retries_until_exhausted() {
    let (engine, container) = container("client");
    let errors: EventLog<Option<String>> = EventLog::new();
    {
        let errors = errors.clone();
        container.on(EventType::Disconnected, move |event| {
            if let Event::Disconnected { error, .. } = event {
                errors.push(error.clone());
            }
        });
    }

    // Grab a free port, then close it so every attempt is refused.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut options = ConnectOptions::new("127.0.0.1", port);
    options.reconnect = true;
    options.reconnect_config = ReconnectConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let _connection = container.connect(options).await.unwrap();

    let conn = engine.last_connection().unwrap();
    wait_until("retry budget exhausted", || conn.was_freed()).await;

    assert_eq!(
        errors.entries(),
        vec![Some("reconnect attempts exhausted".to_string())]
    );
}

#[tokio::test]
async fn connect_failure_without_reconnect_is_an_error() {
    let (_engine, container) = container("client");
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = container.connect(ConnectOptions::new("127.0.0.1", port)).await;
    assert_matches!(result, Err(TetherError::Connect { .. }));
}

#[tokio::test]
async fn connect_without_hosts_is_a_config_error() {
    let (_engine, container) = container("client");
    let result = container.connect(ConnectOptions::new(" , ", 5672)).await;
    assert_matches!(result, Err(TetherError::Config { .. }));
}

#[tokio::test]
async fn listener_wraps_inbound_sockets() {
    let (engine, container) = container("server");
    let listener = container.listen(ListenOptions::port(0)).await.unwrap();
    let port = listener.local_addr().port();

    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    wait_until("server connection created", || {
        engine.connections().len() == 1
    })
    .await;

    // Accepted connections wait for the client's open frame.
    let conn = engine.last_connection().unwrap();
    assert!(conn.state().is_local_uninit());

    socket.write_all(b"client-bytes").await.unwrap();
    let transport = engine.last_transport().unwrap();
    wait_until("bytes pumped into the server transport", || {
        transport.pushed_bytes() == b"client-bytes"
    })
    .await;

    listener.close();
}
