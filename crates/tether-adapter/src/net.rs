//! TCP wiring
//!
//! Sockets are pumped by two tasks per connection: a reader feeding
//! [`Connection::input`] and a writer draining a channel the connection's
//! sink writes into (fire-and-forget, per the adapter's concurrency
//! model). Reconnects are timer-driven tasks that replace the transport
//! and socket while the engine connection keeps its identity.

use crate::connection::{Connection, WireSink};
use crate::container::ContainerInner;
use crate::error::{Result, TetherError};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const READ_BUFFER: usize = 8 * 1024;

enum WriterCommand {
    Write(Vec<u8>),
    End,
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl WireSink for ChannelSink {
    fn write(&mut self, bytes: Vec<u8>) {
        // Writer task gone means the socket already failed; the reader
        // side surfaces that as eof.
        let _ = self.tx.send(WriterCommand::Write(bytes));
    }

    fn end(&mut self) {
        let _ = self.tx.send(WriterCommand::End);
    }
}

/// Establish a socket to the connection's next failover host and wire it
/// up.
pub(crate) async fn connect_socket(connection: &Connection) -> Result<()> {
    let Some((host, port)) = connection.next_host() else {
        return Err(TetherError::config("no hosts configured"));
    };
    debug!(id = %connection.id(), host = %host, port, "connecting");
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    attach_stream(connection, stream);
    Ok(())
}

/// Spawn the reader/writer tasks for an established socket and attach
/// its outbound half to the connection.
pub(crate) fn attach_stream(connection: &Connection, stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                WriterCommand::Write(bytes) => {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                WriterCommand::End => {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        }
    });

    let reader_conn = connection.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    reader_conn.eof(None);
                    break;
                }
                Ok(n) => reader_conn.input(&buf[..n]),
                Err(err) => {
                    reader_conn.eof(Some(err.to_string()));
                    break;
                }
            }
        }
    });

    connection.attach_sink(Box::new(ChannelSink { tx }));
}

/// Accept loop for a server container.
pub(crate) async fn run_listener(listener: TcpListener, container: Arc<ContainerInner>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let connection = Connection::new(container.clone(), None);
                info!(id = %connection.id(), peer = %peer, "client accepted");
                attach_stream(&connection, stream);
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
            }
        }
    }
}

/// Claim the next retry slot and spawn the delayed attempt; gives up and
/// releases the connection once the policy's budget is spent.
pub(crate) fn schedule_reconnect(connection: Connection) {
    let Some((attempt, delay)) = connection.begin_reconnect_attempt() else {
        connection.reconnect_exhausted();
        return;
    };
    info!(id = %connection.id(), attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        connection.rebind_transport();
        match connect_socket(&connection).await {
            Ok(()) => {
                connection.reset_reconnect();
                info!(id = %connection.id(), attempt, "reconnected");
            }
            Err(err) => {
                warn!(id = %connection.id(), attempt, error = %err, "reconnect attempt failed");
                schedule_reconnect(connection);
            }
        }
    });
}
