//! Per-peer connection actor.
//!
//! A connection runs two tasks over one split transport:
//!
//! - the **reader** decodes inbound frames, stamps them with the identity and
//!   receipt time, refreshes the activity timestamp and forwards them to the
//!   hub's inbound channel
//! - the **command loop** drains the mailbox and writes frames to the peer
//!
//! Both tasks share one cancellation scope, a child of the server root. Any
//! fatal condition cancels the scope; the command loop then closes the
//! transport exactly once and marks the connection stopped.

use std::sync::Arc;
use std::time::Duration;

use chatte_core::codec;
use chatte_core::transport::{FrameSink, FrameSource, Transport};
use chatte_core::{Command, Identity, Message, TransportError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Mailbox depth. One slot: the hub hands a command off and the command loop
/// takes it, so a stalled peer backs up into the hub's dispatch timeout
/// rather than into memory.
const MAILBOX_CAPACITY: usize = 1;

/// Upper bound on closing the transport once the scope is cancelled.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Both loops running.
    Active,
    /// Scope cancelled, transport not yet closed.
    Stopping,
    /// Transport closed. Terminal.
    Stopped,
}

/// Handle to a running connection actor.
///
/// Dropping the last handle closes the mailbox, which stops the actor.
pub struct Connection {
    identity: Identity,
    mailbox: mpsc::Sender<Command>,
    cancel: CancellationToken,
    closed: CancellationToken,
    last_activity: Arc<Mutex<Instant>>,
    connected_at: Instant,
    tasks: TaskTracker,
}

impl Connection {
    /// Split `transport` and spawn the reader and command loops.
    ///
    /// Decoded messages go to `inbound`. The connection's scope is a child of
    /// `parent`, so cancelling the parent stops it.
    pub fn start<T: Transport>(
        identity: Identity,
        transport: T,
        inbound: mpsc::Sender<Message>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let closed = CancellationToken::new();
        let (mailbox, commands) = mpsc::channel(MAILBOX_CAPACITY);
        let connected_at = Instant::now();
        let last_activity = Arc::new(Mutex::new(connected_at));
        let (source, sink) = transport.split();

        let tasks = TaskTracker::new();
        let _ = tasks.spawn(read_loop(
            source,
            identity.clone(),
            inbound,
            cancel.clone(),
            Arc::clone(&last_activity),
        ));
        let _ = tasks.spawn(command_loop(
            sink,
            commands,
            identity.clone(),
            cancel.clone(),
            closed.clone(),
        ));
        let _ = tasks.close();

        debug!(identity = %identity, "connection started");
        Self {
            identity,
            mailbox,
            cancel,
            closed,
            last_activity,
            connected_at,
            tasks,
        }
    }

    /// Display name of this connection.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Hand `command` to the command loop.
    ///
    /// Waits for a free mailbox slot. Returns `false` without blocking once
    /// the connection is stopping, and never returns `true` after the scope
    /// was cancelled.
    pub async fn deliver(&self, command: Command) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.mailbox.send(command) => sent.is_ok(),
        }
    }

    /// Ask the connection to shut down.
    pub async fn stop(&self) -> bool {
        self.deliver(Command::Stop).await
    }

    /// Send an error notice to this peer.
    pub async fn send_error(&self, text: impl Into<String>) -> bool {
        self.deliver(Command::Error { text: text.into() }).await
    }

    /// Relay a public message from `sender`.
    pub async fn public(&self, sender: Identity, text: impl Into<String>, time: DateTime<Utc>) -> bool {
        self.deliver(Command::Broadcast {
            sender,
            text: text.into(),
            time,
        })
        .await
    }

    /// Relay a private message from `sender`.
    pub async fn private(&self, sender: Identity, text: impl Into<String>, time: DateTime<Utc>) -> bool {
        self.deliver(Command::PrivateDeliver {
            sender,
            text: text.into(),
            time,
        })
        .await
    }

    /// Cancel the scope directly, bypassing the mailbox.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the scope is still live.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        if self.closed.is_cancelled() {
            ConnectionState::Stopped
        } else if self.cancel.is_cancelled() {
            ConnectionState::Stopping
        } else {
            ConnectionState::Active
        }
    }

    /// When the last decoded inbound message arrived (or the connection
    /// started, if none has).
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since [`last_activity`](Self::last_activity).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Resolves once the transport has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Resolves once both loops have exited.
    pub async fn join(&self) {
        self.tasks.wait().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn read_loop<S: FrameSource>(
    mut source: S,
    identity: Identity,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
    last_activity: Arc<Mutex<Instant>>,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = source.receive() => received,
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(e) => {
                if !cancel.is_cancelled() {
                    if e == TransportError::Closed {
                        info!(identity = %identity, "peer disconnected");
                    } else {
                        warn!(identity = %identity, error = %e, "read failed, stopping connection");
                    }
                    cancel.cancel();
                }
                break;
            }
        };

        let body = match codec::decode(&frame) {
            Ok(body) => body,
            Err(e) => {
                warn!(identity = %identity, error = %e, len = frame.len(), "dropping undecodable frame");
                continue;
            }
        };

        *last_activity.lock() = Instant::now();
        let message = Message::stamp(identity.clone(), body);
        debug!(identity = %identity, kind = message.body.discriminant(), "frame decoded");

        tokio::select! {
            () = cancel.cancelled() => break,
            sent = inbound.send(message) => {
                if sent.is_err() {
                    warn!(identity = %identity, "hub inbound channel closed, stopping connection");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    trace!(identity = %identity, "reader exited");
}

async fn command_loop<K: FrameSink>(
    mut sink: K,
    mut commands: mpsc::Receiver<Command>,
    identity: Identity,
    cancel: CancellationToken,
    closed: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => {
                    debug!(identity = %identity, "all handles dropped");
                    cancel.cancel();
                    break;
                }
            },
        };

        if matches!(command, Command::Stop) {
            debug!(identity = %identity, "stop requested");
            cancel.cancel();
            break;
        }
        let Some(frame) = command.to_frame() else {
            continue;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            written = sink.send(frame) => {
                if let Err(e) = written {
                    warn!(identity = %identity, kind = command.kind(), error = %e, "write failed, stopping connection");
                    cancel.cancel();
                    break;
                }
            }
        }
    }

    commands.close();
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        warn!(identity = %identity, "transport close timed out");
    }
    closed.cancel();
    info!(identity = %identity, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatte_core::transport::memory::{self, MemoryPeer, MemoryTransport};
    use chatte_core::MessageBody;

    const WAIT: Duration = Duration::from_secs(1);

    fn start(
        transport: MemoryTransport,
        root: &CancellationToken,
    ) -> (Connection, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(10);
        let conn = Connection::start(Identity::numbered(1), transport, tx, root);
        (conn, rx)
    }

    fn spawn_one() -> (Connection, MemoryPeer, mpsc::Receiver<Message>, CancellationToken) {
        let root = CancellationToken::new();
        let (transport, peer) = memory::pair();
        let (conn, rx) = start(transport, &root);
        (conn, peer, rx, root)
    }

    async fn wait_closed(conn: &Connection) {
        tokio::time::timeout(WAIT, conn.closed())
            .await
            .expect("connection did not close");
    }

    #[tokio::test]
    async fn reader_stamps_and_forwards() {
        let (conn, peer, mut rx, _root) = spawn_one();
        assert!(peer.send_body(&MessageBody::Public { text: "hi".into() }));

        let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.sender, *conn.identity());
        assert_eq!(msg.body, MessageBody::Public { text: "hi".into() });
        assert_eq!(conn.state(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let (conn, peer, mut rx, _root) = spawn_one();
        assert!(peer.send("{not json"));
        assert!(peer.send(r#"{"Discriminator":"SHOUT"}"#));
        assert!(peer.send_body(&MessageBody::Ping));

        let msg = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.body, MessageBody::Ping);
        assert!(conn.is_running());
    }

    #[tokio::test]
    async fn commands_render_frames() {
        let (conn, mut peer, _rx, _root) = spawn_one();
        assert!(conn.public(Identity::numbered(2), "hello", Utc::now()).await);
        assert!(conn.private(Identity::numbered(3), "psst", Utc::now()).await);
        assert!(conn.send_error("Recipient User9 not found").await);

        assert_eq!(peer.recv().await.as_deref(), Some("User2: hello"));
        assert_eq!(peer.recv().await.as_deref(), Some("User3: psst"));
        assert_eq!(
            peer.recv().await.as_deref(),
            Some("error: Recipient User9 not found")
        );
    }

    #[tokio::test]
    async fn stop_closes_transport_once() {
        let (conn, mut peer, _rx, _root) = spawn_one();
        assert!(conn.stop().await);
        wait_closed(&conn).await;
        conn.join().await;

        assert_eq!(conn.state(), ConnectionState::Stopped);
        assert!(!conn.stop().await);
        assert!(!conn.public(Identity::numbered(2), "late", Utc::now()).await);
        assert!(peer.recv().await.is_none());
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn read_failure_stops_connection() {
        let (conn, mut peer, _rx, _root) = spawn_one();
        peer.hang_up();
        wait_closed(&conn).await;
        assert!(!conn.is_running());
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn write_failure_stops_connection() {
        let (conn, mut peer, _rx, _root) = spawn_one();
        peer.stop_reading();
        let _ = conn.public(Identity::numbered(2), "lost", Utc::now()).await;
        wait_closed(&conn).await;
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn cancel_wins_over_pending_mailbox() {
        let (conn, _peer, _rx, _root) = spawn_one();
        conn.cancel();
        assert_eq!(
            tokio::time::timeout(WAIT, conn.deliver(Command::Stop)).await,
            Ok(false)
        );
        wait_closed(&conn).await;
    }

    #[tokio::test]
    async fn root_cancel_stops_children_only_downwards() {
        let root = CancellationToken::new();
        let (t1, p1) = memory::pair();
        let (t2, p2) = memory::pair();
        let (a, _rx_a) = start(t1, &root);
        let (b, _rx_b) = start(t2, &root);

        a.cancel();
        wait_closed(&a).await;
        assert!(!root.is_cancelled());
        assert!(b.is_running());

        root.cancel();
        wait_closed(&b).await;
        assert_eq!(p1.close_count(), 1);
        assert_eq!(p2.close_count(), 1);
    }

    #[tokio::test]
    async fn hub_gone_stops_reader() {
        let (conn, peer, rx, _root) = spawn_one();
        drop(rx);
        assert!(peer.send_body(&MessageBody::Ping));
        wait_closed(&conn).await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_actor() {
        let root = CancellationToken::new();
        let (transport, mut peer) = memory::pair();
        let (conn, _rx) = start(transport, &root);
        drop(conn);
        assert!(tokio::time::timeout(WAIT, peer.recv()).await.unwrap().is_none());
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_decoded_frames_refresh_activity() {
        let (conn, peer, mut rx, _root) = spawn_one();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(peer.send("garbage"));
        assert!(peer.send_body(&MessageBody::Ping));
        let _ = rx.recv().await.unwrap();
        assert_eq!(conn.idle_for(), Duration::ZERO);
        assert!(conn.age() >= Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(peer.send("garbage"));
        tokio::task::yield_now().await;
        assert!(conn.idle_for() >= Duration::from_secs(3));
    }
}
