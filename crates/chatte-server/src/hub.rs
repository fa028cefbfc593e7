//! Routing hub.
//!
//! One task owns the shared inbound channel and the sweep timer. Each inbound
//! message is routed (broadcast, private delivery, quit) by handing commands
//! to connection mailboxes; every hand-off is bounded by the dispatch timeout,
//! so one stalled peer delays a broadcast by at most that long and never
//! blocks it. Registrations go through [`Registrar`], which writes the
//! registry directly under its lock.

use std::sync::Arc;
use std::time::Duration;

use chatte_core::transport::Transport;
use chatte_core::{Command, Identity, Message, MessageBody};
use chatte_settings::ChatSettings;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::connection::Connection;
use crate::errors::RegisterError;
use crate::registry::Registry;

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Shared inbound channel capacity.
    pub inbound_capacity: usize,
    /// Idle time after which a connection is stopped.
    pub inactivity_timeout: Duration,
    /// Time between sweeps.
    pub sweep_interval: Duration,
    /// Bound on one mailbox hand-off.
    pub dispatch_timeout: Duration,
    /// Registration limit.
    pub max_connections: usize,
}

impl HubConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self {
            inbound_capacity: settings.hub.inbound_capacity,
            inactivity_timeout: settings.hub.inactivity_timeout(),
            sweep_interval: settings.hub.sweep_interval(),
            dispatch_timeout: settings.hub.dispatch_timeout(),
            max_connections: settings.server.max_connections,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from_settings(&ChatSettings::default())
    }
}

/// Outcome of one bounded mailbox hand-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Stopped,
    TimedOut,
}

/// The routing loop. Consumed by [`Hub::run`].
pub struct Hub {
    config: HubConfig,
    registry: Arc<Registry>,
    inbound: mpsc::Receiver<Message>,
    root: CancellationToken,
}

/// Admits new connections into a running hub.
#[derive(Clone)]
pub struct Registrar {
    registry: Arc<Registry>,
    inbound: mpsc::Sender<Message>,
    root: CancellationToken,
    max_connections: usize,
}

impl Hub {
    /// Create a hub and the registrar that feeds it.
    ///
    /// Every connection's scope is a child of `root`; cancelling `root` stops
    /// the hub and all connections.
    pub fn new(config: HubConfig, root: CancellationToken) -> (Self, Registrar) {
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let registry = Arc::new(Registry::new());
        let registrar = Registrar {
            registry: Arc::clone(&registry),
            inbound: tx,
            root: root.clone(),
            max_connections: config.max_connections,
        };
        let hub = Self {
            config,
            registry,
            inbound: rx,
            root,
        };
        (hub, registrar)
    }

    /// Shared registry handle.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route inbound messages and sweep idle connections until the root
    /// scope is cancelled. On exit, waits for every connection to close.
    pub async fn run(mut self) {
        let period = self.config.sweep_interval;
        let mut sweep = time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            inactivity_timeout_ms = self.config.inactivity_timeout.as_millis(),
            sweep_interval_ms = period.as_millis(),
            dispatch_timeout_ms = self.config.dispatch_timeout.as_millis(),
            "hub started"
        );

        loop {
            tokio::select! {
                biased;
                () = self.root.cancelled() => break,
                _ = sweep.tick() => self.sweep().await,
                message = self.inbound.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => break,
                },
            }
        }

        let remaining = self.registry.drain();
        info!(connections = remaining.len(), "hub stopping, closing connections");
        for conn in &remaining {
            conn.cancel();
        }
        let _ = join_all(remaining.iter().map(|conn| conn.join())).await;
        info!("hub stopped");
    }

    /// Route one inbound message.
    #[instrument(skip_all, fields(sender = %message.sender, kind = message.body.discriminant()))]
    async fn dispatch(&self, message: Message) {
        let Some(sender) = self.registry.get(message.sender.as_str()) else {
            warn!("message from unregistered sender, dropping");
            return;
        };

        match message.body {
            MessageBody::Ping => trace!("ping"),
            MessageBody::Quit => {
                info!("quit requested");
                self.stop_connection(&sender).await;
            }
            MessageBody::Public { text } => {
                self.broadcast(&message.sender, &text, message.received_at).await;
            }
            MessageBody::Private { recipient, text } => match self.registry.get(recipient.as_str()) {
                Some(target) => {
                    let command = Command::PrivateDeliver {
                        sender: message.sender.clone(),
                        text,
                        time: message.received_at,
                    };
                    let _ = self.deliver(&target, command).await;
                }
                None => {
                    debug!(recipient = %recipient, "recipient not found");
                    let command = Command::Error {
                        text: format!("Recipient {recipient} not found"),
                    };
                    let _ = self.deliver(&sender, command).await;
                }
            },
        }
    }

    async fn broadcast(&self, sender: &Identity, text: &str, time: DateTime<Utc>) {
        let targets = self.registry.snapshot();
        let deliveries = targets.iter().map(|target| {
            let command = Command::Broadcast {
                sender: sender.clone(),
                text: text.to_owned(),
                time,
            };
            self.deliver(target, command)
        });
        let outcomes = join_all(deliveries).await;
        let delivered = outcomes.iter().filter(|d| **d == Delivery::Delivered).count();
        debug!(recipients = targets.len(), delivered, "broadcast");
    }

    async fn deliver(&self, target: &Connection, command: Command) -> Delivery {
        let kind = command.kind();
        match time::timeout(self.config.dispatch_timeout, target.deliver(command)).await {
            Ok(true) => Delivery::Delivered,
            Ok(false) => {
                trace!(peer = %target.identity(), kind, "target stopping, command dropped");
                Delivery::Stopped
            }
            Err(_) => {
                warn!(
                    peer = %target.identity(),
                    kind,
                    timeout_ms = self.config.dispatch_timeout.as_millis(),
                    "mailbox hand-off timed out, command dropped"
                );
                Delivery::TimedOut
            }
        }
    }

    /// Deliver `Stop`; cancel the scope directly if the mailbox stays full.
    async fn stop_connection(&self, conn: &Connection) {
        if self.deliver(conn, Command::Stop).await == Delivery::TimedOut {
            conn.cancel();
        }
    }

    async fn sweep(&self) {
        let outcome = self.registry.sweep(self.config.inactivity_timeout);
        for identity in &outcome.removed {
            debug!(identity = %identity, "removed stopped connection");
        }
        if outcome.expired.is_empty() {
            return;
        }
        let stops = outcome.expired.iter().map(|conn| {
            info!(
                identity = %conn.identity(),
                idle_ms = conn.idle_for().as_millis(),
                "inactivity timeout, stopping connection"
            );
            self.stop_connection(conn)
        });
        let _ = join_all(stops).await;
    }
}

impl Registrar {
    /// Assign an identity to `transport`, start its connection and register it.
    pub fn register<T: Transport>(&self, transport: T) -> Result<Identity, RegisterError> {
        self.check_admission()?;
        let identity = self.registry.admit(self.max_connections, |identity| {
            Connection::start(identity, transport, self.inbound.clone(), &self.root)
        })?;
        info!(identity = %identity, connections = self.registry.len(), "client registered");
        Ok(identity)
    }

    /// Whether a registration attempted now would be refused, without
    /// consuming a transport.
    pub fn check_admission(&self) -> Result<(), RegisterError> {
        if self.root.is_cancelled() {
            return Err(RegisterError::ShuttingDown);
        }
        if self.registry.len() >= self.max_connections {
            return Err(RegisterError::AtCapacity {
                limit: self.max_connections,
            });
        }
        Ok(())
    }

    /// Shared registry handle.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registered connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatte_core::transport::memory::{self, MemoryPeer};

    const WAIT: Duration = Duration::from_secs(1);

    fn config() -> HubConfig {
        HubConfig {
            dispatch_timeout: Duration::from_millis(100),
            ..HubConfig::default()
        }
    }

    fn connect(registrar: &Registrar) -> (Identity, MemoryPeer) {
        let (transport, peer) = memory::pair();
        (registrar.register(transport).unwrap(), peer)
    }

    #[test]
    fn config_from_settings() {
        let mut settings = ChatSettings::default();
        settings.hub.sweep_interval_ms = 250;
        settings.server.max_connections = 7;
        let config = HubConfig::from_settings(&settings);
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.inbound_capacity, 10);
    }

    #[tokio::test]
    async fn unregistered_sender_is_dropped() {
        let root = CancellationToken::new();
        let (hub, registrar) = Hub::new(config(), root.clone());
        let (a, mut pa) = connect(&registrar);

        registrar
            .inbound
            .send(Message::stamp(
                Identity::from_raw("ghost"),
                MessageBody::Public { text: "boo".into() },
            ))
            .await
            .unwrap();
        registrar
            .inbound
            .send(Message::stamp(a, MessageBody::Public { text: "hi".into() }))
            .await
            .unwrap();

        let hub_task = tokio::spawn(hub.run());
        let frame = tokio::time::timeout(WAIT, pa.recv()).await.unwrap();
        assert_eq!(frame.as_deref(), Some("User1: hi"));

        root.cancel();
        tokio::time::timeout(WAIT, hub_task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refused_after_root_cancel() {
        let root = CancellationToken::new();
        let (_hub, registrar) = Hub::new(config(), root.clone());
        root.cancel();
        let (transport, _peer) = memory::pair();
        assert_eq!(registrar.register(transport), Err(RegisterError::ShuttingDown));
        assert_eq!(registrar.connection_count(), 0);
    }

    #[tokio::test]
    async fn admission_check_reports_capacity() {
        let root = CancellationToken::new();
        let (_hub, registrar) = Hub::new(
            HubConfig {
                max_connections: 1,
                ..config()
            },
            root,
        );
        assert!(registrar.check_admission().is_ok());
        let (_a, _pa) = connect(&registrar);
        assert_eq!(
            registrar.check_admission(),
            Err(RegisterError::AtCapacity { limit: 1 })
        );
    }

    #[tokio::test]
    async fn stalled_stop_escalates_to_cancel() {
        let root = CancellationToken::new();
        let (hub, registrar) = Hub::new(config(), root);
        let (transport, mut peer) = memory::pair_with_capacity(1);
        let id = registrar.register(transport).unwrap();
        let conn = hub.registry.get(id.as_str()).unwrap();

        // First frame fills the peer buffer, the second blocks the command
        // loop mid-write, the third occupies the mailbox.
        for text in ["one", "two", "three"] {
            assert!(conn.public(Identity::numbered(9), text, Utc::now()).await);
        }
        assert!(conn.is_running());

        hub.stop_connection(&conn).await;
        tokio::time::timeout(WAIT, conn.closed()).await.unwrap();
        assert_eq!(peer.close_count(), 1);
        assert_eq!(peer.recv().await.as_deref(), Some("User9: one"));
        assert!(peer.recv().await.is_none());
    }
}
