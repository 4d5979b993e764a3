use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::backoff::ReconnectConfig;
use super::router::{EventRouter, RouterStats};
use super::session::{ConnectionStatus, Effect, Session, SessionEvent};
use super::transport::{Connector, Transport};
use crate::types::GroupId;

enum Command {
    Connect(GroupId),
    Disconnect,
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the group synchronization session.
///
/// The session runs on its own task; every state change is serialized through
/// it, so transports, timers and caller requests never race. Failures are
/// reported through [`ConnectionStatus`], never returned to the caller.
///
/// # Example
///
/// ```no_run
/// use bets_sync::websocket::{ConnectionStatus, SyncClient, WsConnector, EventRouter};
/// # async fn demo(router: EventRouter) {
/// let origin = url::Url::parse("https://bets.example.com").unwrap();
/// let client = SyncClient::spawn(WsConnector::new(origin), router, Default::default());
///
/// client.connect("g1");
/// let mut status = client.subscribe_status();
/// while status.changed().await.is_ok() {
///     if *status.borrow() == ConnectionStatus::Closed {
///         client.connect("g1"); // manual retry
///     }
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    router: Arc<EventRouter>,
}

impl SyncClient {
    /// Start the session task. Must be called from within a tokio runtime.
    pub fn spawn<C: Connector>(connector: C, router: EventRouter, config: ReconnectConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);
        let router = Arc::new(router);

        let driver = Driver {
            session: Session::new(config),
            connector: Arc::new(connector),
            router: Arc::clone(&router),
            events_tx,
            status_tx,
            transport: None,
            retry: None,
        };
        tokio::spawn(driver.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            router,
        }
    }

    /// Observe `group_id`, replacing any group observed so far
    pub fn connect(&self, group_id: impl Into<GroupId>) {
        self.send(Command::Connect(group_id.into()));
    }

    /// Stop observing; a no-op when idle
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status transition
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Disconnect and stop the session task
    pub async fn shutdown(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Shutdown(ack_tx));
        let _ = ack_rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("sync session already stopped");
        }
    }
}

struct LiveTransport {
    generation: u64,
    shutdown: oneshot::Sender<()>,
}

struct PendingRetry {
    generation: u64,
    task: JoinHandle<()>,
}

struct Driver<C: Connector> {
    session: Session,
    connector: Arc<C>,
    router: Arc<EventRouter>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    transport: Option<LiveTransport>,
    retry: Option<PendingRetry>,
}

impl<C: Connector> Driver<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        debug!("sync session started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect(group_id)) => {
                        self.dispatch(SessionEvent::ConnectRequested(group_id));
                    }
                    Some(Command::Disconnect) => self.dispatch(SessionEvent::DisconnectRequested),
                    Some(Command::Shutdown(ack)) => {
                        self.dispatch(SessionEvent::DisconnectRequested);
                        let _ = ack.send(());
                        break;
                    }
                    // Every handle dropped
                    None => {
                        self.dispatch(SessionEvent::DisconnectRequested);
                        break;
                    }
                },
                // The driver holds a sender, so this never yields `None`.
                Some(event) = events.recv() => self.dispatch(event),
            }
        }
        debug!("sync session stopped");
    }

    fn dispatch(&mut self, event: SessionEvent) {
        // Reap resources that ended on their own before the session decides.
        match &event {
            SessionEvent::TransportClosed { generation } => {
                if self.transport.as_ref().map(|t| t.generation) == Some(*generation) {
                    self.transport = None;
                }
            }
            SessionEvent::RetryFired { generation } => {
                if self.retry.as_ref().map(|r| r.generation) == Some(*generation) {
                    self.retry = None;
                }
            }
            _ => {}
        }

        for effect in self.session.handle(event) {
            self.execute(effect);
        }

        let status = self.session.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!(from = %current, to = %status, "connection status changed");
            *current = status;
            true
        });
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport {
                generation,
                group_id,
            } => {
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                tokio::spawn(run_transport(
                    Arc::clone(&self.connector),
                    group_id,
                    generation,
                    self.events_tx.clone(),
                    shutdown_rx,
                ));
                self.transport = Some(LiveTransport {
                    generation,
                    shutdown: shutdown_tx,
                });
            }
            Effect::CloseTransport { generation } => {
                if self.transport.as_ref().map(|t| t.generation) == Some(generation) {
                    if let Some(live) = self.transport.take() {
                        let _ = live.shutdown.send(());
                    }
                }
            }
            Effect::ScheduleRetry { generation, delay } => {
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = events.send(SessionEvent::RetryFired { generation });
                });
                self.retry = Some(PendingRetry { generation, task });
            }
            Effect::CancelRetry { generation } => {
                if self.retry.as_ref().map(|r| r.generation) == Some(generation) {
                    if let Some(retry) = self.retry.take() {
                        retry.task.abort();
                    }
                }
            }
            Effect::Route { group_id, text } => {
                self.router.route(&text, &group_id);
            }
        }
    }
}

/// Own one transport for its whole life, reporting to the session under
/// `generation`.
async fn run_transport<C: Connector>(
    connector: Arc<C>,
    group_id: GroupId,
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        result = connector.connect(&group_id) => result,
        _ = &mut shutdown => return,
    };

    let mut transport = match connected {
        Ok(transport) => transport,
        Err(e) => {
            warn!(group = %group_id, error = %e, "websocket connect failed");
            let _ = events.send(SessionEvent::TransportClosed { generation });
            return;
        }
    };
    let _ = events.send(SessionEvent::OpenSucceeded { generation });

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = transport.close().await {
                    debug!(group = %group_id, error = %e, "error closing websocket");
                }
                return;
            }
            frame = transport.recv() => match frame {
                Some(Ok(text)) => {
                    let _ = events.send(SessionEvent::FrameReceived { generation, text });
                }
                Some(Err(e)) => {
                    warn!(group = %group_id, error = %e, "websocket error");
                    let _ = events.send(SessionEvent::TransportFailed { generation });
                    // The session answers with a close; a dropped sender means the same.
                    let _ = shutdown.await;
                    let _ = transport.close().await;
                    return;
                }
                None => {
                    debug!(group = %group_id, "websocket closed by server");
                    let _ = events.send(SessionEvent::TransportClosed { generation });
                    return;
                }
            }
        }
    }
}
