//! Connection session state machine.
//!
//! [`Session`] is pure: it never touches a socket or a timer. Each
//! [`SessionEvent`] moves it to a new state and yields the [`Effect`]s the
//! runtime must perform. Every transport and retry timer is tagged with the
//! generation that was current when it was created, and events from any
//! other generation are ignored.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use super::backoff::ReconnectConfig;
use crate::types::GroupId;

/// Observable connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No group is being observed
    #[default]
    Idle,
    /// A transport is being opened
    Connecting,
    /// The transport is open and delivering notifications
    Open,
    /// The transport dropped and a retry is scheduled
    Reconnecting,
    /// The retry ceiling was reached; only a new `connect` leaves this state
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectRequested(GroupId),
    DisconnectRequested,
    OpenSucceeded { generation: u64 },
    FrameReceived { generation: u64, text: String },
    TransportClosed { generation: u64 },
    TransportFailed { generation: u64 },
    RetryFired { generation: u64 },
}

/// Work the runtime must perform after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport { generation: u64, group_id: GroupId },
    CloseTransport { generation: u64 },
    ScheduleRetry { generation: u64, delay: Duration },
    CancelRetry { generation: u64 },
    Route { group_id: GroupId, text: String },
}

/// The one resource a session may own at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    None,
    Transport(u64),
    Retry(u64),
}

#[derive(Debug, Clone)]
pub struct Session {
    config: ReconnectConfig,
    group_id: Option<GroupId>,
    status: ConnectionStatus,
    attempts: u32,
    generation: u64,
    link: Link,
}

impl Session {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            group_id: None,
            status: ConnectionStatus::Idle,
            attempts: 0,
            generation: 0,
            link: Link::None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn group_id(&self) -> Option<&GroupId> {
        self.group_id.as_ref()
    }

    /// Consecutive failed connections since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// Apply one event and return the effects it requires
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::ConnectRequested(group_id) => self.connect(group_id),
            SessionEvent::DisconnectRequested => self.disconnect(),
            SessionEvent::OpenSucceeded { generation } => {
                if self.owns_transport(generation) {
                    debug!(group = ?self.group_id, generation, "transport open");
                    self.status = ConnectionStatus::Open;
                    self.attempts = 0;
                }
                Vec::new()
            }
            SessionEvent::FrameReceived { generation, text } => {
                match (&self.group_id, self.owns_transport(generation)) {
                    (Some(group_id), true) => vec![Effect::Route {
                        group_id: group_id.clone(),
                        text,
                    }],
                    _ => Vec::new(),
                }
            }
            SessionEvent::TransportClosed { generation } => {
                if !self.owns_transport(generation) {
                    return Vec::new();
                }
                self.link = Link::None;
                self.schedule_retry()
            }
            SessionEvent::TransportFailed { generation } => {
                if !self.owns_transport(generation) {
                    return Vec::new();
                }
                // Force the socket shut and take the close path exactly once;
                // the close that follows arrives with a stale generation.
                self.link = Link::None;
                let mut effects = vec![Effect::CloseTransport { generation }];
                effects.extend(self.schedule_retry());
                effects
            }
            SessionEvent::RetryFired { generation } => {
                if self.link != Link::Retry(generation) || self.group_id.is_none() {
                    return Vec::new();
                }
                self.status = ConnectionStatus::Connecting;
                self.open()
            }
        }
    }

    fn connect(&mut self, group_id: GroupId) -> Vec<Effect> {
        let mut effects = self.release();
        self.group_id = Some(group_id);
        self.attempts = 0;
        self.status = ConnectionStatus::Connecting;
        effects.extend(self.open());
        effects
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        let effects = self.release();
        if self.group_id.take().is_some() || self.status != ConnectionStatus::Idle {
            debug!("session disconnected");
            // Anything still in flight for the old group is now stale.
            self.generation += 1;
        }
        self.status = ConnectionStatus::Idle;
        self.attempts = 0;
        effects
    }

    fn open(&mut self) -> Vec<Effect> {
        let Some(group_id) = self.group_id.clone() else {
            return Vec::new();
        };
        self.generation += 1;
        self.link = Link::Transport(self.generation);
        vec![Effect::OpenTransport {
            generation: self.generation,
            group_id,
        }]
    }

    fn schedule_retry(&mut self) -> Vec<Effect> {
        if self.group_id.is_none() {
            self.status = ConnectionStatus::Idle;
            return Vec::new();
        }
        if self.attempts >= self.config.max_attempts {
            warn!(
                group = ?self.group_id,
                attempts = self.attempts,
                "reconnect ceiling reached, giving up"
            );
            self.status = ConnectionStatus::Closed;
            return Vec::new();
        }

        let delay = self.config.backoff().delay(self.attempts);
        self.attempts += 1;
        self.generation += 1;
        self.link = Link::Retry(self.generation);
        self.status = ConnectionStatus::Reconnecting;
        debug!(
            group = ?self.group_id,
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        vec![Effect::ScheduleRetry {
            generation: self.generation,
            delay,
        }]
    }

    /// Drop whatever the session currently owns.
    fn release(&mut self) -> Vec<Effect> {
        let effects = match self.link {
            Link::None => Vec::new(),
            Link::Transport(generation) => vec![Effect::CloseTransport { generation }],
            Link::Retry(generation) => vec![Effect::CancelRetry { generation }],
        };
        self.link = Link::None;
        effects
    }

    fn owns_transport(&self, generation: u64) -> bool {
        self.link == Link::Transport(generation)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
