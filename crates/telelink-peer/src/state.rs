//! Connection lifecycle as a pure state machine.
//!
//! ```text
//!   Connecting ──Opened──▶ Open ──Closed──▶ Closed ─┐
//!       │                   │                       │ ReconnectElapsed
//!       └──Failed──▶ Error ◀┘ Failed                │ (after the delay)
//!                     └─────────────────────────────┴──▶ Connecting
//! ```
//!
//! [`transition`] never performs I/O. It returns the [`Effect`]s the driver
//! must carry out, in order.

use std::fmt;

/// Externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full machine state: the visible status plus timer bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    pub status: ConnectionStatus,
    pub reconnect_pending: bool,
    pub shut_down: bool,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            reconnect_pending: false,
            shut_down: false,
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Start (or restart) a connection attempt.
    Connect,
    /// The socket finished opening.
    Opened,
    /// The peer closed the socket.
    Closed,
    /// Opening, reading or writing the socket failed.
    Failed,
    /// A send was attempted while the connection was not open.
    SendRejected,
    /// The reconnect delay has passed.
    ReconnectElapsed,
    /// The connection is being torn down.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Open a fresh socket and reset the frame finder.
    OpenSocket,
    CancelReconnect,
    ScheduleReconnect,
    /// Announce subscriptions now and start the periodic refresh.
    StartRefresh,
    StopRefresh,
    CloseSocket,
}

/// Apply `event` to `state`.
///
/// After [`LinkEvent::Shutdown`] every event is ignored. A reconnect is only
/// scheduled when none is pending.
pub fn transition(state: LinkState, event: LinkEvent) -> (LinkState, Vec<Effect>) {
    use ConnectionStatus as S;

    if state.shut_down {
        return (state, Vec::new());
    }

    let mut next = state;
    let mut effects = Vec::new();

    match event {
        LinkEvent::Connect => {
            if state.status == S::Open {
                return (state, effects);
            }
            if state.reconnect_pending {
                effects.push(Effect::CancelReconnect);
                next.reconnect_pending = false;
            }
            next.status = S::Connecting;
            effects.push(Effect::OpenSocket);
        }
        LinkEvent::Opened => {
            if state.status == S::Open {
                return (state, effects);
            }
            if state.reconnect_pending {
                effects.push(Effect::CancelReconnect);
                next.reconnect_pending = false;
            }
            next.status = S::Open;
            effects.push(Effect::StartRefresh);
        }
        LinkEvent::Closed | LinkEvent::Failed => {
            if state.status == S::Open {
                effects.push(Effect::StopRefresh);
            }
            effects.push(Effect::CloseSocket);
            next.status = if event == LinkEvent::Closed {
                S::Closed
            } else {
                S::Error
            };
            if !state.reconnect_pending {
                effects.push(Effect::ScheduleReconnect);
                next.reconnect_pending = true;
            }
        }
        LinkEvent::SendRejected => {
            // A rejection raced with the socket opening; the link is fine.
            if state.status != S::Open {
                next.status = S::Error;
            }
        }
        LinkEvent::ReconnectElapsed => {
            next.reconnect_pending = false;
            if matches!(state.status, S::Closed | S::Error) {
                next.status = S::Connecting;
                effects.push(Effect::OpenSocket);
            }
        }
        LinkEvent::Shutdown => {
            if state.reconnect_pending {
                effects.push(Effect::CancelReconnect);
            }
            if state.status == S::Open {
                effects.push(Effect::StopRefresh);
            }
            effects.push(Effect::CloseSocket);
            next = LinkState {
                status: S::Closed,
                reconnect_pending: false,
                shut_down: true,
            };
        }
    }

    (next, effects)
}
