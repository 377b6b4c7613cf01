//! Client connection state machine
//!
//! Pure transition logic, kept apart from the receiver so every history of
//! inputs can be checked without a transport.
//!
//! | From               | Input                        | To                 |
//! |--------------------|------------------------------|--------------------|
//! | Disconnected       | Connect(peer)                | Connecting         |
//! | Connecting         | LinkEstablished              | Connected          |
//! | Connected          | ServicesFound(compatible)    | ServicesDiscovered |
//! | Connected          | ServicesFound(incompatible)  | Disconnected       |
//! | ServicesDiscovered | Subscribed                   | Subscribed         |
//! | any but Disconnected | LinkLost / Teardown        | Disconnected       |
//!
//! Every other combination is ignored and leaves the state unchanged.

use aura_common::connection::ClientState;
use aura_common::PeerId;

/// Inputs driving the client state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    Connect(PeerId),
    LinkEstablished,
    ServicesFound { compatible: bool },
    Subscribed,
    LinkLost,
    /// Local teardown: failed request, timeout, or explicit disconnect
    Teardown,
}

/// Result of applying an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved { from: ClientState, to: ClientState },
    Ignored,
}

impl Transition {
    pub fn moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientStateMachine {
    state: ClientState,
    peer: Option<PeerId>,
}

impl ClientStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Host of the current link; None while Disconnected
    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    pub fn apply(&mut self, input: ClientInput) -> Transition {
        use ClientState::*;

        let from = self.state;
        let to = match (from, input) {
            (Disconnected, ClientInput::Connect(peer)) => {
                self.peer = Some(peer);
                Connecting
            }
            (Connecting, ClientInput::LinkEstablished) => Connected,
            (Connected, ClientInput::ServicesFound { compatible: true }) => ServicesDiscovered,
            (Connected, ClientInput::ServicesFound { compatible: false }) => Disconnected,
            (ServicesDiscovered, ClientInput::Subscribed) => Subscribed,
            (Disconnected, ClientInput::LinkLost | ClientInput::Teardown) => return Transition::Ignored,
            (_, ClientInput::LinkLost | ClientInput::Teardown) => Disconnected,
            _ => return Transition::Ignored,
        };

        if to == Disconnected {
            self.peer = None;
        }
        self.state = to;
        Transition::Moved { from, to }
    }
}
