//! Client actor
//!
//! A single task owns the [`ClientSyncReceiver`]. Transport callbacks arrive
//! on the link event queue, application requests on the command queue, so
//! every state transition is serialized on this task.

use aura_common::channel::{ClientChannel, ClientLinkReceiver};
use aura_common::connection::ClientState;
use aura_common::events::SyncEvent;
use aura_common::playback::PlaybackSource;
use aura_common::{Error, PeerId, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::receiver::{ClientStatus, ClientSyncReceiver};

const COMMAND_QUEUE_DEPTH: usize = 32;

enum ClientCommand {
    Connect {
        peer: PeerId,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<ClientStatus>,
    },
}

/// Cloneable handle to a running client actor
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Connect to `peer` and wait until subscribed
    ///
    /// Resolves with the failure if any handshake step fails or times out.
    pub async fn connect(&self, peer: impl Into<PeerId>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Connect {
            peer: peer.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Disconnect { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::Status { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Stop the actor; the current link is torn down on the way out
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: ClientCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::ActorStopped("client".to_string())
}

/// Spawn the actor task owning `receiver`
pub fn spawn_client<L, P>(
    receiver: ClientSyncReceiver<L, P>,
    link_events: ClientLinkReceiver,
) -> (ClientHandle, JoinHandle<()>)
where
    L: ClientChannel,
    P: PlaybackSource,
{
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let handle = ClientHandle {
        commands: tx,
        events: receiver.event_sender(),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(run(receiver, link_events, rx, cancel));
    (handle, task)
}

async fn run<L: ClientChannel, P: PlaybackSource>(
    mut receiver: ClientSyncReceiver<L, P>,
    mut link_events: ClientLinkReceiver,
    mut commands: mpsc::Receiver<ClientCommand>,
    cancel: CancellationToken,
) {
    info!("Client sync actor started");

    loop {
        let deadline = receiver.handshake_deadline();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Client actor cancelled");
                break;
            }

            command = commands.recv() => match command {
                Some(command) => handle_command(&mut receiver, &mut link_events, command).await,
                None => {
                    debug!("All client handles dropped");
                    break;
                }
            },

            Some(event) = link_events.recv() => {
                receiver.handle_link_event(event).await;
            }

            _ = wait_until(deadline) => {
                receiver.on_handshake_timeout().await;
            }
        }
    }

    receiver.disconnect().await;
    info!("Client sync actor stopped");
}

async fn handle_command<L: ClientChannel, P: PlaybackSource>(
    receiver: &mut ClientSyncReceiver<L, P>,
    link_events: &mut ClientLinkReceiver,
    command: ClientCommand,
) {
    match command {
        ClientCommand::Connect { peer, reply } => {
            if receiver.state() == ClientState::Disconnected {
                discard_stale_callbacks(link_events);
            }
            match receiver.connect(peer).await {
                Ok(()) => receiver.await_subscribed(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        }
        ClientCommand::Disconnect { reply } => {
            receiver.disconnect().await;
            let _ = reply.send(());
        }
        ClientCommand::Status { reply } => {
            let _ = reply.send(receiver.status());
        }
    }
}

/// Drop callbacks queued before a new connect is issued
///
/// While Disconnected every queued callback belongs to an earlier link, even
/// one to the same host; the new link only reports after `connect` is called.
fn discard_stale_callbacks(link_events: &mut ClientLinkReceiver) {
    while let Ok(event) = link_events.try_recv() {
        debug!(peer = %event.peer, kind = ?event.kind, "Discarding callback from an earlier link");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
