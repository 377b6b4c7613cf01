//! Host actor
//!
//! Owns the [`HostSyncBroadcaster`] on a single task. The loop multiplexes:
//! - the periodic tick (missed ticks are skipped, not bursted)
//! - GATT server callbacks
//! - commands from [`HostHandle`]
//! - completions of per-peer push tasks

use aura_common::channel::{HostChannel, HostLinkReceiver};
use aura_common::events::SyncEvent;
use aura_common::playback::{PlaybackEvent, PlaybackSource};
use aura_common::{Error, PlaybackState, Result};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcaster::{HostSnapshot, HostSyncBroadcaster};

const COMMAND_QUEUE_DEPTH: usize = 32;

enum HostCommand {
    Playback {
        event: PlaybackEvent,
        reply: oneshot::Sender<Result<PlaybackState>>,
    },
    Snapshot {
        reply: oneshot::Sender<HostSnapshot>,
    },
}

/// Cloneable handle to a running host actor
#[derive(Clone)]
pub struct HostHandle {
    commands: mpsc::Sender<HostCommand>,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
}

impl HostHandle {
    pub async fn play(&self) -> Result<PlaybackState> {
        self.playback_event(PlaybackEvent::Play).await
    }

    pub async fn pause(&self) -> Result<PlaybackState> {
        self.playback_event(PlaybackEvent::Pause).await
    }

    pub async fn seek(&self, position_ms: u32) -> Result<PlaybackState> {
        self.playback_event(PlaybackEvent::Seek { position_ms }).await
    }

    pub async fn change_track(&self, track_id: impl Into<String>) -> Result<PlaybackState> {
        self.playback_event(PlaybackEvent::TrackChanged {
            track_id: track_id.into(),
        })
        .await
    }

    /// Apply a transition and push it; resolves with the resulting state
    pub async fn playback_event(&self, event: PlaybackEvent) -> Result<PlaybackState> {
        let (reply, rx) = oneshot::channel();
        self.send(HostCommand::Playback { event, reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn snapshot(&self) -> Result<HostSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(HostCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Stop the tick and the actor; outstanding pushes are aborted
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: HostCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::ActorStopped("host".to_string())
}

/// Spawn the actor task owning `broadcaster`
///
/// The first tick fires one `tick_interval` after spawn.
pub fn spawn_host<L, P>(
    broadcaster: HostSyncBroadcaster<L, P>,
    link_events: HostLinkReceiver,
    tick_interval: Duration,
) -> (HostHandle, JoinHandle<()>)
where
    L: HostChannel,
    P: PlaybackSource,
{
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let cancel = CancellationToken::new();
    let handle = HostHandle {
        commands: tx,
        events: broadcaster.event_sender(),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(run(broadcaster, link_events, rx, cancel, tick_interval));
    (handle, task)
}

async fn run<L: HostChannel, P: PlaybackSource>(
    mut broadcaster: HostSyncBroadcaster<L, P>,
    mut link_events: HostLinkReceiver,
    mut commands: mpsc::Receiver<HostCommand>,
    cancel: CancellationToken,
    tick_interval: Duration,
) {
    info!(tick_ms = tick_interval.as_millis() as u64, "Host sync actor started");

    let mut tick = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Host actor cancelled");
                break;
            }

            _ = tick.tick() => {
                broadcaster.on_timer_tick();
            }

            Some(event) = link_events.recv() => {
                broadcaster.handle_link_event(event);
            }

            command = commands.recv() => match command {
                Some(HostCommand::Playback { event, reply }) => {
                    let _ = reply.send(broadcaster.on_playback_event(event));
                }
                Some(HostCommand::Snapshot { reply }) => {
                    let _ = reply.send(broadcaster.snapshot());
                }
                None => {
                    debug!("All host handles dropped");
                    break;
                }
            },

            Some(joined) = broadcaster.join_next_push() => {
                broadcaster.record_push(joined);
            }
        }
    }

    broadcaster.shutdown();
    info!("Host sync actor stopped");
}
