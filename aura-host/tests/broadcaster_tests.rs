//! Host broadcaster integration tests
//!
//! Peer bookkeeping, push eligibility (subscription + bonding), tick and
//! transition pushes, fan-out isolation, and actor lifecycle.

mod helpers;

use aura_common::channel::{HostLinkEvent, HostLinkSender};
use aura_common::connection::HostPeerState;
use aura_common::events::{PushReason, SyncEvent};
use aura_common::playback::PlaybackEvent;
use aura_common::protocol::SYNC_CHARACTERISTIC_UUID;
use aura_common::{Error, PeerId, PlaybackState};
use aura_host::{spawn_host, HostHandle, HostSyncBroadcaster};
use helpers::{MockHostLink, MockPlayer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

type Broadcaster = HostSyncBroadcaster<MockHostLink, MockPlayer>;

const TICK: Duration = Duration::from_millis(1000);

fn broadcaster(player: MockPlayer) -> (Broadcaster, Arc<MockHostLink>, broadcast::Receiver<SyncEvent>) {
    let link = Arc::new(MockHostLink::new());
    let (events, observer) = broadcast::channel(100);
    (HostSyncBroadcaster::new(link.clone(), player, events), link, observer)
}

/// Connect, subscribe and (optionally) bond a peer
fn attach(b: &mut Broadcaster, link: &MockHostLink, peer: &str, bonded: bool) {
    let id = PeerId::from(peer);
    b.on_client_connected(id.clone());
    b.on_subscription_changed(&id, true);
    if bonded {
        link.bond(peer);
        b.on_bond_changed(&id, true);
    }
}

fn drain(observer: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = observer.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_and_disconnect_are_idempotent() {
    let (mut b, _link, mut observer) = broadcaster(MockPlayer::default());
    let peer = PeerId::from("AA:01");

    b.on_client_connected(peer.clone());
    b.on_client_connected(peer.clone());
    assert_eq!(b.peers().len(), 1);
    assert_eq!(
        b.peers().get(&peer).map(|c| c.state),
        Some(HostPeerState::Connected)
    );

    b.on_client_disconnected(&peer);
    b.on_client_disconnected(&peer);
    assert!(b.peers().is_empty());

    let kinds: Vec<&str> = drain(&mut observer).iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds, vec!["ClientConnected", "ClientDisconnected"]);
}

#[tokio::test]
async fn test_connect_does_not_push() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player);
    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();
    b.flush_pushes().await;

    attach(&mut b, &link, "AA:01", true);
    b.flush_pushes().await;
    assert_eq!(link.sent_count(), 0);
}

#[tokio::test]
async fn test_transition_pushes_immediately() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player.clone());
    attach(&mut b, &link, "AA:01", true);

    let state = b
        .on_playback_event(PlaybackEvent::TrackChanged {
            track_id: "a.mp3".to_string(),
        })
        .unwrap();
    assert_eq!(state, PlaybackState::new("a.mp3", 0, true));

    player.set_position(5000);
    b.on_playback_event(PlaybackEvent::Pause).unwrap();
    b.on_playback_event(PlaybackEvent::Seek { position_ms: 60_000 })
        .unwrap();
    b.on_playback_event(PlaybackEvent::Play).unwrap();
    b.flush_pushes().await;

    assert_eq!(
        link.sent_to("AA:01"),
        vec![
            "true|0|a.mp3",
            "false|5000|a.mp3",
            "false|60000|a.mp3",
            "true|60000|a.mp3",
        ]
    );
}

#[tokio::test]
async fn test_rejected_event_changes_nothing() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player);
    attach(&mut b, &link, "AA:01", true);

    let err = b
        .on_playback_event(PlaybackEvent::TrackChanged {
            track_id: "missing.mp3".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::Playback(_)));

    // Nothing loaded, so play is rejected too
    assert!(b.on_playback_event(PlaybackEvent::Play).is_err());

    b.flush_pushes().await;
    assert_eq!(link.sent_count(), 0);
    assert_eq!(b.state(), &PlaybackState::default());
}

#[tokio::test]
async fn test_push_requires_subscription_and_bond() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, mut observer) = broadcaster(player);

    attach(&mut b, &link, "bonded", true);
    attach(&mut b, &link, "unbonded", false);
    // Bonded but never subscribed
    b.on_client_connected(PeerId::from("silent"));
    link.bond("silent");
    // Subscribed then unsubscribed
    attach(&mut b, &link, "left", true);
    b.on_subscription_changed(&PeerId::from("left"), false);

    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();
    b.flush_pushes().await;

    assert_eq!(link.sent_to("bonded"), vec!["true|0|a.mp3"]);
    assert!(link.sent_to("unbonded").is_empty());
    assert!(link.sent_to("silent").is_empty());
    assert!(link.sent_to("left").is_empty());

    let broadcast = drain(&mut observer).into_iter().find_map(|e| match e {
        SyncEvent::StateBroadcast {
            recipients,
            skipped_unbonded,
            reason,
            ..
        } => Some((recipients, skipped_unbonded, reason)),
        _ => None,
    });
    assert_eq!(broadcast, Some((1, 1, PushReason::Transition)));
}

#[tokio::test]
async fn test_bonding_checked_at_push_time() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player);
    attach(&mut b, &link, "AA:01", false);

    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();

    // Security layer bonds the peer without a callback reaching the host
    link.bond("AA:01");
    b.on_timer_tick();
    b.flush_pushes().await;

    assert_eq!(link.sent_to("AA:01").len(), 1);
    assert_eq!(b.peers().get(&PeerId::from("AA:01")).map(|c| c.bonded), Some(true));
}

#[tokio::test]
async fn test_read_served_regardless_of_bonding() {
    let player = MockPlayer::with_library(&["Midnight City.mp3"]);
    let (mut b, _link, _observer) = broadcaster(player.clone());
    let stranger = PeerId::from("stranger");
    b.on_client_connected(stranger.clone());

    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "Midnight City.mp3".to_string(),
    })
    .unwrap();
    player.set_position(182_340);

    let message = b.on_read_request(&stranger);
    assert_eq!(message.to_string(), "true|182340|Midnight City.mp3");
}

#[tokio::test]
async fn test_tick_pushes_only_while_playing() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player.clone());
    attach(&mut b, &link, "AA:01", true);

    // Nothing loaded, not playing
    assert_eq!(b.on_timer_tick(), 0);

    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();
    player.set_position(1000);
    assert_eq!(b.on_timer_tick(), 1);
    player.set_position(2000);
    assert_eq!(b.on_timer_tick(), 1);

    b.on_playback_event(PlaybackEvent::Pause).unwrap();
    assert_eq!(b.on_timer_tick(), 0);
    b.flush_pushes().await;

    assert_eq!(
        link.sent_to("AA:01"),
        vec!["true|0|a.mp3", "true|1000|a.mp3", "true|2000|a.mp3", "false|2000|a.mp3"]
    );
}

#[tokio::test]
async fn test_tick_position_never_runs_backwards() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player.clone());
    attach(&mut b, &link, "AA:01", true);
    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();

    let mut last = 0;
    for reported in [1000, 2000, 1990, 3000, 2500, 4000] {
        player.set_position(reported);
        b.on_timer_tick();
        assert!(b.state().position_ms >= last);
        last = b.state().position_ms;
    }
    assert_eq!(last, 4000);

    // Explicit seek may move backwards
    b.on_playback_event(PlaybackEvent::Seek { position_ms: 500 })
        .unwrap();
    assert_eq!(b.state().position_ms, 500);
}

#[tokio::test]
async fn test_completion_pushes_final_state_once() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player.clone());
    attach(&mut b, &link, "AA:01", true);
    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();

    player.set_position(240_000);
    player.finish();
    assert_eq!(b.on_timer_tick(), 1);
    assert!(!b.state().playing);
    assert_eq!(b.on_timer_tick(), 0);
    b.flush_pushes().await;

    assert_eq!(
        link.sent_to("AA:01").last().map(String::as_str),
        Some("false|240000|a.mp3")
    );
}

#[tokio::test]
async fn test_read_before_tick_does_not_swallow_completion() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, _observer) = broadcaster(player.clone());
    attach(&mut b, &link, "AA:01", true);
    b.on_client_connected(PeerId::from("AA:02"));
    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();

    player.set_position(240_000);
    player.finish();

    // The reader sees the finished track right away
    let message = b.on_read_request(&PeerId::from("AA:02"));
    assert_eq!(message.as_bytes(), b"false|240000|a.mp3");
    assert!(b.state().playing);

    // Subscribers still get the transition on the next tick
    assert_eq!(b.on_timer_tick(), 1);
    assert!(!b.state().playing);
    b.flush_pushes().await;

    assert_eq!(
        link.sent_to("AA:01"),
        vec!["true|0|a.mp3".to_string(), "false|240000|a.mp3".to_string()]
    );
}

#[tokio::test]
async fn test_failed_push_is_reported_not_retried() {
    let player = MockPlayer::with_library(&["a.mp3"]);
    let (mut b, link, mut observer) = broadcaster(player);
    attach(&mut b, &link, "flaky", true);
    attach(&mut b, &link, "steady", true);
    link.fail("flaky");

    b.on_playback_event(PlaybackEvent::TrackChanged {
        track_id: "a.mp3".to_string(),
    })
    .unwrap();
    b.flush_pushes().await;

    assert_eq!(link.sent_to("steady").len(), 1);
    assert!(link.sent_to("flaky").is_empty());

    let failed: Vec<PeerId> = drain(&mut observer)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::PushFailed { peer_id, .. } => Some(peer_id),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![PeerId::from("flaky")]);
    assert!(!b.has_pending_pushes());
}

// ------------------------------------------------------------------------
// Actor
// ------------------------------------------------------------------------

struct Running {
    handle: HostHandle,
    task: JoinHandle<()>,
    link: Arc<MockHostLink>,
    link_tx: HostLinkSender,
    player: MockPlayer,
}

fn spawn(tick: Duration) -> Running {
    let link = Arc::new(MockHostLink::new());
    let player = MockPlayer::with_library(&["a.mp3", "b.mp3"]);
    let (events, _) = broadcast::channel(100);
    let b = HostSyncBroadcaster::new(link.clone(), player.clone(), events);
    let (link_tx, link_rx) = mpsc::unbounded_channel();
    let (handle, task) = spawn_host(b, link_rx, tick);
    Running {
        handle,
        task,
        link,
        link_tx,
        player,
    }
}

impl Running {
    /// Deliver connect + CCCD + bond callbacks and wait until the actor has them
    async fn attach(&self, peer: &str) {
        let id = PeerId::from(peer);
        self.link.bond(peer);
        self.link_tx
            .send(HostLinkEvent::ClientConnected(id.clone()))
            .unwrap();
        self.link_tx
            .send(HostLinkEvent::SubscriptionChanged {
                peer: id.clone(),
                enabled: true,
            })
            .unwrap();

        loop {
            let snapshot = self.handle.snapshot().await.unwrap();
            let ready = snapshot
                .peers
                .iter()
                .any(|c| c.peer_id == id && c.state == HostPeerState::Subscribed);
            if ready {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[tokio::test]
async fn test_slow_and_dead_peers_do_not_block_others() {
    let host = spawn(TICK);
    for peer in ["fast", "stalled", "failing", "slow"] {
        host.attach(peer).await;
    }
    host.link.stall("stalled");
    host.link.fail("failing");
    host.link.delay("slow", Duration::from_millis(200));

    let mut observer = host.handle.subscribe_events();
    host.handle.change_track("a.mp3").await.unwrap();

    // Fast peer delivered while the stalled push is still outstanding
    loop {
        if host.link.sent_to("fast").len() == 1 && host.link.sent_to("slow").len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    loop {
        if let SyncEvent::PushFailed { peer_id, .. } = observer.recv().await.unwrap() {
            assert_eq!(peer_id, PeerId::from("failing"));
            break;
        }
    }

    // Actor still responsive with a push in flight
    host.handle.pause().await.unwrap();
    loop {
        if host.link.sent_to("fast").len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(host.link.sent_to("stalled").is_empty());

    host.handle.shutdown();
    host.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tick_fires_on_interval_while_playing() {
    let host = spawn(TICK);
    host.attach("AA:01").await;

    host.handle.change_track("a.mp3").await.unwrap();
    host.player.set_position(1000);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let sent = host.link.sent_to("AA:01");
    assert_eq!(sent.len(), 4, "transition push plus three ticks: {:?}", sent);
    assert_eq!(sent[0], "true|0|a.mp3");
    assert_eq!(sent[3], "true|1000|a.mp3");

    host.handle.pause().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(host.link.sent_to("AA:01").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_ticking() {
    let host = spawn(TICK);
    host.attach("AA:01").await;
    host.handle.change_track("a.mp3").await.unwrap();

    host.handle.shutdown();
    host.task.await.unwrap();
    let sent = host.link.sent_count();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(host.link.sent_count(), sent);

    let err = host.handle.play().await.unwrap_err();
    assert!(matches!(err, Error::ActorStopped(_)));
}

#[tokio::test]
async fn test_read_request_answered_by_actor() {
    let host = spawn(TICK);
    host.handle.change_track("b.mp3").await.unwrap();
    host.handle.seek(42_000).await.unwrap();

    let (respond_to, response) = oneshot::channel();
    host.link_tx
        .send(HostLinkEvent::ReadRequest {
            peer: PeerId::from("unbonded-reader"),
            characteristic: SYNC_CHARACTERISTIC_UUID,
            respond_to,
        })
        .unwrap();

    let message = response.await.unwrap();
    assert_eq!(message.to_string(), "true|42000|b.mp3");
}

#[tokio::test]
async fn test_snapshot_lists_peers() {
    let host = spawn(TICK);
    host.attach("AA:02").await;
    host.attach("AA:01").await;

    let snapshot = host.handle.snapshot().await.unwrap();
    let ids: Vec<&str> = snapshot.peers.iter().map(|c| c.peer_id.as_str()).collect();
    assert_eq!(ids, vec!["AA:01", "AA:02"]);
    assert_eq!(snapshot.state, PlaybackState::default());
}
