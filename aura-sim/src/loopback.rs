//! In-process radio
//!
//! `LoopbackRadio` stands in for the BLE stack on both sides: one host GATT
//! server and any number of client GATT links, all in the same process.
//! Callbacks are delivered on the same queues a real stack would use, so the
//! host and client actors run unmodified.
//!
//! Fault injection covers what the sync core must survive: dropped links,
//! unbonded peers, clients out of range, delayed notifications and hosts that
//! advertise the wrong service table.

use async_trait::async_trait;
use aura_common::channel::{
    ClientChannel, ClientLinkEvent, ClientLinkEventKind, ClientLinkReceiver, ClientLinkSender,
    HostChannel, HostLinkEvent, HostLinkReceiver, HostLinkSender, LinkError,
};
use aura_common::protocol::{ServiceDescriptor, SYNC_CHARACTERISTIC_UUID, SYNC_SERVICE_UUID};
use aura_common::{PeerId, SyncMessage};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound on a characteristic read round trip
const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct RadioState {
    /// Client address → that client's callback queue, while linked
    links: HashMap<PeerId, ClientLinkSender>,
    subscribed: HashSet<PeerId>,
    bonded: HashSet<PeerId>,
    out_of_range: HashSet<PeerId>,
    services: Vec<ServiceDescriptor>,
    auto_bond: bool,
    latency: Option<Duration>,
}

struct RadioInner {
    host_address: PeerId,
    host_events: HostLinkSender,
    state: Mutex<RadioState>,
}

impl RadioInner {
    fn lock(&self) -> MutexGuard<'_, RadioState> {
        // A poisoned lock only means a panicking test thread; the maps stay valid
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn to_host(&self, event: HostLinkEvent) {
        if self.host_events.send(event).is_err() {
            debug!("Host actor gone, dropping radio callback");
        }
    }
}

/// Shared radio medium; cheap to clone
#[derive(Clone)]
pub struct LoopbackRadio {
    inner: Arc<RadioInner>,
}

impl LoopbackRadio {
    /// Create the medium with a host at `host_address`
    ///
    /// The returned receiver carries the host's GATT server callbacks.
    pub fn new(host_address: impl Into<PeerId>) -> (Self, HostLinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = RadioInner {
            host_address: host_address.into(),
            host_events: tx,
            state: Mutex::new(RadioState {
                links: HashMap::new(),
                subscribed: HashSet::new(),
                bonded: HashSet::new(),
                out_of_range: HashSet::new(),
                services: vec![ServiceDescriptor::sync_service()],
                auto_bond: true,
                latency: None,
            }),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn host_address(&self) -> &PeerId {
        &self.inner.host_address
    }

    pub fn host_link(&self) -> LoopbackHostLink {
        LoopbackHostLink {
            inner: Arc::clone(&self.inner),
        }
    }

    /// A client radio at `address`, with its callback queue
    pub fn client_link(&self, address: impl Into<PeerId>) -> (LoopbackClientLink, ClientLinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = LoopbackClientLink {
            inner: Arc::clone(&self.inner),
            address: address.into(),
            events: tx,
        };
        (link, rx)
    }

    /// Bond new links automatically on connect (default on)
    pub fn set_auto_bond(&self, enabled: bool) {
        self.inner.lock().auto_bond = enabled;
    }

    pub fn set_bonded(&self, address: &PeerId, bonded: bool) {
        let linked = {
            let mut state = self.inner.lock();
            if bonded {
                state.bonded.insert(address.clone());
            } else {
                state.bonded.remove(address);
            }
            state.links.contains_key(address)
        };
        info!(peer = %address, bonded, "Radio bond state set");
        if linked {
            self.inner.to_host(HostLinkEvent::BondStateChanged {
                peer: address.clone(),
                bonded,
            });
        }
    }

    /// Make connect attempts from `address` fail
    pub fn set_out_of_range(&self, address: &PeerId, out_of_range: bool) {
        let mut state = self.inner.lock();
        if out_of_range {
            state.out_of_range.insert(address.clone());
        } else {
            state.out_of_range.remove(address);
        }
    }

    /// Service table the host advertises during discovery
    pub fn set_services(&self, services: Vec<ServiceDescriptor>) {
        self.inner.lock().services = services;
    }

    /// Delay applied to every notification
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    pub fn is_linked(&self, address: &PeerId) -> bool {
        self.inner.lock().links.contains_key(address)
    }

    /// Sever the link to `address` as if it went out of range
    ///
    /// Both ends are told: the client sees `LinkLost`, the host a disconnect.
    /// Returns false if the client had no link.
    pub fn drop_link(&self, address: &PeerId) -> bool {
        let sender = {
            let mut state = self.inner.lock();
            state.subscribed.remove(address);
            state.links.remove(address)
        };

        match sender {
            Some(sender) => {
                info!(peer = %address, "Radio link dropped");
                let _ = sender.send(ClientLinkEvent::new(
                    self.inner.host_address.clone(),
                    ClientLinkEventKind::LinkLost,
                ));
                self.inner
                    .to_host(HostLinkEvent::ClientDisconnected(address.clone()));
                true
            }
            None => false,
        }
    }
}

/// Host end of the loopback radio
pub struct LoopbackHostLink {
    inner: Arc<RadioInner>,
}

#[async_trait]
impl HostChannel for LoopbackHostLink {
    async fn notify(&self, peer: &PeerId, message: SyncMessage) -> Result<(), LinkError> {
        let latency = self.inner.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let sender = {
            let state = self.inner.lock();
            if !state.subscribed.contains(peer) {
                None
            } else {
                state.links.get(peer).cloned()
            }
        };
        let sender = sender.ok_or_else(|| LinkError::NotConnected(peer.clone()))?;

        sender
            .send(ClientLinkEvent::new(
                self.inner.host_address.clone(),
                ClientLinkEventKind::Notification {
                    characteristic: SYNC_CHARACTERISTIC_UUID,
                    value: message.to_vec(),
                },
            ))
            .map_err(|_| LinkError::SendFailed {
                peer: peer.clone(),
                reason: "client radio closed".to_string(),
            })
    }

    fn is_bonded(&self, peer: &PeerId) -> bool {
        self.inner.lock().bonded.contains(peer)
    }
}

/// Client end of the loopback radio
pub struct LoopbackClientLink {
    inner: Arc<RadioInner>,
    address: PeerId,
    events: ClientLinkSender,
}

impl LoopbackClientLink {
    pub fn address(&self) -> &PeerId {
        &self.address
    }

    fn emit(&self, kind: ClientLinkEventKind) {
        let _ = self
            .events
            .send(ClientLinkEvent::new(self.inner.host_address.clone(), kind));
    }

    fn ensure_linked(&self) -> Result<(), LinkError> {
        if self.inner.lock().links.contains_key(&self.address) {
            Ok(())
        } else {
            Err(LinkError::NotConnected(self.inner.host_address.clone()))
        }
    }
}

#[async_trait]
impl ClientChannel for LoopbackClientLink {
    async fn connect(&self, peer: &PeerId) -> Result<(), LinkError> {
        if *peer != self.inner.host_address {
            return Err(LinkError::ConnectFailed(format!("no device at {}", peer)));
        }

        let bonded = {
            let mut state = self.inner.lock();
            if state.out_of_range.contains(&self.address) {
                return Err(LinkError::ConnectFailed(format!("{} out of range", peer)));
            }
            state.links.insert(self.address.clone(), self.events.clone());
            if state.auto_bond {
                state.bonded.insert(self.address.clone());
            }
            state.bonded.contains(&self.address)
        };

        debug!(client = %self.address, host = %peer, "Radio link up");
        self.inner
            .to_host(HostLinkEvent::ClientConnected(self.address.clone()));
        if bonded {
            self.inner.to_host(HostLinkEvent::BondStateChanged {
                peer: self.address.clone(),
                bonded: true,
            });
        }
        self.emit(ClientLinkEventKind::LinkEstablished);
        Ok(())
    }

    async fn discover_services(&self) -> Result<(), LinkError> {
        self.ensure_linked()
            .map_err(|e| LinkError::DiscoveryFailed(e.to_string()))?;
        let services = self.inner.lock().services.clone();
        self.emit(ClientLinkEventKind::ServicesDiscovered(services));
        Ok(())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<(), LinkError> {
        self.ensure_linked()
            .map_err(|e| LinkError::SubscribeFailed(e.to_string()))?;

        if service != SYNC_SERVICE_UUID || characteristic != SYNC_CHARACTERISTIC_UUID {
            self.emit(ClientLinkEventKind::SubscriptionFailed(
                LinkError::SubscribeFailed(format!("{} does not notify", characteristic)),
            ));
            return Ok(());
        }

        self.inner.lock().subscribed.insert(self.address.clone());
        self.inner.to_host(HostLinkEvent::SubscriptionChanged {
            peer: self.address.clone(),
            enabled: true,
        });
        self.emit(ClientLinkEventKind::SubscriptionConfirmed);
        Ok(())
    }

    async fn read(&self, _service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        self.ensure_linked()
            .map_err(|e| LinkError::ReadFailed(e.to_string()))?;

        let (respond_to, response) = oneshot::channel();
        self.inner.to_host(HostLinkEvent::ReadRequest {
            peer: self.address.clone(),
            characteristic,
            respond_to,
        });

        match tokio::time::timeout(READ_TIMEOUT, response).await {
            Ok(Ok(message)) => Ok(message.to_vec()),
            Ok(Err(_)) => Err(LinkError::ReadFailed(
                "host did not answer the read".to_string(),
            )),
            Err(_) => Err(LinkError::Timeout(READ_TIMEOUT)),
        }
    }

    async fn disconnect(&self) {
        let was_linked = {
            let mut state = self.inner.lock();
            state.subscribed.remove(&self.address);
            state.links.remove(&self.address).is_some()
        };
        if was_linked {
            debug!(client = %self.address, "Radio link closed by client");
            self.inner
                .to_host(HostLinkEvent::ClientDisconnected(self.address.clone()));
        }
    }
}
