//! One host and N clients over the loopback radio

use aura_client::{spawn_client, ClientHandle, ClientSyncReceiver};
use aura_common::config::SyncConfig;
use aura_common::{PeerId, Result};
use aura_host::{spawn_host, HostHandle, HostSyncBroadcaster};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::loopback::LoopbackRadio;
use crate::player::{SimulatedPlayer, NOMINAL_RATE_PERMILLE};

pub const HOST_ADDRESS: &str = "00:00:00:00:00:01";

/// Address of the client at `index`
pub fn client_address(index: usize) -> PeerId {
    PeerId::new(format!("00:00:00:00:01:{:02X}", index))
}

/// A running client and its radio address
#[derive(Clone)]
pub struct SimClient {
    pub address: PeerId,
    pub handle: ClientHandle,
}

pub struct SimulationBuilder {
    config: SyncConfig,
    clients: usize,
    library: Vec<(String, u32)>,
    client_rates: Vec<u32>,
}

impl SimulationBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            clients: 1,
            library: Vec::new(),
            client_rates: Vec::new(),
        }
    }

    pub fn clients(mut self, count: usize) -> Self {
        self.clients = count;
        self
    }

    /// Tracks every device holds locally: `(track_id, duration_ms)`
    pub fn library(mut self, tracks: Vec<(String, u32)>) -> Self {
        self.library = tracks;
        self
    }

    /// Clock rate per client (permille of real time); missing entries run nominal
    pub fn client_rates(mut self, rates: Vec<u32>) -> Self {
        self.client_rates = rates;
        self
    }

    /// Spawn the host and client actors
    pub fn start(self) -> Result<Simulation> {
        self.config.validate()?;

        let (radio, host_rx) = LoopbackRadio::new(HOST_ADDRESS);
        let (host_events, _) = broadcast::channel(self.config.event_capacity);
        let broadcaster = HostSyncBroadcaster::new(
            Arc::new(radio.host_link()),
            SimulatedPlayer::new(self.library.clone()),
            host_events,
        );
        let (host, host_task) = spawn_host(broadcaster, host_rx, self.config.tick_interval());
        let mut tasks = vec![host_task];

        let mut clients = Vec::with_capacity(self.clients);
        for index in 0..self.clients {
            let address = client_address(index);
            let rate = self
                .client_rates
                .get(index)
                .copied()
                .unwrap_or(NOMINAL_RATE_PERMILLE);
            let (link, link_rx) = radio.client_link(address.clone());
            let (events, _) = broadcast::channel(self.config.event_capacity);
            let receiver = ClientSyncReceiver::new(
                Arc::new(link),
                SimulatedPlayer::new(self.library.clone()).with_rate_permille(rate),
                self.config.clone(),
                events,
            );
            let (handle, task) = spawn_client(receiver, link_rx);
            tasks.push(task);
            clients.push(SimClient { address, handle });
        }

        info!(
            clients = clients.len(),
            tracks = self.library.len(),
            "Simulation started"
        );

        Ok(Simulation {
            radio,
            host,
            clients,
            tasks,
        })
    }
}

pub struct Simulation {
    pub radio: LoopbackRadio,
    pub host: HostHandle,
    pub clients: Vec<SimClient>,
    tasks: Vec<JoinHandle<()>>,
}

impl Simulation {
    pub fn host_address(&self) -> PeerId {
        PeerId::from(HOST_ADDRESS)
    }

    pub fn client(&self, index: usize) -> Option<&SimClient> {
        self.clients.get(index)
    }

    /// Connect every client to the host, one at a time
    ///
    /// A failed client is logged and skipped; the count of subscribed clients
    /// is returned.
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for client in &self.clients {
            match client.handle.connect(HOST_ADDRESS).await {
                Ok(()) => connected += 1,
                Err(e) => warn!(client = %client.address, "Client failed to connect: {}", e),
            }
        }
        connected
    }

    /// Stop every actor and wait for them to finish
    pub async fn shutdown(self) {
        for client in &self.clients {
            client.handle.shutdown();
        }
        self.host.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Actor task ended abnormally: {}", e);
            }
        }
        info!("Simulation stopped");
    }
}
