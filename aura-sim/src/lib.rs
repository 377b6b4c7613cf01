//! # AuraSync Simulator
//!
//! Runs one host and any number of clients in a single process over an
//! in-memory radio, with simulated playback engines and an HTTP API to drive
//! and observe them.

pub mod api;
pub mod loopback;
pub mod player;
pub mod sim;

pub use loopback::{LoopbackClientLink, LoopbackHostLink, LoopbackRadio};
pub use player::{parse_library_entry, SimulatedPlayer};
pub use sim::{client_address, SimClient, Simulation, SimulationBuilder, HOST_ADDRESS};
