//! HTTP control and observer API
//!
//! - Host transport controls (play/pause/seek/track) and status
//! - Client connect/disconnect and status
//! - Radio fault injection (drop link, bond state)
//! - SSE feed of every actor's events

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
