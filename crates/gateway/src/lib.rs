//! MudVault Mesh gateway: the WebSocket transport (§6.1), the per-connection
//! state machine (§4.7), and the supervisor that owns process lifecycle
//! (§4.9).
//!
//! Everything that routes, authenticates, or persists lives in the sibling
//! `mudvault-{protocol,store,auth,ratelimit,presence,channels,routing}`
//! crates; this crate's job is wiring them together behind a real listener
//! and driving the accept loop.

pub mod connection;
pub mod error;
pub mod registry;
pub mod state;
pub mod supervisor;
pub mod ws;

pub use {
    error::{GatewayError, Result},
    state::GatewayState,
    supervisor::GatewaySupervisor,
};
