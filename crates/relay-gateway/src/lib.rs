//! relay-gateway — HTTP front door for the relay
//!
//! Exposes `POST /api/openrouter` for chat requests and `GET /api/status`
//! for a liveness and configuration summary.

pub mod protocol;
pub mod server;

pub use server::{GatewayServer, GatewayState};
