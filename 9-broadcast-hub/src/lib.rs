//! WebSocket broadcast hub: every message a client sends is relayed to all
//! the other connected clients.
//!
//! - [`hub`] owns the live connection set behind a single control loop and
//!   fans messages out without ever waiting on a slow client.
//! - [`connection`] mints identities and runs the per-client read and write
//!   pumps.
//! - [`envelope`] is the JSON wrapper exchanged on the wire, plus the join and
//!   leave notices.
//! - [`server`] binds the axum route that upgrades requests and wires new
//!   sessions into the hub.
//! - [`cli`] and [`config`] hold the command-line flags and hub tuning.

pub mod cli;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod server;
