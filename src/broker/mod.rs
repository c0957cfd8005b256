//! TCP broker unit
//!
//! Accepts inbound connections and reports every socket event to the
//! orchestrator without interpreting the bytes:
//!
//! ```text
//! TcpListener ──► accept loop ──► connection task (one per client)
//!                                      │
//!                                      ▼
//!                         Envelope { Connected | Received | ConnectionError | Closed }
//! ```
//!
//! - [`broker_handle`] - bind, spawn and own the accept loop
//! - [`connection`] - per-client read loop

pub mod broker_handle;
pub mod connection;

pub use broker_handle::{BrokerError, BrokerHandle};
