//! Simulated device units
//!
//! Each device runs as its own tokio task driven by a typestate machine:
//!
//! ```text
//! Starting ──► Running
//!               ├─ Passive: one payload per period
//!               └─ Active:  one payload on start, then one per request
//! ```
//!
//! - [`device_worker`] - state machine and emission loop
//! - [`broker_link`] - TCP client connection to the broker
//! - [`device_handle`] - spawning and the handle type the orchestrator owns

pub mod broker_link;
pub mod device_handle;
pub mod device_worker;

pub use device_handle::{spawn, DeviceHandle};
pub use device_worker::{DeviceError, DeviceRequest, DeviceSettings};
