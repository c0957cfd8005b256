//! Command routing and unit ownership
//!
//! - [`command`] - console grammar
//! - [`registry`] - running devices, by id and by start order
//! - [`orchestrator`] - owns every unit handle and the inbound queue

pub mod command;
#[allow(clippy::module_inception)]
pub mod orchestrator;
pub mod registry;

pub use command::Command;
pub use orchestrator::Orchestrator;
pub use registry::{DeviceRecord, DeviceRegistry};
