//! Messages flowing from units back to the orchestrator

use crate::telemetry::{DeviceKind, TelemetryPayload};
use crate::unit::UnitTag;
use chrono::{DateTime, Local};
use std::fmt;
use uuid::Uuid;

/// Everything a unit can report
#[derive(Debug, Clone, PartialEq)]
pub enum UnitMessage {
    /// Broker accepted a TCP client
    Connected { peer: String },
    /// Broker read a chunk of bytes from a client
    Received { peer: String, bytes: Vec<u8> },
    /// Client connection ended
    Closed { peer: String },
    /// Socket error on a client connection
    ConnectionError { peer: String, error: String },
    /// Device worker entered its running state
    Online { id: Uuid, kind: DeviceKind },
    Telemetry(TelemetryPayload),
}

impl fmt::Display for UnitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitMessage::Connected { peer } => write!(f, "client connected: {}", peer),
            UnitMessage::Received { peer, bytes } => {
                write!(f, "{} sent: {}", peer, String::from_utf8_lossy(bytes))
            }
            UnitMessage::Closed { peer } => write!(f, "{} closed the connection", peer),
            UnitMessage::ConnectionError { peer, error } => {
                write!(f, "{} connection error: {}", peer, error)
            }
            UnitMessage::Online { id, kind } => write!(f, "{} device {} online", kind, id),
            UnitMessage::Telemetry(payload) => {
                let json = payload.to_json().map_err(|_| fmt::Error)?;
                write!(f, "{}", json)
            }
        }
    }
}

/// A message tagged with its source and arrival time
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: UnitTag,
    pub message: UnitMessage,
    pub timestamp: DateTime<Local>,
}

impl Envelope {
    pub fn new(source: UnitTag, message: UnitMessage) -> Self {
        Self {
            source,
            message,
            timestamp: Local::now(),
        }
    }

    pub fn telemetry(&self) -> Option<&TelemetryPayload> {
        match &self.message {
            UnitMessage::Telemetry(payload) => Some(payload),
            _ => None,
        }
    }
}
