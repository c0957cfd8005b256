//! Telemetry payloads produced by simulated devices

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Emission behaviour of a simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Emits only when asked
    Active,
    /// Emits on a fixed period
    Passive,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Active => write!(f, "Active"),
            DeviceKind::Passive => write!(f, "Passive"),
        }
    }
}

/// One reading of a simulated device.
///
/// Serializes as `{ "id": "...", "data": 0.42, "type": "Passive" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    id: Uuid,
    data: f64,
    #[serde(rename = "type")]
    kind: DeviceKind,
}

impl TelemetryPayload {
    /// Builds a payload with a freshly sampled value
    pub fn sample(id: Uuid, kind: DeviceKind) -> Self {
        Self {
            id,
            data: sample_value(),
            kind,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> f64 {
        self.data
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Samples a value in `[0, 1)`
pub fn sample_value() -> f64 {
    rand::thread_rng().gen::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_values_stay_in_unit_interval() {
        for _ in 0..1000 {
            let value = sample_value();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn payload_serializes_with_type_field() {
        let id = Uuid::new_v4();
        let payload = TelemetryPayload::sample(id, DeviceKind::Passive);
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["type"], "Passive");
        assert!(json["data"].as_f64().unwrap() < 1.0);
    }
}
