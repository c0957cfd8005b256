//! Spawning device workers

use super::device_worker::{DeviceRequest, DeviceSettings, DeviceWorker};
use crate::message::Envelope;
use crate::telemetry::DeviceKind;
use crate::unit::{UnitHandle, UnitTag};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Handle the orchestrator keeps for every running device
pub type DeviceHandle = UnitHandle<mpsc::Sender<DeviceRequest>>;

/// Creates a worker for `id` and runs it on its own task.
///
/// Start-up and run failures end the task and are only logged.
pub fn spawn(
    id: Uuid,
    kind: DeviceKind,
    settings: DeviceSettings,
    outbox: mpsc::Sender<Envelope>,
) -> DeviceHandle {
    info!("Spawning {} device {}", kind, id);

    let (request_sender, request_receiver) = mpsc::channel(settings.mailbox_capacity);
    let worker = DeviceWorker::create(id, kind, settings, outbox, request_receiver);

    let task = tokio::spawn(async move {
        match worker.start().await {
            Ok(running) => match running.run().await {
                Ok(()) => info!("Device {} finished", id),
                Err(e) => warn!("Device {} stopped: {}", id, e),
            },
            Err(e) => error!("Device {} failed to start: {}", id, e),
        }
    });

    UnitHandle::with_mailbox(UnitTag::Device(id), request_sender, task)
}
