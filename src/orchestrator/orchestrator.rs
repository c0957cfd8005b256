//! Orchestrator - sole owner of every running unit
//!
//! Console commands and unit messages are both handled on the orchestrator's
//! own task, so the registry needs no locking:
//!
//! ```text
//! console lines ──► dispatch ──► broker / device handles
//!                                        │
//!                   on_message ◄── shared inbound queue
//! ```

use super::command::{parse_device_id, Command, MENU};
use super::registry::{DeviceRecord, DeviceRegistry};
use crate::broker::broker_handle::BrokerSettings;
use crate::broker::{BrokerError, BrokerHandle};
use crate::config::Config;
use crate::device::{self, DeviceRequest, DeviceSettings};
use crate::message::{Envelope, UnitMessage};
use crate::telemetry::DeviceKind;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    config: Config,
    broker: Option<BrokerHandle>,
    registry: DeviceRegistry,

    // Every unit gets a clone of the sender; only the orchestrator reads
    inbound_sender: mpsc::Sender<Envelope>,
    inbound_receiver: mpsc::Receiver<Envelope>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let (inbound_sender, inbound_receiver) =
            mpsc::channel(config.orchestrator.inbound_capacity);
        debug!(
            "Created inbound queue with capacity {}",
            config.orchestrator.inbound_capacity
        );

        Self {
            config,
            broker: None,
            registry: DeviceRegistry::new(),
            inbound_sender,
            inbound_receiver,
        }
    }

    pub fn is_broker_running(&self) -> bool {
        self.broker.is_some()
    }

    pub fn broker_addr(&self) -> Option<SocketAddr> {
        self.broker.as_ref().map(BrokerHandle::local_addr)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Binds and spawns the broker. No-op if it is already running.
    pub async fn start_broker(&mut self) -> Result<(), BrokerError> {
        if self.broker.is_some() {
            debug!("Broker already running");
            return Ok(());
        }

        let settings = BrokerSettings::from_config(&self.config.broker)?;
        let broker = BrokerHandle::spawn(settings, self.inbound_sender.clone()).await?;
        println!("broker started on {}", broker.local_addr());
        self.broker = Some(broker);
        Ok(())
    }

    /// Stops the broker and every device with it. No-op if not running.
    pub fn stop_broker(&mut self) {
        let Some(broker) = self.broker.take() else {
            debug!("Broker not running");
            return;
        };
        broker.terminate();

        let devices = self.registry.drain();
        info!("Broker stopped, terminating {} devices", devices.len());
        for record in devices {
            record.handle.terminate();
        }
        println!("broker stopped");
    }

    /// Spawns a device of `kind`. Without a running broker nothing happens.
    pub fn start_device(&mut self, kind: DeviceKind) -> Option<Uuid> {
        let broker_addr = match self.broker_addr() {
            Some(addr) => addr,
            None => {
                debug!("Ignoring {} device start, broker not running", kind);
                return None;
            }
        };

        let id = Uuid::new_v4();
        let settings = DeviceSettings::from_config(&self.config.device, broker_addr);
        let handle = device::spawn(id, kind, settings, self.inbound_sender.clone());

        if let Some(replaced) = self.registry.push(DeviceRecord { id, kind, handle }) {
            warn!("Device id {} was already registered", replaced.id);
            replaced.handle.terminate();
        }
        Some(id)
    }

    /// Stops the most recently started device
    pub fn stop_device(&mut self) -> Option<Uuid> {
        let record = self.registry.pop()?;
        info!("Stopping {} device {}", record.kind, record.id);
        record.handle.terminate();
        Some(record.id)
    }

    /// Asks the active device named by `raw` for one payload.
    ///
    /// Malformed ids, unknown ids and passive devices are dropped silently.
    pub fn request_active_data(&self, raw: &str) -> bool {
        match parse_device_id(raw) {
            Some(id) => self.request_device(id),
            None => {
                debug!("Dropping request for malformed id {:?}", raw);
                false
            }
        }
    }

    fn request_device(&self, id: Uuid) -> bool {
        let Some(record) = self.registry.active(&id) else {
            debug!("Dropping request for {}, no such active device", id);
            return false;
        };
        match record.handle.send(DeviceRequest::Produce) {
            Ok(()) => true,
            Err(e) => {
                warn!("Request for {} not delivered: {}", id, e);
                false
            }
        }
    }

    /// Prints a unit message. Never touches the registry.
    pub fn on_message(&self, envelope: Envelope) {
        debug!(
            "Message from {} at {}",
            envelope.source,
            envelope.timestamp.format("%H:%M:%S%.3f")
        );
        if let Some(payload) = envelope.telemetry() {
            debug!(
                "{} telemetry from {}: {:.4}",
                payload.kind(),
                payload.id(),
                payload.data()
            );
        }
        if let UnitMessage::ConnectionError { .. } = envelope.message {
            warn!("{}: {}", envelope.source, envelope.message);
        }
        println!("{}", envelope.message);
    }

    /// Handles one console line
    pub async fn dispatch(&mut self, line: &str) {
        println!("number of client devices: {}", self.device_count());

        let Some(command) = Command::parse(line) else {
            debug!("Ignoring input {:?}", line);
            return;
        };
        info!("Dispatching {:?}", command);

        match command {
            Command::StartBroker => {
                if let Err(e) = self.start_broker().await {
                    error!("Failed to start broker: {}", e);
                }
            }
            Command::StopBroker => self.stop_broker(),
            Command::StartPassive => self.report_start(DeviceKind::Passive),
            Command::StartActive => self.report_start(DeviceKind::Active),
            Command::StopDevice => {
                if let Some(id) = self.stop_device() {
                    println!("stopped device {}", id);
                }
            }
            Command::RequestData(id) => {
                self.request_device(id);
            }
        }
    }

    fn report_start(&mut self, kind: DeviceKind) {
        if let Some(id) = self.start_device(kind) {
            println!("started {} device {}", kind, id);
            println!("client devices: {}", self.device_count());
        }
    }

    /// Serves console lines and unit messages until the console closes
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>) {
        println!("{}", MENU);

        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => self.dispatch(&line).await,
                    None => {
                        info!("Console input closed");
                        break;
                    }
                },
                Some(envelope) = self.inbound_receiver.recv() => self.on_message(envelope),
            }
        }
    }
}
