//! Device worker state machine
//!
//! A worker owns one simulated device identity. It only talks to the outside
//! through its request mailbox, the shared orchestrator queue and its optional
//! broker link.

use super::broker_link::{next_inbound, BrokerLink};
use crate::config::DeviceConfig;
use crate::message::{Envelope, UnitMessage};
use crate::telemetry::{DeviceKind, TelemetryPayload};
use crate::unit::UnitTag;
use statum::{machine, state};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LINK_READ_BUFFER: usize = 1024;

/// Requests the orchestrator can send to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Emit one payload now
    Produce,
}

#[derive(Clone, Debug)]
pub struct DeviceSettings {
    pub passive_interval: Duration,
    pub mailbox_capacity: usize,
    /// Broker to open a TCP link to, if any
    pub broker_addr: Option<SocketAddr>,
}

impl DeviceSettings {
    pub fn from_config(config: &DeviceConfig, broker_addr: SocketAddr) -> Self {
        Self {
            passive_interval: config.passive_interval(),
            mailbox_capacity: config.mailbox_capacity,
            broker_addr: config.connect_to_broker.then_some(broker_addr),
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            passive_interval: Duration::from_secs(5),
            mailbox_capacity: 16,
            broker_addr: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to connect to broker at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send handshake: {0}")]
    Handshake(io::Error),

    #[error("Orchestrator channel closed")]
    ChannelClosed,
}

#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Starting,
    Running,
}

#[machine]
pub struct DeviceWorker<S: WorkerState> {
    id: Uuid,
    kind: DeviceKind,
    settings: DeviceSettings,

    // Shared queue read by the orchestrator
    outbox: mpsc::Sender<Envelope>,

    // Private request mailbox
    mailbox: mpsc::Receiver<DeviceRequest>,

    link: Option<BrokerLink>,

    // Passive emissions are scheduled from this instant
    started_at: Instant,
}

impl<S: WorkerState> DeviceWorker<S> {
    async fn emit(&self, message: UnitMessage) -> Result<(), DeviceError> {
        self.outbox
            .send(Envelope::new(UnitTag::Device(self.id), message))
            .await
            .map_err(|_| DeviceError::ChannelClosed)
    }

    async fn emit_telemetry(&self) -> Result<(), DeviceError> {
        let payload = TelemetryPayload::sample(self.id, self.kind);
        debug!("Device {} emitting {:.4}", self.id, payload.data());
        self.emit(UnitMessage::Telemetry(payload)).await
    }
}

impl DeviceWorker<Starting> {
    pub fn create(
        id: Uuid,
        kind: DeviceKind,
        settings: DeviceSettings,
        outbox: mpsc::Sender<Envelope>,
        mailbox: mpsc::Receiver<DeviceRequest>,
    ) -> Self {
        debug!("Creating {} device {} with settings: {:?}", kind, id, settings);
        Self::new(id, kind, settings, outbox, mailbox, None, Instant::now())
    }

    /// Announces the device and opens its broker link.
    ///
    /// A link failure is logged and the device keeps running without one.
    pub async fn start(mut self) -> Result<DeviceWorker<Running>, DeviceError> {
        self.emit(UnitMessage::Online {
            id: self.id,
            kind: self.kind,
        })
        .await?;

        if let Some(addr) = self.settings.broker_addr {
            match BrokerLink::connect(addr, self.id).await {
                Ok(link) => {
                    info!("Device {} linked to broker at {}", self.id, link.addr());
                    self.link = Some(link);
                }
                Err(e) => warn!("Device {} running without broker link: {}", self.id, e),
            }
        }

        info!("{} device {} running", self.kind, self.id);
        Ok(self.transition())
    }
}

impl DeviceWorker<Running> {
    /// Runs until the mailbox closes or the orchestrator queue goes away
    pub async fn run(mut self) -> Result<(), DeviceError> {
        if self.kind == DeviceKind::Active {
            self.emit_telemetry().await?;
        }

        let period = self.settings.passive_interval;
        let mut ticker = interval_at(self.started_at + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; LINK_READ_BUFFER];
        let passive = self.kind == DeviceKind::Passive;

        loop {
            tokio::select! {
                _ = ticker.tick(), if passive => {
                    self.emit_telemetry().await?;
                }
                request = self.mailbox.recv() => match request {
                    Some(DeviceRequest::Produce) if !passive => {
                        debug!("Serving request for {}", self.id);
                        self.emit_telemetry().await?;
                    }
                    Some(request) => {
                        debug!("Passive device {} ignores {:?}", self.id, request);
                    }
                    None => {
                        info!("Device {} mailbox closed, stopping", self.id);
                        return Ok(());
                    }
                },
                read = next_inbound(&mut self.link, &mut buf) => match read {
                    Ok(0) => {
                        info!("Broker closed link of device {}", self.id);
                        self.link = None;
                    }
                    Ok(n) => {
                        debug!(
                            "Device {} received: {}",
                            self.id,
                            String::from_utf8_lossy(&buf[..n])
                        );
                    }
                    Err(e) => {
                        warn!("Broker link of device {} failed: {}", self.id, e);
                        self.link = None;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn spawn_worker(
        kind: DeviceKind,
        settings: DeviceSettings,
    ) -> (
        Uuid,
        mpsc::Sender<DeviceRequest>,
        mpsc::Receiver<Envelope>,
        tokio::task::JoinHandle<Result<(), DeviceError>>,
    ) {
        let id = Uuid::new_v4();
        let (out_tx, out_rx) = mpsc::channel(64);
        let (req_tx, req_rx) = mpsc::channel(settings.mailbox_capacity);
        let worker = DeviceWorker::create(id, kind, settings, out_tx, req_rx);
        let task = tokio::spawn(async move { worker.start().await?.run().await });
        (id, req_tx, out_rx, task)
    }

    fn telemetry_of(envelope: Envelope) -> TelemetryPayload {
        match envelope.message {
            UnitMessage::Telemetry(payload) => payload,
            other => panic!("expected telemetry, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn passive_device_emits_once_per_period() {
        let (id, _requests, mut rx, _task) =
            spawn_worker(DeviceKind::Passive, DeviceSettings::default());

        let online = rx.recv().await.unwrap();
        assert_eq!(online.source, UnitTag::Device(id));
        assert_eq!(
            online.message,
            UnitMessage::Online {
                id,
                kind: DeviceKind::Passive
            }
        );

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let first = telemetry_of(rx.try_recv().unwrap());
        assert_eq!(first.id(), id);
        assert_eq!(first.kind(), DeviceKind::Passive);
        assert!((0.0..1.0).contains(&first.data()));
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = telemetry_of(rx.try_recv().unwrap());
        assert_eq!(second.id(), id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn active_device_emits_on_start_and_per_request() {
        let (id, requests, mut rx, _task) =
            spawn_worker(DeviceKind::Active, DeviceSettings::default());

        assert!(matches!(
            rx.recv().await.unwrap().message,
            UnitMessage::Online { .. }
        ));
        let announced = telemetry_of(rx.recv().await.unwrap());
        assert_eq!(announced.id(), id);
        assert_eq!(announced.kind(), DeviceKind::Active);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());

        requests.send(DeviceRequest::Produce).await.unwrap();
        let served = telemetry_of(rx.recv().await.unwrap());
        assert_eq!(served.kind(), DeviceKind::Active);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn passive_device_ignores_requests() {
        let (_id, requests, mut rx, _task) =
            spawn_worker(DeviceKind::Passive, DeviceSettings::default());
        rx.recv().await.unwrap();

        requests.send(DeviceRequest::Produce).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_mailbox_stops_the_worker() {
        let (_id, requests, mut rx, task) =
            spawn_worker(DeviceKind::Active, DeviceSettings::default());
        rx.recv().await.unwrap();
        drop(requests);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn device_sends_handshake_to_broker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = DeviceSettings {
            broker_addr: Some(listener.local_addr().unwrap()),
            ..DeviceSettings::default()
        };
        let (id, _requests, _rx, _task) = spawn_worker(DeviceKind::Passive, settings);

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut frame = vec![0u8; 40];
        stream.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, crate::device::broker_link::handshake(id));
    }

    #[tokio::test]
    async fn unreachable_broker_does_not_stop_the_device() {
        // grab a free port, then close it again
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let settings = DeviceSettings {
            broker_addr: Some(addr),
            ..DeviceSettings::default()
        };
        let (_id, _requests, mut rx, task) = spawn_worker(DeviceKind::Active, settings);

        assert!(matches!(
            rx.recv().await.unwrap().message,
            UnitMessage::Online { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().message,
            UnitMessage::Telemetry(_)
        ));
        assert!(!task.is_finished());
    }
}
