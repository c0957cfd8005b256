//! Per-client read loop of the broker

use super::broker_handle::BrokerError;
use crate::message::{Envelope, UnitMessage};
use crate::unit::UnitTag;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reads from `stream` until EOF or error, reporting each event.
///
/// The broker never writes back; bytes are forwarded as-is.
pub async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    read_buffer: usize,
    outbox: mpsc::Sender<Envelope>,
) -> Result<(), BrokerError> {
    let peer = peer.to_string();
    info!("Client connected: {}", peer);
    report(&outbox, UnitMessage::Connected { peer: peer.clone() }).await?;

    let mut buf = vec![0u8; read_buffer];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                info!("Client {} closed the connection", peer);
                report(&outbox, UnitMessage::Closed { peer }).await?;
                return Ok(());
            }
            Ok(n) => {
                debug!("Read {} bytes from {}", n, peer);
                report(
                    &outbox,
                    UnitMessage::Received {
                        peer: peer.clone(),
                        bytes: buf[..n].to_vec(),
                    },
                )
                .await?;
            }
            Err(e) => {
                warn!("Connection error on {}: {}", peer, e);
                report(
                    &outbox,
                    UnitMessage::ConnectionError {
                        peer: peer.clone(),
                        error: e.to_string(),
                    },
                )
                .await?;
                report(&outbox, UnitMessage::Closed { peer }).await?;
                return Ok(());
            }
        }
    }
}

async fn report(outbox: &mpsc::Sender<Envelope>, message: UnitMessage) -> Result<(), BrokerError> {
    outbox
        .send(Envelope::new(UnitTag::Broker, message))
        .await
        .map_err(|_| BrokerError::ChannelClosed)
}
