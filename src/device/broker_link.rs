//! TCP link from a device to the broker

use super::device_worker::DeviceError;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

const HANDSHAKE_TAG: &[u8] = b"UUID";

/// Handshake frame: the tag immediately followed by the hyphenated id
pub fn handshake(id: Uuid) -> Vec<u8> {
    let mut frame = HANDSHAKE_TAG.to_vec();
    frame.extend_from_slice(id.hyphenated().to_string().as_bytes());
    frame
}

#[derive(Debug)]
pub struct BrokerLink {
    stream: TcpStream,
    addr: SocketAddr,
}

impl BrokerLink {
    /// Connects and sends the handshake as a single write
    pub async fn connect(addr: SocketAddr, id: Uuid) -> Result<Self, DeviceError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| DeviceError::Connect { addr, source })?;
        stream
            .write_all(&handshake(id))
            .await
            .map_err(DeviceError::Handshake)?;
        debug!("Device {} connected to broker at {}", id, addr);
        Ok(Self { stream, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Reads the next chunk from the link, or never resolves without one
pub async fn next_inbound(link: &mut Option<BrokerLink>, buf: &mut [u8]) -> io::Result<usize> {
    match link {
        Some(link) => link.stream.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_is_tag_then_id() {
        let id = Uuid::new_v4();
        let frame = handshake(id);
        assert_eq!(&frame[..4], b"UUID");
        assert_eq!(&frame[4..], id.to_string().as_bytes());
        assert_eq!(frame.len(), 40);
    }
}
