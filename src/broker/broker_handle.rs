//! Broker Handle - binds the listener and owns the accept loop

use super::connection::serve_connection;
use crate::config::{BrokerConfig, ConfigError};
use crate::message::Envelope;
use crate::unit::{UnitHandle, UnitTag};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(io::Error),

    #[error("Orchestrator channel closed")]
    ChannelClosed,

    #[error("Invalid broker settings: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Clone, Debug)]
pub struct BrokerSettings {
    pub listen_addr: SocketAddr,
    pub read_buffer: usize,
}

impl BrokerSettings {
    pub fn from_config(config: &BrokerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: config.listen_addr()?,
            read_buffer: config.read_buffer,
        })
    }
}

/// Running broker unit.
///
/// The broker takes no requests, so its unit handle has no mailbox.
/// Dropping or terminating the handle aborts the accept loop, and with it
/// every connection task it spawned.
#[derive(Debug)]
pub struct BrokerHandle {
    unit: UnitHandle,
    local_addr: SocketAddr,
}

impl BrokerHandle {
    /// Binds the listener, then spawns the accept loop.
    ///
    /// Binding happens before this returns so devices started right after
    /// can connect.
    pub async fn spawn(
        settings: BrokerSettings,
        outbox: mpsc::Sender<Envelope>,
    ) -> Result<Self, BrokerError> {
        info!("Spawning broker with settings: {:?}", settings);

        let listener = TcpListener::bind(settings.listen_addr)
            .await
            .map_err(|source| BrokerError::Bind {
                addr: settings.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(BrokerError::LocalAddr)?;
        info!("Broker listening on {}", local_addr);

        let task = tokio::spawn(accept_loop(listener, settings.read_buffer, outbox));
        debug!("Broker task spawned");

        Ok(Self {
            unit: UnitHandle::detached(UnitTag::Broker, task),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tag(&self) -> UnitTag {
        self.unit.tag()
    }

    pub fn terminate(self) {
        info!("Stopping broker on {}", self.local_addr);
        self.unit.terminate();
    }
}

async fn accept_loop(listener: TcpListener, read_buffer: usize, outbox: mpsc::Sender<Envelope>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    connections.spawn(serve_connection(stream, peer, read_buffer, outbox.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                match finished {
                    Ok(Ok(())) => debug!("Connection task finished"),
                    Ok(Err(e)) => warn!("Connection task stopped: {}", e),
                    Err(e) => error!("Connection task failed: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UnitMessage;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    fn loopback() -> BrokerSettings {
        BrokerSettings {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            read_buffer: 256,
        }
    }

    #[tokio::test]
    async fn relays_handshake_bytes_untouched() {
        let (tx, mut rx) = mpsc::channel(16);
        let broker = BrokerHandle::spawn(loopback(), tx).await.unwrap();
        assert_eq!(broker.tag(), UnitTag::Broker);

        let mut client = TcpStream::connect(broker.local_addr()).await.unwrap();
        client.write_all(b"UUIDabc").await.unwrap();

        let connected = rx.recv().await.unwrap();
        assert_eq!(connected.source, UnitTag::Broker);
        assert!(matches!(connected.message, UnitMessage::Connected { .. }));

        let received = rx.recv().await.unwrap();
        match received.message {
            UnitMessage::Received { bytes, .. } => assert_eq!(bytes, b"UUIDabc"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (tx, _rx) = mpsc::channel(16);
        let first = BrokerHandle::spawn(loopback(), tx.clone()).await.unwrap();
        let taken = BrokerSettings {
            listen_addr: first.local_addr(),
            read_buffer: 256,
        };

        let second = BrokerHandle::spawn(taken, tx).await;
        assert!(matches!(second, Err(BrokerError::Bind { .. })));
    }

    #[tokio::test]
    async fn terminate_closes_the_listener() {
        let (tx, _rx) = mpsc::channel(16);
        let broker = BrokerHandle::spawn(loopback(), tx).await.unwrap();
        let addr = broker.local_addr();
        broker.terminate();

        // the aborted task drops the listener on its next poll
        let mut refused = false;
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refused);
    }
}
