//! In-process transport
//!
//! A `MemoryTransport` is paired with a `MemoryPeer` that plays the sensor.
//! Used for simulators and tests; dropping the peer looks exactly like the
//! link going down.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::{error::*, Transport};

/// Host side of an in-process link
pub struct MemoryTransport {
    name: String,
    to_peer: mpsc::UnboundedSender<Bytes>,
    from_peer: mpsc::UnboundedReceiver<Bytes>,
    connected: bool,
}

/// Sensor side of an in-process link
pub struct MemoryPeer {
    to_host: mpsc::UnboundedSender<Bytes>,
    from_host: mpsc::UnboundedReceiver<Bytes>,
    pending: BytesMut,
}

impl MemoryTransport {
    /// Create a linked transport/peer pair
    pub fn pair(name: impl Into<String>) -> (Self, MemoryPeer) {
        let (to_peer, from_host) = mpsc::unbounded_channel();
        let (to_host, from_peer) = mpsc::unbounded_channel();

        let transport = Self {
            name: name.into(),
            to_peer,
            from_peer,
            connected: false,
        };
        let peer = MemoryPeer {
            to_host,
            from_host,
            pending: BytesMut::new(),
        };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }
        if self.to_peer.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        debug!("Connected to {}", self.name);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            debug!("Disconnecting from {}...", self.name);
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        trace!("Sending {} bytes: {:?}", data.len(), String::from_utf8_lossy(data));

        self.to_peer
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| {
                self.connected = false;
                Error::ConnectionClosed
            })
    }

    async fn receive(&mut self, wait: Option<Duration>) -> Result<BytesMut> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let next = match wait {
            Some(limit) => timeout(limit, self.from_peer.recv())
                .await
                .map_err(|_| Error::ReadTimeout)?,
            None => self.from_peer.recv().await,
        };

        match next {
            Some(chunk) => {
                trace!("Received {} bytes: {:?}", chunk.len(), String::from_utf8_lossy(&chunk));
                Ok(BytesMut::from(&chunk[..]))
            }
            None => {
                self.connected = false;
                Err(Error::ConnectionClosed)
            }
        }
    }

    fn remote_addr(&self) -> String {
        format!("memory://{}", self.name)
    }
}

impl MemoryPeer {
    /// Next line written by the host, without its terminator
    ///
    /// Returns `None` once the host side is dropped.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let raw = self.pending.split_to(pos + 1);
                let line = String::from_utf8_lossy(&raw[..pos]);
                return Some(line.trim_end_matches('\r').to_string());
            }

            let chunk = self.from_host.recv().await?;
            self.pending.extend_from_slice(&chunk);
        }
    }

    /// Send one line, appending the newline
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut data = BytesMut::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\n");
        self.send_raw(&data)
    }

    /// Send bytes exactly as given (partial lines allowed)
    pub fn send_raw(&self, data: &[u8]) -> Result<()> {
        self.to_host
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::ConnectionClosed)
    }
}
