//! Transport layer for thumbid
//!
//! Carries newline-terminated text between the host and a sensor bridge.

pub mod error;
pub mod memory;
pub mod tcp;

pub use error::{Error, Result};
pub use memory::{MemoryPeer, MemoryTransport};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different links to the sensor
///
/// Implementations deliver bytes in send order. A closed link surfaces as
/// [`Error::ConnectionClosed`] from [`Transport::receive`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;
    
    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;
    
    /// Check if connected
    fn is_connected(&self) -> bool;
    
    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;
    
    /// Receive the next chunk; `None` waits indefinitely
    async fn receive(&mut self, timeout: Option<Duration>) -> Result<BytesMut>;
    
    /// Get remote address
    fn remote_addr(&self) -> String;
}
