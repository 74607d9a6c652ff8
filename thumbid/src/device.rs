//! High-level sensor interface

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use thumbid_core::{
    constants::DEFAULT_STORAGE_TIMEOUT, Command, DeviceEvent, LineBuffer, Parser, ParserConfig,
    Session, StorageReport, Tagged,
};
use thumbid_transport::{TcpTransport, Transport};
use thumbid_types::{DeviceRecordId, EncodedRecordId};

use crate::error::{Error, Result};

/// Fingerprint sensor
///
/// Owns the link, frames incoming text into lines and parses them into
/// [`DeviceEvent`]s stamped with the current attempt generation. One
/// command is outstanding at a time.
///
/// # Examples
///
/// ```no_run
/// use thumbid::Device;
///
/// #[tokio::main]
/// async fn main() -> thumbid::Result<()> {
///     let mut device = Device::new("192.168.1.50", 8888);
///
///     device.connect().await?;
///
///     let report = device.storage_report().await?;
///     println!("{} slots occupied", report.len());
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    transport: Box<dyn Transport>,
    session: Session,
    lines: LineBuffer,
    parser: Parser,
    timeout: Duration,
}

impl Device {
    /// Create a new device instance (TCP bridge)
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self::with_transport(Box::new(TcpTransport::new(addr, port)))
    }

    /// Create a device over any transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            session: Session::new(),
            lines: LineBuffer::new(),
            parser: Parser::new(),
            timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT),
        }
    }

    /// Set the deadline for standalone queries
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parser_config(mut self, config: ParserConfig) -> Self {
        self.parser = Parser::with_config(config);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.transport.is_connected()
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Connect to device
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}...", self.transport.remote_addr());

        self.transport.connect().await?;
        self.lines.clear();
        self.session.open()?;

        info!("Connected to {}", self.transport.remote_addr());
        Ok(())
    }

    /// Disconnect from device
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        info!("Disconnecting from {}...", self.transport.remote_addr());

        self.transport.disconnect().await?;
        self.session.close();
        self.lines.clear();

        info!("Disconnected");
        Ok(())
    }

    /// Write one command
    pub async fn send_command(&mut self, command: Command) -> Result<()> {
        self.ensure_connected()?;

        debug!("Sending {}", command);

        if let Err(e) = self.transport.send(&command.encode()).await {
            warn!("Failed to send {}: {}", command, e);
            if e.is_link_loss() {
                self.mark_link_lost();
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Read the next chunk and return the events it completed
    ///
    /// `deadline` bounds the wait; `None` waits until data arrives or the
    /// link drops. Any error other than a timeout marks the link lost.
    pub async fn read_events(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<Vec<Tagged<DeviceEvent>>> {
        self.ensure_connected()?;

        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    return Err(thumbid_transport::Error::ReadTimeout.into());
                }
                Some(deadline - now)
            }
            None => None,
        };

        match self.transport.receive(wait).await {
            Ok(chunk) => {
                self.lines.feed(&chunk);
                Ok(self.buffered_events())
            }
            Err(thumbid_transport::Error::ReadTimeout) => {
                Err(thumbid_transport::Error::ReadTimeout.into())
            }
            Err(e) => {
                warn!("Link to {} lost: {}", self.transport.remote_addr(), e);
                self.mark_link_lost();
                Err(e.into())
            }
        }
    }

    /// Drop buffered input, including any partial line; returns lines dropped
    pub fn discard_buffered(&mut self) -> usize {
        let dropped = self.lines.drain_lines();
        for line in &dropped {
            debug!("Discarding stale line: {:?}", line);
        }
        self.lines.clear();
        dropped.len()
    }

    /// Query occupied slots
    pub async fn storage_report(&mut self) -> Result<StorageReport> {
        self.send_command(Command::GetIds).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let events = self.read_until(deadline).await?;
            for tagged in events {
                match tagged.value {
                    DeviceEvent::StorageReport(report) => return Ok(report),
                    other => trace!("Skipping {} while awaiting storage report", other.name()),
                }
            }
        }
    }

    /// Occupied slots on this sensor with no persisted binding
    ///
    /// `bound` is every record persisted for any user; only those whose unit
    /// is `unit_label` are considered. Reporting only, nothing is deleted.
    pub async fn find_orphans(
        &mut self,
        unit_label: &str,
        bound: &[EncodedRecordId],
    ) -> Result<Vec<DeviceRecordId>> {
        let report = self.storage_report().await?;

        let bound_ids: BTreeSet<DeviceRecordId> = bound
            .iter()
            .filter(|record| record.unit() == unit_label)
            .map(|record| record.record_id())
            .collect();

        let orphans: Vec<_> = report
            .occupied()
            .difference(&bound_ids)
            .copied()
            .collect();

        if !orphans.is_empty() {
            warn!(
                "{} orphaned slot(s) on unit {}: {:?}",
                orphans.len(),
                unit_label,
                orphans.iter().map(|id| id.get()).collect::<Vec<_>>()
            );
        }

        Ok(orphans)
    }

    // Helper methods

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn read_until(&mut self, deadline: Instant) -> Result<Vec<Tagged<DeviceEvent>>> {
        self.read_events(Some(deadline)).await.map_err(|e| {
            if e.is_timeout() {
                thumbid_core::Error::Timeout {
                    seconds: self.timeout.as_secs(),
                }
                .into()
            } else {
                e
            }
        })
    }

    fn buffered_events(&mut self) -> Vec<Tagged<DeviceEvent>> {
        self.lines
            .drain_lines()
            .iter()
            .filter_map(|line| self.parser.parse_line(line))
            .map(|event| self.session.tag(event))
            .collect()
    }

    fn mark_link_lost(&mut self) {
        self.session.close();
        self.lines.clear();
    }
}
