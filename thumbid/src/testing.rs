//! Scripted sensor for worker tests

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thumbid_transport::MemoryPeer;
use tokio::sync::watch;

const UNIT: &str = "A01";

#[derive(Debug, Clone, Copy)]
enum Capture {
    Complete,
    FailWith(&'static str),
    DropLinkAfter(usize),
    NeverPlaced,
}

/// Plays the sensor side of a `MemoryTransport`
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    occupied: BTreeSet<u16>,
    overrides: VecDeque<u16>,
    capture: Capture,
    delay: Option<Duration>,
    silent: bool,
}

/// What the sensor saw
#[derive(Debug, Clone)]
pub struct SensorLog {
    commands: Arc<Mutex<Vec<String>>>,
    stored: watch::Receiver<usize>,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            occupied: BTreeSet::new(),
            overrides: VecDeque::new(),
            capture: Capture::Complete,
            delay: None,
            silent: false,
        }
    }

    pub fn with_occupied(mut self, ids: &[u16]) -> Self {
        self.occupied.extend(ids);
        self
    }

    /// Store successive enrollments into these slots, ignoring the one announced
    pub fn with_store_overrides(mut self, ids: &[u16]) -> Self {
        self.overrides.extend(ids);
        self
    }

    pub fn with_capture_failure(mut self, line: &'static str) -> Self {
        self.capture = Capture::FailWith(line);
        self
    }

    /// Drop the link after this many capture lines and a partial registration
    pub fn with_disconnect_after_capture_lines(mut self, count: usize) -> Self {
        self.capture = Capture::DropLinkAfter(count);
        self
    }

    pub fn with_finger_never_placed(mut self) -> Self {
        self.capture = Capture::NeverPlaced;
        self
    }

    /// Pause between announcing the slot and the rest of the capture
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Read commands, never answer
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn spawn(self, peer: MemoryPeer) -> SensorLog {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (stored_tx, stored) = watch::channel(0);

        tokio::spawn(self.run(peer, commands.clone(), stored_tx));

        SensorLog { commands, stored }
    }

    async fn run(
        mut self,
        mut peer: MemoryPeer,
        commands: Arc<Mutex<Vec<String>>>,
        stored: watch::Sender<usize>,
    ) {
        while let Some(line) = peer.next_line().await {
            commands.lock().push(line.clone());
            if self.silent {
                continue;
            }

            let sent = if line == "GET_IDS" {
                let ids: Vec<String> = self.occupied.iter().map(u16::to_string).collect();
                peer.send_line(&format!("IDS:{}", ids.join(",")))
            } else if line == "ENROLL" {
                match self.enroll(&peer, &stored).await {
                    Some(result) => result,
                    // Link dropped on purpose
                    None => return,
                }
            } else if let Some(raw) = line.strip_prefix("DELETE_ID:") {
                match raw.parse::<u16>() {
                    Ok(id) => {
                        self.occupied.remove(&id);
                        peer.send_line(&format!("Deleted #{}", id))
                    }
                    Err(_) => peer.send_line("Invalid id"),
                }
            } else {
                peer.send_line("Unknown command")
            };

            if sent.is_err() {
                return;
            }
        }
    }

    async fn enroll(
        &mut self,
        peer: &MemoryPeer,
        stored: &watch::Sender<usize>,
    ) -> Option<thumbid_transport::Result<()>> {
        let announced = (1..).find(|id| !self.occupied.contains(id)).unwrap_or(1);
        let slot = self.overrides.pop_front().unwrap_or(announced);

        let mut script = vec![format!("Waiting for valid finger to enroll as #{}", announced)];

        match self.capture {
            Capture::NeverPlaced => {
                return Some(peer.send_line(&script[0]));
            }
            Capture::FailWith(failure) => {
                script.push("Image taken".into());
                script.push(failure.into());
            }
            Capture::Complete | Capture::DropLinkAfter(_) => {
                script.extend(
                    [
                        "Image taken",
                        "Image converted",
                        "Remove finger",
                        "Place same finger again",
                        "Image taken",
                        "Image converted",
                        "Prints matched!",
                    ]
                    .map(String::from),
                );
                script.push(format!("ThumbID Registered: TID{}{:04}", UNIT, slot));
            }
        }

        if let Capture::DropLinkAfter(count) = self.capture {
            for line in script.iter().take(count) {
                let _ = peer.send_line(line);
            }
            // Cut off in the middle of the registration line
            let partial = format!("ThumbID Registered: TID{}", UNIT);
            let _ = peer.send_raw(partial.as_bytes());
            return None;
        }

        for (index, line) in script.iter().enumerate() {
            if index == 1 {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
            }
            if let Err(e) = peer.send_line(line) {
                return Some(Err(e));
            }
        }

        if matches!(self.capture, Capture::Complete) {
            self.occupied.insert(slot);
            stored.send_modify(|count| *count += 1);
        }

        Some(Ok(()))
    }
}

impl SensorLog {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Wait until the sensor has stored `count` templates
    pub async fn wait_for_stored(&self, count: usize) {
        let mut stored = self.stored.clone();
        // Sender dropping ends the wait as well
        let _ = stored.wait_for(|stored| *stored >= count).await;
    }
}
