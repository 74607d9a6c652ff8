//! Enrollment state machine
//!
//! Drives one enrollment attempt without doing any I/O. The caller feeds
//! [`Input`]s and carries out the returned [`Action`]s: send a command,
//! show a status line, or finish.
//!
//! # State Machine
//!
//! ```text
//!            start()            StorageReport              TemplatesMatched
//!  ┌──────┐ GET_IDS ┌─────────────────────┐ ENROLL ┌───────────┐      ┌────────────────────┐
//!  │ Idle │────────>│AwaitingStorageReport│───────>│ Enrolling │─────>│ AwaitingCompletion │
//!  └──────┘         └─────────────────────┘        └───────────┘      └────────────────────┘
//!                      ^        ^    ^                 │                      │
//!                      │        │    │ AwaitingFinger  │         Stored       │
//!                      │        │    └─── (other id) ──┘                      v
//!                      │        │  DELETE_ID, ack, GET_IDS             ┌───────────┐
//!                      │        └──────── (assigned != target) ────────│ Verifying │
//!                      │                                               └───────────┘
//!                      │                                                 │       │
//!                  Timeout/StorageFull/capture failure/link loss     equal       3rd mismatch
//!                      v                                                 v       v
//!                  ┌────────┐                                    ┌───────────┐ ┌────────┐
//!                  │ Failed │                                    │ Succeeded │ │ Failed │
//!                  └────────┘                                    └───────────┘ └────────┘
//! ```
//!
//! A slot mismatch reported by `Stored` is corrected by deleting the wrongly
//! written slot, waiting for the deletion to be acknowledged, re-reading
//! storage and running the whole capture again. Only the exhaustion of those
//! corrections is reported as a failure.

use std::time::Duration;

use thumbid_types::{DeviceRecordId, EncodedRecordId};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::constants::{
    CAPACITY, DEFAULT_DELETE_TIMEOUT, DEFAULT_STORAGE_TIMEOUT, MAX_RESNAPSHOTS,
    MAX_VERIFICATION_ATTEMPTS,
};
use crate::parser::DeviceEvent;
use crate::session::{Generation, Tagged};
use crate::storage::StorageReport;

/// Enrollment tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Deadline for `IDS:` after `GET_IDS`
    pub storage_timeout: Duration,

    /// Deadline for `Deleted #n` after `DELETE_ID`
    pub delete_timeout: Duration,

    /// Slot corrections before `PersistentMismatch`
    pub max_verification_attempts: u8,

    /// Consecutive pre-capture re-snapshots before `PersistentMismatch`
    pub max_resnapshots: u8,

    /// Slots on the sensor
    pub capacity: u16,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT),
            delete_timeout: Duration::from_secs(DEFAULT_DELETE_TIMEOUT),
            max_verification_attempts: MAX_VERIFICATION_ATTEMPTS,
            max_resnapshots: MAX_RESNAPSHOTS,
            capacity: CAPACITY,
        }
    }
}

impl EnrollmentConfig {
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }

    pub fn with_max_verification_attempts(mut self, attempts: u8) -> Self {
        self.max_verification_attempts = attempts;
        self
    }

    pub fn with_max_resnapshots(mut self, resnapshots: u8) -> Self {
        self.max_resnapshots = resnapshots;
        self
    }

    pub fn with_capacity(mut self, capacity: u16) -> Self {
        self.capacity = capacity.min(DeviceRecordId::MAX);
        self
    }
}

/// Where an attempt is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Idle,
    AwaitingStorageReport,
    Enrolling,
    AwaitingCompletion,
    Verifying,
    Succeeded,
    Failed,
}

impl EnrollmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrollmentFailure {
    /// No answer within the command's deadline
    #[error("Sensor did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    /// Every slot is occupied
    #[error("Sensor storage is full")]
    StorageFull,

    /// The two captures were different fingers
    #[error("Fingerprints did not match")]
    TemplatesMismatched,

    #[error("Image too messy")]
    PoorImage,

    #[error("Could not find fingerprint features")]
    NoFeatures,

    /// Slot corrections exhausted
    #[error("Sensor kept storing into unexpected slots after {attempts} corrections")]
    PersistentMismatch { attempts: u8 },

    /// Link lost mid-attempt
    #[error("Sensor disconnected")]
    Disconnected,

    /// Template stored on the sensor but the identity binding was not saved
    #[error("Record {record} stored on sensor but not bound: {reason}")]
    PersistedButOrphaned {
        record: EncodedRecordId,
        reason: String,
    },
}

impl EnrollmentFailure {
    /// Capture failures: the caller may start a fresh attempt right away
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            Self::TemplatesMismatched | Self::PoorImage | Self::NoFeatures
        )
    }

    /// Check if the caller may retry without operator involvement
    pub fn is_retryable(&self) -> bool {
        self.is_capture_failure() || matches!(self, Self::Timeout { .. })
    }

    /// Conditions that need an operator
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::StorageFull | Self::PersistentMismatch { .. } | Self::PersistedButOrphaned { .. }
        )
    }
}

/// Terminal result of an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    Succeeded(EncodedRecordId),
    Failed(EnrollmentFailure),
}

impl EnrollmentOutcome {
    /// Single line suitable for the operator display
    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded(record) => format!("Fingerprint registered as {}", record),
            Self::Failed(failure) => failure.to_string(),
        }
    }
}

/// Inputs the machine reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Event(DeviceEvent),

    /// The deadline returned by [`EnrollmentMachine::deadline`] elapsed
    Timeout,

    LinkLost,
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write this command to the sensor
    Send(Command),

    /// Replace the operator's current instruction
    Status(String),

    /// The attempt is over. `Ok` carries the verified record, which still
    /// has to be bound to the identity.
    Complete(Result<EncodedRecordId, EnrollmentFailure>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Nothing,
    StorageReport,
    Deletion(DeviceRecordId),
    Capture,
}

/// One enrollment attempt
#[derive(Debug)]
pub struct EnrollmentMachine {
    config: EnrollmentConfig,
    generation: Generation,
    status: EnrollmentStatus,
    awaiting: Awaiting,
    target: Option<DeviceRecordId>,
    verification_attempts: u8,
    resnapshots: u8,
}

impl EnrollmentMachine {
    pub fn new(generation: Generation, config: EnrollmentConfig) -> Self {
        Self {
            config,
            generation,
            status: EnrollmentStatus::Idle,
            awaiting: Awaiting::Nothing,
            target: None,
            verification_attempts: 0,
            resnapshots: 0,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    /// Slot this attempt expects the template in
    pub fn target(&self) -> Option<DeviceRecordId> {
        self.target
    }

    pub fn verification_attempts(&self) -> u8 {
        self.verification_attempts
    }

    /// How long the driver may wait for the next input
    ///
    /// `None` while the sensor waits on a finger; that phase is only ended
    /// by the sensor or by cancellation.
    pub fn deadline(&self) -> Option<Duration> {
        match self.awaiting {
            Awaiting::StorageReport => Some(self.config.storage_timeout),
            Awaiting::Deletion(_) => Some(self.config.delete_timeout),
            Awaiting::Capture | Awaiting::Nothing => None,
        }
    }

    /// Idle → AwaitingStorageReport
    pub fn start(&mut self) -> Vec<Action> {
        if self.status != EnrollmentStatus::Idle || self.awaiting != Awaiting::Nothing {
            warn!(generation = %self.generation, "Enrollment already started");
            return Vec::new();
        }

        debug!(generation = %self.generation, "Starting enrollment");
        self.request_storage("Checking sensor storage")
    }

    /// Abandon the attempt; nothing is sent to the sensor
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }

        info!(
            generation = %self.generation,
            status = ?self.status,
            "Enrollment cancelled"
        );
        if self.status == EnrollmentStatus::AwaitingCompletion {
            warn!(
                generation = %self.generation,
                target = ?self.target,
                "Cancelled after capture; sensor may still store the template"
            );
        }

        self.status = EnrollmentStatus::Idle;
        self.awaiting = Awaiting::Nothing;
        self.target = None;
    }

    /// Feed an event read under `generation`; stale events are dropped
    pub fn handle_tagged(&mut self, event: Tagged<DeviceEvent>) -> Vec<Action> {
        if event.generation != self.generation {
            warn!(
                current = %self.generation,
                stale = %event.generation,
                event = event.value.name(),
                "Discarding event from a previous attempt"
            );
            return Vec::new();
        }
        self.handle(Input::Event(event.value))
    }

    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        if self.status.is_terminal() || self.awaiting == Awaiting::Nothing {
            debug!(
                generation = %self.generation,
                status = ?self.status,
                "Ignoring input: {:?}",
                input
            );
            return Vec::new();
        }

        match input {
            Input::LinkLost => {
                warn!(generation = %self.generation, status = ?self.status, "Link lost");
                self.fail(EnrollmentFailure::Disconnected)
            }
            Input::Timeout => self.on_timeout(),
            Input::Event(event) => match self.awaiting {
                Awaiting::StorageReport => self.on_storage_event(event),
                Awaiting::Deletion(id) => self.on_deletion_event(id, event),
                Awaiting::Capture => self.on_capture_event(event),
                Awaiting::Nothing => Vec::new(),
            },
        }
    }

    fn on_timeout(&mut self) -> Vec<Action> {
        match self.awaiting {
            Awaiting::StorageReport => {
                let seconds = self.config.storage_timeout.as_secs();
                warn!(generation = %self.generation, "No storage report after {}s", seconds);
                self.fail(EnrollmentFailure::Timeout { seconds })
            }
            Awaiting::Deletion(id) => {
                // The next storage report shows whether the slot was cleared
                warn!(
                    generation = %self.generation,
                    "No acknowledgment for deleting #{}, re-reading storage",
                    id
                );
                self.after_deletion()
            }
            Awaiting::Capture | Awaiting::Nothing => Vec::new(),
        }
    }

    fn on_storage_event(&mut self, event: DeviceEvent) -> Vec<Action> {
        match event {
            DeviceEvent::StorageReport(report) => self.on_storage_report(&report),
            DeviceEvent::Stored { record, .. } => {
                warn!(
                    generation = %self.generation,
                    "Sensor stored {} while storage was being re-read; slot may be orphaned",
                    record
                );
                Vec::new()
            }
            other => {
                debug!(generation = %self.generation, "Ignoring {} while awaiting storage", other.name());
                Vec::new()
            }
        }
    }

    fn on_storage_report(&mut self, report: &StorageReport) -> Vec<Action> {
        let target = match report.next_free_id(self.config.capacity) {
            Ok(target) => target,
            Err(e) => {
                error!(generation = %self.generation, "{}", e);
                return self.fail(EnrollmentFailure::StorageFull);
            }
        };

        debug!(
            generation = %self.generation,
            occupied = report.len(),
            target = target.get(),
            "Storage snapshot taken"
        );

        self.target = Some(target);
        self.status = EnrollmentStatus::Enrolling;
        self.awaiting = Awaiting::Capture;

        vec![
            Action::Send(Command::Enroll),
            Action::Status(format!("Preparing record #{}", target)),
        ]
    }

    fn on_deletion_event(&mut self, pending: DeviceRecordId, event: DeviceEvent) -> Vec<Action> {
        match event {
            DeviceEvent::RecordDeleted(id) if id == pending => {
                debug!(generation = %self.generation, "Deleted #{}", id);
                self.after_deletion()
            }
            other => {
                debug!(
                    generation = %self.generation,
                    "Ignoring {} while awaiting deletion of #{}",
                    other.name(),
                    pending
                );
                Vec::new()
            }
        }
    }

    fn after_deletion(&mut self) -> Vec<Action> {
        if self.verification_attempts >= self.config.max_verification_attempts {
            error!(
                generation = %self.generation,
                attempts = self.verification_attempts,
                "Sensor allocator diverged; giving up"
            );
            return self.fail(EnrollmentFailure::PersistentMismatch {
                attempts: self.verification_attempts,
            });
        }

        // Status was already announced when the correction started
        self.awaiting = Awaiting::StorageReport;
        vec![Action::Send(Command::GetIds)]
    }

    fn on_capture_event(&mut self, event: DeviceEvent) -> Vec<Action> {
        match event {
            DeviceEvent::AwaitingFinger(proposed) => self.on_awaiting_finger(proposed),
            DeviceEvent::ImageCaptured => self.progress("Image taken"),
            DeviceEvent::ImageProcessed => self.progress("Image processed"),
            DeviceEvent::RemoveFinger => self.progress("Remove finger"),
            DeviceEvent::PlaceAgain => self.progress("Place the same finger again"),
            DeviceEvent::TemplatesMatched => {
                self.status = EnrollmentStatus::AwaitingCompletion;
                vec![Action::Status("Prints matched, storing template".into())]
            }
            DeviceEvent::TemplatesMismatched => self.fail(EnrollmentFailure::TemplatesMismatched),
            DeviceEvent::PoorImage => self.fail(EnrollmentFailure::PoorImage),
            DeviceEvent::FeatureExtractionFailed => self.fail(EnrollmentFailure::NoFeatures),
            DeviceEvent::Stored { assigned, record } => self.verify(assigned, record),
            other => {
                debug!(generation = %self.generation, "Ignoring {} during capture", other.name());
                Vec::new()
            }
        }
    }

    fn on_awaiting_finger(&mut self, proposed: DeviceRecordId) -> Vec<Action> {
        if self.target == Some(proposed) {
            self.resnapshots = 0;
            return self.progress("Place finger on the sensor");
        }

        // Counts consecutive re-snapshots; checked before incrementing so
        // the counter never exceeds the configured bound
        if self.resnapshots >= self.config.max_resnapshots {
            error!(
                generation = %self.generation,
                resnapshots = self.resnapshots,
                "Sensor keeps proposing unexpected slots"
            );
            return self.fail(EnrollmentFailure::PersistentMismatch {
                attempts: self.verification_attempts,
            });
        }
        self.resnapshots += 1;

        info!(
            generation = %self.generation,
            target = ?self.target,
            proposed = proposed.get(),
            "Sensor proposed a different slot, re-reading storage"
        );
        self.request_storage("Sensor storage changed, re-checking")
    }

    fn verify(&mut self, assigned: DeviceRecordId, record: EncodedRecordId) -> Vec<Action> {
        self.status = EnrollmentStatus::Verifying;
        self.resnapshots = 0;

        if self.target == Some(assigned) {
            info!(generation = %self.generation, "Enrolled as {}", record);
            self.status = EnrollmentStatus::Succeeded;
            self.awaiting = Awaiting::Nothing;
            return vec![Action::Complete(Ok(record))];
        }

        self.verification_attempts += 1;
        warn!(
            generation = %self.generation,
            target = ?self.target,
            assigned = assigned.get(),
            attempt = self.verification_attempts,
            "Sensor stored into an unexpected slot, deleting it"
        );

        self.target = None;
        self.status = EnrollmentStatus::AwaitingStorageReport;
        self.awaiting = Awaiting::Deletion(assigned);

        vec![
            Action::Send(Command::DeleteId(assigned)),
            Action::Status(format!("Correcting sensor record #{}", assigned)),
        ]
    }

    fn request_storage(&mut self, status: &str) -> Vec<Action> {
        self.target = None;
        self.status = EnrollmentStatus::AwaitingStorageReport;
        self.awaiting = Awaiting::StorageReport;

        vec![Action::Send(Command::GetIds), Action::Status(status.to_string())]
    }

    fn progress(&self, status: &str) -> Vec<Action> {
        vec![Action::Status(status.to_string())]
    }

    fn fail(&mut self, failure: EnrollmentFailure) -> Vec<Action> {
        self.status = EnrollmentStatus::Failed;
        self.awaiting = Awaiting::Nothing;
        vec![Action::Complete(Err(failure))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use pretty_assertions::assert_eq;

    fn id(value: u16) -> DeviceRecordId {
        DeviceRecordId::new(value).unwrap()
    }

    fn report(values: &[u16]) -> Input {
        Input::Event(DeviceEvent::StorageReport(StorageReport::new(
            values.iter().map(|&v| id(v)),
        )))
    }

    fn stored(value: u16) -> Input {
        let record = EncodedRecordId::parse(&format!("TIDA01{:04}", value), "TID").unwrap();
        Input::Event(DeviceEvent::Stored {
            assigned: id(value),
            record,
        })
    }

    fn deleted(value: u16) -> Input {
        Input::Event(DeviceEvent::RecordDeleted(id(value)))
    }

    fn event(event: DeviceEvent) -> Input {
        Input::Event(event)
    }

    fn machine() -> EnrollmentMachine {
        EnrollmentMachine::new(Generation::INITIAL, EnrollmentConfig::default())
    }

    fn sent(actions: &[Action]) -> Vec<Command> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    fn completion(actions: &[Action]) -> Option<Result<EncodedRecordId, EnrollmentFailure>> {
        actions.iter().find_map(|a| match a {
            Action::Complete(result) => Some(result.clone()),
            _ => None,
        })
    }

    fn status_count(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Status(_)))
            .count()
    }

    /// Run the capture sequence up to (not including) Stored
    fn capture(m: &mut EnrollmentMachine, proposed: u16) -> Vec<Action> {
        let mut actions = Vec::new();
        for input in [
            event(DeviceEvent::AwaitingFinger(id(proposed))),
            event(DeviceEvent::ImageCaptured),
            event(DeviceEvent::ImageProcessed),
            event(DeviceEvent::RemoveFinger),
            event(DeviceEvent::PlaceAgain),
            event(DeviceEvent::ImageCaptured),
            event(DeviceEvent::ImageProcessed),
            event(DeviceEvent::TemplatesMatched),
        ] {
            actions.extend(m.handle(input));
        }
        actions
    }

    #[test]
    fn test_start_requests_storage() {
        let mut m = machine();
        let actions = m.start();

        assert_eq!(sent(&actions), vec![Command::GetIds]);
        assert_eq!(status_count(&actions), 1);
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);
        assert_eq!(m.deadline(), Some(Duration::from_secs(8)));

        assert!(m.start().is_empty());
    }

    #[test]
    fn test_happy_path_next_free_slot() {
        let mut m = machine();
        m.start();

        let actions = m.handle(report(&[1, 2, 3]));
        assert_eq!(sent(&actions), vec![Command::Enroll]);
        assert_eq!(m.target(), Some(id(4)));
        assert_eq!(m.status(), EnrollmentStatus::Enrolling);
        assert_eq!(m.deadline(), None);

        let actions = capture(&mut m, 4);
        assert!(sent(&actions).is_empty());
        assert_eq!(m.status(), EnrollmentStatus::AwaitingCompletion);

        let actions = m.handle(stored(4));
        let record = completion(&actions).unwrap().unwrap();
        assert_eq!(record.as_str(), "TIDA010004");
        assert_eq!(m.status(), EnrollmentStatus::Succeeded);
        assert_eq!(m.verification_attempts(), 0);
    }

    #[test]
    fn test_every_progress_event_yields_one_status() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));

        for input in [
            event(DeviceEvent::AwaitingFinger(id(1))),
            event(DeviceEvent::ImageCaptured),
            event(DeviceEvent::ImageProcessed),
            event(DeviceEvent::RemoveFinger),
            event(DeviceEvent::PlaceAgain),
            event(DeviceEvent::TemplatesMatched),
        ] {
            assert_eq!(status_count(&m.handle(input)), 1);
        }
    }

    #[test]
    fn test_single_mismatch_is_corrected() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));
        assert_eq!(m.target(), Some(id(1)));
        capture(&mut m, 1);

        let actions = m.handle(stored(2));
        assert_eq!(sent(&actions), vec![Command::DeleteId(id(2))]);
        assert!(completion(&actions).is_none());
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);
        assert_eq!(m.verification_attempts(), 1);
        assert_eq!(m.deadline(), Some(Duration::from_secs(8)));

        // No pipelining: GET_IDS only after the delete is acknowledged
        assert!(m.handle(report(&[])).is_empty());
        let actions = m.handle(deleted(2));
        assert_eq!(sent(&actions), vec![Command::GetIds]);

        let actions = m.handle(report(&[]));
        assert_eq!(sent(&actions), vec![Command::Enroll]);
        assert_eq!(m.target(), Some(id(1)));

        capture(&mut m, 1);
        let actions = m.handle(stored(1));
        assert_eq!(completion(&actions).unwrap().unwrap().as_str(), "TIDA010001");
        assert_eq!(m.status(), EnrollmentStatus::Succeeded);
    }

    #[test]
    fn test_three_mismatches_fail_after_three_deletes() {
        let mut m = machine();
        let mut commands = sent(&m.start());

        for assigned in [2, 3, 4] {
            commands.extend(sent(&m.handle(report(&[]))));
            assert_eq!(m.target(), Some(id(1)));
            capture(&mut m, 1);

            let actions = m.handle(stored(assigned));
            assert!(completion(&actions).is_none());
            commands.extend(sent(&actions));

            let actions = m.handle(deleted(assigned));
            commands.extend(sent(&actions));

            if let Some(result) = completion(&actions) {
                assert_eq!(assigned, 4);
                assert_eq!(
                    result,
                    Err(EnrollmentFailure::PersistentMismatch { attempts: 3 })
                );
            }
        }

        let deletes: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, Command::DeleteId(_)))
            .collect();
        assert_eq!(
            deletes,
            vec![
                &Command::DeleteId(id(2)),
                &Command::DeleteId(id(3)),
                &Command::DeleteId(id(4)),
            ]
        );
        assert_eq!(commands.last(), Some(&Command::DeleteId(id(4))));
        assert_eq!(m.status(), EnrollmentStatus::Failed);

        // Terminal: a late Stored does not trigger a fourth correction
        assert!(m.handle(stored(5)).is_empty());
    }

    #[test]
    fn test_delete_timeout_still_rereads_storage() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));
        capture(&mut m, 1);
        m.handle(stored(2));

        let actions = m.handle(Input::Timeout);
        assert_eq!(sent(&actions), vec![Command::GetIds]);
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);
    }

    #[test]
    fn test_deletion_ack_for_other_slot_ignored() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));
        capture(&mut m, 1);
        m.handle(stored(2));

        assert!(m.handle(deleted(9)).is_empty());
        assert_eq!(sent(&m.handle(deleted(2))), vec![Command::GetIds]);
    }

    #[test]
    fn test_proposed_slot_mismatch_resnapshots() {
        let mut m = machine();
        m.start();
        m.handle(report(&[1]));
        assert_eq!(m.target(), Some(id(2)));

        let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(3))));
        assert_eq!(sent(&actions), vec![Command::GetIds]);
        assert_eq!(status_count(&actions), 1);
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);
        assert_eq!(m.verification_attempts(), 0);

        m.handle(report(&[1, 2]));
        assert_eq!(m.target(), Some(id(3)));
        capture(&mut m, 3);
        assert!(completion(&m.handle(stored(3))).unwrap().is_ok());
    }

    #[test]
    fn test_resnapshot_bound() {
        let config = EnrollmentConfig::default().with_max_resnapshots(2);
        let mut m = EnrollmentMachine::new(Generation::INITIAL, config);
        m.start();

        for _ in 0..2 {
            m.handle(report(&[]));
            let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(9))));
            assert_eq!(sent(&actions), vec![Command::GetIds]);
        }

        m.handle(report(&[]));
        let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(9))));
        assert_eq!(
            completion(&actions),
            Some(Err(EnrollmentFailure::PersistentMismatch { attempts: 0 }))
        );
    }

    #[test]
    fn test_resnapshot_bound_at_counter_limit() {
        let config = EnrollmentConfig::default().with_max_resnapshots(u8::MAX);
        let mut m = EnrollmentMachine::new(Generation::INITIAL, config);
        m.start();

        for _ in 0..u8::MAX {
            m.handle(report(&[]));
            let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(9))));
            assert_eq!(sent(&actions), vec![Command::GetIds]);
        }

        m.handle(report(&[]));
        let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(9))));
        assert_eq!(
            completion(&actions),
            Some(Err(EnrollmentFailure::PersistentMismatch { attempts: 0 }))
        );
    }

    #[test]
    fn test_resnapshot_streak_ends_on_accepted_capture() {
        let config = EnrollmentConfig::default().with_max_resnapshots(1);
        let mut m = EnrollmentMachine::new(Generation::INITIAL, config);
        m.start();

        // One re-snapshot, then the sensor agrees on slot 1
        m.handle(report(&[]));
        assert_eq!(
            sent(&m.handle(event(DeviceEvent::AwaitingFinger(id(5))))),
            vec![Command::GetIds]
        );
        m.handle(report(&[]));
        capture(&mut m, 1);

        // Stored into the wrong slot, corrected
        assert_eq!(sent(&m.handle(stored(2))), vec![Command::DeleteId(id(2))]);
        assert_eq!(sent(&m.handle(deleted(2))), vec![Command::GetIds]);
        m.handle(report(&[]));

        // A fresh streak is allowed its own re-snapshot
        let actions = m.handle(event(DeviceEvent::AwaitingFinger(id(5))));
        assert_eq!(sent(&actions), vec![Command::GetIds]);
        assert_eq!(completion(&actions), None);

        m.handle(report(&[]));
        capture(&mut m, 1);
        let record = completion(&m.handle(stored(1))).unwrap().unwrap();
        assert_eq!(record.as_str(), "TIDA010001");
    }

    #[test]
    fn test_capture_failures_are_terminal() {
        for (failure_event, expected) in [
            (DeviceEvent::TemplatesMismatched, EnrollmentFailure::TemplatesMismatched),
            (DeviceEvent::PoorImage, EnrollmentFailure::PoorImage),
            (DeviceEvent::FeatureExtractionFailed, EnrollmentFailure::NoFeatures),
        ] {
            let mut m = machine();
            m.start();
            m.handle(report(&[]));
            m.handle(event(DeviceEvent::AwaitingFinger(id(1))));

            let actions = m.handle(event(failure_event));
            assert_eq!(completion(&actions), Some(Err(expected.clone())));
            assert!(sent(&actions).is_empty());
            assert_eq!(m.status(), EnrollmentStatus::Failed);
            assert!(expected.is_capture_failure());
        }
    }

    #[test]
    fn test_storage_full() {
        let mut m = EnrollmentMachine::new(
            Generation::INITIAL,
            EnrollmentConfig::default().with_capacity(3),
        );
        m.start();

        let actions = m.handle(report(&[1, 2, 3]));
        assert_eq!(completion(&actions), Some(Err(EnrollmentFailure::StorageFull)));
        assert!(sent(&actions).is_empty());
    }

    #[test]
    fn test_storage_timeout() {
        let mut m = machine();
        m.start();

        let actions = m.handle(Input::Timeout);
        assert_eq!(
            completion(&actions),
            Some(Err(EnrollmentFailure::Timeout { seconds: 8 }))
        );
    }

    #[test]
    fn test_timeout_ignored_during_capture() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));

        assert!(m.handle(Input::Timeout).is_empty());
        assert_eq!(m.status(), EnrollmentStatus::Enrolling);
    }

    #[test]
    fn test_link_lost_is_terminal_everywhere() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));
        m.handle(event(DeviceEvent::AwaitingFinger(id(1))));

        let actions = m.handle(Input::LinkLost);
        assert_eq!(actions, vec![Action::Complete(Err(EnrollmentFailure::Disconnected))]);

        assert!(m.handle(stored(1)).is_empty());
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut m = machine();
        m.start();
        m.handle(report(&[]));

        m.cancel();
        assert_eq!(m.status(), EnrollmentStatus::Idle);
        assert_eq!(m.target(), None);
        assert!(m.handle(stored(1)).is_empty());
    }

    #[test]
    fn test_stale_generation_dropped() {
        let mut m = EnrollmentMachine::new(Generation::INITIAL, EnrollmentConfig::default());
        m.start();

        let session = Session::new();
        session.open().unwrap();
        let newer = session.begin_attempt().unwrap();

        let stale = Tagged::new(newer, DeviceEvent::StorageReport(StorageReport::default()));
        assert!(m.handle_tagged(stale).is_empty());
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);

        let current = Tagged::new(
            Generation::INITIAL,
            DeviceEvent::StorageReport(StorageReport::default()),
        );
        assert_eq!(sent(&m.handle_tagged(current)), vec![Command::Enroll]);
    }

    #[test]
    fn test_unrelated_events_ignored_while_awaiting_storage() {
        let mut m = machine();
        m.start();

        assert!(m.handle(event(DeviceEvent::ImageCaptured)).is_empty());
        assert!(m.handle(stored(1)).is_empty());
        assert_eq!(m.status(), EnrollmentStatus::AwaitingStorageReport);
    }

    #[test]
    fn test_outcome_describe() {
        let record = EncodedRecordId::parse("TIDA010004", "TID").unwrap();
        assert_eq!(
            EnrollmentOutcome::Succeeded(record).describe(),
            "Fingerprint registered as TIDA010004"
        );
        assert!(EnrollmentFailure::PersistentMismatch { attempts: 3 }.requires_operator());
        assert!(EnrollmentFailure::Timeout { seconds: 8 }.is_retryable());
        assert!(!EnrollmentFailure::Disconnected.is_retryable());
    }
}
