//! Enrollment worker
//!
//! The [`Enroller`] owns a connected [`Device`] on a dedicated task and runs
//! at most one [`EnrollmentMachine`] at a time. Callers start attempts,
//! cancel them, and follow progress through an [`AttemptHandle`]; they are
//! never blocked on the sensor.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use thumbid_core::{
    Action, DeviceEvent, EnrollmentConfig, EnrollmentFailure, EnrollmentMachine,
    EnrollmentOutcome, Generation, Input, Tagged,
};
use thumbid_types::{EncodedRecordId, IdentityContext};

use crate::binder::Binder;
use crate::device::Device;
use crate::error::{Error, Result};

/// One line of progress for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentUpdate {
    pub generation: Generation,

    /// Current instruction; replaces the previous one
    pub status: String,

    /// No further updates follow
    pub terminal: bool,

    /// Set on terminal updates, except after cancellation
    pub outcome: Option<EnrollmentOutcome>,
}

impl EnrollmentUpdate {
    fn progress(generation: Generation, status: String) -> Self {
        Self {
            generation,
            status,
            terminal: false,
            outcome: None,
        }
    }

    fn finished(generation: Generation, outcome: EnrollmentOutcome) -> Self {
        Self {
            generation,
            status: outcome.describe(),
            terminal: true,
            outcome: Some(outcome),
        }
    }

    fn cancelled(generation: Generation) -> Self {
        Self {
            generation,
            status: "Enrollment cancelled".into(),
            terminal: true,
            outcome: None,
        }
    }
}

/// Caller's view of a running attempt
#[derive(Debug)]
pub struct AttemptHandle {
    generation: Generation,
    updates: mpsc::UnboundedReceiver<EnrollmentUpdate>,
}

impl AttemptHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Next progress update; `None` after the terminal one
    pub async fn next_update(&mut self) -> Option<EnrollmentUpdate> {
        self.updates.recv().await
    }

    /// Skip progress and wait for the outcome
    ///
    /// `None` if the attempt was cancelled or the worker stopped.
    pub async fn outcome(mut self) -> Option<EnrollmentOutcome> {
        while let Some(update) = self.updates.recv().await {
            if update.terminal {
                return update.outcome;
            }
        }
        None
    }
}

enum Request {
    Start {
        identity: IdentityContext,
        reply: oneshot::Sender<Result<AttemptHandle>>,
    },
    Cancel {
        generation: Generation,
    },
    Shutdown,
}

/// Runs enrollments against one sensor
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use thumbid::{Binder, Device, Enroller, EnrollmentConfig, MemoryRecordStore};
/// use thumbid_types::{IdentityContext, UserId};
///
/// #[tokio::main]
/// async fn main() -> thumbid::Result<()> {
///     let mut device = Device::new("192.168.1.50", 8888);
///     device.connect().await?;
///
///     let binder = Binder::new(Arc::new(MemoryRecordStore::new()));
///     let enroller = Enroller::spawn(device, binder, EnrollmentConfig::default());
///
///     let identity = IdentityContext::new(UserId::new("u-17"), "A01");
///     let mut attempt = enroller.start_enrollment(identity).await?;
///
///     while let Some(update) = attempt.next_update().await {
///         println!("{}", update.status);
///     }
///
///     enroller.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Enroller {
    requests: mpsc::Sender<Request>,
    worker: JoinHandle<Device>,
}

impl Enroller {
    /// Hand a connected device to a new worker task
    pub fn spawn(device: Device, binder: Binder, config: EnrollmentConfig) -> Self {
        let (requests, inbox) = mpsc::channel(16);

        let worker = Worker {
            device,
            binder,
            config,
            active: None,
        };

        Self {
            requests,
            worker: tokio::spawn(worker.run(inbox)),
        }
    }

    /// Begin an attempt for `identity`
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if another attempt is running
    /// - [`Error::NotConnected`] if the link is down
    pub async fn start_enrollment(&self, identity: IdentityContext) -> Result<AttemptHandle> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(Request::Start { identity, reply })
            .await
            .map_err(|_| Error::WorkerStopped)?;

        response.await.map_err(|_| Error::WorkerStopped)?
    }

    /// Stop consuming events for the attempt
    ///
    /// Commands already sent cannot be withdrawn; the sensor may still
    /// finish storing a template for a cancelled attempt.
    pub async fn cancel(&self, handle: &AttemptHandle) -> Result<()> {
        self.requests
            .send(Request::Cancel {
                generation: handle.generation(),
            })
            .await
            .map_err(|_| Error::WorkerStopped)
    }

    /// Stop the worker and take the device back
    pub async fn shutdown(self) -> Result<Device> {
        // The worker also stops when the channel closes
        let _ = self.requests.send(Request::Shutdown).await;
        self.worker.await.map_err(|_| Error::WorkerStopped)
    }
}

struct Attempt {
    machine: EnrollmentMachine,
    identity: IdentityContext,
    updates: mpsc::UnboundedSender<EnrollmentUpdate>,
    deadline: Option<Instant>,
}

impl Attempt {
    fn generation(&self) -> Generation {
        self.machine.generation()
    }

    fn publish(&self, update: EnrollmentUpdate) {
        // The caller may have dropped the handle; the attempt still runs
        let _ = self.updates.send(update);
    }
}

enum Step {
    Request(Option<Request>),
    Read(Result<Vec<Tagged<DeviceEvent>>>),
}

struct Worker {
    device: Device,
    binder: Binder,
    config: EnrollmentConfig,
    active: Option<Attempt>,
}

impl Worker {
    async fn run(mut self, mut inbox: mpsc::Receiver<Request>) -> Device {
        debug!("Enrollment worker started for {}", self.device.remote_addr());

        loop {
            let listening = self.device.is_connected();
            let deadline = self.active.as_ref().and_then(|a| a.deadline);

            // Keep reading while idle so late lines from a cancelled
            // attempt are consumed under a generation nobody owns.
            let step = tokio::select! {
                request = inbox.recv() => Step::Request(request),
                read = self.device.read_events(deadline), if listening => Step::Read(read),
            };

            match step {
                Step::Request(None) | Step::Request(Some(Request::Shutdown)) => break,
                Step::Request(Some(Request::Start { identity, reply })) => {
                    let result = self.start(identity).await;
                    let _ = reply.send(result);
                }
                Step::Request(Some(Request::Cancel { generation })) => self.cancel(generation),
                Step::Read(Ok(events)) => self.dispatch(events).await,
                Step::Read(Err(e)) if e.is_timeout() => self.feed(Input::Timeout).await,
                Step::Read(Err(e)) => {
                    warn!("Sensor link error: {}", e);
                    self.feed(Input::LinkLost).await;
                }
            }
        }

        if let Some(attempt) = self.active.as_ref() {
            let generation = attempt.generation();
            self.cancel(generation);
        }

        debug!("Enrollment worker stopped");
        self.device
    }

    async fn start(&mut self, identity: IdentityContext) -> Result<AttemptHandle> {
        if self.active.is_some() {
            return Err(Error::Busy);
        }
        if !self.device.is_connected() {
            return Err(Error::NotConnected);
        }

        let stale = self.device.discard_buffered();
        if stale > 0 {
            debug!("Discarded {} buffered line(s) before new attempt", stale);
        }

        let generation = self.device.session().begin_attempt().map_err(|e| {
            if e.requires_reconnect() {
                Error::NotConnected
            } else {
                Error::Core(e)
            }
        })?;
        info!(generation = %generation, "Enrolling {}", identity);

        let (updates, receiver) = mpsc::unbounded_channel();
        let mut machine = EnrollmentMachine::new(generation, self.config.clone());
        let actions = machine.start();

        self.active = Some(Attempt {
            machine,
            identity,
            updates,
            deadline: None,
        });
        self.apply(actions).await;

        Ok(AttemptHandle {
            generation,
            updates: receiver,
        })
    }

    fn cancel(&mut self, generation: Generation) {
        let Some(attempt) = self.active.as_mut() else {
            debug!(generation = %generation, "Ignoring cancel: no attempt running");
            return;
        };
        if attempt.generation() != generation {
            debug!(generation = %generation, "Ignoring cancel for a previous attempt");
            return;
        }

        attempt.machine.cancel();
        if let Err(e) = self.device.session().cancel_attempt(generation) {
            if e.is_recoverable() {
                debug!("Session already moved on: {}", e);
            } else {
                warn!("Session out of step with the attempt: {}", e);
            }
        }

        attempt.publish(EnrollmentUpdate::cancelled(generation));
        self.active = None;
    }

    async fn dispatch(&mut self, events: Vec<Tagged<DeviceEvent>>) {
        for event in events {
            let Some(attempt) = self.active.as_mut() else {
                warn!(
                    generation = %event.generation,
                    "Discarding {} with no attempt running",
                    event.value.name()
                );
                continue;
            };

            let actions = attempt.machine.handle_tagged(event);
            self.apply(actions).await;
        }
    }

    async fn feed(&mut self, input: Input) {
        match self.active.as_mut() {
            Some(attempt) => {
                let actions = attempt.machine.handle(input);
                self.apply(actions).await;
            }
            None => {
                if input == Input::LinkLost {
                    warn!("Sensor link lost while idle");
                }
            }
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            let Some(attempt) = self.active.as_mut() else {
                return;
            };

            match action {
                Action::Send(command) => match self.device.send_command(command).await {
                    Ok(()) => {
                        attempt.deadline = attempt
                            .machine
                            .deadline()
                            .map(|limit| Instant::now() + limit);
                    }
                    Err(e) => {
                        warn!(generation = %attempt.generation(), "Could not send {}: {}", command, e);
                        queue.clear();
                        queue.extend(attempt.machine.handle(Input::LinkLost));
                    }
                },
                Action::Status(status) => {
                    debug!(generation = %attempt.generation(), "{}", status);
                    attempt.publish(EnrollmentUpdate::progress(attempt.generation(), status));
                }
                Action::Complete(result) => {
                    self.complete(result).await;
                    return;
                }
            }
        }
    }

    async fn complete(&mut self, result: std::result::Result<EncodedRecordId, EnrollmentFailure>) {
        let Some(attempt) = self.active.take() else {
            return;
        };
        let generation = attempt.generation();

        let outcome = match result {
            Ok(record) => match self.binder.bind(&attempt.identity, &record).await {
                Ok(()) => EnrollmentOutcome::Succeeded(record),
                Err(e) => EnrollmentOutcome::Failed(EnrollmentFailure::PersistedButOrphaned {
                    record,
                    reason: e.to_string(),
                }),
            },
            Err(failure) => EnrollmentOutcome::Failed(failure),
        };

        match &outcome {
            EnrollmentOutcome::Succeeded(record) => {
                info!(generation = %generation, "Enrollment finished: {}", record)
            }
            EnrollmentOutcome::Failed(failure) if failure.requires_operator() => {
                error!(generation = %generation, "Enrollment failed, operator action required: {}", failure)
            }
            EnrollmentOutcome::Failed(failure) => {
                warn!(generation = %generation, "Enrollment failed: {}", failure)
            }
        }

        if let Err(e) = self.device.session().finish_attempt(generation) {
            if e.is_recoverable() {
                debug!("Session already moved on: {}", e);
            } else {
                warn!("Session out of step with the attempt: {}", e);
            }
        }

        attempt.publish(EnrollmentUpdate::finished(generation, outcome));
    }
}
