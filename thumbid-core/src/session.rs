//! Session management for a sensor connection
//!
//! A session represents one connection to a sensor and tracks:
//! - Connection state
//! - Whether an enrollment attempt is in progress
//! - The attempt generation used to discard stale events

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// Connected, no attempt running
    Idle,

    /// An enrollment attempt owns the link
    Enrolling,
}

/// Attempt generation
///
/// Incremented whenever an attempt starts, is cancelled, or the link closes.
/// An event tagged with a generation other than the current one belongs to
/// an attempt that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Self = Self(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value stamped with the generation current when it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub generation: Generation,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn new(generation: Generation, value: T) -> Self {
        Self { generation, value }
    }
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    generation: AtomicU64,
    state: parking_lot::RwLock<SessionState>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                generation: AtomicU64::new(Generation::INITIAL.0),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), SessionState::Disconnected)
    }

    /// Check if an attempt is running
    pub fn is_enrolling(&self) -> bool {
        matches!(self.state(), SessionState::Enrolling)
    }

    /// Generation events should be tagged with right now
    pub fn current_generation(&self) -> Generation {
        Generation(self.inner.generation.load(Ordering::Acquire))
    }

    /// Stamp a value with the current generation
    pub fn tag<T>(&self, value: T) -> Tagged<T> {
        Tagged::new(self.current_generation(), value)
    }

    /// Mark the link as up
    pub fn open(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot open from state: {:?}",
                *state
            )));
        }

        *state = SessionState::Idle;
        Ok(())
    }

    /// Start an attempt and return its generation
    pub fn begin_attempt(&self) -> Result<Generation> {
        let mut state = self.inner.state.write();

        match *state {
            SessionState::Idle => {}
            SessionState::Disconnected => return Err(Error::SessionNotInitialized),
            SessionState::Enrolling => {
                return Err(Error::InvalidSessionState(
                    "Enrollment already in progress".into(),
                ))
            }
        }

        *state = SessionState::Enrolling;
        Ok(self.bump())
    }

    /// Mark the attempt `generation` finished
    pub fn finish_attempt(&self, generation: Generation) -> Result<()> {
        let mut state = self.inner.state.write();

        let current = self.current_generation();
        if generation != current {
            return Err(Error::StaleGeneration {
                current,
                actual: generation,
            });
        }

        if *state == SessionState::Enrolling {
            *state = SessionState::Idle;
        }
        Ok(())
    }

    /// Abandon the attempt `generation`
    ///
    /// Anything read from the link after this carries a newer generation.
    pub fn cancel_attempt(&self, generation: Generation) -> Result<()> {
        let mut state = self.inner.state.write();

        let current = self.current_generation();
        if generation != current || *state != SessionState::Enrolling {
            return Err(Error::StaleGeneration {
                current,
                actual: generation,
            });
        }

        self.bump();
        *state = SessionState::Idle;
        Ok(())
    }

    /// Close session
    pub fn close(&self) {
        let mut state = self.inner.state.write();
        self.bump();
        *state = SessionState::Disconnected;
    }

    fn bump(&self) -> Generation {
        Generation(self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.current_generation(), Generation::INITIAL);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(!session.is_enrolling());
    }

    #[test]
    fn test_session_open() {
        let session = Session::new();
        session.open().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.is_connected());
        assert!(session.open().is_err());
    }

    #[test]
    fn test_begin_attempt_bumps_generation() {
        let session = Session::new();
        session.open().unwrap();

        let first = session.begin_attempt().unwrap();
        assert_eq!(session.current_generation(), first);
        assert!(session.is_enrolling());
        session.finish_attempt(first).unwrap();
        assert!(!session.is_enrolling());

        let second = session.begin_attempt().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_single_attempt_at_a_time() {
        let session = Session::new();
        session.open().unwrap();

        session.begin_attempt().unwrap();
        assert!(matches!(
            session.begin_attempt(),
            Err(Error::InvalidSessionState(_))
        ));
    }

    #[test]
    fn test_begin_attempt_requires_connection() {
        let session = Session::new();
        assert!(matches!(
            session.begin_attempt(),
            Err(Error::SessionNotInitialized)
        ));
    }

    #[test]
    fn test_cancel_invalidates_tags() {
        let session = Session::new();
        session.open().unwrap();

        let generation = session.begin_attempt().unwrap();
        let early = session.tag("Image taken");
        assert_eq!(early.generation, generation);

        session.cancel_attempt(generation).unwrap();
        let late = session.tag("Prints matched!");

        assert_ne!(late.generation, generation);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_cancel_stale_generation() {
        let session = Session::new();
        session.open().unwrap();

        let old = session.begin_attempt().unwrap();
        session.cancel_attempt(old).unwrap();
        let new = session.begin_attempt().unwrap();

        assert!(matches!(
            session.cancel_attempt(old),
            Err(Error::StaleGeneration { .. })
        ));
        assert_eq!(session.current_generation(), new);
    }

    #[test]
    fn test_session_close() {
        let session = Session::new();
        session.open().unwrap();
        let generation = session.begin_attempt().unwrap();

        session.close();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_ne!(session.current_generation(), generation);
        assert!(session.finish_attempt(generation).is_err());
    }

    #[test]
    fn test_session_clone() {
        let session1 = Session::new();
        session1.open().unwrap();

        let session2 = session1.clone();
        let generation = session1.begin_attempt().unwrap();

        // Both share same state
        assert_eq!(session2.current_generation(), generation);
        assert!(session2.is_enrolling());
    }
}
