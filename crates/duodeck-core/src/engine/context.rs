//! Shared processing context lifecycle
//!
//! Both decks and the master bus process against one context. The host
//! embedding the engine decides when audio may start: a context can come
//! up suspended and only becomes runnable once the host grants a resume
//! (typically after some user interaction on its side).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{EngineError, EngineResult};
use crate::types::SAMPLE_RATE;

/// Context lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Processing is active
    Running,
    /// Processing is paused; can be resumed if the host permits
    Suspended,
    /// Terminal. A closed context never processes again
    Closed,
}

const STATE_RUNNING: u8 = 0;
const STATE_SUSPENDED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Shared processing context
///
/// Cheap to share behind an `Arc`; every field is atomic so the audio
/// thread and control thread read it without locking.
pub struct ProcessingContext {
    state: AtomicU8,
    /// Host policy flag: whether a resume attempt is currently allowed
    resume_permitted: AtomicBool,
    sample_rate: u32,
}

impl ProcessingContext {
    /// Create a context in the suspended state, pending host permission
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_SUSPENDED),
            resume_permitted: AtomicBool::new(false),
            sample_rate: SAMPLE_RATE,
        }
    }

    pub fn state(&self) -> ContextState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => ContextState::Running,
            STATE_SUSPENDED => ContextState::Suspended,
            _ => ContextState::Closed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Grant (or revoke) permission for resume attempts
    pub fn set_resume_permitted(&self, permitted: bool) {
        self.resume_permitted.store(permitted, Ordering::Release);
    }

    pub fn resume_permitted(&self) -> bool {
        self.resume_permitted.load(Ordering::Acquire)
    }

    /// Attempt to move from suspended to running
    ///
    /// Fails if the context is closed or the host has not permitted a
    /// resume. Resuming a running context is a no-op.
    pub fn resume(&self) -> EngineResult<()> {
        match self.state() {
            ContextState::Closed => Err(EngineError::ContextUnavailable(
                "context is closed".to_string(),
            )),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                if !self.resume_permitted() {
                    return Err(EngineError::ContextUnavailable(
                        "resume not permitted by host".to_string(),
                    ));
                }
                self.state.store(STATE_RUNNING, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Pause processing. No-op unless running
    pub fn suspend(&self) {
        // Never revives a closed context
        let _ = self.state.compare_exchange(
            STATE_RUNNING,
            STATE_SUSPENDED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Terminally shut the context down
    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        log::info!("processing context closed");
    }
}

impl Default for ProcessingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_suspended_without_permission() {
        let ctx = ProcessingContext::new();
        assert_eq!(ctx.state(), ContextState::Suspended);
        assert!(!ctx.resume_permitted());
        assert!(ctx.resume().is_err());
    }

    #[test]
    fn test_resume_after_permission() {
        let ctx = ProcessingContext::new();
        ctx.set_resume_permitted(true);
        ctx.resume().unwrap();
        assert!(ctx.is_running());

        // Idempotent while running
        ctx.resume().unwrap();
        assert!(ctx.is_running());
    }

    #[test]
    fn test_suspend_and_resume_cycle() {
        let ctx = ProcessingContext::new();
        ctx.set_resume_permitted(true);
        ctx.resume().unwrap();

        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Suspended);

        ctx.resume().unwrap();
        assert!(ctx.is_running());
    }

    #[test]
    fn test_closed_is_terminal() {
        let ctx = ProcessingContext::new();
        ctx.set_resume_permitted(true);
        ctx.close();

        assert_eq!(ctx.state(), ContextState::Closed);
        assert!(ctx.resume().is_err());

        // suspend on a closed context must not revive it
        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Closed);
    }
}
