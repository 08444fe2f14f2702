//! Timed operator prompt for choosing a filament slot.
//!
//! A session is Idle -> Active -> Idle. It ends exactly once, either by the
//! operator's choice or by its timer; a timer that fires after the session
//! already ended is recognized by its session id and ignored.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mmu_shared::{SLOT_COUNT, Slot};
use thiserror::Error;
use uuid::Uuid;

/// Operator answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Slot(Slot),
    /// Leave the firmware's own selection alone.
    Skip,
}

/// Wire value of [`PromptChoice::Skip`].
pub const SKIP_CHOICE: i64 = -1;

impl PromptChoice {
    /// Validates an API choice: `0..=4`, or [`SKIP_CHOICE`].
    pub fn from_request(value: i64) -> Option<PromptChoice> {
        if value == SKIP_CHOICE {
            return Some(PromptChoice::Skip);
        }
        u8::try_from(value).ok().and_then(Slot::new).map(PromptChoice::Slot)
    }
}

impl FromStr for PromptChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("skip") {
            return Ok(PromptChoice::Skip);
        }
        s.parse::<i64>()
            .ok()
            .and_then(PromptChoice::from_request)
            .ok_or_else(|| format!("'{}' is not a slot 0-{} or skip", s, SLOT_COUNT - 1))
    }
}

impl fmt::Display for PromptChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptChoice::Slot(slot) => write!(f, "T{}", slot),
            PromptChoice::Skip => f.write_str("skip"),
        }
    }
}

/// One-shot deadline for the active prompt.
pub trait PromptTimer: Send {
    /// Schedules an expiry notice for `session` after `after`, replacing any
    /// previously armed deadline.
    fn arm(&mut self, session: Uuid, after: Duration);
    /// Cancels the armed deadline; a no-op if it already fired.
    fn cancel(&mut self);
}

/// Timer that never fires, for hosts that resolve prompts themselves.
#[derive(Debug, Default)]
pub struct NoTimer;

impl PromptTimer for NoTimer {
    fn arm(&mut self, _session: Uuid, _after: Duration) {}
    fn cancel(&mut self) {}
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt already active")]
    AlreadyActive,
    #[error("no active prompt")]
    NotActive,
}

#[derive(Debug, Default)]
pub struct PromptSession {
    session: Option<Uuid>,
    selected_filament: Option<Slot>,
}

impl PromptSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session
    }

    /// Slot chosen by the operator or the timeout fallback, not yet applied.
    pub fn selected_filament(&self) -> Option<Slot> {
        self.selected_filament
    }

    pub fn set_selected_filament(&mut self, slot: Option<Slot>) {
        self.selected_filament = slot;
    }

    pub fn take_selected_filament(&mut self) -> Option<Slot> {
        self.selected_filament.take()
    }

    pub fn start(&mut self, timer: &mut dyn PromptTimer, timeout: Duration) -> Result<Uuid, PromptError> {
        if self.session.is_some() {
            return Err(PromptError::AlreadyActive);
        }
        let id = Uuid::new_v4();
        timer.arm(id, timeout);
        self.session = Some(id);
        tracing::info!("Prompt {} started, times out in {:?}", id, timeout);
        Ok(id)
    }

    /// Records the operator's choice. The caller finishes the session.
    pub fn resolve(&mut self, choice: PromptChoice) -> Result<Uuid, PromptError> {
        let id = self.session.ok_or(PromptError::NotActive)?;
        self.selected_filament = match choice {
            PromptChoice::Slot(slot) => Some(slot),
            PromptChoice::Skip => None,
        };
        tracing::info!("Prompt {} resolved with {}", id, choice);
        Ok(id)
    }

    /// Whether an expiry notice for `session` belongs to the active prompt.
    pub fn is_current(&self, session: Uuid) -> bool {
        self.session == Some(session)
    }

    /// Ends the active session. Returns false if there was none.
    pub fn finish(&mut self, timer: &mut dyn PromptTimer) -> bool {
        match self.session.take() {
            Some(id) => {
                timer.cancel();
                tracing::info!("Prompt {} closed", id);
                true
            }
            None => false,
        }
    }
}
