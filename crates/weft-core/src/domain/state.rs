//! Listener lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle of one per-function listener.
///
/// State transitions:
/// - Created -> Starting -> Running -> Stopped
/// - Created -> Faulted (listener could not be built)
/// - Created -> Starting -> Faulted (start failed, or singleton lease lost)
/// - Running -> Faulted (singleton lease lost)
/// - Created/Starting -> Stopped (stopped before it ever ran)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerState {
    /// Built, not yet started.
    Created,

    /// Start requested; for singleton listeners this covers lease acquisition.
    Starting,

    /// Underlying listener is running.
    Running,

    /// Stopped gracefully.
    Stopped,

    /// Start failed or exclusivity was lost.
    Faulted,
}

impl ListenerState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ListenerState::Stopped | ListenerState::Faulted)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Faulted)
                | (Starting, Running)
                | (Starting, Faulted)
                | (Running, Faulted)
                | (Created, Stopped)
                | (Starting, Stopped)
                | (Running, Stopped)
        )
    }
}
