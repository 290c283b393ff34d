//! Element lifecycle states and the statuses elements report.

use std::fmt;

/// Role of an element within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRole {
    /// Produces data; has no upstream.
    Source,
    /// Consumes upstream data and produces downstream data.
    Filter,
    /// Consumes data; has no downstream.
    Sink,
}

impl ElementRole {
    /// Whether the element reads from an upstream link.
    pub fn has_input(&self) -> bool {
        matches!(self, ElementRole::Filter | ElementRole::Sink)
    }

    /// Whether the element writes to a downstream link.
    pub fn has_output(&self) -> bool {
        matches!(self, ElementRole::Source | ElementRole::Filter)
    }
}

/// Lifecycle state of an element.
///
/// ```text
/// Init ──> Running <──> Paused
///             │            │
///             ├────────────┴──> Stopped ──┐
///             ├──> Finished ──────────────┼──> Terminated
///             └──> Error ─────────────────┘
/// ```
///
/// `Stopped`, `Finished` and `Error` may go back to `Running` when the
/// pipeline is run again. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElementState {
    /// Created, never run.
    #[default]
    Init,
    /// Worker is processing.
    Running,
    /// Worker is parked between chunks.
    Paused,
    /// Worker exited after a stop request.
    Stopped,
    /// Worker exited after consuming all of its input.
    Finished,
    /// Worker exited on a failure.
    Error,
    /// Element was deinitialized.
    Terminated,
}

impl ElementState {
    /// Check if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: ElementState) -> bool {
        use ElementState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => !matches!(self, Running | Paused),
            (Init | Stopped | Finished | Error, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running | Paused, Stopped | Finished | Error) => true,
            _ => false,
        }
    }

    /// Whether the worker has exited (or never started).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ElementState::Init
                | ElementState::Stopped
                | ElementState::Finished
                | ElementState::Error
                | ElementState::Terminated
        )
    }

    /// Whether a worker is alive for this element.
    pub fn is_active(&self) -> bool {
        matches!(self, ElementState::Running | ElementState::Paused)
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementState::Init => "init",
            ElementState::Running => "running",
            ElementState::Paused => "paused",
            ElementState::Stopped => "stopped",
            ElementState::Finished => "finished",
            ElementState::Error => "error",
            ElementState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Which phase of an element failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementErrorKind {
    /// Opening the element (e.g. probing the stream) failed.
    Open,
    /// Reading input failed.
    Input,
    /// Processing (e.g. decoding) failed.
    Process,
    /// Writing output failed.
    Output,
    /// Closing the element failed.
    Close,
    /// A bounded wait expired where it must not.
    Timeout,
}

/// Status payload carried by a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementStatus {
    /// Worker entered `Running`.
    StateRunning,
    /// Worker entered `Paused`.
    StatePaused,
    /// Worker exited after a stop request.
    StateStopped,
    /// Worker drained its input and exited.
    StateFinished,
    /// The element's input reported end of stream.
    InputDone,
    /// Worker failed.
    Error(ElementErrorKind),
}

impl ElementStatus {
    /// Whether the status means the element will not produce more data.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ElementStatus::StateStopped | ElementStatus::StateFinished | ElementStatus::Error(_)
        )
    }

    /// Whether this is an error status.
    pub fn is_error(&self) -> bool {
        matches!(self, ElementStatus::Error(_))
    }

    /// The lifecycle state this status announces, if any.
    pub fn state(&self) -> Option<ElementState> {
        match self {
            ElementStatus::StateRunning => Some(ElementState::Running),
            ElementStatus::StatePaused => Some(ElementState::Paused),
            ElementStatus::StateStopped => Some(ElementState::Stopped),
            ElementStatus::StateFinished => Some(ElementState::Finished),
            ElementStatus::Error(_) => Some(ElementState::Error),
            ElementStatus::InputDone => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ports() {
        assert!(!ElementRole::Source.has_input());
        assert!(ElementRole::Source.has_output());
        assert!(ElementRole::Filter.has_input());
        assert!(ElementRole::Filter.has_output());
        assert!(ElementRole::Sink.has_input());
        assert!(!ElementRole::Sink.has_output());
    }

    #[test]
    fn test_legal_transitions() {
        use ElementState::*;
        assert!(Init.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Finished));
        assert!(Running.can_transition_to(Error));
        assert!(Finished.can_transition_to(Running));
        assert!(Stopped.can_transition_to(Terminated));
        assert!(Init.can_transition_to(Terminated));
    }

    #[test]
    fn test_illegal_transitions() {
        use ElementState::*;
        assert!(!Init.can_transition_to(Paused));
        assert!(!Init.can_transition_to(Finished));
        assert!(!Running.can_transition_to(Terminated));
        assert!(!Paused.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Finished.can_transition_to(Paused));
    }

    #[test]
    fn test_status_classification() {
        assert!(ElementStatus::StateFinished.is_terminal());
        assert!(ElementStatus::StateStopped.is_terminal());
        assert!(ElementStatus::Error(ElementErrorKind::Output).is_terminal());
        assert!(!ElementStatus::StateRunning.is_terminal());
        assert!(!ElementStatus::InputDone.is_terminal());
        assert!(ElementStatus::Error(ElementErrorKind::Open).is_error());
    }

    #[test]
    fn test_status_to_state() {
        assert_eq!(
            ElementStatus::StateFinished.state(),
            Some(ElementState::Finished)
        );
        assert_eq!(ElementStatus::InputDone.state(), None);
    }
}
