use crate::FaultReason;

/// Lifecycle of a guest thread as observed by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Constructed, host thread not yet started.
    #[default]
    Created,
    /// Host thread is executing guest code.
    Running,
    /// Entry subroutine returned normally.
    Exited,
    /// A stop request was observed at a dispatch boundary.
    Stopped,
    /// A guest-semantic fault ended execution.
    Faulted(FaultReason),
}

impl RunState {
    /// Returns the fault that ended execution, if any.
    #[must_use]
    pub const fn fault(self) -> Option<FaultReason> {
        match self {
            Self::Faulted(reason) => Some(reason),
            Self::Created | Self::Running | Self::Exited | Self::Stopped => None,
        }
    }

    /// Whether the host thread has finished.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Exited | Self::Stopped | Self::Faulted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::RunState;
    use crate::{FaultCode, FaultReason};

    #[test]
    fn run_state_default_is_created() {
        assert_eq!(RunState::default(), RunState::Created);
        assert!(!RunState::Running.is_finished());
    }

    #[test]
    fn fault_accessor_reports_only_faulted_variant() {
        let reason = FaultReason::new(FaultCode::GuestBreak, 0x40);
        assert_eq!(RunState::Exited.fault(), None);
        assert_eq!(RunState::Stopped.fault(), None);
        assert_eq!(RunState::Faulted(reason).fault(), Some(reason));
        assert!(RunState::Faulted(reason).is_finished());
    }
}
