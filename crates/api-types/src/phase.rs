//! Build lifecycle phases and the table of legal transitions between them.

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Lifecycle phase of a build.
///
/// `Complete`, `Failed`, `Error` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum BuildPhase {
    /// Created, not yet picked up by the controller
    #[default]
    New,
    /// A pod was requested for the build
    Pending,
    /// The build pod is running
    Running,
    /// All build containers exited successfully
    Complete,
    /// A build container exited with a nonzero code
    Failed,
    /// The build pod vanished before the build finished
    Error,
    /// A user cancelled the build
    Cancelled,
}

impl BuildPhase {
    /// No transition ever leaves a terminal phase.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Error | Self::Cancelled
        )
    }

    /// Phases in which a cancellation request is still honoured.
    pub const fn is_cancellable(self) -> bool {
        !self.is_terminal()
    }

    /// Looks up the phase reached from `self` on `event`.
    ///
    /// # Errors
    ///
    /// - [`TransitionError`] if `self` is terminal, or if the build was already
    ///   admitted and `event` is [`BuildEvent::Admitted`]
    pub fn transition(self, event: BuildEvent) -> Result<Self, TransitionError> {
        let next = match (self, event) {
            (from, _) if from.is_terminal() => None,
            (Self::New, BuildEvent::Admitted) => Some(Self::Pending),
            (_, BuildEvent::Admitted) => None,
            (_, BuildEvent::PodRunning) => Some(Self::Running),
            (_, BuildEvent::PodSucceeded) => Some(Self::Complete),
            (_, BuildEvent::PodFailed) => Some(Self::Failed),
            (_, BuildEvent::CancelRequested) => Some(Self::Cancelled),
            (_, BuildEvent::PodLost) => Some(Self::Error),
        };
        next.ok_or(TransitionError { from: self, event })
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Something that happened to a build or to its pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    /// The controller requested a pod for a new build
    Admitted,
    /// The pod reports phase `Running`
    PodRunning,
    /// The pod finished and every container exited with code 0
    PodSucceeded,
    /// The pod finished and some container exited with a nonzero code
    PodFailed,
    /// A user asked for the build to stop
    CancelRequested,
    /// The pod was deleted while the build was still in flight
    PodLost,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("build in phase {from} cannot accept {event:?}")]
pub struct TransitionError {
    pub from: BuildPhase,
    pub event: BuildEvent,
}
