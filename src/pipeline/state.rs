//! Pipeline state management

use std::time::Instant;

use thiserror::Error;

/// Pipeline state machine
///
/// Represents the lifecycle of a sender or receiver pipeline. State
/// transitions are validated so coordinators can't skip steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is idle and not processing
    Idle,

    /// Stages are being wired up
    Initializing,

    /// Pipeline is moving frames
    Running {
        /// When the pipeline started running
        started_at: Instant,
    },

    /// Frames are ignored until resumed
    Paused {
        /// When the pipeline was paused
        paused_at: Instant,
    },

    /// Pipeline is stopping (transitioning to Stopped)
    Stopping,

    /// Pipeline has stopped and cannot be restarted
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid pipeline transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl PipelineState {
    pub fn running() -> Self {
        PipelineState::Running {
            started_at: Instant::now(),
        }
    }

    pub fn paused() -> Self {
        PipelineState::Paused {
            paused_at: Instant::now(),
        }
    }

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, Initializing) => true,

            (Initializing, Running { .. }) => true,
            (Initializing, Stopping) => true,

            (Running { .. }, Paused { .. }) => true,
            (Running { .. }, Stopping) => true,

            (Paused { .. }, Running { .. }) => true,
            (Paused { .. }, Stopping) => true,

            (Stopping, Stopped) => true,

            (Stopped, _) => false,

            (a, b) if a.description() == b.description() => true,

            _ => false,
        }
    }

    /// Move to `target` if the transition is allowed
    pub fn transition(&mut self, target: PipelineState) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(&target) {
            return Err(InvalidTransition {
                from: *self,
                to: target,
            });
        }
        *self = target;
        Ok(())
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Initializing => "Initializing",
            PipelineState::Running { .. } => "Running",
            PipelineState::Paused { .. } => "Paused",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Check if the pipeline is currently active (running or paused)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::Running { .. } | PipelineState::Paused { .. }
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PipelineState::Paused { .. })
    }

    /// Check if the pipeline is stopped or stopping
    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Stopping)
    }

    /// Get the duration since the pipeline started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
