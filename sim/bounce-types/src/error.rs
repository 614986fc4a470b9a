//! Error types for rollout and gradient operations.

use thiserror::Error;

use crate::BufferId;

/// Errors that can occur while building, simulating or differentiating a rollout.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Gradient requested for a buffer the tape never read.
    #[error("buffer {buffer} was not read during the recorded rollout")]
    UnrecordedInput {
        /// The buffer that was queried.
        buffer: BufferId,
    },

    /// Contact parameters do not match the integrator variant.
    #[error("configuration mismatch for {integrator} integrator: {reason}")]
    ConfigurationMismatch {
        /// Name of the integrator variant.
        integrator: String,
        /// What is wrong with the contact parameters.
        reason: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// A tape was reused without being reset first.
    #[error("tape holds data from a previous use; call reset() or reset_accumulators() first")]
    TapeNotReset,

    /// A reverse pass was requested on a tape with nothing recorded.
    #[error("tape is empty; record a rollout before calling backward()")]
    EmptyTape,

    /// Gradients were requested before a reverse pass ran.
    #[error("no reverse pass has been run on this tape")]
    BackwardNotRun,

    /// State index outside the trajectory.
    #[error("state index {index} out of range for trajectory of {len} states")]
    StateIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of states in the trajectory.
        len: usize,
    },

    /// Vector component outside `0..3`.
    #[error("component {0} out of range (expected 0, 1 or 2)")]
    ComponentOutOfRange(usize),

    /// The state has no external-force channel.
    #[error("state {state} has no external force channel")]
    MissingControlChannel {
        /// Index of the state.
        state: usize,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a configuration mismatch error.
    #[must_use]
    pub fn mismatch(integrator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationMismatch {
            integrator: integrator.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error (invalid or mismatched).
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::ConfigurationMismatch { .. } | Self::InvalidTimestep(_)
        )
    }
}
