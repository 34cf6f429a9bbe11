//! Error types for the score-integrity simulation.

use thiserror::Error;

/// Errors raised by the generator, the distortion transforms and the
/// orchestrator.
///
/// Parameter errors are never clamped away: an out-of-domain value aborts
/// the whole run and no partial tree is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A configured value is outside its valid domain.
    #[error("Invalid parameter in {stage}{}: {field} = {value} ({reason})",
        .subject.as_ref().map(|s| format!(" [subject {}]", s)).unwrap_or_default())]
    InvalidParameter {
        /// Stage that rejected the value (e.g. "generator", "level1")
        stage: &'static str,

        /// Subject the value belongs to, if any
        subject: Option<String>,

        /// Name of the offending field
        field: &'static str,

        /// The rejected value
        value: f64,

        /// Human-readable constraint
        reason: &'static str,
    },

    /// A subject has generation parameters but no passing mark.
    #[error("No passing mark configured for subject {subject}")]
    MissingPassingMark {
        subject: String,
    },

    /// A subject was requested that the scores do not carry.
    #[error("Unknown subject {subject}")]
    UnknownSubject {
        subject: String,
    },

    /// An orchestrator phase was invoked out of order.
    #[error("Phase order violated: expected {expected}, found {actual}")]
    PhaseOrder {
        expected: &'static str,
        actual: &'static str,
    },

    /// A structural invariant of the hierarchy tree does not hold.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl SimError {
    /// Creates an invalid-parameter error without subject context.
    pub fn invalid(
        stage: &'static str,
        field: &'static str,
        value: f64,
        reason: &'static str,
    ) -> Self {
        Self::InvalidParameter {
            stage,
            subject: None,
            field,
            value,
            reason,
        }
    }

    /// Attaches a subject name to an invalid-parameter error.
    pub fn for_subject(self, name: &str) -> Self {
        match self {
            Self::InvalidParameter { stage, field, value, reason, .. } => Self::InvalidParameter {
                stage,
                subject: Some(name.to_string()),
                field,
                value,
                reason,
            },
            other => other,
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type SimResult<T> = Result<T, SimError>;
