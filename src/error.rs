//! Error types for the evolution's public API.
//!
//! Invariant violations inside a tick (a constraint naming a particle with no
//! solver body, a body container mutated after commit) are bugs and panic.
//! Only caller-facing operations return [`EvolutionError`].

use std::fmt;

use crate::utils::allocator::ParticleHandle;

/// Errors reported by fallible evolution operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EvolutionError {
    /// A settings field is out of range.
    InvalidSettings {
        field: &'static str,
        reason: &'static str,
    },
    /// The handle does not name a live particle.
    ParticleNotFound(ParticleHandle),
    /// The operation requires a kinematic particle.
    NotKinematic(ParticleHandle),
    /// A joint or constraint was built with unusable parameters.
    InvalidConstraint(String),
}

impl fmt::Display for EvolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSettings { field, reason } => {
                write!(f, "invalid setting `{field}`: {reason}")
            }
            Self::ParticleNotFound(handle) => write!(f, "particle {handle} not found"),
            Self::NotKinematic(handle) => write!(f, "particle {handle} is not kinematic"),
            Self::InvalidConstraint(msg) => write!(f, "invalid constraint: {msg}"),
        }
    }
}

impl std::error::Error for EvolutionError {}

/// Convenient Result type alias for evolution operations.
pub type Result<T> = std::result::Result<T, EvolutionError>;
