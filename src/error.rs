//! Error taxonomy for manager operations. Every recursive operator returns
//! a `Result<Nid, ManagerError>` instead of CUDD's sentinel-plus-error-code
//! pair.
use std::fmt;

/// Why an operator, canonicalization request, or reordering pass failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerError {
    /// Allocation failed against the OS or the configured memory budget.
    MemoryOut,
    /// Live node count exceeded the configured hard ceiling.
    TooManyNodes,
    /// The caller's deadline passed at a polling point.
    TimeoutExpired,
    /// An abstraction operator was asked to eliminate a non-cube.
    InvalidCube,
    /// A precondition on the arguments was violated (e.g. `n_bits <= 0`).
    InvalidInput,
    /// An internal invariant check failed; the manager should be considered unusable.
    InternalError,
    /// A user hook returned a falsy result, requesting cooperative abort.
    TerminationRequested,
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ManagerError::MemoryOut => "out of memory",
            ManagerError::TooManyNodes => "live node count exceeds configured ceiling",
            ManagerError::TimeoutExpired => "operation deadline expired",
            ManagerError::InvalidCube => "abstraction cube is not a conjunction of literals",
            ManagerError::InvalidInput => "invalid argument",
            ManagerError::InternalError => "internal invariant violated",
            ManagerError::TerminationRequested => "a hook requested termination",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ManagerError {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ManagerError>;
