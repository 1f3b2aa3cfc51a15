//! Application-wide error taxonomy.

use thiserror::Error;

/// Errors surfaced by dispatch operations.
///
/// Every mutation failure leaves stored state unchanged; callers are expected
/// to refresh their view (the clients poll) and re-decide rather than retry
/// blindly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Malformed or missing input; the caller must correct and resubmit.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation is not legal given the trip's current status.
    #[error("operation not permitted in the trip's current status")]
    InvalidState,

    /// Status transition outside the trip state machine.
    #[error("illegal trip status transition")]
    IllegalTransition,

    /// The trip reached a terminal status; no further transitions exist.
    #[error("trip is already finalized")]
    TripAlreadyFinalized,

    /// Select-driver named a driver who never expressed interest.
    #[error("driver has not expressed interest in this trip")]
    NotInterested,

    /// The driver is already assigned to another active trip.
    #[error("driver is already assigned to an active trip")]
    DriverBusy,

    /// Caller is not the owner / assigned driver for a restricted operation.
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    /// Unknown trip or driver id.
    #[error("not found")]
    NotFound,

    /// Transient infrastructure failure after internal retries were exhausted.
    #[error("service temporarily unavailable")]
    ServiceUnavailable,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
