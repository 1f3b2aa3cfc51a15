//! Trip state machine.
//!
//! States: `Open -> Accepted -> InProgress -> Completed`, with `Cancelled`
//! reachable from `Open` or `Accepted` only. Everything outside this table is
//! rejected without side effects.

use crate::error::{DispatchError, Result};
use crate::trip::{DriverId, OwnerId, Trip, TripStatus};

/// Events that drive trip status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripEvent {
    SelectDriver,
    Cancel,
    StartTrip,
    CompleteTrip,
}

/// The identity attempting a transition.
#[derive(Debug, Clone, Copy)]
pub enum Caller<'a> {
    Owner(&'a OwnerId),
    Driver(&'a DriverId),
}

/// Compute the successor status for `event`, or reject.
///
/// Terminal statuses fail with [`DispatchError::TripAlreadyFinalized`]; any
/// other off-table pair fails with [`DispatchError::IllegalTransition`].
pub fn next_status(current: TripStatus, event: TripEvent) -> Result<TripStatus> {
    if current.is_terminal() {
        return Err(DispatchError::TripAlreadyFinalized);
    }
    match (current, event) {
        (TripStatus::Open, TripEvent::SelectDriver) => Ok(TripStatus::Accepted),
        (TripStatus::Open, TripEvent::Cancel) => Ok(TripStatus::Cancelled),
        (TripStatus::Accepted, TripEvent::StartTrip) => Ok(TripStatus::InProgress),
        (TripStatus::Accepted, TripEvent::Cancel) => Ok(TripStatus::Cancelled),
        (TripStatus::InProgress, TripEvent::CompleteTrip) => Ok(TripStatus::Completed),
        _ => Err(DispatchError::IllegalTransition),
    }
}

/// Check the guard column of the transition table for `caller`.
///
/// Assumes `event` is on-table for the trip's current status; call
/// [`next_status`] first.
pub fn authorize(trip: &Trip, event: TripEvent, caller: Caller<'_>) -> Result<()> {
    let allowed = match (event, caller) {
        (TripEvent::SelectDriver, Caller::Owner(owner)) => owner == &trip.owner_id,
        (TripEvent::Cancel, Caller::Owner(owner)) => owner == &trip.owner_id,
        // A driver may cancel only once assigned (Accepted); never an Open trip.
        (TripEvent::Cancel, Caller::Driver(driver)) => {
            trip.status == TripStatus::Accepted && trip.is_assigned_to(driver)
        }
        (TripEvent::StartTrip, Caller::Driver(driver)) => trip.is_assigned_to(driver),
        (TripEvent::CompleteTrip, Caller::Driver(driver)) => trip.is_assigned_to(driver),
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(DispatchError::Unauthorized)
    }
}
