use thiserror::Error;

use crate::{
    bicycle::{BikeId, BikeStatus},
    ledger::RentalId,
    membership::MemberId,
};

/// Errors produced by rental operations.
///
/// Everything except [`RentalError::Persistence`] and [`RentalError::Load`]
/// is recoverable at the call site and leaves the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RentalError {
    /// The member is unknown, flagged inactive, or past the membership end date
    #[error("Member ID {0} is not active")]
    MemberInactive(MemberId),
    /// The member already holds as many open rentals as allowed
    #[error("Member ID {member_id} has reached the rental limit of {limit}")]
    RentalLimitExceeded {
        /// Member making the request
        member_id: MemberId,
        /// Configured limit for that member
        limit: u32,
    },
    /// No bicycle with this id exists in the inventory
    #[error("Bicycle ID {0} does not exist")]
    BikeNotFound(BikeId),
    /// The bicycle exists but cannot be rented right now
    #[error("Bicycle ID {bike_id} is not available for rent. It is {status}")]
    BikeUnavailable {
        /// Requested bicycle
        bike_id: BikeId,
        /// Its current status
        status: BikeStatus,
    },
    /// A return was requested for a bicycle that is not out
    #[error("No active rental found for Bicycle ID {0}")]
    NoActiveRental(BikeId),
    /// A rental rate string could not be parsed into an amount
    #[error("Could not parse rental rate {0:?}")]
    InvalidFormat(String),
    /// A caller supplied an argument outside the operation's domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The store would break the one-open-rental-per-bicycle rule
    #[error("Conflict on Bicycle ID {bike_id}: {reason}")]
    Conflict {
        /// Bicycle the conflict concerns
        bike_id: BikeId,
        /// What is inconsistent
        reason: String,
    },
    /// No open rental carries this id
    #[error("No open rental with ID {0}")]
    NotFound(RentalId),
    /// A status mutation was requested from the wrong status
    #[error("Bicycle ID {bike_id} cannot move from {from} to {to}")]
    InvalidState {
        /// Bicycle being mutated
        bike_id: BikeId,
        /// Status found in the store
        from: BikeStatus,
        /// Status that was requested
        to: BikeStatus,
    },
    /// Error occurred while saving state
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// Error occurred while loading state
    #[error("Load error: {0}")]
    Load(String),
}

impl RentalError {
    /// Whether a caller should give up rather than report and continue
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Load(_))
    }
}
