use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{bicycle::Condition, ledger::RentalId, membership::MemberId};

/// Events that move a bicycle between statuses
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RentalEvent {
    /// A member took the bicycle out
    Rent {
        /// Rental opened by the event
        rental_id: RentalId,
        /// Member who took the bicycle
        member_id: MemberId,
    },
    /// The bicycle came back
    Return {
        /// Rental closed by the event
        rental_id: RentalId,
        /// Total charged
        fees: Decimal,
        /// Condition recorded at return
        condition: Condition,
    },
}
