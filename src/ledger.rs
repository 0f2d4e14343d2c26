use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{bicycle::BikeId, error::RentalError, membership::MemberId};

/// Primary key of a rental, assigned by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct RentalId(pub u64);

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the rentals table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rental {
    /// Unique identifier
    pub id: RentalId,
    /// Bicycle that went out
    pub bike_id: BikeId,
    /// Member who rented it; absent only for imported history with a bad member id
    pub member_id: Option<MemberId>,
    /// Day the rental started
    pub rental_date: NaiveDate,
    /// Day the bicycle is due back; absent for imported history
    pub expected_return_date: Option<NaiveDate>,
    /// Day the bicycle came back; `None` while the rental is open
    pub return_date: Option<NaiveDate>,
    /// Total charged at return
    pub fees: Option<Decimal>,
    /// Damage reported at return
    pub damage_details: Option<String>,
}

impl Rental {
    /// Whether the bicycle is still out
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// The rentals table
///
/// Rows are appended when a bicycle goes out and closed exactly once when it
/// comes back. Rows are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RentalLedger {
    /// Rentals in creation order; ids are strictly increasing
    rentals: Vec<Rental>,
    /// Id handed to the next created rental
    next_id: u64,
}

impl RentalLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self { rentals: Vec::new(), next_id: 1 }
    }

    /// Number of open rentals held by a member
    #[must_use]
    pub fn count_open_rentals(&self, member_id: MemberId) -> usize {
        self.rentals.iter().filter(|r| r.is_open() && r.member_id == Some(member_id)).count()
    }

    /// The open rental for a bicycle, if it is out
    #[must_use]
    pub fn open_rental(&self, bike_id: BikeId) -> Option<&Rental> {
        self.rentals.iter().find(|r| r.is_open() && r.bike_id == bike_id)
    }

    /// Append a new open rental
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Conflict` if the bicycle already has an open
    /// rental, and `RentalError::InvalidArgument` if the expected return date
    /// precedes the rental date.
    pub fn create_rental(
        &mut self,
        bike_id: BikeId,
        member_id: MemberId,
        rental_date: NaiveDate,
        expected_return_date: NaiveDate,
    ) -> Result<RentalId, RentalError> {
        if let Some(open) = self.open_rental(bike_id) {
            return Err(RentalError::Conflict {
                bike_id,
                reason: format!("rental {} is still open", open.id),
            });
        }
        if expected_return_date < rental_date {
            return Err(RentalError::InvalidArgument(format!(
                "expected return date {expected_return_date} precedes rental date {rental_date}"
            )));
        }

        let id = self.allocate_id()?;
        self.rentals.push(Rental {
            id,
            bike_id,
            member_id: Some(member_id),
            rental_date,
            expected_return_date: Some(expected_return_date),
            return_date: None,
            fees: None,
            damage_details: None,
        });
        Ok(id)
    }

    /// Close an open rental
    ///
    /// # Errors
    ///
    /// Returns `RentalError::NotFound` if no open rental carries `rental_id`,
    /// and `RentalError::InvalidArgument` if the return date precedes the
    /// rental date.
    pub fn close_rental(
        &mut self,
        rental_id: RentalId,
        return_date: NaiveDate,
        fees: Decimal,
        damage_details: Option<String>,
    ) -> Result<(), RentalError> {
        let rental = self
            .rentals
            .iter_mut()
            .find(|r| r.id == rental_id && r.is_open())
            .ok_or(RentalError::NotFound(rental_id))?;
        if return_date < rental.rental_date {
            return Err(RentalError::InvalidArgument(format!(
                "return date {return_date} precedes rental date {}",
                rental.rental_date
            )));
        }

        rental.return_date = Some(return_date);
        rental.fees = Some(fees);
        rental.damage_details = damage_details;
        Ok(())
    }

    /// Append an already closed rental from historical records
    ///
    /// # Errors
    ///
    /// Returns `RentalError::InvalidArgument` if the return date precedes the
    /// rental date.
    pub fn record_history(
        &mut self,
        bike_id: BikeId,
        member_id: Option<MemberId>,
        rental_date: NaiveDate,
        return_date: NaiveDate,
    ) -> Result<RentalId, RentalError> {
        if return_date < rental_date {
            return Err(RentalError::InvalidArgument(format!(
                "return date {return_date} precedes rental date {rental_date}"
            )));
        }
        let id = self.allocate_id()?;
        self.rentals.push(Rental {
            id,
            bike_id,
            member_id,
            rental_date,
            expected_return_date: None,
            return_date: Some(return_date),
            fees: None,
            damage_details: None,
        });
        Ok(id)
    }

    /// Look up a rental by id
    #[must_use]
    pub fn get(&self, rental_id: RentalId) -> Option<&Rental> {
        self.rentals.iter().find(|r| r.id == rental_id)
    }

    /// Every rental in creation order
    #[must_use]
    pub fn rentals(&self) -> &[Rental] {
        &self.rentals
    }

    /// Every open rental
    pub fn open_rentals(&self) -> impl Iterator<Item = &Rental> {
        self.rentals.iter().filter(|r| r.is_open())
    }

    /// Hand out the next rental id
    fn allocate_id(&mut self) -> Result<RentalId, RentalError> {
        // A deserialized ledger from an older file may carry next_id = 0
        let id = self.next_id.max(1);
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| RentalError::Persistence("rental id space exhausted".to_string()))?;
        Ok(RentalId(id))
    }
}
