use std::fmt;

use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    bicycle::{BikeId, BikeStatus, Bicycle, Condition},
    clock::{Clock, SystemClock},
    error::RentalError,
    events::RentalEvent,
    fees::{FeePolicy, fee_breakdown, parse_rental_rate},
    inventory::SearchFilter,
    ledger::RentalId,
    membership::{MemberId, MembershipDirectory},
    observers::RentalObserver,
    store::RentalStore,
};

/// Default number of status transitions kept in memory
const DEFAULT_MAX_HISTORY: usize = 100;

/// A committed status change of one bicycle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusTransition {
    /// Bicycle that changed
    pub bike_id: BikeId,
    /// Status before the event
    pub from: BikeStatus,
    /// Status after the event
    pub to: BikeStatus,
    /// What happened
    pub event: RentalEvent,
    /// When it happened
    pub date: NaiveDate,
}

/// Result of a successful rent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalConfirmation {
    /// Newly opened rental
    pub rental_id: RentalId,
    /// Bicycle that went out
    pub bike_id: BikeId,
    /// Member who took it
    pub member_id: MemberId,
    /// Requested rental length
    pub duration_days: u32,
    /// Day the rental started
    pub rental_date: NaiveDate,
    /// Day the bicycle is due back
    pub expected_return_date: NaiveDate,
}

impl fmt::Display for RentalConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rental successful. Bicycle ID {} rented by Member ID {} for {} days. Expected return date: {}",
            self.bike_id,
            self.member_id,
            self.duration_days,
            self.expected_return_date.format("%Y-%m-%d")
        )
    }
}

/// Parameters of a return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRequest {
    /// Bicycle coming back
    pub bike_id: BikeId,
    /// Description of any damage
    pub damage_details: Option<String>,
    /// Flat damage charge; only applied when `damage_details` is set
    pub damage_charge: Decimal,
    /// Condition the bicycle is in now
    pub new_condition: Condition,
}

impl ReturnRequest {
    /// An undamaged return in `Good` condition
    #[must_use]
    pub fn new(bike_id: BikeId) -> Self {
        Self {
            bike_id,
            damage_details: None,
            damage_charge: Decimal::ZERO,
            new_condition: Condition::Good,
        }
    }

    /// Report damage with a flat charge
    #[must_use]
    pub fn with_damage(mut self, details: &str, charge: Decimal) -> Self {
        self.damage_details = Some(details.to_string());
        self.damage_charge = charge;
        self
    }

    /// Record the condition the bicycle came back in
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.new_condition = condition;
        self
    }
}

/// Result of a successful return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    /// Rental that was closed
    pub rental_id: RentalId,
    /// Bicycle that came back
    pub bike_id: BikeId,
    /// Whole days the bicycle was out
    pub days_rented: u32,
    /// Charge for days beyond the allowance
    pub late_fee: Decimal,
    /// Damage charge actually applied
    pub damage_charge: Decimal,
    /// Everything charged
    pub total_fees: Decimal,
    /// Condition recorded
    pub condition: Condition,
    /// Status the bicycle now has
    pub status: BikeStatus,
    /// Non-fatal problems met while processing, e.g. an unparseable rate
    pub warnings: Vec<RentalError>,
}

impl fmt::Display for ReturnReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bicycle Return processed for Bicycle ID {}.", self.bike_id)?;
        if self.late_fee > Decimal::ZERO {
            write!(f, " Late fee: £{:.2}.", self.late_fee)?;
        }
        if self.damage_charge > Decimal::ZERO {
            write!(f, " Damage charge: £{:.2}.", self.damage_charge)?;
        }
        if self.condition == Condition::Damaged {
            write!(f, " Bicycle marked as 'Damaged' and made unavailable for rental.")?;
        }
        Ok(())
    }
}

/// Orchestrates rents and returns against the store
///
/// Every check runs before anything is written, and the writes of one
/// operation happen inside [`RentalStore::atomically`]. Mutating calls take
/// `&mut self`; share a manager between threads behind a `Mutex`.
pub struct RentalManager {
    /// Bicycles and rentals
    store: RentalStore,
    /// Late-fee rule
    policy: FeePolicy,
    /// Source of today's date
    clock: Box<dyn Clock + Send>,
    /// Registered status change observers
    observers: Vec<Box<dyn RentalObserver + Send>>,
    /// Recent committed transitions, oldest first
    history: Vec<StatusTransition>,
    /// Maximum number of history entries to keep
    max_history_size: usize,
}

// Manual implementation of Debug for RentalManager
impl fmt::Debug for RentalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RentalManager")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("today", &self.clock.today())
            .field("observers_count", &self.observers.len())
            .field("history", &self.history)
            .field("max_history_size", &self.max_history_size)
            .finish()
    }
}

impl RentalManager {
    /// Create a manager over `store` using the system date
    #[must_use]
    pub fn new(store: RentalStore, policy: FeePolicy) -> Self {
        Self {
            store,
            policy,
            clock: Box::new(SystemClock),
            observers: Vec::new(),
            history: Vec::new(),
            max_history_size: DEFAULT_MAX_HISTORY,
        }
    }

    /// Use a different source of today's date
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the clock on an existing manager
    pub fn set_clock(&mut self, clock: Box<dyn Clock + Send>) {
        self.clock = clock;
    }

    /// Register an observer to be notified of committed status changes
    pub fn register_observer(&mut self, observer: Box<dyn RentalObserver + Send>) {
        self.observers.push(observer);
    }

    /// Limit the number of transitions kept in memory
    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size;
        self.trim_history();
    }

    /// Read access to both tables
    #[must_use]
    pub fn store(&self) -> &RentalStore {
        &self.store
    }

    /// Give the tables back, e.g. to persist them
    #[must_use]
    pub fn into_store(self) -> RentalStore {
        self.store
    }

    /// Current status of a bicycle
    ///
    /// # Errors
    ///
    /// Returns `RentalError::BikeNotFound` for an unknown id.
    pub fn get_status(&self, bike_id: BikeId) -> Result<BikeStatus, RentalError> {
        self.store.inventory.get_status(bike_id)
    }

    /// Search the inventory
    ///
    /// # Errors
    ///
    /// Returns `RentalError::InvalidArgument` when no criterion is set.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<&Bicycle>, RentalError> {
        self.store.inventory.search(filter)
    }

    /// Rent a bicycle to a member for `duration_days`
    ///
    /// Checks run in order: eligibility, rental limit, bicycle existence,
    /// availability. Nothing is written unless all of them pass.
    ///
    /// # Errors
    ///
    /// * `RentalError::InvalidArgument` for a zero duration
    /// * `RentalError::MemberInactive` if the member is not eligible today
    /// * `RentalError::RentalLimitExceeded` if the member is at their limit
    /// * `RentalError::BikeNotFound` / `RentalError::BikeUnavailable`
    pub fn rent_bike(
        &mut self,
        members: &MembershipDirectory,
        member_id: MemberId,
        bike_id: BikeId,
        duration_days: u32,
    ) -> Result<RentalConfirmation, RentalError> {
        if duration_days == 0 {
            return Err(RentalError::InvalidArgument(
                "rental duration must be at least one day".to_string(),
            ));
        }
        let today = self.clock.today();

        if !members.is_eligible(member_id, today) {
            debug!("Rejected rent of bicycle {bike_id}: member {member_id} not eligible");
            return Err(RentalError::MemberInactive(member_id));
        }

        let limit = members.rental_limit(member_id);
        let open = self.store.ledger.count_open_rentals(member_id);
        if open >= usize::try_from(limit).unwrap_or(usize::MAX) {
            debug!("Rejected rent of bicycle {bike_id}: member {member_id} holds {open}/{limit}");
            return Err(RentalError::RentalLimitExceeded { member_id, limit });
        }

        let status = self.store.inventory.get_status(bike_id)?;
        if status != BikeStatus::Available {
            return Err(RentalError::BikeUnavailable { bike_id, status });
        }

        let expected_return_date = today
            .checked_add_days(Days::new(u64::from(duration_days)))
            .ok_or_else(|| {
                RentalError::InvalidArgument(format!("duration of {duration_days} days is out of range"))
            })?;

        let rental_id = self.store.atomically(|s| {
            s.inventory.mark_rented(bike_id)?;
            s.ledger.create_rental(bike_id, member_id, today, expected_return_date)
        })?;

        info!("Rental {rental_id}: bicycle {bike_id} to member {member_id} until {expected_return_date}");
        self.record_transition(
            bike_id,
            status,
            BikeStatus::Rented,
            RentalEvent::Rent { rental_id, member_id },
            today,
        );

        Ok(RentalConfirmation {
            rental_id,
            bike_id,
            member_id,
            duration_days,
            rental_date: today,
            expected_return_date,
        })
    }

    /// Take a bicycle back, charge fees and record its condition
    ///
    /// An unparseable rental rate does not stop the return: it is charged as
    /// zero and reported in [`ReturnReceipt::warnings`].
    ///
    /// # Errors
    ///
    /// * `RentalError::NoActiveRental` if the bicycle is not out
    /// * `RentalError::InvalidArgument` for a negative damage charge or a
    ///   clock that reads earlier than the rental date
    pub fn return_bike(&mut self, request: ReturnRequest) -> Result<ReturnReceipt, RentalError> {
        let ReturnRequest { bike_id, damage_details, damage_charge, new_condition } = request;

        let rental = self
            .store
            .ledger
            .open_rental(bike_id)
            .ok_or(RentalError::NoActiveRental(bike_id))?;
        let (rental_id, rental_date) = (rental.id, rental.rental_date);

        let bike = self.store.inventory.get(bike_id).ok_or(RentalError::BikeNotFound(bike_id))?;
        let from = bike.status;

        if damage_charge.is_sign_negative() {
            return Err(RentalError::InvalidArgument("damage charge must not be negative".to_string()));
        }

        let mut warnings = Vec::new();
        let daily_rate = match parse_rental_rate(&bike.rental_rate) {
            Ok(rate) => rate.amount,
            Err(e) => {
                warn!("Bicycle {bike_id}: {e}; charging late days at a zero rate");
                warnings.push(e);
                Decimal::ZERO
            }
        };

        let applied_damage_charge = if damage_details.is_some() {
            damage_charge
        } else {
            if !damage_charge.is_zero() {
                let ignored = RentalError::InvalidArgument(format!(
                    "damage charge {damage_charge} ignored without damage details"
                ));
                warn!("Bicycle {bike_id}: {ignored}");
                warnings.push(ignored);
            }
            Decimal::ZERO
        };

        let today = self.clock.today();
        let breakdown =
            fee_breakdown(rental_date, today, daily_rate, &self.policy, applied_damage_charge)?;
        let total_fees = breakdown.total();

        let status = self.store.atomically(|s| {
            s.ledger.close_rental(rental_id, today, total_fees, damage_details)?;
            s.inventory.update_condition(bike_id, new_condition, new_condition.status_after_return())
        })?;

        info!("Rental {rental_id}: bicycle {bike_id} returned {new_condition}, charged {total_fees}");
        self.record_transition(
            bike_id,
            from,
            status,
            RentalEvent::Return { rental_id, fees: total_fees, condition: new_condition },
            today,
        );

        Ok(ReturnReceipt {
            rental_id,
            bike_id,
            days_rented: breakdown.days_rented,
            late_fee: breakdown.late_fee,
            damage_charge: breakdown.damage_charge,
            total_fees,
            condition: new_condition,
            status,
            warnings,
        })
    }

    /// Get the recent transition history, oldest first
    #[must_use]
    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }

    /// Append to the history and notify observers
    fn record_transition(
        &mut self,
        bike_id: BikeId,
        from: BikeStatus,
        to: BikeStatus,
        event: RentalEvent,
        date: NaiveDate,
    ) {
        for observer in &self.observers {
            observer.on_status_change(bike_id, from, to, &event);
        }
        self.history.push(StatusTransition { bike_id, from, to, event, date });
        self.trim_history();
    }

    /// Drop the oldest entries beyond the size limit
    fn trim_history(&mut self) {
        let excess = self.history.len().saturating_sub(self.max_history_size);
        if excess > 0 {
            self.history = self.history.split_off(excess);
        }
    }
}
