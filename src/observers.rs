use log::{info, warn};

use crate::{
    bicycle::{BikeId, BikeStatus, Condition},
    events::RentalEvent,
};

/// Trait for status change observation
pub trait RentalObserver {
    /// Called after a rent or return has been committed
    fn on_status_change(&self, bike_id: BikeId, from: BikeStatus, to: BikeStatus, event: &RentalEvent);
}

/// Logs all committed transitions
#[derive(Debug)]
pub struct TransactionLogger;

impl RentalObserver for TransactionLogger {
    fn on_status_change(&self, bike_id: BikeId, from: BikeStatus, to: BikeStatus, event: &RentalEvent) {
        info!("Bicycle {bike_id}: {from} --({event:?})--> {to}");
    }
}

/// Flags bicycles that come back damaged and leave service
#[derive(Debug)]
pub struct DamageNotifier;

impl RentalObserver for DamageNotifier {
    fn on_status_change(&self, bike_id: BikeId, from: BikeStatus, to: BikeStatus, event: &RentalEvent) {
        if let (BikeStatus::Rented, BikeStatus::Unavailable, RentalEvent::Return { condition, .. }) =
            (from, to, event)
        {
            if *condition == Condition::Damaged {
                warn!("Bicycle {bike_id} returned damaged and is out of service until repaired");
            }
        }
    }
}
