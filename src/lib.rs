//! Bicycle rental shop core: inventory, memberships, rentals and fees.
//!
//! The [`RentalManager`] is the single entry point that changes bicycle
//! status. It checks eligibility against a [`MembershipDirectory`], applies
//! each rent or return to the [`RentalStore`] as one unit and computes fees
//! through the pure functions in [`fees`].

pub mod bicycle;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fees;
pub mod import;
pub mod inventory;
pub mod ledger;
pub mod manager;
pub mod membership;
pub mod observers;
pub mod recommend;
pub mod store;

pub use bicycle::{BikeId, BikeStatus, Bicycle, Condition};
pub use config::RentalConfig;
pub use error::RentalError;
pub use inventory::SearchFilter;
pub use manager::{RentalManager, ReturnRequest};
pub use membership::{MemberId, MembershipDirectory};
pub use store::RentalStore;
