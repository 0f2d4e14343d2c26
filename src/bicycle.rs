use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RentalError;

/// Primary key of a bicycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct BikeId(pub u32);

impl fmt::Display for BikeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BikeId {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|e| RentalError::InvalidArgument(format!("bicycle id {s:?}: {e}")))
    }
}

/// Physical condition of a bicycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Condition {
    /// Never rented out
    New,
    /// Normal wear
    #[default]
    Good,
    /// Usable but worn
    Fair,
    /// Needs repair before it can go out again
    Damaged,
}

impl Condition {
    /// Every condition, in declaration order
    pub const ALL: [Self; 4] = [Self::New, Self::Good, Self::Fair, Self::Damaged];

    /// Status a bicycle takes on when it comes back in this condition
    #[must_use]
    pub fn status_after_return(self) -> BikeStatus {
        match self {
            Self::Damaged => BikeStatus::Unavailable,
            Self::New | Self::Good | Self::Fair => BikeStatus::Available,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Damaged => "Damaged",
        };
        f.write_str(name)
    }
}

impl FromStr for Condition {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RentalError::InvalidArgument(format!("unknown condition {s:?}")))
    }
}

/// Rental status of a bicycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum BikeStatus {
    /// On the rack and rentable
    #[default]
    Available,
    /// Out with a member; exactly one open rental references it
    Rented,
    /// Withdrawn from service
    Unavailable,
}

impl BikeStatus {
    /// Every status, in declaration order
    pub const ALL: [Self; 3] = [Self::Available, Self::Rented, Self::Unavailable];
}

impl fmt::Display for BikeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "Available",
            Self::Rented => "Rented",
            Self::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}

impl FromStr for BikeStatus {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RentalError::InvalidArgument(format!("unknown status {s:?}")))
    }
}

/// A row of the bicycles table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bicycle {
    /// Unique identifier
    pub id: BikeId,
    /// Manufacturer
    pub brand: String,
    /// Kind of bicycle, e.g. "Mountain Bike"
    pub bike_type: String,
    /// Frame size label, e.g. "Medium"
    pub frame_size: String,
    /// Rate as recorded, e.g. "£10/day"; parsed only when fees are computed
    pub rental_rate: String,
    /// When the bicycle was bought, if known
    pub purchase_date: Option<NaiveDate>,
    /// Physical condition
    pub condition: Condition,
    /// Rental status
    pub status: BikeStatus,
}

impl Bicycle {
    /// Create an available bicycle in good condition
    #[must_use]
    pub fn new(id: BikeId, brand: &str, bike_type: &str, frame_size: &str, rental_rate: &str) -> Self {
        Self {
            id,
            brand: brand.to_string(),
            bike_type: bike_type.to_string(),
            frame_size: frame_size.to_string(),
            rental_rate: rental_rate.to_string(),
            purchase_date: None,
            condition: Condition::Good,
            status: BikeStatus::Available,
        }
    }

    /// Set the purchase date
    #[must_use]
    pub fn with_purchase_date(mut self, date: NaiveDate) -> Self {
        self.purchase_date = Some(date);
        self
    }

    /// Set condition and status, forcing `Unavailable` for damaged bicycles
    #[must_use]
    pub fn with_condition(mut self, condition: Condition, status: BikeStatus) -> Self {
        self.condition = condition;
        self.status = if condition == Condition::Damaged { BikeStatus::Unavailable } else { status };
        self
    }
}

impl fmt::Display for Bicycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let purchased =
            self.purchase_date.map_or_else(|| "unknown".to_string(), |d| d.format("%Y-%m-%d").to_string());
        write!(
            f,
            "ID: {}, Brand: {}, Type: {}, Frame Size: {}, Rental Rate: {}, Purchase Date: {}, Condition: {}, Status: {}",
            self.id,
            self.brand,
            self.bike_type,
            self.frame_size,
            self.rental_rate,
            purchased,
            self.condition,
            self.status
        )
    }
}
