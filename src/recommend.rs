//! Purchase recommendations from inventory and rental history.
//!
//! Each recommender names one bicycle type; [`purchase_order`] lets them
//! vote and sizes an order for the winner against a budget.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{bicycle::Condition, store::RentalStore};

/// Default unit cost per bicycle type
#[must_use]
pub fn default_bicycle_costs() -> BTreeMap<String, Decimal> {
    [
        ("Mountain Bike", 300),
        ("Hybrid Bike", 350),
        ("Electric Bike", 1000),
        ("Road Bike", 200),
        ("Gravel Bike", 230),
        ("Folding Bike", 400),
        ("BMX", 250),
    ]
    .into_iter()
    .map(|(bike_type, cost)| (bike_type.to_string(), Decimal::from(cost)))
    .collect()
}

/// Why a type was recommended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Most rentals of any type
    RentalFrequency {
        /// Recommended type
        bike_type: String,
        /// Rentals recorded for it
        rentals: usize,
    },
    /// Type of the oldest bicycle
    Age {
        /// Recommended type
        bike_type: String,
        /// Age in whole years
        years: i32,
    },
    /// Highest share of damaged bicycles
    Condition {
        /// Recommended type
        bike_type: String,
        /// Percentage of that type's bicycles in `Damaged` condition
        damaged_percent: Decimal,
    },
    /// Type rented most often, counted over the bicycles table
    TypePopularity {
        /// Recommended type
        bike_type: String,
        /// Rentals recorded for it
        rentals: usize,
    },
}

impl Recommendation {
    /// The recommended bicycle type
    #[must_use]
    pub fn bike_type(&self) -> &str {
        match self {
            Self::RentalFrequency { bike_type, .. }
            | Self::Age { bike_type, .. }
            | Self::Condition { bike_type, .. }
            | Self::TypePopularity { bike_type, .. } => bike_type,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RentalFrequency { bike_type, rentals } => {
                write!(f, "Rental frequency: {bike_type} ({rentals} rentals)")
            }
            Self::Age { bike_type, years } => write!(f, "Age: {bike_type} ({years} years old)"),
            Self::Condition { bike_type, damaged_percent } => {
                write!(f, "Condition: {bike_type} ({damaged_percent:.1}% damaged)")
            }
            Self::TypePopularity { bike_type, rentals } => {
                write!(f, "Popularity: {bike_type} ({rentals} rentals)")
            }
        }
    }
}

/// Outcome of sizing an order against a budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchasePlan {
    /// The budget covers at least one unit
    Order {
        /// Type to buy
        bike_type: String,
        /// Whole units the budget covers
        units: u64,
        /// Price of one unit
        cost_per_unit: Decimal,
        /// `units * cost_per_unit`
        total_cost: Decimal,
    },
    /// The budget is below one unit, or the type has no known cost
    BudgetShortfall {
        /// Type that was recommended
        bike_type: String,
        /// Price of one unit; zero when unknown
        cost_per_unit: Decimal,
    },
}

impl fmt::Display for PurchasePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Order { bike_type, units, cost_per_unit, total_cost } => write!(
                f,
                "Recommended purchase: {units} x {bike_type} at £{cost_per_unit}/unit, total £{total_cost}"
            ),
            Self::BudgetShortfall { bike_type, cost_per_unit } if cost_per_unit.is_zero() => {
                write!(f, "Recommended bicycle: {bike_type}, but its cost is unknown")
            }
            Self::BudgetShortfall { bike_type, cost_per_unit } => write!(
                f,
                "Recommended bicycle: {bike_type}. To purchase at least 1 unit, you need at least £{cost_per_unit}"
            ),
        }
    }
}

/// Pick the first key with the highest value from an ordered sequence
fn first_max<K, V: PartialOrd>(entries: impl IntoIterator<Item = (K, V)>) -> Option<(K, V)> {
    let mut best: Option<(K, V)> = None;
    for (key, value) in entries {
        let better = best.as_ref().is_none_or(|(_, top)| value > *top);
        if better {
            best = Some((key, value));
        }
    }
    best
}

/// Rentals per bicycle type, ordered by type name
fn rentals_by_type(store: &RentalStore) -> BTreeMap<&str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for rental in store.ledger.rentals() {
        if let Some(bike) = store.inventory.get(rental.bike_id) {
            let count = counts.entry(bike.bike_type.as_str()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
    counts
}

/// Type with the most recorded rentals; ties go to the alphabetically first type
#[must_use]
pub fn by_rental_frequency(store: &RentalStore) -> Option<Recommendation> {
    first_max(rentals_by_type(store)).map(|(bike_type, rentals)| Recommendation::RentalFrequency {
        bike_type: bike_type.to_string(),
        rentals,
    })
}

/// Most popular type among the bicycles that have been rented
///
/// Counts the same rentals as [`by_rental_frequency`], so the two agree and
/// the most rented type carries two votes in [`purchase_order`].
#[must_use]
pub fn by_type_popularity(store: &RentalStore) -> Option<Recommendation> {
    first_max(rentals_by_type(store)).map(|(bike_type, rentals)| Recommendation::TypePopularity {
        bike_type: bike_type.to_string(),
        rentals,
    })
}

/// Type of the oldest bicycle, by purchase year
///
/// A bicycle without a purchase date counts as bought this year.
#[must_use]
pub fn by_age(store: &RentalStore, today: NaiveDate) -> Option<Recommendation> {
    let current_year = today.year();
    let ages = store.inventory.iter().map(|bike| {
        let purchase_year = bike.purchase_date.map_or(current_year, |d| d.year());
        (bike.bike_type.as_str(), current_year.saturating_sub(purchase_year))
    });
    first_max(ages).map(|(bike_type, years)| Recommendation::Age { bike_type: bike_type.to_string(), years })
}

/// Type with the highest percentage of damaged bicycles
#[must_use]
pub fn by_condition(store: &RentalStore) -> Option<Recommendation> {
    // (damaged, total) per type
    let mut tallies: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for bike in store.inventory.iter() {
        let (damaged, total) = tallies.entry(bike.bike_type.as_str()).or_insert((0, 0));
        *total = total.saturating_add(1);
        if bike.condition == Condition::Damaged {
            *damaged = damaged.saturating_add(1);
        }
    }

    let shares = tallies.into_iter().map(|(bike_type, (damaged, total))| {
        let percent = Decimal::from(damaged)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(Decimal::from(total)))
            .unwrap_or(Decimal::ZERO);
        (bike_type, percent)
    });
    first_max(shares).map(|(bike_type, damaged_percent)| Recommendation::Condition {
        bike_type: bike_type.to_string(),
        damaged_percent: damaged_percent.round_dp(1),
    })
}

/// Every recommendation the store supports, in voting order
#[must_use]
pub fn recommendations(store: &RentalStore, today: NaiveDate) -> Vec<Recommendation> {
    [by_rental_frequency(store), by_age(store, today), by_condition(store), by_type_popularity(store)]
        .into_iter()
        .flatten()
        .collect()
}

/// Vote the recommendations and size an order for the winning type
///
/// The most recommended type wins; on a tie the type recommended first wins.
/// Returns `None` when there is nothing to recommend.
#[must_use]
pub fn purchase_order(
    recommendations: &[Recommendation],
    costs: &BTreeMap<String, Decimal>,
    budget: Decimal,
) -> Option<PurchasePlan> {
    let mut votes: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for rec in recommendations {
        let count = votes.entry(rec.bike_type()).or_insert(0);
        if *count == 0 {
            order.push(rec.bike_type());
        }
        *count = count.saturating_add(1);
    }

    let (winner, _) = first_max(order.into_iter().map(|t| (t, votes.get(t).copied().unwrap_or(0))))?;
    let cost_per_unit = costs.get(winner).copied().unwrap_or(Decimal::ZERO);

    if cost_per_unit <= Decimal::ZERO || cost_per_unit > budget {
        return Some(PurchasePlan::BudgetShortfall { bike_type: winner.to_string(), cost_per_unit });
    }

    let units = budget.checked_div(cost_per_unit).map(|q| q.floor()).unwrap_or(Decimal::ZERO);
    let total_cost = units.checked_mul(cost_per_unit).unwrap_or(Decimal::ZERO);
    Some(PurchasePlan::Order {
        bike_type: winner.to_string(),
        units: units.to_u64().unwrap_or(0),
        cost_per_unit,
        total_cost,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::bicycle::{BikeId, BikeStatus, Bicycle};

    /// Helper to build a calendar date in tests
    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    /// Fleet with rental history skewed towards road bikes
    fn fleet() -> RentalStore {
        let mut store = RentalStore::new();
        let bikes = [
            Bicycle::new(BikeId(1), "Trek", "Road Bike", "M", "£10/day").with_purchase_date(date(2019, 5, 1)),
            Bicycle::new(BikeId(2), "Giant", "Road Bike", "L", "£10/day").with_purchase_date(date(2022, 5, 1)),
            Bicycle::new(BikeId(3), "Kona", "BMX", "S", "£6/day")
                .with_purchase_date(date(2015, 1, 1))
                .with_condition(Condition::Damaged, BikeStatus::Unavailable),
            Bicycle::new(BikeId(4), "Kona", "BMX", "S", "£6/day").with_purchase_date(date(2023, 1, 1)),
            Bicycle::new(BikeId(5), "Cube", "Electric Bike", "M", "£25/day"),
        ];
        for bike in bikes {
            store.inventory.insert_or_ignore(bike);
        }
        for (bike, day) in [(1, 1), (2, 3), (1, 5), (4, 7)] {
            let recorded = store.ledger.record_history(BikeId(bike), None, date(2024, 1, day), date(2024, 1, day));
            assert!(recorded.is_ok());
        }
        store
    }

    #[test]
    fn test_rental_frequency_counts_by_type() {
        assert_eq!(
            by_rental_frequency(&fleet()),
            Some(Recommendation::RentalFrequency { bike_type: "Road Bike".to_string(), rentals: 3 })
        );
        assert_eq!(by_rental_frequency(&RentalStore::new()), None);
    }

    #[test]
    fn test_age_picks_oldest_bicycle() {
        assert_eq!(
            by_age(&fleet(), date(2025, 6, 1)),
            Some(Recommendation::Age { bike_type: "BMX".to_string(), years: 10 })
        );
    }

    #[test]
    fn test_condition_picks_highest_damaged_share() {
        assert_eq!(
            by_condition(&fleet()),
            Some(Recommendation::Condition { bike_type: "BMX".to_string(), damaged_percent: dec!(50.0) })
        );
    }

    #[test]
    fn test_purchase_order_within_budget() {
        let store = fleet();
        let recs = recommendations(&store, date(2025, 6, 1));
        assert_eq!(recs.len(), 4);

        // Road Bike (frequency, popularity) ties BMX (age, condition); frequency voted first
        let plan = purchase_order(&recs, &default_bicycle_costs(), dec!(1000));
        assert_eq!(
            plan,
            Some(PurchasePlan::Order {
                bike_type: "Road Bike".to_string(),
                units: 5,
                cost_per_unit: dec!(200),
                total_cost: dec!(1000),
            })
        );
    }

    #[test]
    fn test_popularity_agrees_with_rental_frequency() {
        let store = fleet();
        assert_eq!(
            by_type_popularity(&store),
            Some(Recommendation::TypePopularity { bike_type: "Road Bike".to_string(), rentals: 3 })
        );
        assert_eq!(
            by_type_popularity(&store).map(|r| r.bike_type().to_string()),
            by_rental_frequency(&store).map(|r| r.bike_type().to_string())
        );
        assert_eq!(by_type_popularity(&RentalStore::new()), None);
    }

    #[test]
    fn test_purchase_order_below_budget() {
        let recs = vec![Recommendation::Age { bike_type: "Electric Bike".to_string(), years: 3 }];
        let plan = purchase_order(&recs, &default_bicycle_costs(), dec!(999));
        assert_eq!(
            plan,
            Some(PurchasePlan::BudgetShortfall {
                bike_type: "Electric Bike".to_string(),
                cost_per_unit: dec!(1000),
            })
        );
    }

    #[test]
    fn test_vote_tie_goes_to_first_recommendation() {
        let recs = vec![
            Recommendation::RentalFrequency { bike_type: "Road Bike".to_string(), rentals: 4 },
            Recommendation::Age { bike_type: "BMX".to_string(), years: 9 },
        ];
        let plan = purchase_order(&recs, &default_bicycle_costs(), dec!(450));
        assert!(matches!(
            plan,
            Some(PurchasePlan::Order { ref bike_type, units: 2, .. }) if bike_type == "Road Bike"
        ));
        assert_eq!(purchase_order(&[], &default_bicycle_costs(), dec!(450)), None);
    }

    #[test]
    fn test_unknown_type_has_no_cost() {
        let recs = vec![Recommendation::Age { bike_type: "Tandem".to_string(), years: 1 }];
        let plan = purchase_order(&recs, &default_bicycle_costs(), dec!(10000));
        assert!(matches!(plan, Some(PurchasePlan::BudgetShortfall { cost_per_unit, .. }) if cost_per_unit.is_zero()));
    }
}
