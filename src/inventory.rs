use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    bicycle::{BikeId, BikeStatus, Bicycle, Condition},
    error::RentalError,
};

/// Equality filters for [`InventoryStore::search`]; absent fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Match on bicycle type
    pub bike_type: Option<String>,
    /// Match on brand
    pub brand: Option<String>,
    /// Match on frame size
    pub frame_size: Option<String>,
}

impl SearchFilter {
    /// Filter on bicycle type
    #[must_use]
    pub fn bike_type(mut self, bike_type: &str) -> Self {
        self.bike_type = Some(bike_type.to_string());
        self
    }

    /// Filter on brand
    #[must_use]
    pub fn brand(mut self, brand: &str) -> Self {
        self.brand = Some(brand.to_string());
        self
    }

    /// Filter on frame size
    #[must_use]
    pub fn frame_size(mut self, frame_size: &str) -> Self {
        self.frame_size = Some(frame_size.to_string());
        self
    }

    /// Whether no criterion is set (empty strings count as unset)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.bike_type, &self.brand, &self.frame_size]
            .into_iter()
            .all(|f| f.as_deref().is_none_or(str::is_empty))
    }

    /// Whether a bicycle satisfies every set criterion
    #[must_use]
    pub fn matches(&self, bike: &Bicycle) -> bool {
        /// A criterion that is unset or empty always matches
        fn field_matches(criterion: Option<&String>, value: &str) -> bool {
            criterion.is_none_or(|c| c.is_empty() || c == value)
        }

        field_matches(self.bike_type.as_ref(), &bike.bike_type)
            && field_matches(self.brand.as_ref(), &bike.brand)
            && field_matches(self.frame_size.as_ref(), &bike.frame_size)
    }
}

/// The bicycles table
///
/// Status and condition changes go through [`InventoryStore::mark_rented`]
/// and [`InventoryStore::update_condition`] so the `Damaged` ⇒ `Unavailable`
/// rule always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InventoryStore {
    /// Bicycles keyed by id
    bicycles: BTreeMap<BikeId, Bicycle>,
}

impl InventoryStore {
    /// Create an empty inventory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bicycle unless its id is already present
    ///
    /// Returns `true` when the bicycle was inserted.
    pub fn insert_or_ignore(&mut self, bike: Bicycle) -> bool {
        if self.bicycles.contains_key(&bike.id) {
            return false;
        }
        let bike = bike.with_condition_normalised();
        self.bicycles.insert(bike.id, bike);
        true
    }

    /// Look up a bicycle
    #[must_use]
    pub fn get(&self, bike_id: BikeId) -> Option<&Bicycle> {
        self.bicycles.get(&bike_id)
    }

    /// Current status of a bicycle
    ///
    /// # Errors
    ///
    /// Returns `RentalError::BikeNotFound` for an unknown id.
    pub fn get_status(&self, bike_id: BikeId) -> Result<BikeStatus, RentalError> {
        self.get(bike_id).map(|b| b.status).ok_or(RentalError::BikeNotFound(bike_id))
    }

    /// Move an available bicycle to `Rented`
    ///
    /// # Errors
    ///
    /// Returns `RentalError::BikeNotFound` for an unknown id and
    /// `RentalError::InvalidState` if the bicycle is not `Available`.
    pub fn mark_rented(&mut self, bike_id: BikeId) -> Result<(), RentalError> {
        let bike = self.bicycles.get_mut(&bike_id).ok_or(RentalError::BikeNotFound(bike_id))?;
        if bike.status != BikeStatus::Available {
            return Err(RentalError::InvalidState {
                bike_id,
                from: bike.status,
                to: BikeStatus::Rented,
            });
        }
        bike.status = BikeStatus::Rented;
        Ok(())
    }

    /// Set condition and status together; `Damaged` forces `Unavailable`
    ///
    /// Returns the status actually stored.
    ///
    /// # Errors
    ///
    /// Returns `RentalError::BikeNotFound` for an unknown id.
    pub fn update_condition(
        &mut self,
        bike_id: BikeId,
        condition: Condition,
        status: BikeStatus,
    ) -> Result<BikeStatus, RentalError> {
        let bike = self.bicycles.get_mut(&bike_id).ok_or(RentalError::BikeNotFound(bike_id))?;
        bike.condition = condition;
        bike.status = if condition == Condition::Damaged { BikeStatus::Unavailable } else { status };
        Ok(bike.status)
    }

    /// Bicycles matching every set field of `filter`
    ///
    /// # Errors
    ///
    /// Returns `RentalError::InvalidArgument` when no criterion is set.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<&Bicycle>, RentalError> {
        if filter.is_empty() {
            return Err(RentalError::InvalidArgument(
                "Please specify at least one search criterion".to_string(),
            ));
        }
        Ok(self.bicycles.values().filter(|b| filter.matches(b)).collect())
    }

    /// Iterate over every bicycle in id order
    pub fn iter(&self) -> impl Iterator<Item = &Bicycle> {
        self.bicycles.values()
    }

    /// Number of bicycles
    #[must_use]
    pub fn len(&self) -> usize {
        self.bicycles.len()
    }

    /// Whether the inventory holds no bicycles
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bicycles.is_empty()
    }

    /// Overwrite a bicycle's status without transition checks
    ///
    /// Only used to repair imported data; the rent and return flows use the
    /// checked mutations.
    pub(crate) fn force_status(&mut self, bike_id: BikeId, status: BikeStatus) {
        if let Some(bike) = self.bicycles.get_mut(&bike_id) {
            bike.status = status;
        }
    }
}

impl Bicycle {
    /// Apply the damaged-means-unavailable rule to a freshly built row
    fn with_condition_normalised(self) -> Self {
        let (condition, status) = (self.condition, self.status);
        self.with_condition(condition, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small fixed inventory used by the tests below
    fn sample_inventory() -> InventoryStore {
        let mut store = InventoryStore::new();
        store.insert_or_ignore(Bicycle::new(BikeId(1), "Trek", "Mountain Bike", "Medium", "£10/day"));
        store.insert_or_ignore(Bicycle::new(BikeId(2), "Giant", "Road Bike", "Large", "£12/day"));
        store.insert_or_ignore(Bicycle::new(BikeId(3), "Trek", "Road Bike", "Medium", "£11/day"));
        store
    }

    #[test]
    fn test_mark_rented_requires_available() {
        let mut store = sample_inventory();
        assert!(store.mark_rented(BikeId(1)).is_ok());
        assert_eq!(store.get_status(BikeId(1)), Ok(BikeStatus::Rented));

        let again = store.mark_rented(BikeId(1));
        assert!(matches!(
            again,
            Err(RentalError::InvalidState { from: BikeStatus::Rented, to: BikeStatus::Rented, .. })
        ));
        assert_eq!(store.mark_rented(BikeId(99)), Err(RentalError::BikeNotFound(BikeId(99))));
    }

    #[test]
    fn test_update_condition_forces_unavailable_when_damaged() {
        let mut store = sample_inventory();
        let stored = store.update_condition(BikeId(2), Condition::Damaged, BikeStatus::Available);
        assert_eq!(stored, Ok(BikeStatus::Unavailable));
        assert_eq!(store.get(BikeId(2)).map(|b| b.condition), Some(Condition::Damaged));

        let stored = store.update_condition(BikeId(2), Condition::Good, BikeStatus::Available);
        assert_eq!(stored, Ok(BikeStatus::Available));
    }

    #[test]
    fn test_search_is_conjunctive() {
        let store = sample_inventory();
        let hits = store.search(&SearchFilter::default().brand("Trek").bike_type("Road Bike"));
        let ids: Vec<BikeId> = hits.unwrap_or_default().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![BikeId(3)]);

        let hits = store.search(&SearchFilter::default().frame_size("Medium"));
        assert_eq!(hits.map(|h| h.len()), Ok(2));

        let hits = store.search(&SearchFilter::default().brand("Specialized"));
        assert_eq!(hits.map(|h| h.len()), Ok(0));
    }

    #[test]
    fn test_search_without_criteria_is_rejected() {
        let store = sample_inventory();
        assert!(matches!(
            store.search(&SearchFilter::default()),
            Err(RentalError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.search(&SearchFilter::default().brand("")),
            Err(RentalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_insert_or_ignore_keeps_first_row() {
        let mut store = sample_inventory();
        let inserted =
            store.insert_or_ignore(Bicycle::new(BikeId(1), "Other", "BMX", "Small", "£5/day"));
        assert!(!inserted);
        assert_eq!(store.get(BikeId(1)).map(|b| b.brand.as_str()), Some("Trek"));
        assert_eq!(store.len(), 3);
    }
}
