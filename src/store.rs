use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bicycle::{BikeId, BikeStatus, Condition},
    error::RentalError,
    inventory::InventoryStore,
    ledger::RentalLedger,
};

/// The bicycles and rentals tables held together
///
/// Mutations that must be all-or-nothing go through
/// [`RentalStore::atomically`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RentalStore {
    /// Bicycles table
    pub inventory: InventoryStore,
    /// Rentals table
    pub ledger: RentalLedger,
}

impl RentalStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self { inventory: InventoryStore::new(), ledger: RentalLedger::new() }
    }

    /// Run `f` against the store, undoing all of its changes if it fails
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns; the store is then exactly as it
    /// was before the call.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T, RentalError>
    where
        F: FnOnce(&mut Self) -> Result<T, RentalError>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    /// Check the cross-table invariants
    ///
    /// * at most one open rental per bicycle
    /// * a bicycle is `Rented` iff it has an open rental
    /// * a `Damaged` bicycle is `Unavailable`
    /// * every rental references a known bicycle
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Conflict` describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), RentalError> {
        let mut open_per_bike: HashMap<BikeId, usize> = HashMap::new();
        for rental in self.ledger.rentals() {
            if self.inventory.get(rental.bike_id).is_none() {
                return Err(RentalError::Conflict {
                    bike_id: rental.bike_id,
                    reason: format!("rental {} references an unknown bicycle", rental.id),
                });
            }
            if rental.is_open() {
                let count = open_per_bike.entry(rental.bike_id).or_insert(0);
                *count = count.saturating_add(1);
            }
        }

        for bike in self.inventory.iter() {
            let open = open_per_bike.get(&bike.id).copied().unwrap_or(0);
            if open > 1 {
                return Err(RentalError::Conflict {
                    bike_id: bike.id,
                    reason: format!("{open} open rentals"),
                });
            }
            if (bike.status == BikeStatus::Rented) != (open == 1) {
                return Err(RentalError::Conflict {
                    bike_id: bike.id,
                    reason: format!("status is {} with {open} open rentals", bike.status),
                });
            }
            if bike.condition == Condition::Damaged && bike.status != BikeStatus::Unavailable {
                return Err(RentalError::Conflict {
                    bike_id: bike.id,
                    reason: format!("damaged bicycle is {}", bike.status),
                });
            }
        }
        Ok(())
    }

    /// Save both tables to a JSON file
    ///
    /// The data is written to `<path>.tmp` and renamed over `path`, so a
    /// failed save leaves the previous file intact.
    ///
    /// # Errors
    ///
    /// Returns a `RentalError::Persistence` if:
    /// - The store cannot be serialized to JSON
    /// - The temporary file cannot be created or written
    /// - The temporary file cannot be moved into place
    pub fn save_to_file(&self, path: &Path) -> Result<(), RentalError> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|e| RentalError::Persistence(e.to_string()))?;

        debug!("Saving store to file: {}", path.display());
        let tmp_path = temp_path_for(path);
        if let Err(e) = write_file(&tmp_path, serialized.as_bytes()) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                debug!("Could not remove {}: {cleanup}", tmp_path.display());
            }
            return Err(e);
        }

        fs::rename(&tmp_path, path)
            .map_err(|e| RentalError::Persistence(format!("Failed to replace file: {e}")))
    }

    /// Load both tables from a JSON file and verify the invariants
    ///
    /// # Errors
    ///
    /// Returns a `RentalError::Load` if:
    /// - The file does not exist or cannot be read
    /// - The JSON parsing fails
    /// - The loaded tables violate the store invariants
    pub fn load_from_file(path: &Path) -> Result<Self, RentalError> {
        debug!("Loading store from file: {}", path.display());

        if !path.exists() {
            return Err(RentalError::Load(format!("File does not exist: {}", path.display())));
        }

        let mut file = File::open(path)
            .map_err(|e| RentalError::Load(format!("Failed to open file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| RentalError::Load(format!("Failed to read file: {e}")))?;

        let store: Self = serde_json::from_str(&contents)
            .map_err(|e| RentalError::Load(format!("Failed to parse JSON: {e}")))?;

        store
            .check_invariants()
            .map_err(|e| RentalError::Load(format!("Stored data is inconsistent: {e}")))?;
        Ok(store)
    }
}

/// Sibling path a save is staged in
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Create `path` and write `bytes` to disk
fn write_file(path: &Path, bytes: &[u8]) -> Result<(), RentalError> {
    let mut file = File::create(path)
        .map_err(|e| RentalError::Persistence(format!("Failed to create file: {e}")))?;

    file.write_all(bytes)
        .map_err(|e| RentalError::Persistence(format!("Failed to write to file: {e}")))?;

    file.sync_all()
        .map_err(|e| RentalError::Persistence(format!("Failed to flush file: {e}")))
}
