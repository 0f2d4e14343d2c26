//! Membership lookups consumed by the rent flow.
//!
//! Membership data is loaded once into a [`MembershipDirectory`] and passed
//! by reference into every rent request. `refresh` re-reads the source.

use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::RentalError;

/// Primary key of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct MemberId(pub u32);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|e| RentalError::InvalidArgument(format!("member id {s:?}: {e}")))
    }
}

/// Eligibility data for one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Stored active flag
    pub active: bool,
    /// Maximum number of simultaneously open rentals
    pub rental_limit: u32,
    /// Last day the membership is valid
    pub end_date: NaiveDate,
}

impl Membership {
    /// Whether the membership counts as active on `today`
    #[must_use]
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.active && self.end_date >= today
    }
}

/// Shape of one entry in the membership JSON file
#[derive(Debug, Deserialize, Serialize)]
struct MembershipRecord {
    /// Stored active flag
    active: bool,
    /// Rental limit
    #[serde(rename = "RentalLimit")]
    rental_limit: u32,
    /// End date as `YYYY-MM-DD`
    #[serde(rename = "MembershipEndDate")]
    end_date: String,
}

/// Read-only membership lookups with an explicit load/refresh lifecycle
#[derive(Debug, Clone, Default)]
pub struct MembershipDirectory {
    /// Loaded memberships
    members: HashMap<MemberId, Membership>,
    /// File the memberships were read from, if any
    source: Option<PathBuf>,
}

impl MembershipDirectory {
    /// Build a directory from memberships already in memory
    #[must_use]
    pub fn from_memberships(members: impl IntoIterator<Item = (MemberId, Membership)>) -> Self {
        Self { members: members.into_iter().collect(), source: None }
    }

    /// Load memberships from a JSON file
    ///
    /// Entries with an unparseable id or end date are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Load` if the file cannot be read or is not
    /// valid membership JSON.
    pub fn load(path: &Path) -> Result<Self, RentalError> {
        let members = read_members(path)?;
        Ok(Self { members, source: Some(path.to_path_buf()) })
    }

    /// Parse memberships from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Load` if the document is not valid membership JSON.
    pub fn from_json(json: &str) -> Result<Self, RentalError> {
        Ok(Self { members: parse_members(json)?, source: None })
    }

    /// Re-read the file this directory was loaded from
    ///
    /// A directory built in memory has nothing to refresh and is left as is.
    /// On failure the previously loaded memberships are kept.
    ///
    /// # Errors
    ///
    /// Returns `RentalError::Load` if the source can no longer be read.
    pub fn refresh(&mut self) -> Result<(), RentalError> {
        if let Some(path) = &self.source {
            self.members = read_members(path)?;
            debug!("Refreshed {} memberships from {}", self.members.len(), path.display());
        }
        Ok(())
    }

    /// Whether the member exists, is flagged active and has not expired
    #[must_use]
    pub fn is_eligible(&self, member_id: MemberId, today: NaiveDate) -> bool {
        self.members.get(&member_id).is_some_and(|m| m.is_active_on(today))
    }

    /// Configured rental limit, or 0 for an unknown member
    #[must_use]
    pub fn rental_limit(&self, member_id: MemberId) -> u32 {
        self.members.get(&member_id).map_or(0, |m| m.rental_limit)
    }

    /// Look up a single membership
    #[must_use]
    pub fn get(&self, member_id: MemberId) -> Option<&Membership> {
        self.members.get(&member_id)
    }

    /// Number of loaded memberships
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no memberships are loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Read and parse a membership file
fn read_members(path: &Path) -> Result<HashMap<MemberId, Membership>, RentalError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        RentalError::Load(format!("Could not read membership data {}: {e}", path.display()))
    })?;
    parse_members(&contents)
}

/// Parse the `{"<id>": {...}}` membership document
fn parse_members(json: &str) -> Result<HashMap<MemberId, Membership>, RentalError> {
    let records: BTreeMap<String, MembershipRecord> = serde_json::from_str(json)
        .map_err(|e| RentalError::Load(format!("Could not parse membership data: {e}")))?;

    let mut members = HashMap::with_capacity(records.len());
    for (raw_id, record) in records {
        let Ok(member_id) = raw_id.parse::<MemberId>() else {
            warn!("Skipping membership with invalid member id {raw_id:?}");
            continue;
        };
        let Ok(end_date) = NaiveDate::parse_from_str(record.end_date.trim(), "%Y-%m-%d") else {
            warn!("Skipping member {member_id}: invalid MembershipEndDate {:?}", record.end_date);
            continue;
        };
        members.insert(
            member_id,
            Membership { active: record.active, rental_limit: record.rental_limit, end_date },
        );
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to build a calendar date in tests
    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    const SAMPLE: &str = r#"{
        "1001": {"active": true, "RentalLimit": 5, "MembershipEndDate": "2024-12-31"},
        "999": {"active": false, "RentalLimit": 0, "MembershipEndDate": "2023-01-01"},
        "1002": {"active": true, "RentalLimit": 2, "MembershipEndDate": "2023-06-30"},
        "abc": {"active": true, "RentalLimit": 9, "MembershipEndDate": "2030-01-01"},
        "1003": {"active": true, "RentalLimit": 1, "MembershipEndDate": "31/12/2030"}
    }"#;

    #[test]
    fn test_eligibility_requires_flag_and_unexpired_date() {
        let directory = MembershipDirectory::from_json(SAMPLE).unwrap_or_default();
        let today = date(2024, 6, 1);

        assert!(directory.is_eligible(MemberId(1001), today));
        assert!(!directory.is_eligible(MemberId(999), today));
        // Active flag set but membership already ended
        assert!(!directory.is_eligible(MemberId(1002), today));
        assert!(!directory.is_eligible(MemberId(4242), today));
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let directory = MembershipDirectory::from_json(SAMPLE).unwrap_or_default();
        assert!(directory.is_eligible(MemberId(1001), date(2024, 12, 31)));
        assert!(!directory.is_eligible(MemberId(1001), date(2025, 1, 1)));
    }

    #[test]
    fn test_rental_limit_defaults_to_zero() {
        let directory = MembershipDirectory::from_json(SAMPLE).unwrap_or_default();
        assert_eq!(directory.rental_limit(MemberId(1001)), 5);
        assert_eq!(directory.rental_limit(MemberId(4242)), 0);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let directory = MembershipDirectory::from_json(SAMPLE).unwrap_or_default();
        assert_eq!(directory.len(), 3);
        assert!(directory.get(MemberId(1003)).is_none());
    }

    #[test]
    fn test_invalid_json_is_a_load_error() {
        let result = MembershipDirectory::from_json("not json");
        assert!(matches!(result, Err(RentalError::Load(_))));
    }

    #[test]
    fn test_refresh_rereads_source() {
        let path = std::env::temp_dir().join(format!("bike-rental-members-{}.json", std::process::id()));
        let written = fs::write(
            &path,
            r#"{"7": {"active": true, "RentalLimit": 1, "MembershipEndDate": "2099-01-01"}}"#,
        );
        assert!(written.is_ok());

        let mut directory = MembershipDirectory::load(&path).unwrap_or_default();
        assert_eq!(directory.rental_limit(MemberId(7)), 1);

        let rewritten = fs::write(
            &path,
            r#"{"7": {"active": true, "RentalLimit": 4, "MembershipEndDate": "2099-01-01"}}"#,
        );
        assert!(rewritten.is_ok());
        assert!(directory.refresh().is_ok());
        assert_eq!(directory.rental_limit(MemberId(7)), 4);

        drop(fs::remove_file(&path));
    }
}
