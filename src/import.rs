//! Bulk loading of pipe-delimited inventory and rental history files.
//!
//! Historical files are messy: blank fields, three date formats, rates with
//! and without currency signs. In lenient mode missing values are replaced
//! with defaults; in strict mode the line is rejected. Either way every
//! substitution and rejection is logged at `warn` and listed in the
//! [`ImportReport`].

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use chrono::NaiveDate;
use log::{info, warn};

use crate::{
    bicycle::{BikeId, BikeStatus, Bicycle, Condition},
    error::RentalError,
    membership::MemberId,
    store::RentalStore,
};

/// Date layouts accepted in import files, tried in order
const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Placeholder for blank text fields in lenient mode
const UNKNOWN: &str = "Unknown";

/// Rate used for a blank rate field in lenient mode
const DEFAULT_RATE: &str = "0/day";

/// How tolerant the importer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Substitute defaults for missing or malformed optional fields
    pub lenient: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { lenient: true }
    }
}

/// One line the importer had something to say about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIssue {
    /// File or stream the line came from
    pub source: String,
    /// 1-based line number
    pub line: usize,
    /// What happened
    pub message: String,
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.source, self.line, self.message)
    }
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Bicycles inserted
    pub bicycles_loaded: usize,
    /// Bicycle lines ignored because the id already existed
    pub duplicate_bicycles: usize,
    /// Historical rentals inserted
    pub rentals_loaded: usize,
    /// Fields replaced with a default (lenient mode only)
    pub defaulted: Vec<ImportIssue>,
    /// Lines rejected
    pub skipped: Vec<ImportIssue>,
    /// Statuses changed to satisfy the store invariants
    pub normalised: Vec<ImportIssue>,
}

impl ImportReport {
    /// Whether anything was defaulted, skipped or normalised
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !(self.defaulted.is_empty() && self.skipped.is_empty() && self.normalised.is_empty())
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bicycles loaded ({} duplicates ignored), {} rentals loaded, {} fields defaulted, {} lines skipped, {} statuses normalised",
            self.bicycles_loaded,
            self.duplicate_bicycles,
            self.rentals_loaded,
            self.defaulted.len(),
            self.skipped.len(),
            self.normalised.len()
        )
    }
}

/// Parse a date in any accepted layout
#[must_use]
pub fn clean_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Normalise a rate to `amount/period` without a pound sign
#[must_use]
pub fn clean_rental_rate(raw: &str) -> String {
    let rate = raw.replace('£', "").trim().to_string();
    if rate.contains('/') { rate } else { format!("{rate}/day") }
}

/// Per-line parsing context
struct LineContext<'r> {
    /// Where the line came from
    source: &'r str,
    /// 1-based line number
    line: usize,
    /// Import settings
    options: ImportOptions,
    /// Report to record defaults in
    report: &'r mut ImportReport,
}

impl LineContext<'_> {
    /// Build an issue for this line
    fn issue(&self, message: String) -> ImportIssue {
        ImportIssue { source: self.source.to_string(), line: self.line, message }
    }

    /// Use `default` for a missing value in lenient mode, or fail in strict mode
    fn default_or_reject<T>(&mut self, field: &str, raw: &str, default: T) -> Result<T, String> {
        if !self.options.lenient {
            return Err(format!("invalid {field} {raw:?}"));
        }
        let issue = self.issue(format!("invalid {field} {raw:?}, using default"));
        warn!("{issue}");
        self.report.defaulted.push(issue);
        Ok(default)
    }

    /// A text field, or `Unknown` when blank
    fn text(&mut self, field: &str, raw: &str) -> Result<String, String> {
        let value = raw.trim();
        if value.is_empty() {
            self.default_or_reject(field, raw, UNKNOWN.to_string())
        } else {
            Ok(value.to_string())
        }
    }
}

/// Parse one bicycle line
fn parse_bicycle(fields: &[&str], ctx: &mut LineContext<'_>) -> Result<Bicycle, String> {
    let [id, brand, bike_type, frame_size, rate, purchase_date, condition, status, ..] = fields else {
        return Err(format!("expected 8 fields, found {}", fields.len()));
    };

    let id: BikeId = id.parse().map_err(|e: RentalError| e.to_string())?;
    let brand = ctx.text("brand", brand)?;
    let bike_type = ctx.text("type", bike_type)?;
    let frame_size = ctx.text("frame size", frame_size)?;

    let rental_rate = if rate.trim().is_empty() {
        ctx.default_or_reject("rental rate", rate, DEFAULT_RATE.to_string())?
    } else {
        clean_rental_rate(rate)
    };

    let purchase_date = match clean_date(purchase_date) {
        Some(date) => Some(date),
        None => ctx.default_or_reject("purchase date", purchase_date, None)?,
    };

    let condition = if condition.trim().is_empty() {
        ctx.default_or_reject("condition", condition, Condition::Good)?
    } else {
        condition.parse().map_err(|e: RentalError| e.to_string())?
    };

    let status = if status.trim().is_empty() {
        ctx.default_or_reject("status", status, BikeStatus::Available)?
    } else {
        status.parse().map_err(|e: RentalError| e.to_string())?
    };

    // Status is kept as written; import_bicycles reconciles it with the condition
    let mut bike = Bicycle::new(id, &brand, &bike_type, &frame_size, &rental_rate);
    bike.purchase_date = purchase_date;
    bike.condition = condition;
    bike.status = status;
    Ok(bike)
}

/// Parse one rental history line into its row values
fn parse_history(
    fields: &[&str],
    ctx: &mut LineContext<'_>,
) -> Result<(BikeId, NaiveDate, NaiveDate, Option<MemberId>), String> {
    let [bike_id, rental_date, return_date, member_id, ..] = fields else {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    };

    let bike_id: BikeId = bike_id.parse().map_err(|e: RentalError| e.to_string())?;
    let rental_date =
        clean_date(rental_date).ok_or_else(|| format!("invalid rental date {rental_date:?}"))?;
    let return_date =
        clean_date(return_date).ok_or_else(|| format!("invalid return date {return_date:?}"))?;
    let member_id = match member_id.parse::<MemberId>() {
        Ok(id) => Some(id),
        Err(_) => ctx.default_or_reject("member id", member_id, None)?,
    };

    Ok((bike_id, rental_date, return_date, member_id))
}

/// Record a rejected line
fn skip(report: &mut ImportReport, source: &str, line: usize, message: String) {
    let issue = ImportIssue { source: source.to_string(), line, message };
    warn!("Skipping line {issue}");
    report.skipped.push(issue);
}

/// Load bicycles from `reader`, ignoring ids already in the store
///
/// # Errors
///
/// Returns `RentalError::Load` if the reader fails; malformed lines are
/// reported, not returned as errors.
pub fn import_bicycles(
    store: &mut RentalStore,
    reader: impl BufRead,
    source: &str,
    options: ImportOptions,
    report: &mut ImportReport,
) -> Result<(), RentalError> {
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RentalError::Load(format!("{source}: {e}")))?;
        let line_no = index.saturating_add(1);
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.trim_end().split('|').collect();
        let mut ctx = LineContext { source, line: line_no, options, report: &mut *report };
        match parse_bicycle(&fields, &mut ctx) {
            Ok(mut bike) => {
                if store.inventory.get(bike.id).is_some() {
                    report.duplicate_bicycles = report.duplicate_bicycles.saturating_add(1);
                    continue;
                }
                if bike.condition == Condition::Damaged && bike.status != BikeStatus::Unavailable {
                    let issue = ImportIssue {
                        source: source.to_string(),
                        line: line_no,
                        message: format!(
                            "bicycle {} is Damaged but recorded {}; now Unavailable",
                            bike.id, bike.status
                        ),
                    };
                    warn!("{issue}");
                    report.normalised.push(issue);
                    bike.status = BikeStatus::Unavailable;
                }
                if store.inventory.insert_or_ignore(bike) {
                    report.bicycles_loaded = report.bicycles_loaded.saturating_add(1);
                }
            }
            Err(message) => skip(report, source, line_no, message),
        }
    }
    Ok(())
}

/// Load closed historical rentals from `reader`
///
/// # Errors
///
/// Returns `RentalError::Load` if the reader fails; malformed lines are
/// reported, not returned as errors.
pub fn import_rental_history(
    store: &mut RentalStore,
    reader: impl BufRead,
    source: &str,
    options: ImportOptions,
    report: &mut ImportReport,
) -> Result<(), RentalError> {
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RentalError::Load(format!("{source}: {e}")))?;
        let line_no = index.saturating_add(1);
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.trim_end().split('|').collect();
        let mut ctx = LineContext { source, line: line_no, options, report: &mut *report };
        let (bike_id, rental_date, return_date, member_id) = match parse_history(&fields, &mut ctx) {
            Ok(row) => row,
            Err(message) => {
                skip(report, source, line_no, message);
                continue;
            }
        };

        if store.inventory.get(bike_id).is_none() {
            skip(report, source, line_no, format!("unknown bicycle {bike_id}"));
            continue;
        }
        match store.ledger.record_history(bike_id, member_id, rental_date, return_date) {
            Ok(_) => report.rentals_loaded = report.rentals_loaded.saturating_add(1),
            Err(e) => skip(report, source, line_no, e.to_string()),
        }
    }
    Ok(())
}

/// Bring imported statuses in line with the ledger
///
/// A bicycle recorded as `Rented` with no open rental becomes `Available`.
pub fn normalise_statuses(store: &mut RentalStore, report: &mut ImportReport) {
    let orphaned: Vec<BikeId> = store
        .inventory
        .iter()
        .filter(|b| b.status == BikeStatus::Rented && store.ledger.open_rental(b.id).is_none())
        .map(|b| b.id)
        .collect();

    for bike_id in orphaned {
        store.inventory.force_status(bike_id, BikeStatus::Available);
        let issue = ImportIssue {
            source: "inventory".to_string(),
            line: 0,
            message: format!("bicycle {bike_id} was Rented without an open rental; now Available"),
        };
        warn!("{issue}");
        report.normalised.push(issue);
    }
}

/// Open a file for line reading
fn open(path: &Path) -> Result<BufReader<File>, RentalError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| RentalError::Load(format!("Failed to open {}: {e}", path.display())))
}

/// Import a bicycle file and a rental history file into `store`
///
/// # Errors
///
/// Returns `RentalError::Load` if either file cannot be opened or read.
pub fn import_files(
    store: &mut RentalStore,
    bicycles: &Path,
    history: &Path,
    options: ImportOptions,
) -> Result<ImportReport, RentalError> {
    let mut report = ImportReport::default();
    let bicycles_source = bicycles.display().to_string();
    let history_source = history.display().to_string();

    import_bicycles(store, open(bicycles)?, &bicycles_source, options, &mut report)?;
    import_rental_history(store, open(history)?, &history_source, options, &mut report)?;
    normalise_statuses(store, &mut report);

    info!("Import finished: {report}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Helper to build a calendar date in tests
    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    const BICYCLES: &str = "\
1|Trek|Mountain Bike|Medium|£10/day|01/03/2020|Good|Available
2|Giant|Road Bike|Large|12|2021-06-15|New|Rented
3||Hybrid Bike|Small||not-a-date|Damaged|Available
4|Brompton|Folding Bike|Small|£8/day|15-07-2019||
x|Broken|Line|Only
1|Duplicate|BMX|Small|£5/day|2020-01-01|Good|Available
5|Cube|Gravel Bike|Medium|£9/day|2022-02-02|Shiny|Available
";

    const HISTORY: &str = "\
1|01/01/2024|05/01/2024|1001
2|2024-02-01|2024-02-03|abc
1|2024-03-01||1002
9|2024-03-01|2024-03-02|1003
4|2024-04-10|2024-04-01|1004
";

    /// Run both imports over the sample data
    fn run(options: ImportOptions) -> (RentalStore, ImportReport) {
        let mut store = RentalStore::new();
        let mut report = ImportReport::default();
        let bikes = import_bicycles(&mut store, Cursor::new(BICYCLES), "bikes", options, &mut report);
        assert!(bikes.is_ok());
        let rentals = import_rental_history(&mut store, Cursor::new(HISTORY), "history", options, &mut report);
        assert!(rentals.is_ok());
        normalise_statuses(&mut store, &mut report);
        (store, report)
    }

    #[test]
    fn test_clean_date_accepts_three_layouts() {
        assert_eq!(clean_date("01/03/2020"), Some(date(2020, 3, 1)));
        assert_eq!(clean_date("2020-03-01"), Some(date(2020, 3, 1)));
        assert_eq!(clean_date(" 01-03-2020 "), Some(date(2020, 3, 1)));
        assert_eq!(clean_date("March 1st"), None);
    }

    #[test]
    fn test_clean_rental_rate() {
        assert_eq!(clean_rental_rate("£10/day"), "10/day");
        assert_eq!(clean_rental_rate("12"), "12/day");
        assert_eq!(clean_rental_rate(" 7.5/week "), "7.5/week");
    }

    #[test]
    fn test_lenient_import_defaults_and_flags() {
        let (store, report) = run(ImportOptions { lenient: true });

        assert_eq!(report.bicycles_loaded, 4);
        assert_eq!(report.duplicate_bicycles, 1);
        // brand, rate and purchase date of bike 3; condition and status of bike 4
        assert_eq!(report.defaulted.iter().filter(|i| i.source == "bikes").count(), 5);

        let bike3 = store.inventory.get(BikeId(3)).cloned();
        assert_eq!(bike3.as_ref().map(|b| b.brand.as_str()), Some(UNKNOWN));
        assert_eq!(bike3.as_ref().map(|b| b.rental_rate.as_str()), Some(DEFAULT_RATE));
        assert_eq!(bike3.as_ref().and_then(|b| b.purchase_date), None);
        assert_eq!(bike3.as_ref().map(|b| b.status), Some(BikeStatus::Unavailable));

        let bike4 = store.inventory.get(BikeId(4)).cloned();
        assert_eq!(bike4.as_ref().map(|b| (b.condition, b.status)), Some((Condition::Good, BikeStatus::Available)));
        assert_eq!(store.inventory.get(BikeId(1)).map(|b| b.brand.as_str()), Some("Trek"));
        assert_eq!(store.inventory.get(BikeId(2)).map(|b| b.rental_rate.as_str()), Some("12/day"));
    }

    #[test]
    fn test_bad_lines_are_skipped_in_both_modes() {
        for lenient in [true, false] {
            let (store, report) = run(ImportOptions { lenient });
            assert!(store.inventory.get(BikeId(5)).is_none());
            let skipped_lines: Vec<usize> =
                report.skipped.iter().filter(|i| i.source == "bikes").map(|i| i.line).collect();
            assert!(skipped_lines.contains(&5));
            assert!(skipped_lines.contains(&7));
        }
    }

    #[test]
    fn test_damaged_bicycle_recorded_available_is_reported() {
        let mut store = RentalStore::new();
        let mut report = ImportReport::default();
        let line = "3|Kona|BMX|Small|£6/day|2020-01-01|Damaged|Available\n";
        let result =
            import_bicycles(&mut store, Cursor::new(line), "bikes", ImportOptions::default(), &mut report);
        assert!(result.is_ok());
        normalise_statuses(&mut store, &mut report);

        assert_eq!(store.inventory.get_status(BikeId(3)), Ok(BikeStatus::Unavailable));
        assert!(report.defaulted.is_empty());
        assert_eq!(report.normalised.len(), 1);
        assert_eq!(report.normalised.first().map(|i| i.line), Some(1));
        assert!(report.has_issues());
    }

    #[test]
    fn test_history_import() {
        let (store, report) = run(ImportOptions { lenient: true });

        // Rows 1 and 2 load; row 2's member id is defaulted
        assert_eq!(report.rentals_loaded, 2);
        let skipped: Vec<usize> =
            report.skipped.iter().filter(|i| i.source == "history").map(|i| i.line).collect();
        assert_eq!(skipped, vec![3, 4, 5]);

        let rentals = store.ledger.rentals();
        assert_eq!(rentals.first().map(|r| r.member_id), Some(Some(MemberId(1001))));
        assert_eq!(rentals.get(1).map(|r| r.member_id), Some(None));
        assert_eq!(store.ledger.open_rentals().count(), 0);
    }

    #[test]
    fn test_strict_mode_rejects_what_lenient_mode_defaults() {
        let (store, report) = run(ImportOptions { lenient: false });

        assert!(report.defaulted.is_empty());
        assert!(store.inventory.get(BikeId(3)).is_none());
        assert!(store.inventory.get(BikeId(4)).is_none());
        assert_eq!(report.bicycles_loaded, 2);
        // Bike 2 loads but its history row has a bad member id
        assert_eq!(report.rentals_loaded, 1);
    }

    #[test]
    fn test_rented_without_open_rental_is_normalised() {
        let (store, report) = run(ImportOptions { lenient: true });

        assert_eq!(store.inventory.get_status(BikeId(2)), Ok(BikeStatus::Available));
        // Bike 3 (Damaged but Available) and bike 2 (Rented with no open rental)
        assert_eq!(report.normalised.len(), 2);
        assert!(store.check_invariants().is_ok());
        assert!(report.has_issues());
    }
}
