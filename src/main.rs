use std::{path::PathBuf, process::ExitCode};

use bike_rental::{
    BikeId, Condition, MemberId, MembershipDirectory, RentalConfig, RentalError, RentalManager,
    RentalStore, ReturnRequest, SearchFilter,
    clock::{Clock, SystemClock},
    import::import_files,
    observers::{DamageNotifier, TransactionLogger},
    recommend::{purchase_order, recommendations},
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::{Builder, Env};
use log::{LevelFilter, debug};
use rust_decimal::Decimal;

/// Command-line arguments for the rental shop
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; defaults are used if it does not exist
    #[arg(short, long, default_value = "rental_config.json")]
    config: PathBuf,

    /// Enable verbose output with detailed operation logs
    #[arg(short, long)]
    verbose: bool,

    /// Store file, overriding the config
    #[arg(long)]
    store: Option<PathBuf>,

    /// Membership file, overriding the config
    #[arg(long)]
    members: Option<PathBuf>,

    /// What to do
    #[command(subcommand)]
    command: Command,
}

/// Shop operations
#[derive(Subcommand, Debug)]
enum Command {
    /// Load bicycles and rental history from pipe-separated files
    Import {
        /// Bicycle info file
        bicycles: PathBuf,
        /// Rental history file
        history: PathBuf,
        /// Reject lines with malformed fields instead of defaulting them
        #[arg(long)]
        strict: bool,
    },
    /// Rent a bicycle to a member
    Rent {
        /// Member renting the bicycle
        member_id: MemberId,
        /// Bicycle to rent
        bike_id: BikeId,
        /// Rental duration in days
        #[arg(default_value_t = 7)]
        days: u32,
    },
    /// Return a rented bicycle
    Return {
        /// Bicycle coming back
        bike_id: BikeId,
        /// Description of any damage
        #[arg(long)]
        damage: Option<String>,
        /// Flat damage charge
        #[arg(long)]
        charge: Option<Decimal>,
        /// Condition on return, `Good` unless given
        #[arg(long)]
        condition: Option<Condition>,
    },
    /// Search the inventory
    Search {
        /// Bicycle type, e.g. "Road Bike"
        #[arg(long = "type")]
        bike_type: Option<String>,
        /// Brand
        #[arg(long)]
        brand: Option<String>,
        /// Frame size
        #[arg(long)]
        frame_size: Option<String>,
    },
    /// Recommend which bicycle type to buy next
    Recommend {
        /// Size a purchase order for this budget
        #[arg(long)]
        budget: Option<Decimal>,
    },
    /// Verify the store is consistent
    Check,
}

fn main() -> ExitCode {
    let args = Args::parse();

    logger(Env::default().default_filter_or("info"), args.verbose).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Logger reading its filter from `env`; `--verbose` forces `debug`
fn logger(env: Env<'_>, verbose: bool) -> Builder {
    let mut builder = Builder::from_env(env);
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder
}

/// Build a return from the command-line flags; the condition defaults to `Good`
fn return_request(
    bike_id: BikeId,
    damage: Option<&str>,
    charge: Option<Decimal>,
    condition: Option<Condition>,
) -> ReturnRequest {
    let charge = charge.unwrap_or(Decimal::ZERO);
    let request = match damage {
        Some(details) => ReturnRequest::new(bike_id).with_damage(details, charge),
        None => ReturnRequest { damage_charge: charge, ..ReturnRequest::new(bike_id) },
    };
    request.with_condition(condition.unwrap_or_default())
}

/// Load config and store, execute the command and persist any change
fn run(args: Args) -> Result<(), RentalError> {
    let mut config = RentalConfig::load(&args.config)?;
    if let Some(store_file) = args.store {
        config.store_file = store_file;
    }
    if let Some(membership_file) = args.members {
        config.membership_file = membership_file;
    }

    let store = if config.store_file.exists() {
        RentalStore::load_from_file(&config.store_file)?
    } else {
        debug!("No store at {}, starting empty", config.store_file.display());
        RentalStore::new()
    };

    match execute(args.command, &config, store) {
        Ok(Some(store)) => store.save_to_file(&config.store_file),
        Ok(None) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            println!("{} {e}", "Rejected:".yellow().bold());
            Ok(())
        }
    }
}

/// Run one command; returns the store when it was changed and must be saved
fn execute(
    command: Command,
    config: &RentalConfig,
    mut store: RentalStore,
) -> Result<Option<RentalStore>, RentalError> {
    match command {
        Command::Import { bicycles, history, strict } => {
            let mut options = config.import_options();
            if strict {
                options.lenient = false;
            }
            let report = import_files(&mut store, &bicycles, &history, options)?;
            println!("{} {report}", "Imported:".green().bold());
            for issue in report.defaulted.iter().chain(&report.normalised) {
                println!("  {} {issue}", "note".cyan());
            }
            for issue in &report.skipped {
                println!("  {} {issue}", "skipped".yellow());
            }
            Ok(Some(store))
        }
        Command::Rent { member_id, bike_id, days } => {
            let members = MembershipDirectory::load(&config.membership_file)?;
            let mut manager = manager_for(store, config);
            let confirmation = manager.rent_bike(&members, member_id, bike_id, days)?;
            println!("{}", confirmation.to_string().green());
            Ok(Some(manager.into_store()))
        }
        Command::Return { bike_id, damage, charge, condition } => {
            let request = return_request(bike_id, damage.as_deref(), charge, condition);
            let mut manager = manager_for(store, config);
            let receipt = manager.return_bike(request)?;
            println!("{}", receipt.to_string().green());
            println!("Total fees: £{:.2}", receipt.total_fees);
            for warning in &receipt.warnings {
                println!("  {} {warning}", "warning".yellow());
            }
            Ok(Some(manager.into_store()))
        }
        Command::Search { bike_type, brand, frame_size } => {
            let filter = SearchFilter { bike_type, brand, frame_size };
            let found = store.inventory.search(&filter)?;
            if found.is_empty() {
                println!("{}", "No bicycles match.".yellow());
            }
            for bike in found {
                println!("{bike}");
            }
            Ok(None)
        }
        Command::Recommend { budget } => {
            let recs = recommendations(&store, SystemClock.today());
            if recs.is_empty() {
                println!("{}", "Not enough data for a recommendation.".yellow());
                return Ok(None);
            }
            for rec in &recs {
                println!("{} {rec}", "-".cyan());
            }
            if let Some(plan) = budget.and_then(|b| purchase_order(&recs, &config.bicycle_costs, b)) {
                println!("{}", plan.to_string().green().bold());
            }
            Ok(None)
        }
        Command::Check => {
            store.check_invariants()?;
            println!(
                "{} {} bicycles, {} rentals ({} open)",
                "Store is consistent:".green().bold(),
                store.inventory.len(),
                store.ledger.rentals().len(),
                store.ledger.open_rentals().count()
            );
            Ok(None)
        }
    }
}

/// Wrap `store` in a manager with the configured policy and stock observers
fn manager_for(store: RentalStore, config: &RentalConfig) -> RentalManager {
    let mut manager = RentalManager::new(store, config.fee_policy.clone());
    manager.register_observer(Box::new(TransactionLogger));
    manager.register_observer(Box::new(DamageNotifier));
    manager
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_damage_report_keeps_good_condition_by_default() {
        let request = return_request(BikeId(7), Some("Scratched frame"), Some(dec!(15)), None);
        assert_eq!(request.new_condition, Condition::Good);
        assert_eq!(request.new_condition.status_after_return(), bike_rental::BikeStatus::Available);
        assert_eq!(request.damage_details.as_deref(), Some("Scratched frame"));
        assert_eq!(request.damage_charge, dec!(15));

        let damaged = return_request(BikeId(7), Some("Bent wheel"), None, Some(Condition::Damaged));
        assert_eq!(damaged.new_condition, Condition::Damaged);
        assert_eq!(damaged.damage_charge, Decimal::ZERO);
    }

    #[test]
    fn test_charge_without_details_is_passed_through() {
        let request = return_request(BikeId(2), None, Some(dec!(5)), None);
        assert_eq!(request.damage_details, None);
        assert_eq!(request.damage_charge, dec!(5));
        assert_eq!(request.new_condition, Condition::Good);
    }

    #[test]
    fn test_log_filter_comes_from_environment_unless_verbose() {
        // Variable is never set, so the fallback stands in for RUST_LOG=warn
        let env = || Env::new().filter_or("BIKE_RENTAL_TEST_UNSET_FILTER", "warn");
        assert_eq!(logger(env(), false).build().filter(), LevelFilter::Warn);
        assert_eq!(logger(env(), true).build().filter(), LevelFilter::Debug);
    }
}
