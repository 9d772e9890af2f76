//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::console_prompt::ConsolePrompt;
use crate::adapters::csv_record_source::CsvRecordSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::code_map::CodeMap;
use crate::domain::disambiguation::{Policy, PolicyKind};
use crate::domain::error::SecmasterError;
use crate::domain::reconcile::{BatchSummary, Outcome, Reconciler};
use crate::domain::record::ExternalRecord;
use crate::domain::security::{CanonicalSecurity, ListedSecurity};
use crate::domain::settings::ReconcileSettings;
use crate::domain::similarity::{NameIndex, ScoredName};
use crate::ports::config_port::ConfigPort;
use crate::ports::record_source::RecordSource;
use crate::ports::registry_port::RegistryPort;

#[derive(Parser, Debug)]
#[command(name = "secmaster", about = "Security master reconciliation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the registry schema
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Reconcile a vendor feed against the registry
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
        /// Instrument type for rows without a type column
        #[arg(long)]
        default_type: Option<String>,
        /// skip, auto-accept, auto-reject or interactive
        #[arg(long)]
        policy: Option<PolicyKind>,
        /// Reconcile every record, then roll it back
        #[arg(long)]
        dry_run: bool,
    },
    /// Rank registered names against a query
    Search {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        instrument_type: String,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Show the listing history of an exchange symbol
    Listings {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        exchange: String,
        #[arg(long)]
        symbol: String,
    },
    /// Report overlapping listing windows
    Audit {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Init { config } => run_init(&config),
        Command::Import {
            config,
            file,
            default_type,
            policy,
            dry_run,
        } => run_import(&config, &file, default_type.as_deref(), policy, dry_run),
        Command::Search {
            config,
            name,
            instrument_type,
            threshold,
        } => run_search(&config, &name, &instrument_type, threshold),
        Command::Listings {
            config,
            exchange,
            symbol,
        } => run_listings(&config, &exchange, &symbol),
        Command::Audit { config } => run_audit(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SecmasterError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the
/// `[logging] level` key; the default is `info`.
pub fn init_logging(config: &dyn ConfigPort) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .get_string("logging", "level")
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::new(level)
    });
    // A second call, e.g. from tests, keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn setup(config_path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let config = load_config(config_path)?;
    init_logging(&config);
    Ok(config)
}

/// Reconciliation settings from `[reconcile]`, with command line overrides.
/// The default type is resolved to its canonical name through `code_map`.
pub fn load_settings(
    config: &dyn ConfigPort,
    code_map: &CodeMap,
    default_type: Option<&str>,
    policy: Option<PolicyKind>,
) -> Result<ReconcileSettings, SecmasterError> {
    let mut settings = ReconcileSettings::from_config(config)?;
    if let Some(default_type) = default_type {
        settings.default_type = default_type.trim().to_string();
    }
    if let Some(policy) = policy {
        settings.policy = policy;
    }
    settings.validate()?;
    settings.resolve_default_type(code_map)?;
    Ok(settings)
}

pub fn build_policy(settings: &ReconcileSettings) -> Policy {
    match settings.policy {
        PolicyKind::Skip => Policy::Skip,
        PolicyKind::AutoAccept => Policy::AutoAcceptBest {
            margin: settings.accept_margin,
        },
        PolicyKind::AutoReject => Policy::AutoReject,
        PolicyKind::Interactive => Policy::Interactive(Box::new(ConsolePrompt::stdio())),
    }
}

pub fn import_records(
    registry: &dyn RegistryPort,
    code_map: &CodeMap,
    settings: ReconcileSettings,
    records: Vec<Result<ExternalRecord, SecmasterError>>,
    dry_run: bool,
) -> BatchSummary {
    let policy = build_policy(&settings);
    let mut reconciler =
        Reconciler::new(registry, code_map, Box::new(policy), settings).dry_run(dry_run);
    reconciler.run(records)
}

pub fn search_names(
    registry: &dyn RegistryPort,
    instrument_type: &str,
    name: &str,
    threshold: f64,
) -> Result<Vec<ScoredName>, SecmasterError> {
    let Some(instrument_type) = registry.find_instrument_type(instrument_type)? else {
        return Ok(Vec::new());
    };
    let names = registry.security_names(instrument_type.id)?;
    Ok(NameIndex::build(&names).ranked_search(name, threshold))
}

/// Every listing of an exchange symbol with the security it is bound to.
pub fn listing_history(
    registry: &dyn RegistryPort,
    exchange: &str,
    symbol: &str,
) -> Result<Vec<(ListedSecurity, Option<CanonicalSecurity>)>, SecmasterError> {
    let Some(exchange) = registry.find_exchange(exchange)? else {
        return Ok(Vec::new());
    };
    let listings = registry.listings_for(exchange.id, &symbol.trim().to_uppercase())?;
    let mut history = Vec::with_capacity(listings.len());
    for listing in listings {
        let security = registry.get_entity(listing.security_id)?;
        history.push((listing, security));
    }
    Ok(history)
}

fn with_registry<F>(config: &dyn ConfigPort, f: F) -> ExitCode
where
    F: FnOnce(&dyn RegistryPort) -> ExitCode,
{
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_repository::SqliteRepository;

        let registry = match SqliteRepository::from_config(config) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };
        if let Err(e) = registry.initialize_schema() {
            eprintln!("error: {e}");
            return (&e).into();
        }
        f(&registry)
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, f);
        eprintln!("error: sqlite feature is required");
        ExitCode::from(1)
    }
}

fn run_init(config_path: &Path) -> ExitCode {
    let config = match setup(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    with_registry(&config, |_| {
        eprintln!("Registry schema is ready");
        ExitCode::SUCCESS
    })
}

fn run_import(
    config_path: &Path,
    file: &Path,
    default_type: Option<&str>,
    policy: Option<PolicyKind>,
    dry_run: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match setup(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let code_map = match CodeMap::from_config(&config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let settings = match load_settings(&config, &code_map, default_type, policy) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Reading {}", file.display());
    let records = match CsvRecordSource::new(file).records() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "Reconciling {} records (policy {}{})",
        records.len(),
        settings.policy,
        if dry_run { ", dry run" } else { "" }
    );

    with_registry(&config, |registry| {
        let summary = import_records(registry, &code_map, settings, records, dry_run);
        for (outcome, count) in summary.counts() {
            println!("{outcome}\t{count}");
        }
        eprintln!("{} records processed", summary.total());
        if dry_run {
            eprintln!("Dry run: no changes were kept");
        }
        if summary.count(Outcome::Failed) > 0 {
            eprintln!(
                "warning: {} records failed and were rolled back",
                summary.count(Outcome::Failed)
            );
        }
        ExitCode::SUCCESS
    })
}

fn run_search(
    config_path: &Path,
    name: &str,
    instrument_type: &str,
    threshold: Option<f64>,
) -> ExitCode {
    let config = match setup(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let settings = match ReconcileSettings::from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let threshold = threshold.unwrap_or(settings.threshold);
    if !(threshold > 0.0 && threshold <= 1.0) {
        let err = SecmasterError::ConfigInvalid {
            section: "reconcile".into(),
            key: "threshold".into(),
            reason: "threshold must be in (0, 1]".into(),
        };
        eprintln!("error: {err}");
        return (&err).into();
    }

    with_registry(&config, |registry| {
        match search_names(registry, instrument_type, name, threshold) {
            Ok(hits) if hits.is_empty() => {
                eprintln!("No {instrument_type} names score {threshold} or more against {name:?}");
                ExitCode::SUCCESS
            }
            Ok(hits) => {
                for hit in &hits {
                    println!("{:.3}\t{}", hit.score, hit.name);
                }
                eprintln!("{} matches", hits.len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                (&e).into()
            }
        }
    })
}

fn run_listings(config_path: &Path, exchange: &str, symbol: &str) -> ExitCode {
    let config = match setup(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_registry(&config, |registry| {
        let history = match listing_history(registry, exchange, symbol) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };
        if history.is_empty() {
            eprintln!("No listings for {symbol} on {exchange}");
            return ExitCode::SUCCESS;
        }
        for (listing, security) in &history {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                listing.start_date,
                listing
                    .end_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "open".to_string()),
                listing.symbol,
                security
                    .as_ref()
                    .map(|s| s.name.as_str())
                    .unwrap_or("<missing security>"),
                listing
                    .vendor_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            );
        }
        ExitCode::SUCCESS
    })
}

fn run_audit(config_path: &Path) -> ExitCode {
    let config = match setup(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    with_registry(&config, |registry| {
        let conflicts = match registry.window_conflicts() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };
        if conflicts.is_empty() {
            eprintln!("No overlapping listing windows");
            return ExitCode::SUCCESS;
        }
        for (a, b) in &conflicts {
            println!(
                "{}\tlisting {} {}\tlisting {} {}",
                a.symbol,
                a.id,
                a.window(),
                b.id,
                b.window()
            );
        }
        eprintln!("{} overlapping listing pairs", conflicts.len());
        ExitCode::from(5)
    })
}
