//! spfmap CLI Application
//!
//! Scans one domain or a file of domains for SPF and DMARC records and stores
//! the classified results in a SQLite database.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use spfmap_lib::{
    load_env_config, parse_duration, ConfigManager, EnvConfig, FileConfig, HickoryResolver,
    InputSource, RecordSelection, ScanConfig, ScanError, ScanPipeline, SqliteStore, DEFAULT_DB,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info_span;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for spfmap
#[derive(Parser, Debug)]
#[command(name = "spfmap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scan domains for SPF and DMARC records and store the results in SQLite")]
#[command(
    long_about = "Scan domains for SPF and DMARC records and store the results in SQLite.\n\nLookups run on a fixed pool of workers; every domain produces exactly one row in the results table."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Single domain to scan
    #[arg(long = "target", value_name = "DOMAIN", help_heading = "Input")]
    pub target: Option<String>,

    /// File with target domains (one per line)
    #[arg(
        short = 'f',
        long = "infile",
        value_name = "FILE",
        help_heading = "Input"
    )]
    pub infile: Option<PathBuf>,

    /// Scan targets for SPF only
    #[arg(long = "spf", help_heading = "Records")]
    pub spf: bool,

    /// Scan targets for DMARC only
    #[arg(long = "dmarc", help_heading = "Records")]
    pub dmarc: bool,

    /// SQLite database to write results to (default: spfmap.db)
    #[arg(long = "db", value_name = "PATH", help_heading = "Storage")]
    pub db: Option<String>,

    /// Do not create the results table if it is missing
    #[arg(long = "no-init-db", help_heading = "Storage")]
    pub no_init_db: bool,

    /// Number of lookup workers (default: 5, max: 100)
    #[arg(short = 'w', long = "workers", value_name = "N", help_heading = "Performance")]
    pub workers: Option<usize>,

    /// Deadline per DNS lookup, e.g. 5s, 500ms (default: 5s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Capacity of the work and results queues (default: 100)
    #[arg(long = "queue-capacity", value_name = "N", help_heading = "Performance")]
    pub queue_capacity: Option<usize>,

    /// Print the scan summary as JSON
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show per-domain debug logging
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Settings {
    pub(crate) scan: ScanConfig,
    pub(crate) db: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args);

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_scan(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr tracing subscriber. `RUST_LOG` wins over the flags.
fn init_logging(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},sqlx=warn,hickory_proto=warn,hickory_resolver=warn",
            level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    match (&args.target, &args.infile) {
        (None, None) => {
            return Err(
                "You need to provide a target with --target or a file with --infile".to_string(),
            )
        }
        (Some(_), Some(_)) => {
            return Err("Specify either --target or --infile, not both".to_string());
        }
        (Some(target), None) if target.trim().is_empty() => {
            return Err("Target domain cannot be empty".to_string());
        }
        _ => {}
    }

    if let Some(path) = &args.infile {
        if !path.exists() {
            return Err(format!("Input file not found: {}", path.display()));
        }
        if !path.is_file() {
            return Err(format!("Input is not a regular file: {}", path.display()));
        }
    }

    if let Some(workers) = args.workers {
        if workers == 0 || workers > 100 {
            return Err("Worker count must be between 1 and 100".to_string());
        }
    }

    if let Some(capacity) = args.queue_capacity {
        if capacity == 0 || capacity > 10_000 {
            return Err("Queue capacity must be between 1 and 10000".to_string());
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_duration(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use format like '5s', '500ms', '2m'",
                timeout
            ));
        }
    }

    Ok(())
}

/// Main scanning logic
async fn run_scan(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings(&args, load_env_config())?;
    let input = InputSource::from_options(args.target.clone(), args.infile.clone())?;

    // The database file must not be created for an input that cannot be read
    if let InputSource::File(path) = &input {
        std::fs::File::open(path).map_err(|e| {
            ScanError::file_error(
                path.display().to_string(),
                format!("Failed to open input file: {}", e),
            )
        })?;
    }

    let resolver = Arc::new(HickoryResolver::from_system_conf_or_default());
    let pipeline = ScanPipeline::new(resolver, settings.scan.clone())?
        .with_span(info_span!("scan", db = %settings.db));

    let mut store = SqliteStore::open(&settings.db).await?;
    if !args.no_init_db {
        store.ensure_schema().await?;
    }

    if !args.json {
        ui::print_header(&input, &settings);
    }
    let spinner = if args.json {
        None
    } else {
        ui::Spinner::start("Scanning...".to_string())
    };

    let result = pipeline.run(input, &mut store).await;

    if let Some(s) = spinner {
        s.stop().await;
    }
    let summary = result?;
    store.close().await?;

    if args.json {
        let mut value = serde_json::to_value(&summary)?;
        value["elapsed_ms"] = serde_json::json!(summary.duration.as_millis() as u64);
        value["db"] = serde_json::json!(settings.db);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        ui::print_summary(&summary, &settings.db);
    }

    Ok(())
}

/// Build run settings from all configuration sources.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (SPFMAP_*)
/// 3. Local config file (./spfmap.toml)
/// 4. Global config file (~/.spfmap.toml)
/// 5. XDG config file (~/.config/spfmap/config.toml)
/// 6. Built-in defaults
fn build_settings(
    args: &Args,
    env_config: EnvConfig,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings {
        scan: ScanConfig::default(),
        db: DEFAULT_DB.to_string(),
    };

    let config_manager = ConfigManager::new();

    // Step 1: config files
    let explicit_config = args.config.clone().or_else(|| env_config.config.clone());
    let file_config = match explicit_config {
        Some(path) => config_manager
            .load_file(&path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?,
        None => config_manager.discover_and_load()?,
    };
    settings = merge_file_config(settings, file_config)?;

    // Step 2: environment variables
    settings = apply_env_config(settings, env_config);

    // Step 3: CLI arguments
    settings = apply_cli_args(settings, args)?;

    settings.scan.validate()?;
    Ok(settings)
}

/// Merge FileConfig into the settings.
fn merge_file_config(
    mut settings: Settings,
    file_config: FileConfig,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let Some(defaults) = file_config.defaults else {
        return Ok(settings);
    };

    if let Some(workers) = defaults.workers {
        settings.scan.workers = workers;
    }
    if let Some(db) = defaults.db {
        settings.db = db;
    }
    if let Some(timeout) = defaults.timeout.as_deref().and_then(parse_duration) {
        settings.scan.lookup_timeout = timeout;
    }
    if let Some(capacity) = defaults.queue_capacity {
        settings.scan.queue_capacity = capacity;
    }
    if let Some(scan) = defaults.scan {
        settings.scan.selection = scan.parse()?;
    }

    Ok(settings)
}

/// Apply SPFMAP_* environment variables.
fn apply_env_config(mut settings: Settings, env_config: EnvConfig) -> Settings {
    if let Some(workers) = env_config.workers {
        settings.scan.workers = workers;
    }
    if let Some(db) = env_config.db {
        settings.db = db;
    }
    if let Some(timeout) = env_config.timeout {
        settings.scan.lookup_timeout = timeout;
    }
    if let Some(capacity) = env_config.queue_capacity {
        settings.scan.queue_capacity = capacity;
    }
    if let Some(selection) = env_config.scan {
        settings.scan.selection = selection;
    }
    settings
}

/// Apply explicit CLI arguments (highest precedence).
fn apply_cli_args(
    mut settings: Settings,
    args: &Args,
) -> Result<Settings, Box<dyn std::error::Error>> {
    if let Some(workers) = args.workers {
        settings.scan.workers = workers;
    }
    if let Some(db) = &args.db {
        settings.db = db.clone();
    }
    if let Some(timeout) = &args.timeout {
        settings.scan.lookup_timeout = parse_duration(timeout)
            .ok_or_else(|| format!("Invalid timeout '{}'", timeout))?;
    }
    if let Some(capacity) = args.queue_capacity {
        settings.scan.queue_capacity = capacity;
    }
    if args.spf || args.dmarc {
        settings.scan.selection = RecordSelection::from_flags(args.spf, args.dmarc);
    }
    Ok(settings)
}
