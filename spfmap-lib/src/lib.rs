//! # spfmap Library
//!
//! Scans domains for SPF and DMARC TXT records, classifies what it finds and
//! stores one row per domain for later reporting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spfmap_lib::{HickoryResolver, InputSource, ScanConfig, ScanPipeline, SqliteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Arc::new(HickoryResolver::from_system_conf_or_default());
//!     let pipeline = ScanPipeline::new(resolver, ScanConfig::default().with_workers(10))?;
//!
//!     let mut store = SqliteStore::open("spfmap.db").await?;
//!     store.ensure_schema().await?;
//!
//!     let input = InputSource::File("domains.txt".into());
//!     let summary = pipeline.run(input, &mut store).await?;
//!     println!("{} domains, {} stored", summary.domains_scanned, summary.records_persisted);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded pipeline**: fixed worker pool between two bounded queues
//! - **Clean shutdown**: results queue closes only after the last worker exits
//! - **Lookup deadlines**: a hung query becomes an absent record
//! - **Pluggable backends**: resolver and store are traits

// Re-export main public API types and functions
pub use checker::RecordChecker;
pub use classify::{extract_disposition, extract_enforcement_qualifier};
pub use concurrent::{parse_domain_line, Arrival, CompletionBarrier, ScanPipeline};
pub use config::{
    load_env_config, load_env_config_from, parse_duration, ConfigManager, DefaultsConfig,
    EnvConfig, FileConfig,
};
pub use error::ScanError;
pub use protocols::{
    first_matching, DnsClient, HickoryResolver, StaticResolver, TxtResolver, DMARC_LABEL,
    DMARC_VERSION_TAG, SPF_VERSION_TAG,
};
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use types::{
    InputSource, RecordSelection, ScanConfig, ScanRecord, ScanSummary, DEFAULT_DB,
    DEFAULT_LOOKUP_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
};

// Internal modules - these are not part of the public API
mod checker;
mod classify;
mod concurrent;
mod config;
mod error;
mod protocols;
mod store;
mod types;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
