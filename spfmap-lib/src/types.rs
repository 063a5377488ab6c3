//! Core data types for SPF/DMARC scanning.
//!
//! This module defines the records produced by the pipeline, the scan
//! configuration, and the summary returned once a scan has drained.

use crate::classify::{extract_disposition, extract_enforcement_qualifier};
use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of concurrent lookup workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Default capacity of both the work queue and the results queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default deadline for a single TXT lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default SQLite database path.
pub const DEFAULT_DB: &str = "spfmap.db";

/// Result of scanning one domain.
///
/// Built once by a worker and never modified afterwards. Raw records are the
/// empty string when the record is absent or the lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// The scanned domain name (e.g., "example.com")
    pub domain: String,

    /// Raw SPF record text, or empty
    pub policy_record: String,

    /// Raw DMARC record text, or empty
    pub alignment_record: String,

    /// The `all` mechanism of the SPF record (e.g., "-all"), or empty
    pub policy_qualifier: String,

    /// The `p=` tag of the DMARC record (e.g., "p=reject;"), or empty
    pub alignment_disposition: String,
}

impl ScanRecord {
    /// Build a record from raw lookups, deriving both classifications.
    ///
    /// Classifications are computed from the raw text only, so an empty
    /// record can never carry a qualifier or disposition.
    pub fn classified<D, P, A>(domain: D, policy_record: P, alignment_record: A) -> Self
    where
        D: Into<String>,
        P: Into<String>,
        A: Into<String>,
    {
        let policy_record = policy_record.into();
        let alignment_record = alignment_record.into();
        Self {
            domain: domain.into(),
            policy_qualifier: extract_enforcement_qualifier(&policy_record),
            alignment_disposition: extract_disposition(&alignment_record),
            policy_record,
            alignment_record,
        }
    }

    /// Record for a domain where nothing was found.
    pub fn empty<D: Into<String>>(domain: D) -> Self {
        Self::classified(domain, "", "")
    }

    /// Whether an SPF record was found.
    pub fn has_policy_record(&self) -> bool {
        !self.policy_record.is_empty()
    }

    /// Whether a DMARC record was found.
    pub fn has_alignment_record(&self) -> bool {
        !self.alignment_record.is_empty()
    }
}

/// Which TXT records a scan queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordSelection {
    /// SPF only
    #[serde(rename = "spf")]
    Policy,

    /// DMARC only
    #[serde(rename = "dmarc")]
    Alignment,

    /// Both SPF and DMARC
    #[default]
    #[serde(rename = "both")]
    Both,
}

impl RecordSelection {
    /// Resolve `--spf` / `--dmarc` style flags. Neither or both means both.
    pub fn from_flags(spf: bool, dmarc: bool) -> Self {
        match (spf, dmarc) {
            (true, false) => Self::Policy,
            (false, true) => Self::Alignment,
            _ => Self::Both,
        }
    }

    pub fn scans_policy(self) -> bool {
        matches!(self, Self::Policy | Self::Both)
    }

    pub fn scans_alignment(self) -> bool {
        matches!(self, Self::Alignment | Self::Both)
    }
}

impl FromStr for RecordSelection {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spf" => Ok(Self::Policy),
            "dmarc" => Ok(Self::Alignment),
            "both" | "all" => Ok(Self::Both),
            other => Err(ScanError::config(format!(
                "Invalid scan selection '{}', use spf, dmarc or both",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RecordSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy => write!(f, "spf"),
            Self::Alignment => write!(f, "dmarc"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Where the domains to scan come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A single domain given on the command line
    Target(String),

    /// A newline-delimited file of domains
    File(PathBuf),
}

impl InputSource {
    /// Pick the input source, requiring exactly one of target or file.
    pub fn from_options(
        target: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<Self, ScanError> {
        match (target, file) {
            (Some(target), None) => {
                let target = target.trim().to_string();
                if target.is_empty() {
                    return Err(ScanError::invalid_domain(
                        target,
                        "Target domain cannot be empty",
                    ));
                }
                Ok(Self::Target(target))
            }
            (None, Some(path)) => Ok(Self::File(path)),
            (Some(_), Some(_)) => Err(ScanError::config(
                "Specify either a target domain or an input file, not both",
            )),
            (None, None) => Err(ScanError::config(
                "You need to provide a target domain or an input file",
            )),
        }
    }
}

/// Configuration options for a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Number of concurrent lookup workers
    /// Default: 5, Range: 1-100
    pub workers: usize,

    /// Capacity of the work and results queues
    /// Default: 100
    pub queue_capacity: usize,

    /// Deadline for each individual TXT lookup
    /// Default: 5 seconds
    pub lookup_timeout: Duration,

    /// Which records to query
    /// Default: both
    pub selection: RecordSelection,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            selection: RecordSelection::Both,
        }
    }
}

impl ScanConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_selection(mut self, selection: RecordSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Reject settings that would hang or starve the pipeline.
    ///
    /// Zero workers would leave the work queue undrained forever, and a
    /// zero-capacity queue cannot be constructed.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.workers == 0 || self.workers > 100 {
            return Err(ScanError::config("Worker count must be between 1 and 100"));
        }
        if self.queue_capacity == 0 || self.queue_capacity > 10_000 {
            return Err(ScanError::config(
                "Queue capacity must be between 1 and 10000",
            ));
        }
        if self.lookup_timeout.is_zero() {
            return Err(ScanError::config("Lookup timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Counts reported once a scan has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Records received by the collector
    pub domains_scanned: usize,

    /// Records written successfully
    pub records_persisted: usize,

    /// Records whose write failed and was skipped
    pub write_failures: usize,

    /// Records carrying an SPF record
    pub with_policy_record: usize,

    /// Records carrying a DMARC record
    pub with_alignment_record: usize,

    /// Wall-clock time of the scan
    #[serde(skip)]
    pub duration: Duration,
}

impl ScanSummary {
    pub(crate) fn observe(&mut self, record: &ScanRecord) {
        self.domains_scanned += 1;
        if record.has_policy_record() {
            self.with_policy_record += 1;
        }
        if record.has_alignment_record() {
            self.with_alignment_record += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classified_record_derives_tokens() {
        let record = ScanRecord::classified(
            "example.com",
            "v=spf1 include:_spf.example.com -all",
            "v=DMARC1; p=reject; rua=mailto:x@y.com",
        );
        assert_eq!(record.policy_qualifier, "-all");
        assert_eq!(record.alignment_disposition, "p=reject;");
        assert!(record.has_policy_record());
        assert!(record.has_alignment_record());
    }

    #[test]
    fn test_empty_record_has_no_classification() {
        let record = ScanRecord::empty("nonexistent-domain.invalid");
        assert_eq!(record.domain, "nonexistent-domain.invalid");
        assert!(record.policy_record.is_empty());
        assert!(record.alignment_record.is_empty());
        assert!(record.policy_qualifier.is_empty());
        assert!(record.alignment_disposition.is_empty());
    }

    #[test]
    fn test_selection_from_flags() {
        assert_eq!(RecordSelection::from_flags(false, false), RecordSelection::Both);
        assert_eq!(RecordSelection::from_flags(true, true), RecordSelection::Both);
        assert_eq!(RecordSelection::from_flags(true, false), RecordSelection::Policy);
        assert_eq!(RecordSelection::from_flags(false, true), RecordSelection::Alignment);

        assert!(RecordSelection::Policy.scans_policy());
        assert!(!RecordSelection::Policy.scans_alignment());
        assert!(RecordSelection::Both.scans_alignment());
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!("SPF".parse::<RecordSelection>().unwrap(), RecordSelection::Policy);
        assert_eq!("dmarc".parse::<RecordSelection>().unwrap(), RecordSelection::Alignment);
        assert_eq!("both".parse::<RecordSelection>().unwrap(), RecordSelection::Both);
        assert!("dkim".parse::<RecordSelection>().is_err());
    }

    #[test]
    fn test_input_source_requires_exactly_one() {
        assert_eq!(
            InputSource::from_options(Some("a.com".to_string()), None).unwrap(),
            InputSource::Target("a.com".to_string())
        );
        assert_eq!(
            InputSource::from_options(None, Some(PathBuf::from("domains.txt"))).unwrap(),
            InputSource::File(PathBuf::from("domains.txt"))
        );
        assert!(InputSource::from_options(None, None).unwrap_err().is_fatal());
        assert!(InputSource::from_options(
            Some("a.com".to_string()),
            Some(PathBuf::from("domains.txt"))
        )
        .is_err());
        assert!(InputSource::from_options(Some("   ".to_string()), None).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ScanConfig::default().with_workers(0);
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Worker count"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanConfig::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.queue_capacity, 100);
        assert!(config.validate().is_ok());
        assert!(ScanConfig::default().with_queue_capacity(0).validate().is_err());
        assert!(ScanConfig::default()
            .with_lookup_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_summary_serializes_counts() {
        let mut summary = ScanSummary::default();
        summary.observe(&ScanRecord::classified("a.com", "v=spf1 ~all", ""));
        summary.observe(&ScanRecord::empty("b.com"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["domains_scanned"], 2);
        assert_eq!(json["with_policy_record"], 1);
        assert_eq!(json["with_alignment_record"], 0);
        assert!(json.get("duration").is_none());
    }
}
