//! Per-domain record checking.
//!
//! This module provides `RecordChecker`, which runs the SPF and DMARC lookups
//! for one domain and turns the answers into a classified [`ScanRecord`].

use crate::protocols::{DnsClient, HickoryResolver, TxtResolver};
use crate::types::{RecordSelection, ScanConfig, ScanRecord};
use std::sync::Arc;
use tracing::debug;

/// Checks one domain at a time for SPF and DMARC records.
///
/// Lookup failures never escape `check_domain`: a failed or expired query is
/// recorded as an absent record. Cloning is cheap; every worker holds its own
/// clone sharing the same resolver.
///
/// # Example
///
/// ```rust,no_run
/// use spfmap_lib::RecordChecker;
///
/// #[tokio::main]
/// async fn main() {
///     let checker = RecordChecker::new();
///     let record = checker.check_domain("example.com").await;
///     println!("{}: {:?}", record.domain, record.policy_qualifier);
/// }
/// ```
#[derive(Clone)]
pub struct RecordChecker {
    dns: DnsClient,
    selection: RecordSelection,
}

impl RecordChecker {
    /// Create a checker using the system resolver and default configuration.
    pub fn new() -> Self {
        Self::with_config(
            Arc::new(HickoryResolver::from_system_conf_or_default()),
            &ScanConfig::default(),
        )
    }

    /// Create a checker over a specific resolver.
    pub fn with_config(resolver: Arc<dyn TxtResolver>, config: &ScanConfig) -> Self {
        Self {
            dns: DnsClient::with_timeout(resolver, config.lookup_timeout),
            selection: config.selection,
        }
    }

    /// Which records this checker queries.
    pub fn selection(&self) -> RecordSelection {
        self.selection
    }

    /// Scan a single domain.
    ///
    /// Both lookups run concurrently. A record type that is not selected is
    /// never queried and stays empty.
    pub async fn check_domain(&self, domain: &str) -> ScanRecord {
        let (policy_record, alignment_record) =
            tokio::join!(self.policy_record(domain), self.alignment_record(domain));

        ScanRecord::classified(domain, policy_record, alignment_record)
    }

    async fn policy_record(&self, domain: &str) -> String {
        if !self.selection.scans_policy() {
            return String::new();
        }
        self.dns
            .lookup_policy_record(domain)
            .await
            .unwrap_or_else(|e| {
                debug!(domain, error = %e, "SPF lookup failed, recording as absent");
                String::new()
            })
    }

    async fn alignment_record(&self, domain: &str) -> String {
        if !self.selection.scans_alignment() {
            return String::new();
        }
        self.dns
            .lookup_alignment_record(domain)
            .await
            .unwrap_or_else(|e| {
                debug!(domain, error = %e, "DMARC lookup failed, recording as absent");
                String::new()
            })
    }
}

impl Default for RecordChecker {
    fn default() -> Self {
        Self::new()
    }
}
