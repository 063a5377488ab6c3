//! DNS TXT lookups for SPF and DMARC records.
//!
//! Resolution goes through the [`TxtResolver`] trait so the scan pipeline can
//! run against the system resolver or an in-memory table. [`DnsClient`] sits on
//! top of a resolver and knows which name to query and which record to keep.

use crate::error::ScanError;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Version tag every SPF record starts with.
pub const SPF_VERSION_TAG: &str = "v=spf1";

/// Version tag every DMARC record starts with.
pub const DMARC_VERSION_TAG: &str = "v=DMARC1";

/// Label DMARC records are published under.
pub const DMARC_LABEL: &str = "_dmarc";

/// Anything that can answer a TXT query.
///
/// Implementations return every TXT string published at `name`. A name with
/// no TXT records yields an empty list; transport or server failures yield an
/// error.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError>;
}

/// TXT resolver backed by hickory's tokio resolver.
#[derive(Clone)]
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Create a resolver from the host configuration (`/etc/resolv.conf`).
    pub fn from_system_conf() -> Result<Self, ScanError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Self { inner })
    }

    /// Create a resolver using hickory's default public upstreams.
    pub fn with_default_upstream() -> Self {
        Self {
            inner: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }

    /// Use the host configuration, falling back to the default upstreams when
    /// it cannot be read.
    pub fn from_system_conf_or_default() -> Self {
        match Self::from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "system resolver configuration unavailable, using default upstream");
                Self::with_default_upstream()
            }
        }
    }
}

#[async_trait]
impl TxtResolver for HickoryResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError> {
        // Fully qualified so resolv.conf search domains are never appended
        let fqdn = format!("{}.", name.trim_end_matches('.'));

        match self.inner.txt_lookup(fqdn.as_str()).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. }
                    if matches!(*response_code, ResponseCode::NoError | ResponseCode::NXDomain) =>
                {
                    Ok(Vec::new())
                }
                _ => Err(ScanError::resolve(name, e.to_string())),
            },
        }
    }
}

/// In-memory TXT resolver.
///
/// Names that were never added fail like an unreachable zone. Useful for
/// offline scans and for driving the pipeline in tests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    queries: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish TXT strings at `name`.
    pub fn with_txt<N, I, S>(mut self, name: N, txt: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.records
            .entry(name.into().to_lowercase())
            .or_default()
            .extend(txt.into_iter().map(Into::into));
        self
    }

    /// Make every query for `name` fail.
    pub fn with_failure<N: Into<String>>(mut self, name: N) -> Self {
        self.failing.insert(name.into().to_lowercase());
        self
    }

    /// Delay every answer, to exercise lookup deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxtResolver for StaticResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, ScanError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = name.trim_end_matches('.').to_lowercase();
        if self.failing.contains(&key) {
            return Err(ScanError::resolve(name, "SERVFAIL"));
        }
        self.records
            .get(&key)
            .cloned()
            .ok_or_else(|| ScanError::resolve(name, "no such host"))
    }
}

/// Lookup service for SPF and DMARC records.
///
/// Every query is bounded by the client's timeout; an expired deadline is
/// reported as [`ScanError::Timeout`].
#[derive(Clone)]
pub struct DnsClient {
    resolver: Arc<dyn TxtResolver>,
    timeout: Duration,
}

impl DnsClient {
    /// Create a new client with the default 5 second lookup deadline.
    pub fn new(resolver: Arc<dyn TxtResolver>) -> Self {
        Self::with_timeout(resolver, crate::types::DEFAULT_LOOKUP_TIMEOUT)
    }

    /// Create a new client with a custom lookup deadline.
    pub fn with_timeout(resolver: Arc<dyn TxtResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Look up the SPF record of `domain`.
    ///
    /// Returns the first TXT string starting with `v=spf1`, or an empty string
    /// when none does.
    ///
    /// # Errors
    ///
    /// Returns `ScanError` if the query fails or misses its deadline.
    pub async fn lookup_policy_record(&self, domain: &str) -> Result<String, ScanError> {
        self.lookup_matching(domain, SPF_VERSION_TAG).await
    }

    /// Look up the DMARC record of `domain` under `_dmarc.<domain>`.
    ///
    /// Returns the first TXT string starting with `v=DMARC1`, or an empty
    /// string when none does.
    ///
    /// # Errors
    ///
    /// Returns `ScanError` if the query fails or misses its deadline.
    pub async fn lookup_alignment_record(&self, domain: &str) -> Result<String, ScanError> {
        let name = format!("{}.{}", DMARC_LABEL, domain);
        self.lookup_matching(&name, DMARC_VERSION_TAG).await
    }

    async fn lookup_matching(&self, name: &str, tag: &str) -> Result<String, ScanError> {
        let records = tokio::time::timeout(self.timeout, self.resolver.resolve_txt(name))
            .await
            .map_err(|_| ScanError::timeout(format!("TXT lookup for {}", name), self.timeout))??;

        debug!(name, answers = records.len(), "TXT lookup complete");
        Ok(first_matching(&records, tag).unwrap_or_default())
    }
}

/// Return the first record that starts with `tag`.
pub fn first_matching(records: &[String], tag: &str) -> Option<String> {
    records.iter().find(|r| r.starts_with(tag)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(resolver: StaticResolver) -> DnsClient {
        DnsClient::new(Arc::new(resolver))
    }

    #[test]
    fn test_first_matching_picks_first_tagged_record() {
        let records = vec![
            "google-site-verification=abc".to_string(),
            "v=spf1 include:_spf.google.com ~all".to_string(),
            "v=spf1 -all".to_string(),
        ];
        assert_eq!(
            first_matching(&records, SPF_VERSION_TAG),
            Some("v=spf1 include:_spf.google.com ~all".to_string())
        );
        assert_eq!(first_matching(&records, DMARC_VERSION_TAG), None);
        assert_eq!(first_matching(&[], SPF_VERSION_TAG), None);
    }

    #[tokio::test]
    async fn test_policy_lookup_filters_unrelated_txt() {
        let dns = client(StaticResolver::new().with_txt(
            "example.com",
            ["MS=ms12345", "v=spf1 include:_spf.example.com -all"],
        ));

        let record = dns.lookup_policy_record("example.com").await.unwrap();
        assert_eq!(record, "v=spf1 include:_spf.example.com -all");
    }

    #[tokio::test]
    async fn test_policy_lookup_without_match_is_empty_not_error() {
        let dns = client(StaticResolver::new().with_txt("example.com", ["MS=ms12345"]));
        assert_eq!(dns.lookup_policy_record("example.com").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_alignment_lookup_queries_dmarc_label() {
        let dns = client(
            StaticResolver::new()
                .with_txt("example.com", ["v=DMARC1; p=none;"])
                .with_txt("_dmarc.example.com", ["v=DMARC1; p=reject; rua=mailto:x@y.com"]),
        );

        let record = dns.lookup_alignment_record("example.com").await.unwrap();
        assert_eq!(record, "v=DMARC1; p=reject; rua=mailto:x@y.com");
    }

    #[tokio::test]
    async fn test_query_failure_is_error() {
        let dns = client(StaticResolver::new().with_failure("broken.example"));
        let err = dns.lookup_policy_record("broken.example").await.unwrap_err();
        assert!(err.is_lookup_failure());

        let err = dns.lookup_alignment_record("unknown.example").await.unwrap_err();
        assert!(matches!(err, ScanError::ResolveError { .. }));
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout() {
        let resolver = StaticResolver::new()
            .with_txt("slow.example", ["v=spf1 -all"])
            .with_delay(Duration::from_millis(200));
        let dns = DnsClient::with_timeout(Arc::new(resolver), Duration::from_millis(20));

        let err = dns.lookup_policy_record("slow.example").await.unwrap_err();
        assert!(matches!(err, ScanError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_static_resolver_is_case_insensitive() {
        let resolver = StaticResolver::new().with_txt("Example.COM", ["v=spf1 ~all"]);
        let answers = resolver.resolve_txt("example.com.").await.unwrap();
        assert_eq!(answers, vec!["v=spf1 ~all".to_string()]);
        assert_eq!(resolver.query_count(), 1);
    }
}
