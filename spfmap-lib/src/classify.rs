//! Record classification.
//!
//! Pulls the policy token out of a raw TXT record: the `all` mechanism of an
//! SPF record and the `p=` tag of a DMARC record. Both functions are pure and
//! total; "no match" is an empty string, never an error.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `all` mechanism with an optional qualifier, as a whole term.
    static ref ALL_MECHANISM: Regex =
        Regex::new(r"(?i)(?:^|\s)([+\-~?]?all)(?:\s|$)").unwrap();

    /// `p=` tag up to and including its terminating `;`. The word boundary
    /// keeps `sp=` and `np=` from matching.
    static ref DISPOSITION_TAG: Regex = Regex::new(r"(?i)\bp=[^;]*(?:;|$)").unwrap();
}

/// Extract the enforcement qualifier from an SPF record.
///
/// Returns the first `all` mechanism including its qualifier, e.g. `-all`,
/// `~all`, `+all`, `?all`, or a bare `all`.
///
/// # Example
///
/// ```rust
/// use spfmap_lib::extract_enforcement_qualifier;
///
/// assert_eq!(extract_enforcement_qualifier("v=spf1 mx ~all"), "~all");
/// assert_eq!(extract_enforcement_qualifier(""), "");
/// ```
pub fn extract_enforcement_qualifier(policy_record: &str) -> String {
    if policy_record.is_empty() {
        return String::new();
    }

    ALL_MECHANISM
        .captures(policy_record)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Extract the disposition tag from a DMARC record.
///
/// Returns the first `p=` tag with its value and trailing `;`
/// (e.g. `p=reject;`). When `p=` is the last tag and carries no `;`, the
/// tag is still returned without one, so `v=DMARC1; p=none` yields `p=none`
/// rather than an empty string.
///
/// # Example
///
/// ```rust
/// use spfmap_lib::extract_disposition;
///
/// assert_eq!(extract_disposition("v=DMARC1; p=none; rua=mailto:d@example.com"), "p=none;");
/// ```
pub fn extract_disposition(alignment_record: &str) -> String {
    if alignment_record.is_empty() {
        return String::new();
    }

    DISPOSITION_TAG
        .find(alignment_record)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
