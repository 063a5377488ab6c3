//! Protocol implementations for record scanning.
//!
//! Currently only DNS: TXT resolution for SPF and DMARC records.

/// DNS TXT lookups
pub mod dns;

// Re-export commonly used functions and types
pub use dns::{
    first_matching, DnsClient, HickoryResolver, StaticResolver, TxtResolver, DMARC_LABEL,
    DMARC_VERSION_TAG, SPF_VERSION_TAG,
};
