//! Error handling for scan operations.
//!
//! One error type covers every way a scan can fail. Only configuration and
//! input errors ever leave the pipeline; lookup and write failures are
//! absorbed by the component that produced them.

use std::fmt;
use std::time::Duration;

/// Main error type for scan operations.
#[derive(Debug, Clone)]
pub enum ScanError {
    /// Invalid domain name supplied as a scan target
    InvalidDomain {
        domain: String,
        reason: String,
    },

    /// Configuration errors (invalid settings, conflicting inputs, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading domain lists or config files
    FileError {
        path: String,
        message: String,
    },

    /// DNS query failures (NXDOMAIN, SERVFAIL, unreachable resolver)
    ResolveError {
        name: String,
        message: String,
    },

    /// A lookup did not complete before its deadline
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Persistent store failures (open, schema, insert)
    StoreError {
        message: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl ScanError {
    /// Create a new invalid domain error.
    pub fn invalid_domain<D: Into<String>, R: Into<String>>(domain: D, reason: R) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new resolver error for the queried name.
    pub fn resolve<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::ResolveError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new store error.
    pub fn store<M: Into<String>>(message: M) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is a fatal configuration/input problem.
    ///
    /// These are the only errors that abort a scan; everything else is
    /// contained inside the worker or the collector.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidDomain { .. } | Self::ConfigError { .. } | Self::FileError { .. }
        )
    }

    /// Whether this error came from a DNS lookup (query failure or deadline).
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::ResolveError { .. } | Self::Timeout { .. })
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { domain, reason } => {
                write!(f, "Invalid domain '{}': {}", domain, reason)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::ResolveError { name, message } => {
                write!(f, "DNS lookup failed for '{}': {}", name, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::StoreError { message } => {
                write!(f, "Store error: {}", message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ScanError {}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreError {
            message: err.to_string(),
        }
    }
}

impl From<hickory_resolver::error::ResolveError> for ScanError {
    fn from(err: hickory_resolver::error::ResolveError) -> Self {
        Self::ResolveError {
            name: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for ScanError {
    fn from(err: regex::Error) -> Self {
        Self::Internal {
            message: format!("Regex error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScanError::config("workers must be positive").is_fatal());
        assert!(ScanError::file_error("domains.txt", "not found").is_fatal());
        assert!(ScanError::invalid_domain("", "empty").is_fatal());
        assert!(!ScanError::resolve("example.com", "NXDOMAIN").is_fatal());
        assert!(!ScanError::store("disk full").is_fatal());
    }

    #[test]
    fn test_lookup_failure_classification() {
        assert!(ScanError::resolve("example.com", "SERVFAIL").is_lookup_failure());
        assert!(ScanError::timeout("TXT lookup", Duration::from_secs(5)).is_lookup_failure());
        assert!(!ScanError::store("locked").is_lookup_failure());
    }

    #[test]
    fn test_display_messages() {
        let err = ScanError::resolve("_dmarc.example.com", "no records found");
        assert_eq!(
            err.to_string(),
            "DNS lookup failed for '_dmarc.example.com': no records found"
        );

        let err = ScanError::file_error("missing.txt", "No such file or directory");
        assert!(err.to_string().contains("missing.txt"));
    }
}
