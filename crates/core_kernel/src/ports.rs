//! Ports for external collaborators
//!
//! The claims engine never talks to the outside world itself. XML
//! serialization, transmission to the insurance operator and procedure
//! catalog lookups are reached through port traits defined in the domain
//! crate; this module holds the pieces every port shares.
//!
//! ```text
//!   application service ──► port trait (domain crate) ──► adapter
//!                                                          (file store,
//!                                                           operator web
//!                                                           service, ...)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a port adapter
///
/// Callers decide whether to retry from [`PortError::is_transient`] alone,
/// whichever collaborator failed.
#[derive(Debug, Error)]
pub enum PortError {
    /// A lookup found nothing under the given key
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    /// The collaborator refused the document it was handed
    #[error("rejected: {reason}")]
    Rejected { reason: String, code: Option<String> },

    /// Writing or reading an artifact failed
    #[error("storage failure: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The remote endpoint could not be reached
    #[error("{service} unreachable")]
    Unreachable {
        service: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The remote endpoint is up but refusing work
    #[error("{service} unavailable")]
    Unavailable { service: String },

    /// No answer within the deadline
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        PortError::Rejected {
            reason: reason.into(),
            code: None,
        }
    }

    /// A refusal carrying the operator's own error code
    pub fn rejected_with_code(reason: impl Into<String>, code: impl Into<String>) -> Self {
        PortError::Rejected {
            reason: reason.into(),
            code: Some(code.into()),
        }
    }

    pub fn storage(message: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        PortError::Storage {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        PortError::Unavailable {
            service: service.into(),
        }
    }

    /// True if the same call may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Unreachable { .. } | PortError::Unavailable { .. } | PortError::Timeout { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// True if the collaborator refused the input outright
    pub fn is_rejection(&self) -> bool {
        matches!(self, PortError::Rejected { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits extend this marker so they can be shared across tasks.
pub trait DomainPort: Send + Sync + 'static {}

/// Audit data passed along with every port call
#[derive(Debug, Clone, Default)]
pub struct OperationMetadata {
    /// Ties log lines of one request together
    pub correlation_id: Option<String>,
    /// Clerk or job that started the operation
    pub initiated_by: Option<String>,
    /// Free-form attributes, ordered by key for stable logs
    pub attributes: BTreeMap<String, String>,
}

impl OperationMetadata {
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    pub fn initiated_by(mut self, who: impl Into<String>) -> Self {
        self.initiated_by = Some(who.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Correlation id for log fields, `-` when absent
    pub fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_key() {
        let error = PortError::not_found("Procedure", "40101012");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "Procedure 40101012 not found");
    }

    #[test]
    fn test_transient_failures() {
        let timeout = PortError::Timeout {
            operation: "transmit".to_string(),
            duration_ms: 5000,
        };
        assert!(timeout.is_transient());
        assert!(PortError::unavailable("operator-webservice").is_transient());

        let refused = PortError::rejected_with_code("malformed batch", "1304");
        assert!(refused.is_rejection());
        assert!(!refused.is_transient());
    }

    #[test]
    fn test_storage_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error = PortError::storage("cannot write LOTE-000001.xml", io);
        assert!(std::error::Error::source(&error).is_some());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_operation_metadata() {
        let metadata = OperationMetadata::with_correlation_id("req-123")
            .initiated_by("billing-clerk")
            .with_attribute("batch_number", "LOTE-000001");

        assert_eq!(metadata.correlation(), "req-123");
        assert_eq!(metadata.initiated_by.as_deref(), Some("billing-clerk"));
        assert_eq!(
            metadata.attributes.get("batch_number").map(String::as_str),
            Some("LOTE-000001")
        );
        assert_eq!(OperationMetadata::default().correlation(), "-");
    }
}
