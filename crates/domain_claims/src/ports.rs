//! Claims Domain Ports
//!
//! The engine only records the outcome of work done by external
//! collaborators. These traits describe that work:
//!
//! - **`BillingXmlSerializer`**: renders a batch into the standards-mandated
//!   billing XML and stores it somewhere, returning a logical reference
//! - **`ClaimTransmitter`**: sends the artifact to the insurance operator and
//!   returns the protocol number it issued
//! - **`ProcedureCatalog`**: looks up procedure codes, descriptions and
//!   reference prices
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = BatchSubmissionService::new(Arc::new(serializer), Arc::new(transmitter));
//! let receipt = service.submit(&mut batch, &metadata).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, Money, OperationMetadata, PortError};

use crate::batch::ClaimBatch;

/// Logical reference to a generated billing XML document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlArtifact {
    pub file_name: String,
    pub path: Option<String>,
}

/// What the operator hands back when a batch is accepted for processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub protocol_number: Option<String>,
}

/// A procedure catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureReference {
    pub code: String,
    pub description: String,
    pub reference_price: Money,
}

/// Renders and stores the billing XML for a batch
#[async_trait]
pub trait BillingXmlSerializer: DomainPort {
    /// Produces the artifact for `batch`
    ///
    /// # Errors
    ///
    /// Returns a `PortError` if rendering or storage fails.
    async fn serialize(
        &self,
        batch: &ClaimBatch,
        metadata: &OperationMetadata,
    ) -> Result<XmlArtifact, PortError>;
}

/// Transmits a generated artifact to the insurance operator
#[async_trait]
pub trait ClaimTransmitter: DomainPort {
    async fn transmit(
        &self,
        batch: &ClaimBatch,
        artifact: &XmlArtifact,
        metadata: &OperationMetadata,
    ) -> Result<SubmissionReceipt, PortError>;
}

/// Read-only procedure reference data
#[async_trait]
pub trait ProcedureCatalog: DomainPort {
    /// Looks up a procedure by code
    ///
    /// # Errors
    ///
    /// Returns `PortError::NotFound` for unknown codes.
    async fn lookup(&self, code: &str) -> Result<ProcedureReference, PortError>;
}

/// In-memory port implementations for tests and local runs
///
/// The serializer and transmitter record every batch they handle and can be
/// switched into a failing mode to exercise error paths.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::ClaimBatchId;

    use crate::settings::ClaimsSettings;

    /// Names artifacts after the batch number and remembers each render
    #[derive(Debug, Default)]
    pub struct MockXmlSerializer {
        settings: ClaimsSettings,
        directory: Option<String>,
        failing: bool,
        rendered: Arc<RwLock<Vec<ClaimBatchId>>>,
    }

    impl MockXmlSerializer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reports artifacts as stored under `directory`
        pub fn with_directory(directory: impl Into<String>) -> Self {
            Self {
                directory: Some(directory.into()),
                ..Self::default()
            }
        }

        /// Names artifacts with the configured extension
        pub fn with_settings(settings: ClaimsSettings) -> Self {
            Self {
                settings,
                ..Self::default()
            }
        }

        /// A serializer whose storage is unavailable
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub async fn rendered(&self) -> Vec<ClaimBatchId> {
            self.rendered.read().await.clone()
        }
    }

    impl DomainPort for MockXmlSerializer {}

    #[async_trait]
    impl BillingXmlSerializer for MockXmlSerializer {
        async fn serialize(
            &self,
            batch: &ClaimBatch,
            _metadata: &OperationMetadata,
        ) -> Result<XmlArtifact, PortError> {
            if self.failing {
                return Err(PortError::unavailable("xml-storage"));
            }
            self.rendered.write().await.push(batch.id());

            let file_name = self.settings.artifact_name(batch.batch_number());
            let path = self
                .directory
                .as_ref()
                .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), file_name));
            Ok(XmlArtifact { file_name, path })
        }
    }

    /// Issues `PROT-<batch number>` for every transmission
    #[derive(Debug, Default)]
    pub struct MockTransmitter {
        failing: bool,
        without_protocol: bool,
        transmitted: Arc<RwLock<Vec<(ClaimBatchId, String)>>>,
    }

    impl MockTransmitter {
        pub fn new() -> Self {
            Self::default()
        }

        /// An operator endpoint that never answers
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        /// An operator that accepts batches without issuing a protocol
        pub fn without_protocol() -> Self {
            Self {
                without_protocol: true,
                ..Self::default()
            }
        }

        /// Batch ids and artifact names handed to the operator so far
        pub async fn transmitted(&self) -> Vec<(ClaimBatchId, String)> {
            self.transmitted.read().await.clone()
        }
    }

    impl DomainPort for MockTransmitter {}

    #[async_trait]
    impl ClaimTransmitter for MockTransmitter {
        async fn transmit(
            &self,
            batch: &ClaimBatch,
            artifact: &XmlArtifact,
            _metadata: &OperationMetadata,
        ) -> Result<SubmissionReceipt, PortError> {
            if self.failing {
                return Err(PortError::Timeout {
                    operation: "transmit".to_string(),
                    duration_ms: 30_000,
                });
            }
            self.transmitted
                .write()
                .await
                .push((batch.id(), artifact.file_name.clone()));

            let protocol_number =
                (!self.without_protocol).then(|| format!("PROT-{}", batch.batch_number()));
            Ok(SubmissionReceipt { protocol_number })
        }
    }

    /// Procedure catalog backed by a map keyed by code
    #[derive(Debug, Default)]
    pub struct MockProcedureCatalog {
        procedures: Arc<RwLock<HashMap<String, ProcedureReference>>>,
    }

    impl MockProcedureCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the catalog
        pub async fn with_procedures(procedures: Vec<ProcedureReference>) -> Self {
            let catalog = Self::new();
            for procedure in procedures {
                catalog.upsert(procedure).await;
            }
            catalog
        }

        /// Adds or reprices a procedure
        pub async fn upsert(&self, procedure: ProcedureReference) {
            self.procedures
                .write()
                .await
                .insert(procedure.code.clone(), procedure);
        }
    }

    impl DomainPort for MockProcedureCatalog {}

    #[async_trait]
    impl ProcedureCatalog for MockProcedureCatalog {
        async fn lookup(&self, code: &str) -> Result<ProcedureReference, PortError> {
            self.procedures
                .read()
                .await
                .get(code.trim())
                .cloned()
                .ok_or_else(|| PortError::not_found("Procedure", code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = MockProcedureCatalog::with_procedures(vec![ProcedureReference {
            code: "40101012".to_string(),
            description: "Consulta em consultório".to_string(),
            reference_price: Money::new(dec!(150.00), Currency::BRL),
        }])
        .await;

        let found = catalog.lookup("40101012").await.unwrap();
        assert_eq!(found.reference_price.amount(), dec!(150.00));

        let missing = catalog.lookup("99999999").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_catalog_upsert_reprices() {
        let catalog = MockProcedureCatalog::new();
        let mut procedure = ProcedureReference {
            code: "40301630".to_string(),
            description: "Hemograma completo".to_string(),
            reference_price: Money::new(dec!(12.00), Currency::BRL),
        };
        catalog.upsert(procedure.clone()).await;
        procedure.reference_price = Money::new(dec!(15.00), Currency::BRL);
        catalog.upsert(procedure).await;

        let found = catalog.lookup("40301630").await.unwrap();
        assert_eq!(found.reference_price.amount(), dec!(15.00));
    }
}
