//! Batch submission service
//!
//! Drives a batch through its external round-trip: render the billing XML,
//! record the artifact, transmit it, and record the protocol number. The
//! aggregate only ever sees the outcome of each collaborator call.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use core_kernel::{OperationMetadata, PortError};

use crate::batch::ClaimBatch;
use crate::error::ClaimError;
use crate::guide::ClaimGuide;
use crate::line::ClaimLine;
use crate::ports::{BillingXmlSerializer, ClaimTransmitter, ProcedureCatalog, SubmissionReceipt};

/// Failure of a service operation
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The aggregate refused the operation
    #[error(transparent)]
    Claim(#[from] ClaimError),

    /// An external collaborator failed
    #[error(transparent)]
    Port(#[from] PortError),
}

impl ServiceError {
    /// True if retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Port(err) if err.is_transient())
    }
}

/// Submits batches through the serializer and transmitter ports
#[derive(Clone)]
pub struct BatchSubmissionService {
    serializer: Arc<dyn BillingXmlSerializer>,
    transmitter: Arc<dyn ClaimTransmitter>,
}

impl BatchSubmissionService {
    pub fn new(
        serializer: Arc<dyn BillingXmlSerializer>,
        transmitter: Arc<dyn ClaimTransmitter>,
    ) -> Self {
        Self {
            serializer,
            transmitter,
        }
    }

    /// Renders, records and transmits `batch`
    ///
    /// The batch is checked before any collaborator is called. If
    /// transmission fails, the batch keeps its generated XML and stays
    /// `ReadyToSend`, so the call can be retried.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Claim` if the batch cannot be submitted
    /// - `ServiceError::Port` if rendering or transmission fails
    #[instrument(
        skip(self, batch, metadata),
        fields(batch_id = %batch.id(), correlation_id = metadata.correlation())
    )]
    pub async fn submit(
        &self,
        batch: &mut ClaimBatch,
        metadata: &OperationMetadata,
    ) -> Result<SubmissionReceipt, ServiceError> {
        batch.check_submittable()?;

        let artifact = self.serializer.serialize(batch, metadata).await?;
        debug!(file_name = %artifact.file_name, "billing XML rendered");
        batch.generate_xml(&artifact.file_name, artifact.path.as_deref())?;

        let receipt = match self.transmitter.transmit(batch, &artifact, metadata).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(error = %err, transient = err.is_transient(), "transmission failed");
                return Err(err.into());
            }
        };
        batch.submit(receipt.protocol_number.as_deref())?;

        info!(
            protocol_number = receipt.protocol_number.as_deref().unwrap_or("-"),
            guides = batch.guide_count(),
            "batch submitted"
        );
        Ok(receipt)
    }
}

/// Builds lines from catalog entries
pub struct LineFactory {
    catalog: Arc<dyn ProcedureCatalog>,
}

impl LineFactory {
    pub fn new(catalog: Arc<dyn ProcedureCatalog>) -> Self {
        Self { catalog }
    }

    /// Looks up `code` and prices a line for `guide` at the catalog's
    /// reference price
    #[instrument(skip(self, guide), fields(guide_id = %guide.id()))]
    pub async fn line_for(
        &self,
        guide: &ClaimGuide,
        code: &str,
        quantity: u32,
    ) -> Result<ClaimLine, ServiceError> {
        let reference = self.catalog.lookup(code).await?;
        if reference.reference_price.currency() != guide.currency() {
            return Err(ClaimError::validation(format!(
                "procedure {} is priced in {}, guide bills in {}",
                reference.code,
                reference.reference_price.currency(),
                guide.currency()
            ))
            .into());
        }
        Ok(ClaimLine::from_reference(
            guide.id(),
            &reference,
            quantity,
            guide.tenant_id(),
        )?)
    }
}
