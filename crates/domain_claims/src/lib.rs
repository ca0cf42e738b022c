//! Insurance Claim Batching Domain
//!
//! This crate models the billing of medical services to health-insurance
//! operators as a three-level aggregate:
//!
//! - [`ClaimLine`]: one billed procedure with quantity and unit price
//! - [`ClaimGuide`]: the lines billed for one appointment and insurance link
//! - [`ClaimBatch`]: the guides sent together to one operator
//!
//! Totals roll up eagerly from lines to guides to batches. When the operator
//! answers, approved and glossed amounts are recorded at each level and
//! [`ReconciliationReport`] compares them.
//!
//! # Batch Lifecycle
//!
//! ```text
//! Draft -> ReadyToSend -> Sent -> Processing -> Processed/PartiallyPaid -> Paid
//!                           \                \-> Rejected
//!                            \-> Rejected
//! ```
//!
//! Every operation either applies fully or returns a [`ClaimError`] and
//! leaves the aggregate untouched.

pub mod adjudication;
pub mod batch;
pub mod error;
pub mod events;
pub mod guide;
pub mod line;
pub mod ports;
pub mod service;
pub mod settings;

pub use adjudication::{
    BatchAdjudication, GuideAdjudication, GuideOutcome, LineAdjudication, ReconciliationReport,
};
pub use batch::{BatchStatus, ClaimBatch};
pub use error::{ClaimError, ErrorKind};
pub use events::ClaimEvent;
pub use guide::{ClaimGuide, GuideStatus, GuideType};
pub use line::{ClaimLine, LineSettlement};
pub use ports::{
    BillingXmlSerializer, ClaimTransmitter, ProcedureCatalog, ProcedureReference,
    SubmissionReceipt, XmlArtifact,
};
pub use service::{BatchSubmissionService, LineFactory, ServiceError};
pub use settings::ClaimsSettings;
