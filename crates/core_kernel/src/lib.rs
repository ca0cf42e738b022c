//! Core Kernel - Foundational types shared by the claims engine
//!
//! This crate provides the building blocks used by every other crate:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Shared error types and port infrastructure

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{
    ClaimLineId, ClaimGuideId, ClaimBatchId, ClinicId, InsuranceOperatorId,
    AppointmentId, PatientInsuranceId, TenantId,
};
pub use error::{CoreError, require_text};
pub use ports::{PortError, DomainPort, OperationMetadata};
