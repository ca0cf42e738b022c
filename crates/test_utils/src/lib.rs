//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! claim batching test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for procedures, dates and identifiers
//! - `builders`: Builders for guides and batches at any lifecycle stage
//! - `assertions`: Roll-up invariant checks for lines, guides and batches
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
