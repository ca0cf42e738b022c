//! Claims engine settings

use serde::Deserialize;

use core_kernel::Currency;

/// Tunables for guide and batch handling
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClaimsSettings {
    /// Currency for new guides and batches
    pub currency: Currency,
    /// Prefix used by [`crate::ClaimBatch::next_batch_number`]
    pub batch_number_prefix: String,
    /// Upper bound on guides in one batch
    pub max_guides_per_batch: usize,
    /// Extension appended to generated artifact names
    pub xml_file_extension: String,
}

impl Default for ClaimsSettings {
    fn default() -> Self {
        Self {
            currency: Currency::BRL,
            batch_number_prefix: "LOTE".to_string(),
            max_guides_per_batch: 100,
            xml_file_extension: "xml".to_string(),
        }
    }
}

impl ClaimsSettings {
    /// Loads settings from `CLAIMS_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("CLAIMS"))
            .build()?
            .try_deserialize()
    }

    /// Builds the artifact file name for a batch number
    pub fn artifact_name(&self, batch_number: &str) -> String {
        format!("{}.{}", batch_number, self.xml_file_extension)
    }
}
