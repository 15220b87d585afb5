//! Moderator dataset loading from JSON.
//!
//! Feature-gated behind `data-loader`. Parses the declarative datapack
//! schema into [`ModeratorEntry`] values; coefficient range policy is not
//! applied here but in [`crate::moderator::ModeratorRegistry::reload`], so
//! every ingestion path shares it.

use crate::moderator::ModeratorEntry;

/// Errors that can occur during dataset loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Load a moderator dataset from a JSON string. The dataset is an ordered
/// array; order matters because later entries overwrite earlier ones.
pub fn load_moderator_json(json: &str) -> Result<Vec<ModeratorEntry>, DataLoadError> {
    Ok(serde_json::from_str(json)?)
}

/// Load a moderator dataset from JSON bytes.
pub fn load_moderator_json_bytes(bytes: &[u8]) -> Result<Vec<ModeratorEntry>, DataLoadError> {
    Ok(serde_json::from_slice(bytes)?)
}
