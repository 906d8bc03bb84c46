use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataV2;

/// The identifier for the `zstd` codec.
pub const IDENTIFIER: &str = "zstd";

/// Configuration parameters for the `zstd` codec (numcodecs).
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ZstdCodecConfigurationNumcodecs {
    /// The compression level.
    pub level: i32,
}

impl ZstdCodecConfigurationNumcodecs {
    /// Convert to [`MetadataV2`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if the configuration fails to serialize.
    pub fn to_metadata(&self) -> Result<MetadataV2, serde_json::Error> {
        MetadataV2::new_with_serializable_configuration(IDENTIFIER, self)
    }
}
