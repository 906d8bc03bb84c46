use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataV2;

/// The identifier for the `zlib` codec.
///
/// HDF5 `gzip` (deflate) chunks are zlib streams, so they decode with this codec unchanged.
pub const IDENTIFIER: &str = "zlib";

/// Configuration parameters for the `zlib` codec (numcodecs).
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ZlibCodecConfigurationNumcodecs {
    /// The compression level, 0 to 9.
    pub level: u32,
}

impl ZlibCodecConfigurationNumcodecs {
    /// Convert to [`MetadataV2`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if the configuration fails to serialize.
    pub fn to_metadata(&self) -> Result<MetadataV2, serde_json::Error> {
        MetadataV2::new_with_serializable_configuration(IDENTIFIER, self)
    }
}
