//! The `json2` object codec.
//!
//! Variable length and compound arrays are stored as a single JSON document holding every element in C order, followed by the data type string and the shape:
//! ```json
//! ["abc", "|O", [1]]
//! ```

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::MetadataV2;

/// The identifier for the `json2` codec.
pub const IDENTIFIER: &str = "json2";

/// Configuration parameters for the `json2` codec (numcodecs).
///
/// The defaults match the encoder settings numcodecs writes.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct Json2CodecConfigurationNumcodecs {
    /// Encode NaN and infinities.
    pub allow_nan: bool,
    /// Check for circular references.
    pub check_circular: bool,
    /// The text encoding.
    pub encoding: String,
    /// Escape non-ASCII characters.
    pub ensure_ascii: bool,
    /// The indentation level.
    pub indent: Option<u32>,
    /// The item and key separators.
    pub separators: [String; 2],
    /// Skip keys that are not strings.
    pub skipkeys: bool,
    /// Sort object keys.
    pub sort_keys: bool,
    /// Strict decoding of control characters.
    pub strict: bool,
}

impl Default for Json2CodecConfigurationNumcodecs {
    fn default() -> Self {
        Self {
            allow_nan: true,
            check_circular: true,
            encoding: "utf-8".to_string(),
            ensure_ascii: true,
            indent: None,
            separators: [",".to_string(), ":".to_string()],
            skipkeys: false,
            sort_keys: true,
            strict: true,
        }
    }
}

impl Json2CodecConfigurationNumcodecs {
    /// Convert to [`MetadataV2`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if the configuration fails to serialize.
    pub fn to_metadata(&self) -> Result<MetadataV2, serde_json::Error> {
        MetadataV2::new_with_serializable_configuration(IDENTIFIER, self)
    }
}

/// A `json2` decoding error.
#[derive(Debug, Error)]
pub enum Json2DecodeError {
    /// The payload is not valid JSON.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    /// The payload is not a list ending with a data type and a shape.
    #[error("json2 payload must be a list ending with a data type and a shape")]
    MissingTrailer,
    /// The number of elements does not match the shape.
    #[error("json2 payload has {_0} elements but its shape requires {_1}")]
    ElementCountMismatch(usize, u64),
}

/// Encode flattened `values` with a data type and shape as a `json2` payload.
///
/// # Errors
/// Returns [`serde_json::Error`] if a value fails to serialize.
pub fn json2_encode(
    values: Vec<serde_json::Value>,
    dtype: &str,
    shape: &[u64],
) -> Result<Vec<u8>, serde_json::Error> {
    let mut items = values;
    items.push(serde_json::Value::from(dtype));
    items.push(serde_json::Value::from(shape.to_vec()));
    serde_json::to_vec(&items)
}

/// Decode a `json2` payload into its flattened values, data type and shape.
///
/// # Errors
/// Returns a [`Json2DecodeError`] if the payload is malformed.
pub fn json2_decode(
    payload: &[u8],
) -> Result<(Vec<serde_json::Value>, String, Vec<u64>), Json2DecodeError> {
    let mut items: Vec<serde_json::Value> = serde_json::from_slice(payload)?;
    let shape = items.pop().ok_or(Json2DecodeError::MissingTrailer)?;
    let dtype = items.pop().ok_or(Json2DecodeError::MissingTrailer)?;
    let serde_json::Value::String(dtype) = dtype else {
        return Err(Json2DecodeError::MissingTrailer);
    };
    let shape: Vec<u64> =
        serde_json::from_value(shape).map_err(|_| Json2DecodeError::MissingTrailer)?;
    let num_elements: u64 = shape.iter().product();
    if items.len() as u64 != num_elements {
        return Err(Json2DecodeError::ElementCountMismatch(
            items.len(),
            num_elements,
        ));
    }
    Ok((items, dtype, shape))
}
