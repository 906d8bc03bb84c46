use base64::Engine;
use derive_more::From;

use crate::byte_range::{ByteLength, ByteOffset, ByteRange};

use super::ManifestError;

/// The prefix of a literal holding base64 encoded bytes.
pub const BASE64_PREFIX: &str = "base64:";

/// A `[location, offset, length]` reference.
///
/// The location is a URL, a local path, a container relative path (`./name`), or any of those with `{{template}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteRangeReference {
    /// The location of the referenced bytes.
    pub location: String,
    /// The offset of the first byte.
    pub offset: ByteOffset,
    /// The number of bytes.
    pub length: ByteLength,
}

impl ByteRangeReference {
    /// Create a new byte range reference.
    #[must_use]
    pub fn new(location: impl Into<String>, offset: ByteOffset, length: ByteLength) -> Self {
        Self {
            location: location.into(),
            offset,
            length,
        }
    }

    /// The referenced byte range within the location.
    #[must_use]
    pub fn byte_range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.length)
    }
}

/// A reference in a manifest.
#[derive(Debug, Clone, PartialEq, From)]
pub enum ManifestReference {
    /// Literal content. Base64 encoded if prefixed with [`BASE64_PREFIX`].
    Literal(String),
    /// A JSON object serialized as the content.
    InlineObject(serde_json::Map<String, serde_json::Value>),
    /// A byte range of another resource.
    ByteRange(ByteRangeReference),
}

impl ManifestReference {
    /// Create a literal reference holding `bytes`.
    ///
    /// Valid UTF-8 is stored verbatim and anything else is base64 encoded, so the manifest remains valid JSON.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(string) if !string.starts_with(BASE64_PREFIX) => Self::Literal(string.to_string()),
            _ => Self::Literal(format!(
                "{BASE64_PREFIX}{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )),
        }
    }

    /// Create an inline object reference from a serializable value.
    ///
    /// # Errors
    /// Returns [`ManifestError::Malformed`] if `value` does not serialize to a JSON object.
    pub fn inline_json<T: serde::Serialize>(value: &T) -> Result<Self, ManifestError> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(object) => Ok(Self::InlineObject(object)),
            _ => Err(ManifestError::Malformed {
                key: String::new(),
                reason: "inline value is not a JSON object".to_string(),
            }),
        }
    }

    /// Return the content of an inline reference.
    ///
    /// Returns [`None`] for a byte range reference, which must be resolved against its location.
    ///
    /// # Errors
    /// Returns [`ManifestError`] if a base64 literal is invalid.
    pub fn literal_bytes(&self) -> Result<Option<Vec<u8>>, ManifestError> {
        match self {
            Self::Literal(string) => {
                if let Some(encoded) = string.strip_prefix(BASE64_PREFIX) {
                    Ok(Some(
                        base64::engine::general_purpose::STANDARD.decode(encoded)?,
                    ))
                } else {
                    Ok(Some(string.as_bytes().to_vec()))
                }
            }
            Self::InlineObject(object) => Ok(Some(serde_json::to_vec(object)?)),
            Self::ByteRange(_) => Ok(None),
        }
    }

    pub(crate) fn from_json(key: &str, value: serde_json::Value) -> Result<Self, ManifestError> {
        let malformed = |reason: &str| ManifestError::Malformed {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        match value {
            serde_json::Value::String(string) => {
                if let Some(encoded) = string.strip_prefix(BASE64_PREFIX) {
                    base64::engine::general_purpose::STANDARD
                        .decode(encoded)
                        .map_err(|_| malformed("invalid base64 literal"))?;
                }
                Ok(Self::Literal(string))
            }
            serde_json::Value::Object(object) => Ok(Self::InlineObject(object)),
            serde_json::Value::Array(array) => {
                let [location, offset, length] = array.as_slice() else {
                    return Err(malformed("a byte range must have exactly 3 elements"));
                };
                let location = location
                    .as_str()
                    .ok_or_else(|| malformed("location must be a string"))?;
                let offset = offset
                    .as_u64()
                    .ok_or_else(|| malformed("offset must be a non-negative integer"))?;
                let length = length
                    .as_u64()
                    .ok_or_else(|| malformed("length must be a non-negative integer"))?;
                Ok(Self::ByteRange(ByteRangeReference::new(
                    location, offset, length,
                )))
            }
            _ => Err(malformed(
                "a reference must be a string, an object or a [location, offset, length] list",
            )),
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Literal(string) => serde_json::Value::String(string.clone()),
            Self::InlineObject(object) => serde_json::Value::Object(object.clone()),
            Self::ByteRange(reference) => serde_json::json!([
                reference.location,
                reference.offset,
                reference.length
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_encoding() {
        assert_eq!(
            ManifestReference::from_bytes(b"abc"),
            ManifestReference::Literal("abc".to_string())
        );
        assert_eq!(
            ManifestReference::from_bytes(&[0xff, 0xfe]),
            ManifestReference::Literal("base64://4=".to_string())
        );
        // a literal that looks like base64 must not be decoded as such
        let reference = ManifestReference::from_bytes(b"base64:abc");
        assert_eq!(
            reference.literal_bytes().unwrap().unwrap(),
            b"base64:abc".to_vec()
        );
    }

    #[test]
    fn inline_object_bytes() {
        let reference = ManifestReference::inline_json(&serde_json::json!({"a": [1, 2]})).unwrap();
        assert_eq!(
            reference.literal_bytes().unwrap().unwrap(),
            br#"{"a":[1,2]}"#.to_vec()
        );
        assert!(ManifestReference::inline_json(&5).is_err());
    }

    #[test]
    fn byte_range_from_json() {
        let reference =
            ManifestReference::from_json("k", serde_json::json!(["./blob", 0, 12])).unwrap();
        assert_eq!(reference.literal_bytes().unwrap(), None);
        assert_eq!(reference.to_json(), serde_json::json!(["./blob", 0, 12]));
        assert!(ManifestReference::from_json("k", serde_json::json!(["f", 0.5, 1])).is_err());
        assert!(ManifestReference::from_json("k", serde_json::json!("base64:@@")).is_err());
    }
}
