//! The reference manifest (a reference file system).
//!
//! A manifest maps every key of a Zarr V2 hierarchy to a [`ManifestReference`]:
//!  - a literal string (`base64:` prefixed when the bytes are not valid UTF-8),
//!  - an inline JSON object, or
//!  - a `[location, offset, length]` byte range into a local file, a container blob or a URL.
//!
//! ```json
//! {
//!     "refs": {
//!         ".zgroup": {"zarr_format": 2},
//!         "data/.zarray": {"zarr_format": 2, "shape": [10], "...": "..."},
//!         "data/0": ["{{u1}}", 2048, 40]
//!     },
//!     "templates": {"u1": "https://example.com/file.h5"},
//!     "generationMetadata": {}
//! }
//! ```
//!
//! Manifests are validated eagerly: a malformed reference fails [`ReferenceManifest::from_slice`], not the first read of its key.

pub mod attribute;
mod reference;
mod templates;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use attribute::{
    decode_attributes, encode_attributes, AttributeMap, AttributeValue, ObjectReference,
};
pub use reference::{ByteRangeReference, ManifestReference, BASE64_PREFIX};
pub use templates::{apply_templates, TEMPLATE_MIN_OCCURRENCES};

use crate::metadata::is_metadata_key;

/// A manifest error.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A reference has the wrong shape or element types.
    #[error("malformed reference for key {key}: {reason}")]
    Malformed {
        /// The key of the reference.
        key: String,
        /// Why the reference is malformed.
        reason: String,
    },
    /// The manifest is not valid JSON.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    /// A `base64:` literal has an invalid payload.
    #[error(transparent)]
    InvalidBase64(#[from] base64::DecodeError),
    /// A user string collides with an encoding sentinel such as `"NaN"`.
    #[error("string {0:?} is ambiguous with an encoding sentinel")]
    AmbiguousSentinel(String),
}

/// A reference manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceManifest {
    refs: BTreeMap<String, ManifestReference>,
    templates: BTreeMap<String, String>,
    generation_metadata: serde_json::Map<String, serde_json::Value>,
}

/// The unvalidated JSON form of a manifest.
#[derive(Serialize, Deserialize)]
struct ReferenceManifestJson {
    #[serde(default)]
    refs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    templates: BTreeMap<String, String>,
    #[serde(default, rename = "generationMetadata")]
    generation_metadata: serde_json::Map<String, serde_json::Value>,
}

impl ReferenceManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a manifest from JSON.
    ///
    /// # Errors
    /// Returns a [`ManifestError`] if the JSON is invalid or any reference is malformed.
    pub fn from_slice(json: &[u8]) -> Result<Self, ManifestError> {
        let manifest: ReferenceManifestJson = serde_json::from_slice(json)?;
        let refs = manifest
            .refs
            .into_iter()
            .map(|(key, value)| {
                let reference = ManifestReference::from_json(&key, value)?;
                validate_key_reference(&key, &reference)?;
                Ok((key, reference))
            })
            .collect::<Result<_, ManifestError>>()?;
        Ok(Self {
            refs,
            templates: manifest.templates,
            generation_metadata: manifest.generation_metadata,
        })
    }

    /// Serialize the manifest to JSON.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_json())
    }

    /// Serialize the manifest to pretty printed JSON.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.to_json())
    }

    fn to_json(&self) -> ReferenceManifestJson {
        ReferenceManifestJson {
            refs: self
                .refs
                .iter()
                .map(|(key, reference)| (key.clone(), reference.to_json()))
                .collect(),
            templates: self.templates.clone(),
            generation_metadata: self.generation_metadata.clone(),
        }
    }

    /// Return the references.
    #[must_use]
    pub fn refs(&self) -> &BTreeMap<String, ManifestReference> {
        &self.refs
    }

    /// Return the reference for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ManifestReference> {
        self.refs.get(key)
    }

    /// Insert a reference, returning the previous reference for `key`.
    ///
    /// # Errors
    /// Returns [`ManifestError::Malformed`] if `key` is a metadata key and `reference` is a byte range.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        reference: ManifestReference,
    ) -> Result<Option<ManifestReference>, ManifestError> {
        let key = key.into();
        validate_key_reference(&key, &reference)?;
        Ok(self.refs.insert(key, reference))
    }

    /// Remove the reference for `key`.
    pub fn remove(&mut self, key: &str) -> Option<ManifestReference> {
        self.refs.remove(key)
    }

    /// Return the templates.
    #[must_use]
    pub fn templates(&self) -> &BTreeMap<String, String> {
        &self.templates
    }

    /// Return the generation metadata.
    #[must_use]
    pub fn generation_metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.generation_metadata
    }

    /// Set the generation metadata. It is informational only.
    pub fn set_generation_metadata(
        &mut self,
        generation_metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.generation_metadata = generation_metadata;
    }

    /// Return the location of a byte range reference with its templates expanded.
    #[must_use]
    pub fn resolve_location(&self, location: &str) -> String {
        apply_templates(location, &self.templates)
    }
}

fn validate_key_reference(key: &str, reference: &ManifestReference) -> Result<(), ManifestError> {
    if is_metadata_key(key) && matches!(reference, ManifestReference::ByteRange(_)) {
        Err(ManifestError::Malformed {
            key: key.to_string(),
            reason: "metadata must be stored inline".to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parse() {
        let json = br#"{
            "refs": {
                ".zgroup": {"zarr_format": 2},
                "a/.zattrs": "{\"x\": 1}",
                "a/0": ["https://example.com/f.h5", 10, 20],
                "a/1": "base64:AAEC"
            },
            "generationMetadata": {"generatedBy": "test"}
        }"#;
        let manifest = ReferenceManifest::from_slice(json).unwrap();
        assert_eq!(manifest.refs().len(), 4);
        assert_eq!(
            manifest.get("a/0"),
            Some(&ManifestReference::ByteRange(ByteRangeReference::new(
                "https://example.com/f.h5",
                10,
                20
            )))
        );
        assert_eq!(
            manifest.get("a/1").unwrap().literal_bytes().unwrap().unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(manifest.generation_metadata()["generatedBy"], "test");
    }

    #[test]
    fn manifest_malformed_eager() {
        for json in [
            br#"{"refs": {"a/0": ["u", 1]}}"#.as_slice(),
            br#"{"refs": {"a/0": ["u", -1, 2]}}"#,
            br#"{"refs": {"a/0": [1, 1, 2]}}"#,
            br#"{"refs": {"a/0": 5}}"#,
            br#"{"refs": {"a/0": null}}"#,
            br#"{"refs": {"a/.zarray": ["u", 0, 2]}}"#,
        ] {
            assert!(matches!(
                ReferenceManifest::from_slice(json),
                Err(ManifestError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn manifest_write_read() {
        let mut manifest = ReferenceManifest::new();
        manifest
            .insert(
                ".zgroup",
                ManifestReference::inline_json(&serde_json::json!({"zarr_format": 2})).unwrap(),
            )
            .unwrap();
        manifest
            .insert("x/0", ManifestReference::from_bytes(&[0xff, 0x00]))
            .unwrap();
        let json = manifest.to_vec().unwrap();
        assert_eq!(ReferenceManifest::from_slice(&json).unwrap(), manifest);
        assert!(manifest
            .insert(".zgroup", ByteRangeReference::new("f", 0, 1).into())
            .is_err());
    }
}
