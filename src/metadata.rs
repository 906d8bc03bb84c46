//! Zarr V2 metadata emitted into a reference manifest.
//!
//! A reference manifest describes a Zarr V2 hierarchy: every group has a `.zgroup` document, every array has a `.zarray` document, and either may have user attributes in `.zattrs`.
//! These documents are always stored inline in the manifest, never as byte range references.
//!
//! See <https://zarr-specs.readthedocs.io/en/latest/v2/v2.0.html>.

/// Zarr V2 metadata.
pub mod v2;

use derive_more::Display;

pub use v2::codec;
pub use v2::{
    ArrayMetadataV2, ArrayMetadataV2DataType, ArrayMetadataV2Order, FillValueMetadataV2,
    GroupMetadataV2, MetadataV2,
};

/// The array metadata file name.
pub const ZARRAY: &str = ".zarray";

/// The group metadata file name.
pub const ZGROUP: &str = ".zgroup";

/// The user attributes file name.
pub const ZATTRS: &str = ".zattrs";

/// Returns true if `key` names a group, array or attribute metadata document.
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    matches!(name, ZARRAY | ZGROUP | ZATTRS)
}

/// Returns true if the final path component of `key` is a chunk grid coordinate such as `0` or `3.1.4`.
#[must_use]
pub fn is_chunk_key(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|c| c.is_ascii_digit()))
}

/// The separator placed between the dimensions of a chunk key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Default)]
pub enum ChunkKeySeparator {
    /// The slash '/' character.
    #[display("/")]
    Slash,
    /// The dot '.' character.
    #[display(".")]
    #[default]
    Dot,
}

impl serde::Serialize for ChunkKeySeparator {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Slash => s.serialize_char('/'),
            Self::Dot => s.serialize_char('.'),
        }
    }
}

impl<'de> serde::Deserialize<'de> for ChunkKeySeparator {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let separator = String::deserialize(d)?;
        match separator.as_str() {
            "/" => Ok(Self::Slash),
            "." => Ok(Self::Dot),
            _ => Err(serde::de::Error::custom(
                "chunk key separator must be a `.` or `/` character",
            )),
        }
    }
}
