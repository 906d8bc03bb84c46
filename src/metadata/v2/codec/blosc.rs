use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::metadata::MetadataV2;

/// The identifier for the `blosc` codec.
pub const IDENTIFIER: &str = "blosc";

/// An integer from 0 to 9 controlling the compression level.
///
/// A level of 1 is the fastest compression method and produces the least compressions, while 9 is slowest and produces the most compression.
/// Compression is turned off when the compression level is 0.
#[derive(Serialize, Copy, Clone, Debug, Eq, PartialEq)]
pub struct BloscCompressionLevel(u8);

impl From<BloscCompressionLevel> for u8 {
    fn from(val: BloscCompressionLevel) -> Self {
        val.0
    }
}

impl TryFrom<u8> for BloscCompressionLevel {
    type Error = u8;
    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level <= 9 {
            Ok(Self(level))
        } else {
            Err(level)
        }
    }
}

impl<'de> serde::Deserialize<'de> for BloscCompressionLevel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let level = u8::deserialize(d)?;
        if level <= 9 {
            Ok(Self(level))
        } else {
            Err(serde::de::Error::custom("clevel must be between 0 and 9"))
        }
    }
}

/// The `blosc` compressor.
///
/// See <https://www.blosc.org/pages/>.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BloscCompressor {
    /// BloscLZ: blosc default compressor, heavily based on FastLZ.
    BloscLZ,
    /// LZ4: a compact, very popular and fast compressor.
    LZ4,
    /// LZ4HC: a tweaked version of LZ4, produces better compression ratios at the expense of speed.
    LZ4HC,
    /// Snappy: a popular compressor used in many places.
    Snappy,
    /// Zlib: a classic; somewhat slower than the previous ones, but achieving better compression ratios.
    Zlib,
    /// Zstd: an extremely well balanced codec.
    Zstd,
}

impl BloscCompressor {
    /// Map the compressor code stored in the HDF5 blosc filter (`cd_values[6]`) to a compressor.
    #[must_use]
    pub fn from_filter_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::BloscLZ),
            1 => Some(Self::LZ4),
            2 => Some(Self::LZ4HC),
            3 => Some(Self::Snappy),
            4 => Some(Self::Zlib),
            5 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Configuration parameters for the `blosc` codec (numcodecs).
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct BloscCodecConfigurationNumcodecs {
    /// The compressor.
    pub cname: BloscCompressor,
    /// The compression level.
    pub clevel: BloscCompressionLevel,
    /// The shuffle mode.
    pub shuffle: BloscShuffleModeNumCodecs,
    /// The compression block size. Automatically determined if 0.
    #[serde(default)]
    pub blocksize: usize,
}

impl BloscCodecConfigurationNumcodecs {
    /// Convert to [`MetadataV2`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if the configuration fails to serialize.
    pub fn to_metadata(&self) -> Result<MetadataV2, serde_json::Error> {
        MetadataV2::new_with_serializable_configuration(IDENTIFIER, self)
    }
}

/// Blosc shuffle modes (numcodecs).
#[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[repr(i8)]
pub enum BloscShuffleModeNumCodecs {
    /// No shuffling.
    NoShuffle = 0,
    /// Byte-wise shuffling.
    Shuffle = 1,
    /// Bit-wise shuffling.
    BitShuffle = 2,
    /// Bit-wise shuffling will be used for buffers with itemsize 1, and byte-wise shuffling will be used otherwise.
    AutoShuffle = -1,
}

impl BloscShuffleModeNumCodecs {
    /// Map the shuffle code stored in the HDF5 blosc filter (`cd_values[5]`) to a shuffle mode.
    #[must_use]
    pub fn from_filter_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::NoShuffle),
            1 => Some(Self::Shuffle),
            2 => Some(Self::BitShuffle),
            _ => None,
        }
    }
}
