//! Zarr V2 codec metadata (`numcodecs` configurations).
//!
//! Each submodule provides the `id` of a codec and its typed configuration.
//! Typed configurations convert to the untyped [`MetadataV2`](super::MetadataV2) stored in `.zarray` documents.

/// `blosc` codec metadata.
pub mod blosc;
/// `fletcher32` checksum codec metadata.
pub mod fletcher32;
pub mod json2;
/// `shuffle` filter metadata.
pub mod shuffle;
/// `zlib` codec metadata.
pub mod zlib;
/// `zstd` codec metadata.
pub mod zstd;
