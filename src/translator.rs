//! Translation of chunked source datasets into reference manifests.
//!
//! The [`ChunkLayoutTranslator`] inspects the layout of a [`SourceDataset`] and decides how it is represented in a Zarr V2 hierarchy:
//!  - chunks of fixed size data stay in the source file and are referenced by byte range,
//!  - scalars, variable length strings, references and compound data are encoded inline,
//!  - datasets with too many chunks become an external link to the source dataset.
//!
//! Source filters are translated to equivalent codecs so that the referenced bytes decode unchanged.

pub mod chunk_grid;
pub mod filters;
mod layout;
mod source;

use thiserror::Error;

use crate::{config::global_config, manifest::ManifestError, storage::StorePrefixError};

pub use layout::{
    ChunkLayoutTranslator, DatasetContent, DatasetLayoutDecision, COMPOUND_DTYPE_ATTRIBUTE,
    EXTERNAL_ARRAY_LINK_ATTRIBUTE, REFERENCE_DTYPE, SCALAR_ATTRIBUTE,
};
pub use source::{
    SourceDataType, SourceDataset, SourceError, SourceField, SourceFillValue, SourceFilter,
};

/// A translation error.
#[derive(Debug, Error)]
pub enum TranslatorError {
    /// A filter has no equivalent codec.
    #[error("dataset {dataset} has unsupported filter {filter}")]
    UnsupportedFilter {
        /// The dataset name.
        dataset: String,
        /// The filter.
        filter: String,
    },
    /// The data type cannot be represented.
    #[error("dataset {dataset} has an unsupported data type: {reason}")]
    UnsupportedDataType {
        /// The dataset name.
        dataset: String,
        /// Why the data type is unsupported.
        reason: String,
    },
    /// The dimensionality cannot be represented.
    #[error("dataset {dataset} has unsupported dimensionality {dimensionality}")]
    UnsupportedDimensionality {
        /// The dataset name.
        dataset: String,
        /// The number of dimensions.
        dimensionality: usize,
    },
    /// The source layout is inconsistent.
    #[error("integrity error in dataset {dataset}: {reason}")]
    Integrity {
        /// The dataset name.
        dataset: String,
        /// A description of the inconsistency.
        reason: String,
    },
    /// Chunks are referenced by byte range, but no source URL is set.
    #[error("dataset {0} references chunks of the source file, but no source url is set")]
    MissingSourceUrl(String),
    /// The source reader failed.
    #[error("source error: {0}")]
    Source(String),
    /// An invalid node path.
    #[error(transparent)]
    InvalidPath(#[from] StorePrefixError),
    /// A manifest error.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Serialization failed.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
}

impl From<source::SourceError> for TranslatorError {
    fn from(err: source::SourceError) -> Self {
        Self::Source(err.to_string())
    }
}

/// Options for a [`ChunkLayoutTranslator`].
///
/// The defaults are taken from the [global config](crate::config::global_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// The URL (or path) of the source file, used as the location of chunk references.
    pub source_url: Option<String>,
    /// Datasets with more chunks than this become external links, if the source URL is set.
    pub num_dataset_chunks_threshold: Option<u64>,
    /// Contiguous datasets larger than this many bytes are split into chunks along the first dimension.
    pub contiguous_dataset_max_chunk_size: Option<u64>,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        let config = global_config();
        Self {
            source_url: None,
            num_dataset_chunks_threshold: config.num_dataset_chunks_threshold(),
            contiguous_dataset_max_chunk_size: config.contiguous_dataset_max_chunk_size(),
        }
    }
}

impl TranslatorOptions {
    /// Set the source URL.
    #[must_use]
    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }
}
