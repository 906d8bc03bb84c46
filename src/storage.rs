//! Storage of a Zarr V2 hierarchy described by a reference manifest.
//!
//! The [`ReferenceManifestStore`](store::ReferenceManifestStore) resolves store keys through a [`ReferenceManifest`](crate::manifest::ReferenceManifest).
//! A missing key is not an error: [`ReadableStorageTraits::get`] returns `Ok(None)`, so callers can distinguish "not present" from "unreadable".
//!
//! Stores implement the [`ReadableStorageTraits`], [`WritableStorageTraits`] and [`ListableStorageTraits`] interfaces.
//! [Storage adapters](storage_adapter) wrap a store and implement the same interfaces.

pub mod storage_adapter;
mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

use std::sync::Arc;

use thiserror::Error;

use crate::{
    byte_range::InvalidByteRangeError, container::ContainerError, manifest::ManifestError,
    remote::RemoteError,
};

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError, StorePrefixes};

pub use self::storage_sync::{
    ListableStorageTraits, ReadableListableStorageTraits, ReadableStorageTraits,
    ReadableWritableListableStorageTraits, ReadableWritableStorageTraits, WritableStorageTraits,
};

/// The type for bytes used in synchronous store set and get methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// An alias for bytes which may or may not be available.
///
/// When a value is read from a store, it returns `MaybeBytes` which is [`None`] if the key is not available.
pub type MaybeBytes = Option<Bytes>;

/// [`Arc`] wrapped readable storage.
pub type ReadableStorage = Arc<dyn ReadableStorageTraits>;

/// [`Arc`] wrapped readable and listable storage.
pub type ReadableListableStorage = Arc<dyn ReadableListableStorageTraits>;

/// [`Arc`] wrapped readable, writable, and listable storage.
pub type ReadableWritableListableStorage = Arc<dyn ReadableWritableListableStorageTraits>;

/// [`StoreKeys`] and [`StorePrefixes`].
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct StoreKeysPrefixes {
    keys: StoreKeys,
    prefixes: StorePrefixes,
}

impl StoreKeysPrefixes {
    /// Returns the keys.
    #[must_use]
    pub const fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    /// Returns the prefixes.
    #[must_use]
    pub const fn prefixes(&self) -> &StorePrefixes {
        &self.prefixes
    }
}

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    InvalidStorePrefix(#[from] StorePrefixError),
    /// An invalid byte range.
    #[error("invalid byte range {0}")]
    InvalidByteRange(#[from] InvalidByteRangeError),
    /// A malformed manifest or reference.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// A remote fetch failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// A container error.
    #[error(transparent)]
    Container(#[from] ContainerError),
    /// A value does not have the size implied by its metadata.
    #[error("integrity error for {key}: {reason}")]
    Integrity {
        /// The key of the value.
        key: StoreKey,
        /// A description of the mismatch.
        reason: String,
    },
    /// The requested method is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
