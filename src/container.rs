//! Containers holding a reference manifest and the blobs it references.
//!
//! A [`GrowableContainer`] packs everything into a single tar archive that can be appended to and read remotely.
//! A [`DirectoryContainer`] stores the same files as ordinary files in a directory.
//!
//! Manifests refer to files in their container with `./name` locations.

mod directory;
mod index;
mod random_access;
mod tar_container;
pub mod tar_header;

use thiserror::Error;

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    manifest::{ManifestError, ReferenceManifest},
    remote::RemoteError,
    storage::Bytes,
};

pub use directory::DirectoryContainer;
pub use index::{ContainerIndex, ContainerIndexEntry};
pub use random_access::{LocalFileBytes, RandomAccessBytes, RemoteBytes};
pub use tar_container::{
    growth_size, GrowableContainer, ENTRY_FILE_NAME, INDEX_FILE_NAME, INITIAL_RESERVED_SIZE,
    TRASH_DIRECTORY,
};

/// The name of the manifest file in a container.
pub const MANIFEST_FILE_NAME: &str = "lindi.json";

/// A container error.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A write to a read-only (or remote) container.
    #[error("container is read-only")]
    ReadOnly,
    /// The file does not exist.
    #[error("file {0} not found in container")]
    FileNotFound(String),
    /// The file already exists.
    #[error("file {0} already exists in container")]
    FileExists(String),
    /// The file name is invalid or reserved.
    #[error("invalid file name {0}")]
    InvalidName(String),
    /// Content exceeds the reserved size of a file.
    #[error("{size} bytes do not fit in the {reserved} bytes reserved for {name}")]
    ContentTooLarge {
        /// The file name.
        name: String,
        /// The content size.
        size: u64,
        /// The reserved size.
        reserved: u64,
    },
    /// The entry record is missing or disagrees with the index.
    #[error("invalid container bootstrap: {0}")]
    InvalidBootstrap(String),
    /// The index or a tar header is invalid.
    #[error("invalid container index: {0}")]
    InvalidIndex(String),
    /// An invalid byte range of a file.
    #[error(transparent)]
    InvalidByteRange(#[from] InvalidByteRangeError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A remote read error.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The manifest is invalid.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Serialization failed.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
}

/// A container of a reference manifest and its files.
pub trait Container: Send + Sync {
    /// Read the manifest.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the manifest is missing or invalid.
    fn read_manifest(&self) -> Result<ReferenceManifest, ContainerError>;

    /// Write the manifest.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the container is read-only or the write fails.
    fn write_manifest(&self, manifest: &ReferenceManifest) -> Result<(), ContainerError>;

    /// Read the file `name`.
    ///
    /// # Errors
    /// Returns [`ContainerError::FileNotFound`] if there is no file `name`, or a read error.
    fn read_file(&self, name: &str) -> Result<Bytes, ContainerError>;

    /// Read `byte_range` of the file `name`.
    ///
    /// # Errors
    /// Returns [`ContainerError::FileNotFound`] if there is no file `name`, [`ContainerError::InvalidByteRange`] if the byte range is outside of the file, or a read error.
    fn read_file_range(&self, name: &str, byte_range: ByteRange) -> Result<Bytes, ContainerError>;

    /// Write the file `name`, replacing any existing content.
    ///
    /// # Errors
    /// Returns [`ContainerError::ReadOnly`] if the container is read-only, or a write error.
    fn write_file(&self, name: &str, data: &[u8]) -> Result<(), ContainerError>;

    /// Returns true if the container is read-only.
    fn is_read_only(&self) -> bool;
}
