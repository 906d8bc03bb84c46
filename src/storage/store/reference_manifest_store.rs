//! A store serving the keys of a reference manifest.

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use parking_lot::RwLock;

use crate::{
    byte_range::{extract_byte_range_read_seek, ByteRange},
    container::Container,
    manifest::{ManifestReference, ReferenceManifest},
    metadata::{is_chunk_key, is_metadata_key, ArrayMetadataV2, ChunkKeySeparator, ZARRAY},
    remote::RemoteReader,
    storage::{
        Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
        StoreKeys, StorePrefix, WritableStorageTraits,
    },
};

/// A store serving the keys of a [`ReferenceManifest`].
///
/// Keys resolve as follows:
///  - a literal resolves to its content (base64 decoded if prefixed with `base64:`),
///  - an inline object resolves to its JSON serialization,
///  - a byte range resolves to bytes read from its location, after substituting templates:
///    - `./name` locations are read from the container of the manifest,
///    - URLs with any scheme other than `file` (e.g. `https://` or `s3://`) are read with a [`RemoteReader`], whose URL resolver may rewrite them,
///    - `file://` URLs and any other location are read as local files.
///
/// Chunks read from byte ranges of arrays without codecs are checked against the chunk size implied by the array metadata.
/// An undersized final chunk of a numeric array split from a contiguous dataset is padded with zeros.
/// Any other size mismatch is a [`StorageError::Integrity`] error.
///
/// Writes replace the reference of a key with a literal (or an inline object for metadata), and never write to the referenced location.
pub struct ReferenceManifestStore {
    manifest: RwLock<ReferenceManifest>,
    container: Option<Arc<dyn Container>>,
    remote_reader: OnceLock<Arc<RemoteReader>>,
    read_only: bool,
}

impl std::fmt::Debug for ReferenceManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceManifestStore")
            .field("num_refs", &self.manifest.read().refs().len())
            .field("has_container", &self.container.is_some())
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl ReferenceManifestStore {
    /// Create a writable store serving `manifest`.
    #[must_use]
    pub fn new(manifest: ReferenceManifest) -> Self {
        Self {
            manifest: RwLock::new(manifest),
            container: None,
            remote_reader: OnceLock::new(),
            read_only: false,
        }
    }

    /// Create a store serving the manifest in the JSON file at `path`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the file cannot be read or the manifest is malformed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let json = std::fs::read(path)?;
        Ok(Self::new(ReferenceManifest::from_slice(&json)?))
    }

    /// Create a store serving the manifest of `container`.
    ///
    /// The store is read-only if the container is read-only.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the manifest cannot be read.
    pub fn from_container(container: Arc<dyn Container>) -> Result<Self, StorageError> {
        let manifest = container.read_manifest()?;
        Ok(Self {
            manifest: RwLock::new(manifest),
            read_only: container.is_read_only(),
            container: Some(container),
            remote_reader: OnceLock::new(),
        })
    }

    /// Set the remote reader used for URL locations.
    ///
    /// Otherwise an HTTP reader with default options is created on first use.
    #[must_use]
    pub fn with_remote_reader(self, remote_reader: Arc<RemoteReader>) -> Self {
        let _ = self.remote_reader.set(remote_reader);
        self
    }

    /// Make the store read-only.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only || self.container.as_ref().is_some_and(|c| c.is_read_only());
        self
    }

    /// Returns true if the store is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Return a copy of the manifest, including any modifications.
    #[must_use]
    pub fn export_manifest(&self) -> ReferenceManifest {
        self.manifest.read().clone()
    }

    /// Write the manifest back to the container it was read from.
    ///
    /// # Errors
    /// Returns [`StorageError::ReadOnly`] if the store is read-only, [`StorageError::Unsupported`] if the store has no container, or a container error.
    pub fn write_to_container(&self) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let container = self.container.as_ref().ok_or_else(|| {
            StorageError::Unsupported("the manifest was not read from a container".to_string())
        })?;
        container.write_manifest(&self.manifest.read())?;
        Ok(())
    }

    /// Return the names of the direct children of the group at `path`: its metadata files, chunks and child nodes.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidStorePrefix`] if `path` is not a valid node path.
    pub fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let prefix = StorePrefix::from_node_path(path)?;
        let children = self.list_dir(&prefix)?;
        let mut names: Vec<String> = children
            .keys()
            .iter()
            .map(|key| key.name().to_string())
            .chain(children.prefixes().iter().map(|child| {
                child.as_str()[prefix.as_str().len()..]
                    .trim_end_matches('/')
                    .to_string()
            }))
            .collect();
        names.sort();
        Ok(names)
    }

    fn remote_reader(&self) -> Result<Arc<RemoteReader>, StorageError> {
        if let Some(remote_reader) = self.remote_reader.get() {
            return Ok(remote_reader.clone());
        }
        #[cfg(feature = "http")]
        {
            let remote_reader = Arc::new(RemoteReader::new_http(
                crate::remote::RemoteReaderOptions::default(),
            )?);
            Ok(self.remote_reader.get_or_init(|| remote_reader).clone())
        }
        #[cfg(not(feature = "http"))]
        Err(StorageError::Unsupported(
            "reading a URL requires a remote reader or the http feature".to_string(),
        ))
    }

    fn read_location(&self, location: &str, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        if let Some(name) = location.strip_prefix("./") {
            let container = self.container.as_ref().ok_or_else(|| {
                StorageError::Unsupported(format!(
                    "{location} is relative to a container, but the manifest has no container"
                ))
            })?;
            Ok(container.read_file_range(name, byte_range)?)
        } else if is_remote_url(location) {
            Ok(self.remote_reader()?.read(location, byte_range)?)
        } else {
            let path = local_path(location)?;
            let mut file = File::open(path)?;
            let size = file.metadata()?.len();
            if !byte_range.fits(size) {
                return Err(crate::byte_range::InvalidByteRangeError::new(byte_range, size).into());
            }
            Ok(extract_byte_range_read_seek(&mut file, byte_range)?.into())
        }
    }
}

/// Returns true if `location` is a URL read through the remote reader.
///
/// Any scheme other than `file` is remote, since URL rewrite hooks may map it to a fetchable URL.
/// Single letter schemes are Windows drive letters.
fn is_remote_url(location: &str) -> bool {
    url::Url::parse(location).is_ok_and(|url| url.scheme() != "file" && url.scheme().len() > 1)
}

fn local_path(location: &str) -> Result<PathBuf, StorageError> {
    match url::Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| StorageError::Other(format!("invalid file url {location}"))),
        _ => Ok(PathBuf::from(location)),
    }
}

/// The geometry of the array a chunk key belongs to.
struct ChunkCheck {
    metadata: ArrayMetadataV2,
    chunk_indices: Vec<u64>,
}

/// Return the array metadata and chunk indices to check the size of the chunk at `key`, if it should be checked.
fn chunk_check(
    manifest: &ReferenceManifest,
    key: &StoreKey,
) -> Result<Option<ChunkCheck>, StorageError> {
    if !is_chunk_key(key.as_str()) {
        return Ok(None);
    }
    let zarray_key = format!("{}{ZARRAY}", key.parent());
    let Some(zarray) = manifest.get(&zarray_key) else {
        return Ok(None);
    };
    let Some(zarray) = zarray.literal_bytes()? else {
        return Ok(None);
    };
    let metadata: ArrayMetadataV2 = serde_json::from_slice(&zarray).map_err(|err| {
        StorageError::Other(format!("invalid array metadata {zarray_key}: {err}"))
    })?;
    if metadata.has_codecs()
        || metadata.dtype.is_object()
        || metadata.dimension_separator != ChunkKeySeparator::Dot
    {
        return Ok(None);
    }
    let chunk_indices = key
        .name()
        .split('.')
        .map(str::parse)
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|err| StorageError::Other(format!("invalid chunk key {key}: {err}")))?;
    if chunk_indices.len() != metadata.shape.len().max(1) {
        return Err(StorageError::Integrity {
            key: key.clone(),
            reason: format!(
                "chunk key has {} indices, but the array has {} dimensions",
                chunk_indices.len(),
                metadata.shape.len()
            ),
        });
    }
    Ok(Some(ChunkCheck {
        metadata,
        chunk_indices,
    }))
}

/// Pad an undersized final chunk of a contiguous numeric array, or reject a chunk of the wrong size.
fn check_chunk_size(
    key: &StoreKey,
    bytes: Bytes,
    check: &ChunkCheck,
) -> Result<Bytes, StorageError> {
    let ChunkCheck {
        metadata,
        chunk_indices,
    } = check;
    let Some(expected) = metadata.chunk_size_bytes() else {
        return Ok(bytes);
    };
    let length = bytes.len() as u64;
    if length == expected {
        return Ok(bytes);
    }

    let is_contiguous_split = metadata.shape.len() == metadata.chunks.len()
        && metadata.shape.get(1..) == metadata.chunks.get(1..);
    let is_final_chunk = match (metadata.shape.first(), metadata.chunks.first()) {
        (Some(&shape), Some(&chunk)) if chunk > 0 => {
            chunk_indices[0] + 1 == shape.div_ceil(chunk)
                && chunk_indices[1..].iter().all(|&i| i == 0)
        }
        _ => false,
    };
    if length < expected && metadata.dtype.is_numeric() && is_contiguous_split && is_final_chunk {
        let mut padded = bytes.to_vec();
        padded.resize(
            usize::try_from(expected).map_err(|err| StorageError::Other(err.to_string()))?,
            0,
        );
        return Ok(padded.into());
    }
    Err(StorageError::Integrity {
        key: key.clone(),
        reason: format!("expected {expected} bytes, found {length}"),
    })
}

impl ReadableStorageTraits for ReferenceManifestStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let (location, byte_range, check) = {
            let manifest = self.manifest.read();
            match manifest.get(key.as_str()) {
                None => return Ok(None),
                Some(ManifestReference::ByteRange(reference)) => (
                    manifest.resolve_location(&reference.location),
                    reference.byte_range(),
                    chunk_check(&manifest, key)?,
                ),
                Some(reference) => return Ok(reference.literal_bytes()?.map(Bytes::from)),
            }
        };
        let bytes = self.read_location(&location, byte_range)?;
        match check {
            Some(check) => check_chunk_size(key, bytes, &check).map(Some),
            None => Ok(Some(bytes)),
        }
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let size = match self.manifest.read().get(key.as_str()) {
            None => return Ok(None),
            // chunks may be padded
            Some(ManifestReference::ByteRange(reference)) => {
                (!is_chunk_key(key.as_str())).then_some(reference.length)
            }
            Some(reference) => reference.literal_bytes()?.map(|bytes| bytes.len() as u64),
        };
        match size {
            Some(size) => Ok(Some(size)),
            None => Ok(self.get(key)?.map(|bytes| bytes.len() as u64)),
        }
    }
}

impl ListableStorageTraits for ReferenceManifestStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        self.manifest
            .read()
            .refs()
            .keys()
            .map(|key| Ok(StoreKey::new(key.as_str())?))
            .collect()
    }
}

impl WritableStorageTraits for ReferenceManifestStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let reference = if is_metadata_key(key.as_str()) {
            match serde_json::from_slice::<serde_json::Value>(&value) {
                Ok(serde_json::Value::Object(object)) => ManifestReference::InlineObject(object),
                _ => ManifestReference::from_bytes(&value),
            }
        } else {
            ManifestReference::from_bytes(&value)
        };
        self.manifest.write().insert(key.as_str(), reference)?;
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.manifest.write().remove(key.as_str());
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        for key in self.list_prefix(prefix)? {
            self.manifest.write().remove(key.as_str());
        }
        Ok(())
    }
}
