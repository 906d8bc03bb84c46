use std::{path::Path, sync::Arc};

use parking_lot::Mutex;

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    manifest::{ByteRangeReference, ReferenceManifest},
    remote::RemoteReader,
    storage::Bytes,
};

use super::{
    tar_header::{new_header, padded_size, parse_header, rename_header, HeaderBytes, BLOCK_SIZE},
    Container, ContainerError, ContainerIndex, ContainerIndexEntry, LocalFileBytes,
    RandomAccessBytes, RemoteBytes, MANIFEST_FILE_NAME,
};

/// The name of the bootstrap entry record, always the first file of a container.
pub const ENTRY_FILE_NAME: &str = ".tar_entry.json";

/// The name of the index file.
pub const INDEX_FILE_NAME: &str = ".tar_index.json";

/// Trashed files are renamed into this directory.
pub const TRASH_DIRECTORY: &str = ".trash";

/// The space reserved for the entry record and the initial index.
pub const INITIAL_RESERVED_SIZE: u64 = 1024;

/// The size of the zero blocks terminating a tar archive.
const END_OF_ARCHIVE_SIZE: u64 = 1024;

/// Return the space to reserve for content of `size` bytes that may grow.
///
/// This is the smallest power of two multiple of [`INITIAL_RESERVED_SIZE`] that is at least twice `size`.
#[must_use]
pub fn growth_size(size: u64) -> u64 {
    let mut reserved = INITIAL_RESERVED_SIZE;
    while reserved < size.saturating_mul(2) {
        reserved *= 2;
    }
    reserved
}

/// A growable tar container.
///
/// The container is a valid tar archive.
/// Its first file is the entry record `.tar_entry.json` with its header at offset 0 and data at offset 512.
/// The entry record holds the [`ContainerIndexEntry`] of the index `.tar_index.json`, and the index holds the entries of every file in the container (including the entry record and itself).
/// So any file can be located after reading the first 1536 bytes and the index.
///
/// Text files such as the manifest are padded with spaces to a reserved size and are overwritten in place while they fit.
/// A file that outgrows its reserved size is trashed (zeroed and renamed into `.trash/`) and appended to the end of the container with more reserved space.
/// If the index is relocated, the entry record is updated to point to it.
///
/// A container supports a single writer.
pub struct GrowableContainer {
    bytes: Box<dyn RandomAccessBytes>,
    state: Mutex<ContainerState>,
}

struct ContainerState {
    index: ContainerIndex,
    /// The offset of the end of archive marker, where the next file is appended.
    end: u64,
}

impl std::fmt::Debug for GrowableContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GrowableContainer")
            .field("index", &state.index)
            .field("end", &state.end)
            .field("read_only", &self.bytes.is_read_only())
            .finish()
    }
}

impl GrowableContainer {
    /// Create a container at `path` holding `manifest`, replacing any existing file.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the container cannot be written.
    pub fn create(
        path: impl AsRef<Path>,
        manifest: &ReferenceManifest,
    ) -> Result<Self, ContainerError> {
        let container = Self {
            bytes: Box::new(LocalFileBytes::create(path.as_ref())?),
            state: Mutex::new(ContainerState {
                index: ContainerIndex::default(),
                end: 0,
            }),
        };
        {
            let mut state = container.state.lock();
            container.append(&mut state, ENTRY_FILE_NAME, &[], INITIAL_RESERVED_SIZE)?;
            container.append(&mut state, INDEX_FILE_NAME, &[], INITIAL_RESERVED_SIZE)?;
            let manifest = manifest.to_vec()?;
            container.append(
                &mut state,
                MANIFEST_FILE_NAME,
                &manifest,
                growth_size(manifest.len() as u64),
            )?;
            container.write_index(&mut state)?;
        }
        Ok(container)
    }

    /// Open the container at `path` for reading and writing.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the file cannot be opened or its bootstrap records are invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        Self::from_bytes(Box::new(LocalFileBytes::open(path.as_ref(), false)?))
    }

    /// Open the container at `path` for reading only.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the file cannot be opened or its bootstrap records are invalid.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        Self::from_bytes(Box::new(LocalFileBytes::open(path.as_ref(), true)?))
    }

    /// Open the container at `url` through `reader`. Remote containers are read-only.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the container cannot be read or its bootstrap records are invalid.
    pub fn open_remote(url: &str, reader: Arc<RemoteReader>) -> Result<Self, ContainerError> {
        Self::from_bytes(Box::new(RemoteBytes::new(reader, url)))
    }

    /// Open a container from its bytes, verifying the bootstrap chain.
    ///
    /// # Errors
    /// Returns [`ContainerError::InvalidBootstrap`] if the entry record and the index disagree, or a read error.
    pub fn from_bytes(bytes: Box<dyn RandomAccessBytes>) -> Result<Self, ContainerError> {
        let invalid = |reason: &str| ContainerError::InvalidBootstrap(reason.to_string());

        let size = bytes.size()?;
        if size < BLOCK_SIZE + INITIAL_RESERVED_SIZE + END_OF_ARCHIVE_SIZE {
            return Err(invalid("container is too small"));
        }
        let head = bytes.read(ByteRange::new(0, BLOCK_SIZE + INITIAL_RESERVED_SIZE))?;
        let (name, entry_size) = parse_header(&to_header(&head)?)?;
        if name != ENTRY_FILE_NAME || entry_size != INITIAL_RESERVED_SIZE {
            return Err(invalid("the first file is not the entry record"));
        }
        let index_entry: ContainerIndexEntry = serde_json::from_slice(&head[512..])
            .map_err(|_| invalid("the entry record is not valid JSON"))?;

        let index_header = bytes.read(ByteRange::new(index_entry.header_offset, BLOCK_SIZE))?;
        let (name, index_size) = parse_header(&to_header(&index_header)?)?;
        if name != INDEX_FILE_NAME
            || index_size != index_entry.size
            || index_entry.data_offset != index_entry.header_offset + BLOCK_SIZE
        {
            return Err(invalid("the entry record does not point to the index"));
        }
        let index: ContainerIndex =
            serde_json::from_slice(&bytes.read(index_entry.data_byte_range())?)
                .map_err(|err| ContainerError::InvalidIndex(err.to_string()))?;
        if index.get(INDEX_FILE_NAME) != Some(&index_entry)
            || index.get(ENTRY_FILE_NAME) != Some(&entry_record_entry())
        {
            return Err(invalid("the index does not agree with the entry record"));
        }

        Ok(Self {
            bytes,
            state: Mutex::new(ContainerState {
                index,
                end: size - END_OF_ARCHIVE_SIZE,
            }),
        })
    }

    /// Return the location of the file `name`.
    #[must_use]
    pub fn get_file_info(&self, name: &str) -> Option<ContainerIndexEntry> {
        self.state.lock().index.get(name).cloned()
    }

    /// Return the location of every file, in the order they were added.
    #[must_use]
    pub fn files(&self) -> Vec<ContainerIndexEntry> {
        self.state.lock().index.files().to_vec()
    }

    /// Overwrite the content of `name` in place, padding it with spaces to its reserved size.
    ///
    /// # Errors
    /// Returns [`ContainerError::ContentTooLarge`] if `data` exceeds the reserved size of the file.
    pub fn overwrite_file_content(&self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        self.check_writable(name)?;
        let state = self.state.lock();
        let entry = state
            .index
            .get(name)
            .ok_or_else(|| ContainerError::FileNotFound(name.to_string()))?;
        self.write_padded(entry, data)
    }

    /// Trash `name` and append `data` as a new copy with room to grow.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the container is read-only or cannot be written.
    pub fn replace_file(&self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        self.check_writable(name)?;
        let mut state = self.state.lock();
        self.trash(&mut state, name)?;
        self.append(&mut state, name, data, growth_size(data.len() as u64))?;
        self.write_index(&mut state)
    }

    /// Trash `name`: zero its data, rename it into the trash directory and remove it from the index.
    ///
    /// # Errors
    /// Returns [`ContainerError::FileNotFound`] if there is no file `name`, or a write error.
    pub fn trash_file(&self, name: &str) -> Result<(), ContainerError> {
        self.check_writable(name)?;
        let mut state = self.state.lock();
        self.trash(&mut state, name)?;
        self.write_index(&mut state)
    }

    /// Append `data` as the file `name` without reserving any space to grow.
    ///
    /// Returns the `./name` byte range reference to the blob to record in a manifest.
    ///
    /// # Errors
    /// Returns [`ContainerError::FileExists`] if there is already a file `name`, or a write error.
    pub fn add_blob(&self, name: &str, data: &[u8]) -> Result<ByteRangeReference, ContainerError> {
        self.check_writable(name)?;
        let mut state = self.state.lock();
        if state.index.get(name).is_some() {
            return Err(ContainerError::FileExists(name.to_string()));
        }
        self.append(&mut state, name, data, data.len() as u64)?;
        self.write_index(&mut state)?;
        Ok(ByteRangeReference::new(
            format!("./{name}"),
            0,
            data.len() as u64,
        ))
    }

    fn check_writable(&self, name: &str) -> Result<(), ContainerError> {
        if self.bytes.is_read_only() {
            Err(ContainerError::ReadOnly)
        } else if name == ENTRY_FILE_NAME
            || name == INDEX_FILE_NAME
            || name.starts_with(TRASH_DIRECTORY)
        {
            Err(ContainerError::InvalidName(name.to_string()))
        } else {
            Ok(())
        }
    }

    fn entry(&self, name: &str) -> Result<ContainerIndexEntry, ContainerError> {
        self.get_file_info(name)
            .ok_or_else(|| ContainerError::FileNotFound(name.to_string()))
    }

    /// Append a file at the end of the archive with `reserved` bytes of space-padded data.
    fn append(
        &self,
        state: &mut ContainerState,
        name: &str,
        data: &[u8],
        reserved: u64,
    ) -> Result<(), ContainerError> {
        let entry = ContainerIndexEntry {
            name: name.to_string(),
            header_offset: state.end,
            data_offset: state.end + BLOCK_SIZE,
            size: reserved,
        };
        if data.len() as u64 > reserved {
            return Err(ContainerError::ContentTooLarge {
                name: name.to_string(),
                size: data.len() as u64,
                reserved,
            });
        }
        let header_len = to_usize(BLOCK_SIZE)?;
        let mut record = Vec::with_capacity(
            header_len + to_usize(padded_size(reserved) + END_OF_ARCHIVE_SIZE)?,
        );
        record.extend_from_slice(&new_header(name, reserved)?);
        record.extend_from_slice(data);
        record.resize(header_len + to_usize(reserved)?, b' ');
        record.resize(
            header_len + to_usize(padded_size(reserved) + END_OF_ARCHIVE_SIZE)?,
            0,
        );
        self.bytes.write(entry.header_offset, &record)?;

        state.end = entry.data_offset + padded_size(reserved);
        state.index.insert(entry);
        Ok(())
    }

    fn write_padded(
        &self,
        entry: &ContainerIndexEntry,
        data: &[u8],
    ) -> Result<(), ContainerError> {
        if data.len() as u64 > entry.size {
            return Err(ContainerError::ContentTooLarge {
                name: entry.name.clone(),
                size: data.len() as u64,
                reserved: entry.size,
            });
        }
        let mut padded = data.to_vec();
        padded.resize(to_usize(entry.size)?, b' ');
        self.bytes.write(entry.data_offset, &padded)
    }

    /// Trash `name`. The renamed header is built before anything is written.
    fn trash(&self, state: &mut ContainerState, name: &str) -> Result<(), ContainerError> {
        let entry = state
            .index
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::FileNotFound(name.to_string()))?;
        let header_range = ByteRange::new(entry.header_offset, BLOCK_SIZE);
        let mut header = to_header(&self.bytes.read(header_range)?)?;
        let trash_name = format!("{TRASH_DIRECTORY}/{name}.{}", entry.header_offset);
        if rename_header(&mut header, &trash_name).is_err() {
            // too long for a ustar header
            rename_header(
                &mut header,
                &format!("{TRASH_DIRECTORY}/{}", entry.header_offset),
            )?;
        }

        self.bytes.write(entry.data_offset, &vec![0; to_usize(entry.size)?])?;
        self.bytes.write(entry.header_offset, &header)?;
        state.index.remove(name);
        log::debug!("trashed {name} at {}", entry.header_offset);
        Ok(())
    }

    /// Write the index in place if it fits, otherwise relocate it to the end of the archive.
    /// Then point the entry record to the index.
    fn write_index(&self, state: &mut ContainerState) -> Result<(), ContainerError> {
        let current = state
            .index
            .get(INDEX_FILE_NAME)
            .cloned()
            .ok_or_else(missing_index_entry)?;
        let json = serde_json::to_vec(&state.index)?;
        if json.len() as u64 <= current.size {
            self.write_padded(&current, &json)?;
        } else {
            self.trash(state, INDEX_FILE_NAME)?;
            // The relocated index records its own location, so reserve space before serializing it.
            let mut entry = ContainerIndexEntry {
                name: INDEX_FILE_NAME.to_string(),
                header_offset: state.end,
                data_offset: state.end + BLOCK_SIZE,
                size: growth_size(json.len() as u64),
            };
            let json = loop {
                state.index.insert(entry.clone());
                let json = serde_json::to_vec(&state.index)?;
                if json.len() as u64 <= entry.size {
                    break json;
                }
                entry.size = growth_size(json.len() as u64);
            };
            self.append(state, INDEX_FILE_NAME, &json, entry.size)?;
            log::debug!(
                "relocated the container index to {} ({} bytes reserved)",
                entry.header_offset,
                entry.size
            );
        }

        let index_entry = state
            .index
            .get(INDEX_FILE_NAME)
            .ok_or_else(missing_index_entry)?;
        self.write_padded(&entry_record_entry(), &serde_json::to_vec(index_entry)?)
    }
}

impl Container for GrowableContainer {
    fn read_manifest(&self) -> Result<ReferenceManifest, ContainerError> {
        Ok(ReferenceManifest::from_slice(&self.read_file(MANIFEST_FILE_NAME)?)?)
    }

    fn write_manifest(&self, manifest: &ReferenceManifest) -> Result<(), ContainerError> {
        self.write_file(MANIFEST_FILE_NAME, &manifest.to_vec()?)
    }

    fn read_file(&self, name: &str) -> Result<Bytes, ContainerError> {
        let entry = self.entry(name)?;
        self.bytes.read(entry.data_byte_range())
    }

    fn read_file_range(
        &self,
        name: &str,
        byte_range: ByteRange,
    ) -> Result<Bytes, ContainerError> {
        let entry = self.entry(name)?;
        if !byte_range.fits(entry.size) {
            return Err(InvalidByteRangeError::new(byte_range, entry.size).into());
        }
        self.bytes.read(ByteRange::new(
            entry.data_offset + byte_range.offset,
            byte_range.length,
        ))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        self.check_writable(name)?;
        let mut state = self.state.lock();
        match state.index.get(name).cloned() {
            Some(entry) if data.len() as u64 <= entry.size => {
                return self.write_padded(&entry, data);
            }
            Some(_) => self.trash(&mut state, name)?,
            None => {}
        }
        self.append(&mut state, name, data, growth_size(data.len() as u64))?;
        self.write_index(&mut state)
    }

    fn is_read_only(&self) -> bool {
        self.bytes.is_read_only()
    }
}

/// The fixed location of the entry record.
fn entry_record_entry() -> ContainerIndexEntry {
    ContainerIndexEntry {
        name: ENTRY_FILE_NAME.to_string(),
        header_offset: 0,
        data_offset: BLOCK_SIZE,
        size: INITIAL_RESERVED_SIZE,
    }
}

fn missing_index_entry() -> ContainerError {
    ContainerError::InvalidIndex("the index has no entry for itself".to_string())
}

fn to_usize(size: u64) -> Result<usize, ContainerError> {
    usize::try_from(size)
        .map_err(|_| ContainerError::InvalidIndex(format!("size {size} is not addressable")))
}

fn to_header(bytes: &[u8]) -> Result<HeaderBytes, ContainerError> {
    bytes
        .get(..BLOCK_SIZE as usize)
        .and_then(|header| header.try_into().ok())
        .ok_or_else(|| ContainerError::InvalidIndex("truncated tar header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth() {
        assert_eq!(growth_size(0), 1024);
        assert_eq!(growth_size(512), 1024);
        assert_eq!(growth_size(513), 2048);
        assert_eq!(growth_size(5000), 16384);
    }

    #[test]
    fn container_create_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("c.lindi.tar");
        let container = GrowableContainer::create(&path, &ReferenceManifest::new()).unwrap();
        assert_eq!(
            container.get_file_info(ENTRY_FILE_NAME),
            Some(entry_record_entry())
        );
        let index = container.get_file_info(INDEX_FILE_NAME).unwrap();
        assert_eq!(
            (index.header_offset, index.data_offset, index.size),
            (1536, 2048, 1024)
        );
        let manifest = container.get_file_info(MANIFEST_FILE_NAME).unwrap();
        assert_eq!((manifest.header_offset, manifest.data_offset), (3072, 3584));

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len() as u64, 3584 + padded_size(manifest.size) + 1024);
        assert!(data[data.len() - 1024..].iter().all(|&b| b == 0));
        let record: ContainerIndexEntry = serde_json::from_slice(&data[512..1536]).unwrap();
        assert_eq!(record, index);
    }

    #[test]
    fn container_write_in_place_then_grow() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("c.tar");
        let container = GrowableContainer::create(&path, &ReferenceManifest::new()).unwrap();
        container.write_file("notes.txt", b"hello").unwrap();
        let before = container.get_file_info("notes.txt").unwrap();
        container.write_file("notes.txt", b"hello again").unwrap();
        assert_eq!(container.get_file_info("notes.txt").unwrap(), before);
        assert!(container.read_file("notes.txt").unwrap().starts_with(b"hello again "));

        let large = vec![b'x'; 4000];
        container.write_file("notes.txt", &large).unwrap();
        let after = container.get_file_info("notes.txt").unwrap();
        assert!(after.header_offset > before.header_offset);
        assert_eq!(after.size, 8192);
        assert_eq!(
            &container.read_file_range("notes.txt", ByteRange::new(0, 4000)).unwrap()[..],
            &large[..]
        );
        assert!(matches!(
            container.overwrite_file_content("notes.txt", &vec![b'y'; 9000]),
            Err(ContainerError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn container_reserved_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let container =
            GrowableContainer::create(dir.path().join("c.tar"), &ReferenceManifest::new())
                .unwrap();
        assert!(matches!(
            container.write_file(INDEX_FILE_NAME, b"{}"),
            Err(ContainerError::InvalidName(_))
        ));
        assert!(matches!(
            container.trash_file("missing"),
            Err(ContainerError::FileNotFound(_))
        ));
        container.add_blob("blob", &[1, 2, 3]).unwrap();
        assert!(matches!(
            container.add_blob("blob", &[1]),
            Err(ContainerError::FileExists(_))
        ));
    }

    #[test]
    fn container_grow_long_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("c.tar");
        let container = GrowableContainer::create(&path, &ReferenceManifest::new()).unwrap();
        let name = format!("dir/{}", "a".repeat(90));
        container.write_file(&name, b"hello").unwrap();
        let before = container.get_file_info(&name).unwrap();
        let large = vec![b'x'; 5000];
        container.write_file(&name, &large).unwrap();
        assert!(container.get_file_info(&name).unwrap().header_offset > before.header_offset);
        drop(container);

        let container = GrowableContainer::open(&path).unwrap();
        let data = container.read_file(&name).unwrap();
        assert_eq!(&data[..5000], &large[..]);
        let mut archive = tar::Archive::new(std::fs::File::open(&path).unwrap());
        let trash_name = format!(".trash/{name}.{}", before.header_offset);
        assert!(archive
            .entries()
            .unwrap()
            .any(|entry| entry.unwrap().path().unwrap().to_string_lossy() == trash_name));
    }

    #[test]
    fn container_trash_name_fallback() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("c.tar");
        let container = GrowableContainer::create(&path, &ReferenceManifest::new()).unwrap();
        // fits in a ustar header, but not once renamed into the trash directory
        let name = format!("{}/{}", "d".repeat(150), "a".repeat(98));
        container.write_file(&name, b"hello").unwrap();
        let before = container.get_file_info(&name).unwrap();
        container.write_file(&name, &vec![b'x'; 5000]).unwrap();
        drop(container);

        let container = GrowableContainer::open(&path).unwrap();
        assert!(container.read_file(&name).unwrap().starts_with(&[b'x'; 5000]));
        let mut archive = tar::Archive::new(std::fs::File::open(&path).unwrap());
        let trash_name = format!(".trash/{}", before.header_offset);
        assert!(archive
            .entries()
            .unwrap()
            .any(|entry| entry.unwrap().path().unwrap().to_string_lossy() == trash_name));
    }
}
