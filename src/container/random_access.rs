use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    byte_range::{extract_byte_range_read_seek, ByteRange},
    remote::RemoteReader,
    storage::Bytes,
};

use super::ContainerError;

/// Random access to the bytes of a container.
///
/// Every edit of a container is a patch of bytes at an offset, so a container only needs this interface from its backing store.
pub trait RandomAccessBytes: Send + Sync {
    /// Return the total number of bytes.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the size cannot be determined.
    fn size(&self) -> Result<u64, ContainerError>;

    /// Read `byte_range`.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the read fails.
    fn read(&self, byte_range: ByteRange) -> Result<Bytes, ContainerError>;

    /// Write `data` at `offset`, extending the bytes if required.
    ///
    /// # Errors
    /// Returns [`ContainerError::ReadOnly`] if the bytes are read-only, or an IO error.
    fn write(&self, offset: u64, data: &[u8]) -> Result<(), ContainerError>;

    /// Returns true if [`write`](RandomAccessBytes::write) always fails.
    fn is_read_only(&self) -> bool;
}

/// A local file.
#[derive(Debug)]
pub struct LocalFileBytes {
    file: Mutex<File>,
    read_only: bool,
}

impl LocalFileBytes {
    /// Open a local file for reading and, unless `read_only`, writing.
    ///
    /// # Errors
    /// Returns an IO error if the file cannot be opened.
    pub fn open(path: &Path, read_only: bool) -> Result<Self, ContainerError> {
        let file = File::options().read(true).write(!read_only).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            read_only,
        })
    }

    /// Create a new local file, truncating any existing file.
    ///
    /// # Errors
    /// Returns an IO error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ContainerError> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            read_only: false,
        })
    }
}

impl RandomAccessBytes for LocalFileBytes {
    fn size(&self) -> Result<u64, ContainerError> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn read(&self, byte_range: ByteRange) -> Result<Bytes, ContainerError> {
        let mut file = self.file.lock();
        Ok(extract_byte_range_read_seek(&mut *file, byte_range)?.into())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), ContainerError> {
        if self.read_only {
            return Err(ContainerError::ReadOnly);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// A remote resource read through a [`RemoteReader`]. Always read-only.
#[derive(Debug)]
pub struct RemoteBytes {
    reader: Arc<RemoteReader>,
    url: String,
}

impl RemoteBytes {
    /// Create remote bytes for the resource at `url`.
    #[must_use]
    pub fn new(reader: Arc<RemoteReader>, url: impl Into<String>) -> Self {
        Self {
            reader,
            url: url.into(),
        }
    }
}

impl RandomAccessBytes for RemoteBytes {
    fn size(&self) -> Result<u64, ContainerError> {
        Ok(self.reader.size(&self.url)?)
    }

    fn read(&self, byte_range: ByteRange) -> Result<Bytes, ContainerError> {
        Ok(self.reader.read(&self.url, byte_range)?)
    }

    fn write(&self, _offset: u64, _data: &[u8]) -> Result<(), ContainerError> {
        Err(ContainerError::ReadOnly)
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
