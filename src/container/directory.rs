use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    byte_range::{extract_byte_range_read_seek, ByteRange, InvalidByteRangeError},
    manifest::ReferenceManifest,
    storage::Bytes,
};

use super::{Container, ContainerError, MANIFEST_FILE_NAME};

/// A container stored as ordinary files in a directory.
///
/// The manifest is `lindi.json` in the root directory and every other file is stored at its name relative to the root.
/// Files are independent, so writes never move other files.
#[derive(Debug, Clone)]
pub struct DirectoryContainer {
    root: PathBuf,
    read_only: bool,
}

impl DirectoryContainer {
    /// Create a directory container at `root` holding `manifest`.
    ///
    /// # Errors
    /// Returns a [`ContainerError`] if the directory or the manifest cannot be written.
    pub fn create(
        root: impl Into<PathBuf>,
        manifest: &ReferenceManifest,
    ) -> Result<Self, ContainerError> {
        let container = Self {
            root: root.into(),
            read_only: false,
        };
        std::fs::create_dir_all(&container.root)?;
        container.write_manifest(manifest)?;
        Ok(container)
    }

    /// Open the directory container at `root`.
    ///
    /// # Errors
    /// Returns [`ContainerError::FileNotFound`] if `root` has no manifest.
    pub fn open(root: impl Into<PathBuf>, read_only: bool) -> Result<Self, ContainerError> {
        let container = Self {
            root: root.into(),
            read_only,
        };
        if !container.root.join(MANIFEST_FILE_NAME).is_file() {
            return Err(ContainerError::FileNotFound(MANIFEST_FILE_NAME.to_string()));
        }
        Ok(container)
    }

    /// Return the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, ContainerError> {
        let relative = name.strip_prefix("./").unwrap_or(name);
        if relative.is_empty()
            || relative
                .split('/')
                .any(|component| component.is_empty() || component == "." || component == "..")
        {
            return Err(ContainerError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn open_file(&self, name: &str) -> Result<File, ContainerError> {
        File::open(self.path(name)?).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ContainerError::FileNotFound(name.to_string())
            } else {
                err.into()
            }
        })
    }
}

impl Container for DirectoryContainer {
    fn read_manifest(&self) -> Result<ReferenceManifest, ContainerError> {
        Ok(ReferenceManifest::from_slice(&self.read_file(MANIFEST_FILE_NAME)?)?)
    }

    fn write_manifest(&self, manifest: &ReferenceManifest) -> Result<(), ContainerError> {
        self.write_file(MANIFEST_FILE_NAME, &manifest.to_vec_pretty()?)
    }

    fn read_file(&self, name: &str) -> Result<Bytes, ContainerError> {
        let path = self.path(name)?;
        match std::fs::read(path) {
            Ok(data) => Ok(data.into()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ContainerError::FileNotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read_file_range(&self, name: &str, byte_range: ByteRange) -> Result<Bytes, ContainerError> {
        let mut file = self.open_file(name)?;
        let size = file.metadata()?.len();
        if !byte_range.fits(size) {
            return Err(InvalidByteRangeError::new(byte_range, size).into());
        }
        Ok(extract_byte_range_read_seek(&mut file, byte_range)?.into())
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        if self.read_only {
            return Err(ContainerError::ReadOnly);
        }
        let path = self.path(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_container() {
        let dir = tempfile::TempDir::new().unwrap();
        let container =
            DirectoryContainer::create(dir.path().join("d"), &ReferenceManifest::new()).unwrap();
        container.write_file("blobs/a", &[0, 1, 2, 3, 4]).unwrap();
        assert_eq!(
            &container.read_file_range("./blobs/a", ByteRange::new(1, 3)).unwrap()[..],
            &[1, 2, 3]
        );
        assert!(container.read_file_range("blobs/a", ByteRange::new(3, 3)).is_err());
        assert!(matches!(
            container.read_file("missing"),
            Err(ContainerError::FileNotFound(_))
        ));
        assert!(matches!(
            container.write_file("../escape", &[]),
            Err(ContainerError::InvalidName(_))
        ));
        assert_eq!(container.read_manifest().unwrap(), ReferenceManifest::new());

        let read_only = DirectoryContainer::open(container.root(), true).unwrap();
        assert!(matches!(
            read_only.write_file("b", &[]),
            Err(ContainerError::ReadOnly)
        ));
    }
}
