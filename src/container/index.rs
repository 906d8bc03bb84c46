use serde::{Deserialize, Serialize};

use crate::byte_range::ByteRange;

/// The location of a file in a container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerIndexEntry {
    /// The file name.
    #[serde(rename = "n")]
    pub name: String,
    /// The offset of the tar header of the file.
    #[serde(rename = "o")]
    pub header_offset: u64,
    /// The offset of the file data.
    #[serde(rename = "d")]
    pub data_offset: u64,
    /// The size of the file data, including any reserved space.
    #[serde(rename = "s")]
    pub size: u64,
}

impl ContainerIndexEntry {
    /// The byte range of the file data in the container.
    #[must_use]
    pub fn data_byte_range(&self) -> ByteRange {
        ByteRange::new(self.data_offset, self.size)
    }
}

/// The index of a container: the location of every file, including the index itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerIndex {
    files: Vec<ContainerIndexEntry>,
}

impl ContainerIndex {
    /// Return the entry for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContainerIndexEntry> {
        self.files.iter().find(|entry| entry.name == name)
    }

    /// Insert an entry, replacing any entry with the same name.
    pub fn insert(&mut self, entry: ContainerIndexEntry) {
        if let Some(existing) = self.files.iter_mut().find(|e| e.name == entry.name) {
            *existing = entry;
        } else {
            self.files.push(entry);
        }
    }

    /// Remove the entry for `name`.
    pub fn remove(&mut self, name: &str) -> Option<ContainerIndexEntry> {
        let position = self.files.iter().position(|entry| entry.name == name)?;
        Some(self.files.remove(position))
    }

    /// Return every entry in the order the files were added.
    #[must_use]
    pub fn files(&self) -> &[ContainerIndexEntry] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_json() {
        let mut index = ContainerIndex::default();
        index.insert(ContainerIndexEntry {
            name: "a".to_string(),
            header_offset: 0,
            data_offset: 512,
            size: 10,
        });
        assert_eq!(
            serde_json::to_string(&index).unwrap(),
            r#"{"files":[{"n":"a","o":0,"d":512,"s":10}]}"#
        );
        index.insert(ContainerIndexEntry {
            name: "a".to_string(),
            header_offset: 1024,
            data_offset: 1536,
            size: 20,
        });
        assert_eq!(index.files().len(), 1);
        assert_eq!(index.get("a").unwrap().data_byte_range(), ByteRange::new(1536, 20));
        assert!(index.remove("a").is_some());
        assert!(index.get("a").is_none());
    }
}
