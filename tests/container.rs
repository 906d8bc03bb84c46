use std::{io::Read, sync::Arc, time::Duration};

use lindi::{
    byte_range::ByteRange,
    container::{
        Container, ContainerError, ContainerIndexEntry, DirectoryContainer, GrowableContainer,
        ENTRY_FILE_NAME, INDEX_FILE_NAME, INITIAL_RESERVED_SIZE, MANIFEST_FILE_NAME,
    },
    manifest::{ManifestReference, ReferenceManifest},
    remote::{FetchError, RangeFetcher, RemoteReader, RemoteReaderOptions},
    storage::{
        store::ReferenceManifestStore, Bytes, ReadableStorageTraits, StorageError, StoreKey,
        WritableStorageTraits,
    },
};

fn manifest() -> ReferenceManifest {
    let mut manifest = ReferenceManifest::new();
    manifest
        .insert(
            ".zgroup",
            ManifestReference::inline_json(&serde_json::json!({"zarr_format": 2})).unwrap(),
        )
        .unwrap();
    manifest
}

/// The entry record at offset 512, which locates the index.
fn entry_record(path: &std::path::Path) -> ContainerIndexEntry {
    let bytes = std::fs::read(path).unwrap();
    serde_json::from_slice(&bytes[512..512 + INITIAL_RESERVED_SIZE as usize]).unwrap()
}

#[test]
fn container_index_relocation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.lindi.tar");
    let container = GrowableContainer::create(&path, &manifest()).unwrap();

    let index = container.get_file_info(INDEX_FILE_NAME).unwrap();
    assert_eq!(index.header_offset, 1536);
    assert_eq!(entry_record(&path), index);
    let manifest_entry = container.get_file_info(MANIFEST_FILE_NAME).unwrap();
    assert_eq!(manifest_entry.header_offset, 3072);
    assert_eq!(manifest_entry.data_offset, 3584);

    for i in 0..100u8 {
        container
            .add_blob(&format!("blobs/blob_{i:03}"), &[i; 3])
            .unwrap();
        // relocating the index never moves previously stored files
        for j in 0..=i {
            assert_eq!(
                container.read_file(&format!("blobs/blob_{j:03}")).unwrap(),
                [j; 3].as_slice()
            );
        }
    }
    let relocated = container.get_file_info(INDEX_FILE_NAME).unwrap();
    assert!(relocated.header_offset > manifest_entry.header_offset);
    assert!(relocated.size > INITIAL_RESERVED_SIZE);
    assert_eq!(entry_record(&path), relocated);
    assert_eq!(
        container.get_file_info(MANIFEST_FILE_NAME),
        Some(manifest_entry.clone())
    );
    drop(container);

    let container = GrowableContainer::open(&path).unwrap();
    assert_eq!(container.get_file_info(INDEX_FILE_NAME), Some(relocated));
    assert_eq!(
        container.get_file_info(MANIFEST_FILE_NAME),
        Some(manifest_entry)
    );
    assert_eq!(
        container.read_file("blobs/blob_042").unwrap(),
        [42u8; 3].as_slice()
    );
    assert_eq!(container.read_manifest().unwrap(), manifest());
}

#[test]
fn container_is_a_tar_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.lindi.tar");
    let container = GrowableContainer::create(&path, &manifest()).unwrap();
    container.add_blob("blob", b"hello").unwrap();

    // outgrow the reserved space of the manifest
    let mut large = manifest();
    for i in 0..200 {
        large
            .insert(
                format!("x/{i}"),
                ManifestReference::Literal("payload".repeat(4)),
            )
            .unwrap();
    }
    container.write_manifest(&large).unwrap();
    assert!(container.get_file_info(MANIFEST_FILE_NAME).unwrap().header_offset > 3072);
    drop(container);

    let mut archive = tar::Archive::new(std::fs::File::open(&path).unwrap());
    let mut names = vec![];
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        if name == "blob" {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            assert_eq!(content, "hello");
        }
        names.push(name);
    }
    assert_eq!(&names[..2], [ENTRY_FILE_NAME, INDEX_FILE_NAME]);
    assert!(names.contains(&".trash/lindi.json.3072".to_string()));
    assert_eq!(
        names.iter().filter(|name| *name == MANIFEST_FILE_NAME).count(),
        1
    );

    let container = GrowableContainer::open_read_only(&path).unwrap();
    assert_eq!(container.read_manifest().unwrap(), large);
}

#[test]
fn container_store_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.lindi.tar");
    let container = Arc::new(GrowableContainer::create(&path, &manifest()).unwrap());
    let reference = container.add_blob("blobs/x0", &[9, 8, 7, 6]).unwrap();
    assert_eq!(reference.location, "./blobs/x0");

    let mut with_blob = manifest();
    with_blob.insert("x/0", reference.into()).unwrap();
    container.write_manifest(&with_blob).unwrap();

    let store = ReferenceManifestStore::from_container(container.clone()).unwrap();
    assert_eq!(
        store.get(&StoreKey::new("x/0").unwrap()).unwrap().unwrap(),
        [9u8, 8, 7, 6].as_slice()
    );
    store
        .set(
            &StoreKey::new("x/.zattrs").unwrap(),
            Bytes::from_static(br#"{"units":"m"}"#),
        )
        .unwrap();
    store.write_to_container().unwrap();
    drop(store);
    drop(container);

    let container: Arc<dyn Container> = Arc::new(GrowableContainer::open_read_only(&path).unwrap());
    let store = ReferenceManifestStore::from_container(container).unwrap();
    assert!(store.is_read_only());
    assert_eq!(
        store
            .get(&StoreKey::new("x/.zattrs").unwrap())
            .unwrap()
            .unwrap(),
        br#"{"units":"m"}"#.as_slice()
    );
    assert!(matches!(
        store.set(&StoreKey::new("x/1").unwrap(), Bytes::new()),
        Err(StorageError::ReadOnly)
    ));
}

#[test]
fn container_reserved_names_and_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.lindi.tar");
    let container = GrowableContainer::create(&path, &manifest()).unwrap();
    assert!(matches!(
        container.add_blob(INDEX_FILE_NAME, b"x"),
        Err(ContainerError::InvalidName(_))
    ));
    container.add_blob("a", b"1").unwrap();
    assert!(matches!(
        container.add_blob("a", b"2"),
        Err(ContainerError::FileExists(_))
    ));
    container.trash_file("a").unwrap();
    assert!(container.get_file_info("a").is_none());
    drop(container);

    let container = GrowableContainer::open_read_only(&path).unwrap();
    assert!(container.is_read_only());
    assert!(matches!(
        container.add_blob("b", b"1"),
        Err(ContainerError::ReadOnly)
    ));
}

/// Serves a file from disk as if it were remote.
struct FileServer(Vec<u8>);

impl RangeFetcher for FileServer {
    fn fetch(&self, _url: &str, byte_range: ByteRange) -> Result<Bytes, FetchError> {
        Ok(Bytes::copy_from_slice(
            &self.0[byte_range.to_range_usize().unwrap()],
        ))
    }

    fn size(&self, _url: &str) -> Result<u64, FetchError> {
        Ok(self.0.len() as u64)
    }
}

#[test]
fn container_remote_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.lindi.tar");
    let container = GrowableContainer::create(&path, &manifest()).unwrap();
    container.add_blob("blob", b"remote bytes").unwrap();
    drop(container);

    let reader = Arc::new(RemoteReader::new(
        Arc::new(FileServer(std::fs::read(&path).unwrap())),
        RemoteReaderOptions {
            initial_backoff: Duration::from_millis(1),
            ..RemoteReaderOptions::default()
        },
    ));
    let container =
        GrowableContainer::open_remote("https://example.com/data.lindi.tar", reader).unwrap();
    assert!(container.is_read_only());
    assert_eq!(
        container
            .read_file_range("blob", ByteRange::new(7, 5))
            .unwrap(),
        b"bytes".as_slice()
    );
    assert!(matches!(
        container.write_manifest(&manifest()),
        Err(ContainerError::ReadOnly)
    ));
}

#[test]
fn directory_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data.lindi.d");
    let container = DirectoryContainer::create(&root, &manifest()).unwrap();
    container.write_file("blobs/a", b"abc").unwrap();
    assert_eq!(
        container
            .read_file_range("blobs/a", ByteRange::new(1, 2))
            .unwrap(),
        b"bc".as_slice()
    );
    assert!(root.join(MANIFEST_FILE_NAME).exists());
    assert!(container.write_file("../escape", b"x").is_err());

    let container = DirectoryContainer::open(&root, true).unwrap();
    assert_eq!(container.read_manifest().unwrap(), manifest());
    assert!(matches!(
        container.write_file("blobs/b", b"x"),
        Err(ContainerError::ReadOnly)
    ));
}
