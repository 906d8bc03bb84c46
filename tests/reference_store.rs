use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use lindi::{
    byte_range::ByteRange,
    manifest::{ByteRangeReference, ManifestReference, ReferenceManifest},
    remote::{FetchError, RangeFetcher, RemoteReader, RemoteReaderOptions, UrlResolver},
    storage::{
        store::ReferenceManifestStore, Bytes, ListableStorageTraits, ReadableStorageTraits,
        StorageError, StoreKey, StorePrefix, WritableStorageTraits,
    },
};

/// Serves `https://example.com/data.bin`, failing the first `failures` fetches with a server error.
struct FlakyServer {
    data: Vec<u8>,
    failures: AtomicUsize,
    fetches: AtomicUsize,
}

impl FlakyServer {
    fn new(failures: usize) -> Self {
        Self {
            data: (0..4096u32).map(|i| (i * 7 % 256) as u8).collect(),
            failures: AtomicUsize::new(failures),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl RangeFetcher for FlakyServer {
    fn fetch(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if url != "https://example.com/data.bin" {
            return Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            });
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1))
            .is_ok()
        {
            return Err(FetchError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(Bytes::copy_from_slice(
            &self.data[byte_range.to_range_usize().unwrap()],
        ))
    }

    fn size(&self, _url: &str) -> Result<u64, FetchError> {
        Ok(self.data.len() as u64)
    }
}

fn reader(server: Arc<FlakyServer>) -> Arc<RemoteReader> {
    Arc::new(RemoteReader::new(
        server,
        RemoteReaderOptions {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            min_chunk_size: 64,
            max_chunk_size: 1024,
            ..RemoteReaderOptions::default()
        },
    ))
}

fn key(key: &str) -> StoreKey {
    StoreKey::new(key).unwrap()
}

#[test]
fn reference_store_remote_retries() {
    let server = Arc::new(FlakyServer::new(2));
    let mut manifest = ReferenceManifest::new();
    manifest
        .insert(
            "x/0",
            ByteRangeReference::new("https://example.com/data.bin", 100, 50).into(),
        )
        .unwrap();
    let store = ReferenceManifestStore::new(manifest).with_remote_reader(reader(server.clone()));

    let bytes = store.get(&key("x/0")).unwrap().unwrap();
    assert_eq!(bytes, &server.data[100..150]);
    assert!(server.fetches.load(Ordering::SeqCst) >= 3);
}

#[test]
fn reference_store_remote_exhausted() {
    let server = Arc::new(FlakyServer::new(10));
    let mut manifest = ReferenceManifest::new();
    manifest
        .insert(
            "x/0",
            ByteRangeReference::new("https://example.com/data.bin", 0, 8).into(),
        )
        .unwrap();
    let store = ReferenceManifestStore::new(manifest).with_remote_reader(reader(server));
    assert!(matches!(
        store.get(&key("x/0")),
        Err(StorageError::Remote(_))
    ));
}

#[test]
fn reference_store_rewritten_scheme() {
    let server = Arc::new(FlakyServer::new(0));
    let resolver = UrlResolver::new(Duration::from_secs(60)).with_hook(Arc::new(|url: &str| {
        url.strip_prefix("s3://bucket/")
            .map(|path| format!("https://example.com/{path}"))
    }));
    let reader = Arc::new(
        RemoteReader::new(
            server.clone(),
            RemoteReaderOptions {
                initial_backoff: Duration::from_millis(1),
                ..RemoteReaderOptions::default()
            },
        )
        .with_resolver(Arc::new(resolver)),
    );
    let mut manifest = ReferenceManifest::new();
    manifest
        .insert(
            "x/0",
            ByteRangeReference::new("s3://bucket/data.bin", 0, 4).into(),
        )
        .unwrap();
    let store = ReferenceManifestStore::new(manifest).with_remote_reader(reader);
    assert_eq!(store.get(&key("x/0")).unwrap().unwrap(), &server.data[0..4]);
}

#[test]
fn reference_store_file_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();
    let location = url::Url::from_file_path(&path).unwrap().to_string();
    let mut manifest = ReferenceManifest::new();
    manifest
        .insert("x/0", ByteRangeReference::new(location, 1, 3).into())
        .unwrap();
    let store = ReferenceManifestStore::new(manifest);
    assert_eq!(
        store.get(&key("x/0")).unwrap().unwrap(),
        [2u8, 3, 4].as_slice()
    );
}

#[test]
fn reference_store_templates() {
    let mut manifest = ReferenceManifest::new();
    for i in 0..6 {
        manifest
            .insert(
                format!("a/{i}"),
                ByteRangeReference::new("https://example.com/data.bin", i * 100, 100).into(),
            )
            .unwrap();
    }
    for i in 0..3 {
        manifest
            .insert(
                format!("b/{i}"),
                ByteRangeReference::new("https://example.com/other.bin", i * 10, 10).into(),
            )
            .unwrap();
    }
    manifest.extract_templates();
    assert_eq!(manifest.templates().len(), 1);
    assert_eq!(manifest.templates()["u1"], "https://example.com/data.bin");
    for i in 0..6 {
        let Some(ManifestReference::ByteRange(reference)) = manifest.get(&format!("a/{i}")) else {
            panic!("expected a byte range");
        };
        assert_eq!(reference.location, "{{u1}}");
    }
    for i in 0..3 {
        let Some(ManifestReference::ByteRange(reference)) = manifest.get(&format!("b/{i}")) else {
            panic!("expected a byte range");
        };
        assert_eq!(reference.location, "https://example.com/other.bin");
    }

    // templated locations are expanded when read
    let server = Arc::new(FlakyServer::new(0));
    let json = manifest.to_vec().unwrap();
    let store = ReferenceManifestStore::new(ReferenceManifest::from_slice(&json).unwrap())
        .with_remote_reader(reader(server.clone()));
    assert_eq!(
        store.get(&key("a/3")).unwrap().unwrap(),
        &server.data[300..400]
    );
}

#[test]
fn reference_store_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.lindi.json");
    std::fs::write(
        &path,
        br#"{
            "refs": {
                ".zgroup": {"zarr_format": 2},
                ".zattrs": {"version": "1.0", "nan": "NaN"},
                "g/.zgroup": "{\"zarr_format\": 2}",
                "g/x/0": "base64:AQID"
            }
        }"#,
    )
    .unwrap();
    let store = ReferenceManifestStore::from_json_file(&path).unwrap();
    assert_eq!(
        store.get(&key("g/x/0")).unwrap().unwrap(),
        [1u8, 2, 3].as_slice()
    );
    assert_eq!(store.list_children("/").unwrap(), vec![".zattrs", ".zgroup", "g"]);
    assert_eq!(
        store
            .list_prefix(&StorePrefix::new("g/").unwrap())
            .unwrap(),
        vec![key("g/.zgroup"), key("g/x/0")]
    );

    // writes go to the manifest, never to the referenced locations
    store.set(&key("g/x/1"), Bytes::from_static(b"\xff\x01")).unwrap();
    let exported = store.export_manifest();
    assert_eq!(
        exported.get("g/x/1"),
        Some(&ManifestReference::Literal("base64:/wE=".to_string()))
    );
    assert!(matches!(
        store.write_to_container(),
        Err(StorageError::Unsupported(_))
    ));
}

#[test]
fn reference_store_malformed_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.lindi.json");
    std::fs::write(&path, br#"{"refs": {"x/0": ["f.h5", 0]}}"#).unwrap();
    assert!(matches!(
        ReferenceManifestStore::from_json_file(&path),
        Err(StorageError::Manifest(_))
    ));
}
