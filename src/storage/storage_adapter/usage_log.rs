//! A storage adapter which prints function calls.

use std::{io::Write, sync::Arc};

use itertools::Itertools;
use parking_lot::Mutex;

use crate::storage::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StoreKeysPrefixes, StorePrefix, WritableStorageTraits,
};

/// The usage log storage adapter. Logs storage method calls.
///
/// It is intended to aid in debugging and optimising performance by revealing storage access patterns.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::Arc;
/// # use parking_lot::Mutex;
/// # use lindi::manifest::ReferenceManifest;
/// # use lindi::storage::{store::ReferenceManifestStore, storage_adapter::UsageLogStorageAdapter};
/// let store = Arc::new(ReferenceManifestStore::new(ReferenceManifest::new()));
/// let log_writer = Arc::new(Mutex::new(std::io::stdout()));
/// let store = Arc::new(UsageLogStorageAdapter::new(store, log_writer, || {
///     "[lindi] ".to_string()
/// }));
/// ```
///
/// Reading through the adapter prints outputs like:
/// ```text
/// [lindi] get(.zgroup) -> len=Ok(17)
/// [lindi] list_dir() -> (keys:[.zattrs, .zgroup], prefixes:[acquisition/])
/// [lindi] get(acquisition/ts/.zarray) -> len=Ok(312)
/// [lindi] get(acquisition/ts/0.0) -> len=Ok(409600)
/// [lindi] set(acquisition/ts/.zattrs, len=24) -> Ok(())
/// ```
pub struct UsageLogStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    handle: Arc<Mutex<dyn Write + Send + Sync>>,
    prefix_func: fn() -> String,
}

impl<TStorage: ?Sized> core::fmt::Debug for UsageLogStorageAdapter<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "usage log")
    }
}

impl<TStorage: ?Sized> UsageLogStorageAdapter<TStorage> {
    /// Create a new usage log storage adapter writing to `handle`. Every line starts with the output of `prefix_func`.
    pub fn new(
        storage: Arc<TStorage>,
        handle: Arc<Mutex<dyn Write + Send + Sync>>,
        prefix_func: fn() -> String,
    ) -> Self {
        Self {
            storage,
            handle,
            prefix_func,
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let result = self.storage.get(key);
        writeln!(
            self.handle.lock(),
            "{}get({key}) -> len={:?}",
            (self.prefix_func)(),
            result.as_ref().map(|v| v.as_ref().map_or(0, Bytes::len))
        )?;
        result
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let result = self.storage.size_key(key);
        writeln!(
            self.handle.lock(),
            "{}size_key({key}) -> {result:?}",
            (self.prefix_func)()
        )?;
        result
    }
}

impl<TStorage: ?Sized + ListableStorageTraits> ListableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn list(&self) -> Result<StoreKeys, StorageError> {
        let result = self.storage.list();
        writeln!(
            self.handle.lock(),
            "{}list() -> [{}]",
            (self.prefix_func)(),
            result.as_ref().unwrap_or(&vec![]).iter().format(", ")
        )?;
        result
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let result = self.storage.list_prefix(prefix);
        writeln!(
            self.handle.lock(),
            "{}list_prefix({prefix}) -> [{}]",
            (self.prefix_func)(),
            result.as_ref().unwrap_or(&vec![]).iter().format(", ")
        )?;
        result
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreKeysPrefixes, StorageError> {
        let result = self.storage.list_dir(prefix);
        writeln!(
            self.handle.lock(),
            "{}list_dir({prefix}) -> {}",
            (self.prefix_func)(),
            result.as_ref().map_or_else(
                |err| err.to_string(),
                |keys_prefixes| format!(
                    "(keys:[{}], prefixes:[{}])",
                    keys_prefixes.keys().iter().format(", "),
                    keys_prefixes.prefixes().iter().format(", ")
                )
            )
        )?;
        result
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let len = value.len();
        let result = self.storage.set(key, value);
        writeln!(
            self.handle.lock(),
            "{}set({key}, len={len}) -> {result:?}",
            (self.prefix_func)()
        )?;
        result
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        let result = self.storage.erase(key);
        writeln!(
            self.handle.lock(),
            "{}erase({key}) -> {result:?}",
            (self.prefix_func)()
        )?;
        result
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        let result = self.storage.erase_prefix(prefix);
        writeln!(
            self.handle.lock(),
            "{}erase_prefix({prefix}) -> {result:?}",
            (self.prefix_func)()
        )?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        manifest::{ManifestReference, ReferenceManifest},
        storage::store::ReferenceManifestStore,
    };

    #[test]
    fn usage_log() {
        let mut manifest = ReferenceManifest::new();
        manifest
            .insert("a/.zattrs", ManifestReference::Literal("{}".to_string()))
            .unwrap();
        let store = Arc::new(ReferenceManifestStore::new(manifest));
        let log: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let adapter = UsageLogStorageAdapter::new(store, log.clone(), || "> ".to_string());

        adapter.get(&StoreKey::new("a/.zattrs").unwrap()).unwrap();
        adapter.get(&StoreKey::new("a/missing").unwrap()).unwrap();
        adapter.list_dir(&StorePrefix::root()).unwrap();
        adapter
            .set(&StoreKey::new("a/0").unwrap(), Bytes::from_static(b"xy"))
            .unwrap();

        let log = String::from_utf8(log.lock().clone()).unwrap();
        assert_eq!(
            log,
            "> get(a/.zattrs) -> len=Ok(2)\n\
             > get(a/missing) -> len=Ok(0)\n\
             > list_dir() -> (keys:[], prefixes:[a/])\n\
             > set(a/0, len=2) -> Ok(())\n"
        );
    }
}
