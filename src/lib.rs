//! Reference file systems for chunked hierarchical array files.
//!
//! `lindi` exposes the datasets of a chunked hierarchical file (such as HDF5) as a [Zarr V2](https://zarr.dev) hierarchy without copying the chunk data.
//! A [`ReferenceManifest`](manifest::ReferenceManifest) maps every Zarr key to inline content or to a byte range of the source file, a local file, or a blob in a container.
//!
//! ## Getting Started
//! - [`translator`] decides how each source dataset is represented and builds a manifest.
//! - [`storage::store::ReferenceManifestStore`] serves the keys of a manifest through the [`storage`] traits.
//! - [`container`] holds a manifest and its blobs in a single growable tar file, or in a directory.
//! - [`remote`] reads byte ranges of remote files with retries, adaptive read-ahead and an optional persistent cache.
//!
//! ## Example
//! ```rust
//! # use lindi::{manifest::{ReferenceManifest, ManifestReference}, storage::{ReadableStorageTraits, StoreKey, store::ReferenceManifestStore}};
//! let mut manifest = ReferenceManifest::new();
//! manifest.insert(".zgroup", ManifestReference::inline_json(&serde_json::json!({"zarr_format": 2}))?)?;
//! manifest.insert("x/0", ManifestReference::from_bytes(&[1, 2, 3]))?;
//!
//! let store = ReferenceManifestStore::new(manifest);
//! let chunk = store.get(&StoreKey::new("x/0")?)?;
//! assert_eq!(chunk.as_deref(), Some([1u8, 2, 3].as_slice()));
//! assert!(store.get(&StoreKey::new("x/1")?)?.is_none());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `http`: fetch remote byte ranges with [`reqwest`](https://docs.rs/reqwest), and resolve redirecting URLs.
//!  - `local-cache`: persist fetched remote chunks in a [SQLite](https://docs.rs/rusqlite) database.
//!
//! ## Licence
//! `lindi` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod byte_range;
pub mod config;
pub mod container;
pub mod manifest;
pub mod metadata;
pub mod remote;
pub mod storage;
pub mod translator;
