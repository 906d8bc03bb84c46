//! Stores.
//!
//! The [`ReferenceManifestStore`] serves the keys of a reference manifest.

mod reference_manifest_store;

pub use reference_manifest_store::ReferenceManifestStore;
