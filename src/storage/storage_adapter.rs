//! Storage adapters.
//!
//! An adapter wraps a store and implements the same storage traits.

mod usage_log;

pub use usage_log::UsageLogStorageAdapter;
