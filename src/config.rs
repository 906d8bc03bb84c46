//! Global configuration options.

use std::{sync::OnceLock, time::Duration};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the lindi crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
/// These are defaults only: [`RemoteReaderOptions`](crate::remote::RemoteReaderOptions) and [`TranslatorOptions`](crate::translator::TranslatorOptions) are seeded from the global config when created, and can be changed per instance.
///
/// # Remote Configuration Options
/// ## Remote Max Attempts
/// > default: `8`
///
/// The maximum number of attempts for a single remote byte range fetch before the last failure is surfaced.
///
/// ## Remote Initial Backoff
/// > default: `100ms`
///
/// The delay after the first failed attempt. The delay doubles after every subsequent failure.
///
/// ## Remote Request Timeout
/// > default: `60s`
///
/// The time limit for an individual HTTP request.
///
/// ## Remote Min Chunk Size
/// > default: `100 KiB`
///
/// The base unit of remote reads. Remote files are fetched and cached in multiples of this size.
///
/// ## Remote Max Chunk Size
/// > default: `100 MiB`
///
/// The maximum number of bytes fetched ahead in a single request during a sequential scan.
///
/// ## Remote Chunk Increment Factor
/// > default: `1.7`
///
/// The geometric factor applied to the prefetch run length on sequential reads (and divided out on random reads).
///
/// ## Remote Max Cache Num Chunks
/// > default: `1000`
///
/// The number of base units retained in memory per remote file. The oldest half is evicted when exceeded.
///
/// ## Resolved URL TTL
/// > default: `5min`
///
/// How long a resolved (signed) URL is reused before it is resolved again.
///
/// # Translation Configuration Options
/// ## Num Dataset Chunks Threshold
/// > default: `Some(1000)`
///
/// Datasets with more chunks than this are written as an external array link instead of enumerating every chunk.
///
/// ## Contiguous Dataset Max Chunk Size
/// > default: `Some(20_000_000)`
///
/// Contiguous (unchunked) datasets larger than this many bytes are split into chunks of at most this size along the first dimension.
#[derive(Debug, Clone)]
pub struct Config {
    remote_max_attempts: u32,
    remote_initial_backoff: Duration,
    remote_request_timeout: Duration,
    remote_min_chunk_size: u64,
    remote_max_chunk_size: u64,
    remote_chunk_increment_factor: f64,
    remote_max_cache_num_chunks: usize,
    resolved_url_ttl: Duration,
    num_dataset_chunks_threshold: Option<u64>,
    contiguous_dataset_max_chunk_size: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote_max_attempts: 8,
            remote_initial_backoff: Duration::from_millis(100),
            remote_request_timeout: Duration::from_secs(60),
            remote_min_chunk_size: 100 * 1024,
            remote_max_chunk_size: 100 * 1024 * 1024,
            remote_chunk_increment_factor: 1.7,
            remote_max_cache_num_chunks: 1000,
            resolved_url_ttl: Duration::from_secs(5 * 60),
            num_dataset_chunks_threshold: Some(1000),
            contiguous_dataset_max_chunk_size: Some(20_000_000),
        }
    }
}

impl Config {
    /// Get the [remote max attempts](#remote-max-attempts) configuration.
    #[must_use]
    pub fn remote_max_attempts(&self) -> u32 {
        self.remote_max_attempts
    }

    /// Set the [remote max attempts](#remote-max-attempts) configuration.
    pub fn set_remote_max_attempts(&mut self, max_attempts: u32) {
        self.remote_max_attempts = max_attempts;
    }

    /// Get the [remote initial backoff](#remote-initial-backoff) configuration.
    #[must_use]
    pub fn remote_initial_backoff(&self) -> Duration {
        self.remote_initial_backoff
    }

    /// Set the [remote initial backoff](#remote-initial-backoff) configuration.
    pub fn set_remote_initial_backoff(&mut self, initial_backoff: Duration) {
        self.remote_initial_backoff = initial_backoff;
    }

    /// Get the [remote request timeout](#remote-request-timeout) configuration.
    #[must_use]
    pub fn remote_request_timeout(&self) -> Duration {
        self.remote_request_timeout
    }

    /// Set the [remote request timeout](#remote-request-timeout) configuration.
    pub fn set_remote_request_timeout(&mut self, request_timeout: Duration) {
        self.remote_request_timeout = request_timeout;
    }

    /// Get the [remote min chunk size](#remote-min-chunk-size) configuration.
    #[must_use]
    pub fn remote_min_chunk_size(&self) -> u64 {
        self.remote_min_chunk_size
    }

    /// Set the [remote min chunk size](#remote-min-chunk-size) configuration.
    pub fn set_remote_min_chunk_size(&mut self, min_chunk_size: u64) {
        self.remote_min_chunk_size = min_chunk_size;
    }

    /// Get the [remote max chunk size](#remote-max-chunk-size) configuration.
    #[must_use]
    pub fn remote_max_chunk_size(&self) -> u64 {
        self.remote_max_chunk_size
    }

    /// Set the [remote max chunk size](#remote-max-chunk-size) configuration.
    pub fn set_remote_max_chunk_size(&mut self, max_chunk_size: u64) {
        self.remote_max_chunk_size = max_chunk_size;
    }

    /// Get the [remote chunk increment factor](#remote-chunk-increment-factor) configuration.
    #[must_use]
    pub fn remote_chunk_increment_factor(&self) -> f64 {
        self.remote_chunk_increment_factor
    }

    /// Set the [remote chunk increment factor](#remote-chunk-increment-factor) configuration.
    pub fn set_remote_chunk_increment_factor(&mut self, chunk_increment_factor: f64) {
        self.remote_chunk_increment_factor = chunk_increment_factor;
    }

    /// Get the [remote max cache num chunks](#remote-max-cache-num-chunks) configuration.
    #[must_use]
    pub fn remote_max_cache_num_chunks(&self) -> usize {
        self.remote_max_cache_num_chunks
    }

    /// Set the [remote max cache num chunks](#remote-max-cache-num-chunks) configuration.
    pub fn set_remote_max_cache_num_chunks(&mut self, max_cache_num_chunks: usize) {
        self.remote_max_cache_num_chunks = max_cache_num_chunks;
    }

    /// Get the [resolved URL TTL](#resolved-url-ttl) configuration.
    #[must_use]
    pub fn resolved_url_ttl(&self) -> Duration {
        self.resolved_url_ttl
    }

    /// Set the [resolved URL TTL](#resolved-url-ttl) configuration.
    pub fn set_resolved_url_ttl(&mut self, ttl: Duration) {
        self.resolved_url_ttl = ttl;
    }

    /// Get the [num dataset chunks threshold](#num-dataset-chunks-threshold) configuration.
    #[must_use]
    pub fn num_dataset_chunks_threshold(&self) -> Option<u64> {
        self.num_dataset_chunks_threshold
    }

    /// Set the [num dataset chunks threshold](#num-dataset-chunks-threshold) configuration.
    pub fn set_num_dataset_chunks_threshold(&mut self, threshold: Option<u64>) {
        self.num_dataset_chunks_threshold = threshold;
    }

    /// Get the [contiguous dataset max chunk size](#contiguous-dataset-max-chunk-size) configuration.
    #[must_use]
    pub fn contiguous_dataset_max_chunk_size(&self) -> Option<u64> {
        self.contiguous_dataset_max_chunk_size
    }

    /// Set the [contiguous dataset max chunk size](#contiguous-dataset-max-chunk-size) configuration.
    pub fn set_contiguous_dataset_max_chunk_size(&mut self, max_chunk_size: Option<u64>) {
        self.contiguous_dataset_max_chunk_size = max_chunk_size;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global lindi configuration.
///
/// Might deadlock if the global config is already mutably held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global lindi configuration.
///
/// Might deadlock if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write()
}
