//! Remote byte range reading.
//!
//! A [`RemoteReader`] reads byte ranges of remote resources through
//!  - a [`UrlResolver`], which exchanges URLs for the URLs actually fetched (e.g. short-lived signed URLs),
//!  - a [`RetryPolicy`], which retries transient failures with exponential backoff,
//!  - and the adaptive prefetch of each [`RemoteFile`], which caches units of the file either in memory or in the persistent [`LocalCache`] (if enabled).
//!
//! Bytes are fetched with a [`RangeFetcher`]. [`HttpRangeFetcher`] fetches over HTTP with `reqwest`.

mod fetcher;
#[cfg(feature = "local-cache")]
mod local_cache;
mod remote_file;
mod retry;
mod url_resolver;

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    config::global_config,
    storage::Bytes,
};

#[cfg(feature = "http")]
pub use fetcher::HttpRangeFetcher;
pub use fetcher::{FetchError, RangeFetcher};
#[cfg(feature = "local-cache")]
pub use local_cache::{
    LocalCache, LocalCacheError, LOCAL_CACHE_FILE_NAME, LOCAL_CACHE_MAX_CHUNK_SIZE,
};
pub use remote_file::RemoteFile;
pub use retry::RetryPolicy;
#[cfg(feature = "http")]
pub use url_resolver::HttpRedirectResolver;
pub use url_resolver::{ResolveUrl, UrlResolver, UrlRewriteHook};

/// A remote reading error.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Every attempt failed. Holds the last failure.
    #[error("failed to read {url} after {attempts} attempts")]
    RetriesExhausted {
        /// The requested URL.
        url: String,
        /// The number of attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        source: FetchError,
    },
    /// The resource does not exist.
    #[error("remote resource {0} not found")]
    NotFound(String),
    /// The request failed permanently.
    #[error("invalid response for {url}")]
    InvalidResponse {
        /// The requested URL.
        url: String,
        /// The failure.
        #[source]
        source: FetchError,
    },
    /// URL resolution failed permanently.
    #[error("failed to resolve url: {0}")]
    Resolve(String),
    /// The HTTP client could not be created.
    #[error("failed to create client: {0}")]
    Client(String),
    /// The requested byte range is outside of the resource.
    #[error(transparent)]
    InvalidByteRange(#[from] InvalidByteRangeError),
    /// A persistent cache error.
    #[cfg(feature = "local-cache")]
    #[error(transparent)]
    Cache(#[from] LocalCacheError),
}

/// Options for a [`RemoteReader`].
///
/// The defaults are taken from the [global config](crate::config::global_config).
#[derive(Debug, Clone)]
pub struct RemoteReaderOptions {
    /// The maximum number of attempts per fetch.
    pub max_attempts: u32,
    /// The delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// The time limit for an individual request.
    pub request_timeout: Duration,
    /// The base unit of reads and of the cache keys, in bytes.
    pub min_chunk_size: u64,
    /// The maximum number of bytes fetched in a single request during sequential reads.
    pub max_chunk_size: u64,
    /// The geometric factor applied to the prefetch run length.
    pub chunk_increment_factor: f64,
    /// The number of base units kept in memory per file.
    pub max_cache_num_chunks: usize,
}

impl Default for RemoteReaderOptions {
    fn default() -> Self {
        let config = global_config();
        Self {
            max_attempts: config.remote_max_attempts(),
            initial_backoff: config.remote_initial_backoff(),
            request_timeout: config.remote_request_timeout(),
            min_chunk_size: config.remote_min_chunk_size(),
            max_chunk_size: config.remote_max_chunk_size(),
            chunk_increment_factor: config.remote_chunk_increment_factor(),
            max_cache_num_chunks: config.remote_max_cache_num_chunks(),
        }
    }
}

/// Reads byte ranges of remote resources with URL resolution, retries and caching.
///
/// A reader can be shared between threads. Reads of the same file are serialised through that file's prefetch state.
pub struct RemoteReader {
    fetcher: Arc<dyn RangeFetcher>,
    options: RemoteReaderOptions,
    retry: RetryPolicy,
    resolver: Arc<UrlResolver>,
    #[cfg(feature = "local-cache")]
    local_cache: Option<Arc<LocalCache>>,
    files: Mutex<HashMap<String, Arc<Mutex<RemoteFile>>>>,
}

impl std::fmt::Debug for RemoteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteReader")
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl RemoteReader {
    /// Create a new remote reader fetching with `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn RangeFetcher>, options: RemoteReaderOptions) -> Self {
        let retry = RetryPolicy::new(options.max_attempts, options.initial_backoff);
        Self {
            fetcher,
            options,
            retry,
            resolver: Arc::new(UrlResolver::default()),
            #[cfg(feature = "local-cache")]
            local_cache: None,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new remote reader fetching over HTTP.
    ///
    /// # Errors
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be created.
    #[cfg(feature = "http")]
    pub fn new_http(options: RemoteReaderOptions) -> Result<Self, RemoteError> {
        let fetcher = HttpRangeFetcher::new(options.request_timeout)?;
        Ok(Self::new(Arc::new(fetcher), options))
    }

    /// Set the URL resolver. A resolver may be shared between readers.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<UrlResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set a persistent cache, which replaces the in-memory unit cache of every file read afterwards.
    #[cfg(feature = "local-cache")]
    #[must_use]
    pub fn with_local_cache(mut self, local_cache: Arc<LocalCache>) -> Self {
        self.local_cache = Some(local_cache);
        self
    }

    /// Return the options.
    #[must_use]
    pub fn options(&self) -> &RemoteReaderOptions {
        &self.options
    }

    /// Return the size in bytes of the resource at `url`.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] if the size cannot be retrieved.
    pub fn size(&self, url: &str) -> Result<u64, RemoteError> {
        self.retry.run(url, || {
            let resolved = self.resolve(url)?;
            self.fetcher.size(&resolved).inspect_err(|err| {
                if err.is_auth() {
                    self.resolver.invalidate(url);
                }
            })
        })
    }

    /// Read `byte_range` of the resource at `url`.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] if the read fails after exhausting retries, or the byte range is outside of the resource.
    pub fn read(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, RemoteError> {
        let file = self.file(url)?;
        let mut file = file.lock();
        file.read(byte_range, &mut |range| self.fetch_exact(url, range))
    }

    fn file(&self, url: &str) -> Result<Arc<Mutex<RemoteFile>>, RemoteError> {
        if let Some(file) = self.files.lock().get(url) {
            return Ok(file.clone());
        }
        let size = self.size(url)?;
        let file = self
            .files
            .lock()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.new_file(url, size))))
            .clone();
        Ok(file)
    }

    fn new_file(&self, url: &str, size: u64) -> RemoteFile {
        let file = RemoteFile::new(size, &self.options);
        #[cfg(feature = "local-cache")]
        if let Some(local_cache) = &self.local_cache {
            return file.with_local_cache(url, local_cache.clone());
        }
        #[cfg(not(feature = "local-cache"))]
        let _ = url;
        file
    }

    fn resolve(&self, url: &str) -> Result<String, FetchError> {
        self.resolver
            .resolve(url)
            .map_err(|err| FetchError::Resolve(err.to_string()))
    }

    /// Fetch exactly `byte_range` of `url`, bypassing every cache.
    fn fetch_exact(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, RemoteError> {
        log::debug!("fetching {byte_range} of {url}");
        self.retry.run(url, || {
            let resolved = self.resolve(url)?;
            let bytes = self.fetcher.fetch(&resolved, byte_range).inspect_err(|err| {
                if err.is_auth() {
                    self.resolver.invalidate(url);
                }
            })?;
            if bytes.len() as u64 == byte_range.length {
                Ok(bytes)
            } else {
                Err(FetchError::InvalidLength {
                    expected: byte_range.length,
                    received: bytes.len() as u64,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Serves an in-memory resource, failing the first `failures` fetches.
    struct MockFetcher {
        data: Vec<u8>,
        failures: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl MockFetcher {
        fn new(size: usize, failures: usize) -> Self {
            Self {
                data: (0..size).map(|i| (i % 256) as u8).collect(),
                failures: AtomicUsize::new(failures),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl RangeFetcher for MockFetcher {
        fn fetch(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
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

    fn options() -> RemoteReaderOptions {
        RemoteReaderOptions {
            initial_backoff: Duration::from_millis(1),
            min_chunk_size: 16,
            max_chunk_size: 256,
            ..RemoteReaderOptions::default()
        }
    }

    #[test]
    fn remote_reader_retries_transient_failures() {
        let fetcher = Arc::new(MockFetcher::new(1000, 2));
        let reader = RemoteReader::new(fetcher.clone(), options());
        let bytes = reader.read("https://a/f", ByteRange::new(100, 10)).unwrap();
        assert_eq!(&bytes[..], &fetcher.data[100..110]);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remote_reader_memory_cache() {
        let fetcher = Arc::new(MockFetcher::new(1000, 0));
        let reader = RemoteReader::new(fetcher.clone(), options());
        reader.read("https://a/f", ByteRange::new(0, 8)).unwrap();
        reader.read("https://a/f", ByteRange::new(2, 4)).unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert!(reader.read("https://a/f", ByteRange::new(995, 10)).is_err());
    }

    #[test]
    fn remote_reader_exhausted() {
        let fetcher = Arc::new(MockFetcher::new(100, usize::MAX));
        let mut options = options();
        options.max_attempts = 3;
        let reader = RemoteReader::new(fetcher, options);
        assert!(matches!(
            reader.read("https://a/f", ByteRange::new(0, 8)),
            Err(RemoteError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[cfg(feature = "local-cache")]
    #[test]
    fn remote_reader_local_cache() {
        let fetcher = Arc::new(MockFetcher::new(1000, 0));
        let cache = Arc::new(LocalCache::in_memory().unwrap());
        let reader = RemoteReader::new(fetcher.clone(), options()).with_local_cache(cache.clone());
        let bytes = reader.read("https://a/f", ByteRange::new(10, 20)).unwrap();
        assert_eq!(&bytes[..], &fetcher.data[10..30]);
        // cached in base units of 16 bytes
        assert_eq!(cache.get("https://a/f", 0, 16).unwrap().unwrap(), &fetcher.data[..16]);
        assert_eq!(cache.get("https://a/f", 16, 16).unwrap().unwrap(), &fetcher.data[16..32]);
        reader.read("https://a/f", ByteRange::new(10, 20)).unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);

        // a new reader sharing the cache does not fetch again
        let reader = RemoteReader::new(fetcher.clone(), options()).with_local_cache(cache);
        reader.read("https://a/f", ByteRange::new(12, 4)).unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "local-cache")]
    #[test]
    fn remote_reader_local_cache_overlapping_reads() {
        let fetcher = Arc::new(MockFetcher::new(1000, 0));
        let cache = Arc::new(LocalCache::in_memory().unwrap());
        let reader = RemoteReader::new(fetcher.clone(), options()).with_local_cache(cache);
        let first = reader.read("https://a/f", ByteRange::new(0, 10)).unwrap();
        let second = reader.read("https://a/f", ByteRange::new(5, 10)).unwrap();
        assert_eq!(&first[..], &fetcher.data[0..10]);
        assert_eq!(&second[..], &fetcher.data[5..15]);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "local-cache")]
    #[test]
    fn remote_reader_local_cache_too_large() {
        let fetcher = Arc::new(MockFetcher::new(1000, 0));
        let cache = Arc::new(LocalCache::in_memory().unwrap().with_max_chunk_size(8));
        let reader = RemoteReader::new(fetcher.clone(), options()).with_local_cache(cache.clone());
        let bytes = reader.read("https://a/f", ByteRange::new(100, 40)).unwrap();
        assert_eq!(&bytes[..], &fetcher.data[100..140]);
        assert_eq!(cache.num_entries().unwrap(), 0);

        // uncached units are fetched again
        reader.read("https://a/f", ByteRange::new(100, 40)).unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }
}
