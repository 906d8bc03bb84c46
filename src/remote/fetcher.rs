use thiserror::Error;

use crate::{byte_range::ByteRange, storage::Bytes};

/// A failed attempt to fetch bytes from a remote location.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server responded with an unexpected status code.
    #[error("http status {status} for {url}")]
    Status {
        /// The status code.
        status: u16,
        /// The requested URL.
        url: String,
    },
    /// The request did not complete.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response did not have the requested length.
    #[error("expected {expected} bytes, received {received}")]
    InvalidLength {
        /// The requested length.
        expected: u64,
        /// The received length.
        received: u64,
    },
    /// The URL could not be resolved.
    #[error("failed to resolve url: {0}")]
    Resolve(String),
}

impl FetchError {
    /// Returns true if the attempt may succeed when repeated.
    ///
    /// Transport failures, truncated responses, server errors, timeouts, rate limiting and expired credentials are retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                (500..=599).contains(status) || matches!(status, 408 | 429) || self.is_auth()
            }
            Self::Transport(_) | Self::InvalidLength { .. } | Self::Resolve(_) => true,
        }
    }

    /// Returns true if the attempt was rejected for authentication reasons.
    ///
    /// The resolved URL is likely expired and should be resolved again.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// Returns true if the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Fetches byte ranges of remote resources.
///
/// Implementations perform a single attempt. Retries, URL resolution and caching are the responsibility of the [`RemoteReader`](super::RemoteReader).
pub trait RangeFetcher: Send + Sync {
    /// Fetch `byte_range` of the resource at `url`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] if the attempt fails.
    fn fetch(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, FetchError>;

    /// Return the size in bytes of the resource at `url`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] if the attempt fails.
    fn size(&self, url: &str) -> Result<u64, FetchError>;
}

#[cfg(feature = "http")]
mod http {
    use std::{str::FromStr, time::Duration};

    use reqwest::{
        header::{HeaderValue, CONTENT_LENGTH, RANGE},
        StatusCode,
    };

    use super::{FetchError, RangeFetcher};
    use crate::{byte_range::ByteRange, remote::RemoteError, storage::Bytes};

    #[allow(clippy::needless_pass_by_value)]
    fn handle_reqwest_error(err: reqwest::Error) -> FetchError {
        FetchError::Transport(err.to_string())
    }

    /// A blocking HTTP range fetcher.
    #[derive(Debug, Clone)]
    pub struct HttpRangeFetcher {
        client: reqwest::blocking::Client,
    }

    impl HttpRangeFetcher {
        /// Create a new HTTP range fetcher. Each request is bounded by `timeout`.
        ///
        /// # Errors
        /// Returns [`RemoteError::Client`] if the HTTP client cannot be created.
        pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| RemoteError::Client(err.to_string()))?;
            Ok(Self { client })
        }
    }

    impl RangeFetcher for HttpRangeFetcher {
        fn fetch(&self, url: &str, byte_range: ByteRange) -> Result<Bytes, FetchError> {
            if byte_range.length == 0 {
                return Ok(Bytes::new());
            }
            let range = HeaderValue::from_str(&format!(
                "bytes={}-{}",
                byte_range.offset,
                byte_range.end() - 1
            ))
            .map_err(|err| FetchError::Transport(err.to_string()))?;
            let response = self
                .client
                .get(url)
                .header(RANGE, range)
                .send()
                .map_err(handle_reqwest_error)?;
            match response.status() {
                StatusCode::PARTIAL_CONTENT => response.bytes().map_err(handle_reqwest_error),
                StatusCode::OK => {
                    // The server ignored the range header and returned the entire resource
                    let bytes = response.bytes().map_err(handle_reqwest_error)?;
                    let invalid_length = || FetchError::InvalidLength {
                        expected: byte_range.end(),
                        received: bytes.len() as u64,
                    };
                    if !byte_range.fits(bytes.len() as u64) {
                        return Err(invalid_length());
                    }
                    let range = byte_range.to_range_usize().map_err(|_| invalid_length())?;
                    Ok(bytes.slice(range))
                }
                status => Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                }),
            }
        }

        fn size(&self, url: &str) -> Result<u64, FetchError> {
            let response = self.client.head(url).send().map_err(handle_reqwest_error)?;
            match response.status() {
                StatusCode::OK => response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|header_value| header_value.to_str().ok())
                    .and_then(|header_str| u64::from_str(header_str).ok())
                    .ok_or_else(|| {
                        FetchError::Transport("content length response is invalid".to_string())
                    }),
                status => Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                }),
            }
        }
    }
}

#[cfg(feature = "http")]
pub use http::HttpRangeFetcher;
