use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::RemoteError;

/// A hook that rewrites a URL before it is resolved, or returns [`None`] to leave it unchanged.
pub type UrlRewriteHook = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Exchanges a URL for the URL that should actually be fetched, such as a short-lived signed URL.
pub trait ResolveUrl: Send + Sync {
    /// Resolve `url`, or return [`None`] if this resolver does not apply to it.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] if resolution fails.
    fn resolve(&self, url: &str) -> Result<Option<String>, RemoteError>;
}

/// Resolves URLs through a chain of rewrite hooks and an optional [`ResolveUrl`], caching results for a fixed time.
///
/// The cache is keyed by the original URL and is safe for concurrent use.
/// Expired entries are resolved again on next use, and [`UrlResolver::invalidate`] drops an entry early (e.g. after an authentication failure).
pub struct UrlResolver {
    hooks: Vec<UrlRewriteHook>,
    resolver: Option<Arc<dyn ResolveUrl>>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl std::fmt::Debug for UrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlResolver")
            .field("hooks", &self.hooks.len())
            .field("resolver", &self.resolver.is_some())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UrlResolver {
    /// Create a URL resolver with no hooks or resolver, caching for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            hooks: Vec::new(),
            resolver: None,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Append a rewrite hook. Hooks run in insertion order before the resolver.
    #[must_use]
    pub fn with_hook(mut self, hook: UrlRewriteHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ResolveUrl>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Resolve `url`.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] if the resolver fails.
    pub fn resolve(&self, url: &str) -> Result<String, RemoteError> {
        if self.hooks.is_empty() && self.resolver.is_none() {
            return Ok(url.to_string());
        }
        if let Some((resolved, resolved_at)) = self.cache.lock().get(url) {
            if resolved_at.elapsed() < self.ttl {
                return Ok(resolved.clone());
            }
        }

        let mut resolved = url.to_string();
        for hook in &self.hooks {
            if let Some(rewritten) = hook(&resolved) {
                resolved = rewritten;
            }
        }
        if let Some(resolver) = &self.resolver {
            if let Some(signed) = resolver.resolve(&resolved)? {
                resolved = signed;
            }
        }
        log::debug!("resolved {url} to {resolved}");
        self.cache
            .lock()
            .insert(url.to_string(), (resolved.clone(), Instant::now()));
        Ok(resolved)
    }

    /// Drop the cached resolution of `url`.
    pub fn invalidate(&self, url: &str) {
        self.cache.lock().remove(url);
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new(crate::config::global_config().resolved_url_ttl())
    }
}

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use reqwest::{header::LOCATION, redirect::Policy};

    use super::{ResolveUrl, RemoteError};

    /// Resolves URLs on matching hosts to the target of the redirect they respond with.
    ///
    /// This suits APIs that redirect a stable download URL to a short-lived signed URL.
    /// An `Authorization: token <token>` header is sent if a token is set.
    #[derive(Debug, Clone)]
    pub struct HttpRedirectResolver {
        client: reqwest::blocking::Client,
        hosts: Vec<String>,
        token: Option<String>,
    }

    impl HttpRedirectResolver {
        /// Create a redirect resolver for URLs on `hosts`.
        ///
        /// # Errors
        /// Returns [`RemoteError::Client`] if the HTTP client cannot be created.
        pub fn new(hosts: Vec<String>, timeout: Duration) -> Result<Self, RemoteError> {
            let client = reqwest::blocking::Client::builder()
                .redirect(Policy::none())
                .timeout(timeout)
                .build()
                .map_err(|err| RemoteError::Client(err.to_string()))?;
            Ok(Self {
                client,
                hosts,
                token: None,
            })
        }

        /// Set the authorization token.
        #[must_use]
        pub fn with_token(mut self, token: Option<String>) -> Self {
            self.token = token;
            self
        }
    }

    impl ResolveUrl for HttpRedirectResolver {
        fn resolve(&self, url: &str) -> Result<Option<String>, RemoteError> {
            let parsed =
                reqwest::Url::parse(url).map_err(|err| RemoteError::Resolve(err.to_string()))?;
            let Some(host) = parsed.host_str() else {
                return Ok(None);
            };
            if !self.hosts.iter().any(|h| h == host) {
                return Ok(None);
            }
            let mut request = self.client.head(parsed);
            if let Some(token) = &self.token {
                request = request.header(reqwest::header::AUTHORIZATION, format!("token {token}"));
            }
            let response = request
                .send()
                .map_err(|err| RemoteError::Resolve(err.to_string()))?;
            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|location| location.to_str().ok())
                    .ok_or_else(|| {
                        RemoteError::Resolve(format!("redirect from {url} has no location"))
                    })?;
                Ok(Some(location.to_string()))
            } else if response.status().is_success() {
                Ok(None)
            } else {
                Err(RemoteError::Resolve(format!(
                    "resolving {url} failed with status {}",
                    response.status()
                )))
            }
        }
    }
}

#[cfg(feature = "http")]
pub use http::HttpRedirectResolver;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingResolver(AtomicUsize);

    impl ResolveUrl for CountingResolver {
        fn resolve(&self, url: &str) -> Result<Option<String>, RemoteError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("{url}?sig={n}")))
        }
    }

    #[test]
    fn resolver_caches_and_invalidates() {
        let counter = Arc::new(CountingResolver(AtomicUsize::new(0)));
        let resolver = UrlResolver::new(Duration::from_secs(60)).with_resolver(counter.clone());
        assert_eq!(resolver.resolve("https://a/f").unwrap(), "https://a/f?sig=0");
        assert_eq!(resolver.resolve("https://a/f").unwrap(), "https://a/f?sig=0");
        resolver.invalidate("https://a/f");
        assert_eq!(resolver.resolve("https://a/f").unwrap(), "https://a/f?sig=1");
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolver_ttl_expiry() {
        let counter = Arc::new(CountingResolver(AtomicUsize::new(0)));
        let resolver = UrlResolver::new(Duration::ZERO).with_resolver(counter.clone());
        resolver.resolve("https://a/f").unwrap();
        resolver.resolve("https://a/f").unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hooks_run_before_resolver() {
        let resolver = UrlResolver::new(Duration::from_secs(60))
            .with_hook(Arc::new(|url: &str| {
                url.strip_prefix("s3://bucket/")
                    .map(|path| format!("https://bucket.s3.amazonaws.com/{path}"))
            }))
            .with_resolver(Arc::new(CountingResolver(AtomicUsize::new(0))));
        assert_eq!(
            resolver.resolve("s3://bucket/f.h5").unwrap(),
            "https://bucket.s3.amazonaws.com/f.h5?sig=0"
        );
        assert_eq!(resolver.resolve("https://x/y").unwrap(), "https://x/y?sig=1");
    }
}
