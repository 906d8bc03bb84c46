use derive_more::{Display, From};
use thiserror::Error;

/// A store prefix: a store key path ending with `/`, or the empty root prefix.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, Error, From)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

/// A list of [`StorePrefix`].
pub type StorePrefixes = Vec<StorePrefix>;

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`()].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    pub(crate) fn from_validated(prefix: String) -> Self {
        debug_assert!(Self::validate(&prefix));
        Self(prefix)
    }

    /// Create the prefix of the group or array at `path`.
    ///
    /// Leading and trailing `/` are ignored, so `""`, `"/"`, `"a"` and `"/a/"` are all accepted.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `path` contains an empty path component.
    pub fn from_node_path(path: &str) -> Result<Self, StorePrefixError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            Ok(Self::root())
        } else {
            Self::new(format!("{path}/"))
        }
    }

    /// The root prefix.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice containing the prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    ///
    /// A prefix is empty, or ends with a `/` and has no empty path components.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(|path| !path.is_empty() && path.split('/').all(|c| !c.is_empty()))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, StorePrefixError> {
        Self::new(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid() {
        assert!(StorePrefix::new("").is_ok());
        assert!(StorePrefix::new("a/").is_ok());
        assert!(StorePrefix::new("a/b/").is_ok());
        assert_eq!(StorePrefix::try_from("a/").unwrap().to_string(), "a/");
    }

    #[test]
    fn invalid() {
        assert!(StorePrefix::new("a").is_err());
        assert!(StorePrefix::new("/a/").is_err());
        assert!(StorePrefix::new("a//").is_err());
        assert_eq!(
            StorePrefix::new("a/b").unwrap_err().to_string(),
            "invalid store prefix a/b"
        );
    }

    #[test]
    fn node_path() {
        assert_eq!(StorePrefix::from_node_path("/").unwrap(), StorePrefix::root());
        assert_eq!(
            StorePrefix::from_node_path("/a/b").unwrap(),
            StorePrefix::new("a/b/").unwrap()
        );
        assert!(StorePrefix::from_node_path("a//b").is_err());
    }
}
