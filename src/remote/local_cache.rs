//! A persistent cache of remote byte ranges backed by SQLite.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::storage::Bytes;

/// The file name of the cache database within the cache directory.
pub const LOCAL_CACHE_FILE_NAME: &str = "lindi_cache.db";

/// The default maximum entry size. Entries of this size or larger are rejected.
pub const LOCAL_CACHE_MAX_CHUNK_SIZE: u64 = 900 * 1000 * 1000;

/// A [`LocalCache`] error.
#[derive(Debug, Error)]
pub enum LocalCacheError {
    /// The entry is too large to be cached.
    ///
    /// Callers should skip caching rather than fail the read.
    #[error("cannot cache {size} bytes, the maximum is {max}")]
    ChunkTooLarge {
        /// The size of the entry.
        size: u64,
        /// The exclusive maximum size.
        max: u64,
    },
    /// The data does not have the declared size.
    #[error("data length {length} does not match the declared size {size}")]
    SizeMismatch {
        /// The declared size.
        size: u64,
        /// The length of the data.
        length: u64,
    },
    /// A database error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// A persistent cache of remote byte ranges keyed by `(url, offset, size)`.
///
/// Entries are immutable: storing an existing key is a no-op.
/// The cache is not safe for concurrent writers in separate processes.
#[derive(Debug)]
pub struct LocalCache {
    connection: parking_lot::Mutex<Connection>,
    max_chunk_size: u64,
}

impl LocalCache {
    /// Open or create a cache in `directory`.
    ///
    /// # Errors
    /// Returns a [`LocalCacheError`] if the directory or database cannot be created.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, LocalCacheError> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        Self::with_connection(Connection::open(directory.join(LOCAL_CACHE_FILE_NAME))?)
    }

    /// Create a cache held in memory for the lifetime of the returned value.
    ///
    /// # Errors
    /// Returns a [`LocalCacheError`] if the database cannot be created.
    pub fn in_memory() -> Result<Self, LocalCacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, LocalCacheError> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS remote_chunks (
                url TEXT NOT NULL,
                offset INTEGER NOT NULL,
                size INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (url, offset, size)
            )",
            [],
        )?;
        Ok(Self {
            connection: parking_lot::Mutex::new(connection),
            max_chunk_size: LOCAL_CACHE_MAX_CHUNK_SIZE,
        })
    }

    /// Set the exclusive maximum entry size. Defaults to [`LOCAL_CACHE_MAX_CHUNK_SIZE`].
    #[must_use]
    pub fn with_max_chunk_size(mut self, max_chunk_size: u64) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Return the number of cached entries.
    ///
    /// # Errors
    /// Returns a [`LocalCacheError`] if the query fails.
    pub fn num_entries(&self) -> Result<u64, LocalCacheError> {
        let count: i64 = self.connection.lock().query_row(
            "SELECT COUNT(*) FROM remote_chunks",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Return the cached bytes for `(url, offset, size)`, if present.
    ///
    /// # Errors
    /// Returns a [`LocalCacheError`] if the lookup fails.
    pub fn get(
        &self,
        url: &str,
        offset: u64,
        size: u64,
    ) -> Result<Option<Bytes>, LocalCacheError> {
        let (offset, size) = (to_sql_integer(offset)?, to_sql_integer(size)?);
        let data: Option<Vec<u8>> = self
            .connection
            .lock()
            .query_row(
                "SELECT data FROM remote_chunks WHERE url = ?1 AND offset = ?2 AND size = ?3",
                params![url, offset, size],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(Bytes::from))
    }

    /// Store `data` for `(url, offset, size)`.
    ///
    /// # Errors
    /// Returns [`LocalCacheError::ChunkTooLarge`] if `size` is at least the maximum entry size, [`LocalCacheError::SizeMismatch`] if `data` is not `size` bytes long, or a database error.
    pub fn put(
        &self,
        url: &str,
        offset: u64,
        size: u64,
        data: &[u8],
    ) -> Result<(), LocalCacheError> {
        if size >= self.max_chunk_size {
            return Err(LocalCacheError::ChunkTooLarge {
                size,
                max: self.max_chunk_size,
            });
        }
        if data.len() as u64 != size {
            return Err(LocalCacheError::SizeMismatch {
                size,
                length: data.len() as u64,
            });
        }
        self.connection.lock().execute(
            "INSERT OR IGNORE INTO remote_chunks (url, offset, size, data) VALUES (?1, ?2, ?3, ?4)",
            params![url, to_sql_integer(offset)?, to_sql_integer(size)?, data],
        )?;
        Ok(())
    }
}

fn to_sql_integer(value: u64) -> Result<i64, LocalCacheError> {
    i64::try_from(value).map_err(|_| {
        LocalCacheError::Sqlite(rusqlite::Error::ToSqlConversionFailure(
            format!("{value} exceeds the maximum sqlite integer").into(),
        ))
    })
}
