use std::collections::{HashMap, VecDeque};
#[cfg(feature = "local-cache")]
use std::sync::Arc;

use bytes::BytesMut;

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    storage::Bytes,
};

#[cfg(feature = "local-cache")]
use super::{LocalCache, LocalCacheError};
use super::{RemoteError, RemoteReaderOptions};

/// The adaptive read-ahead state and unit cache of a single remote file.
///
/// Bytes are fetched and cached in units of the minimum chunk size.
/// A read that starts where the previous read ended grows the number of units fetched per request by the increment factor (up to the maximum chunk size).
/// Any other read shrinks it by the same factor (down to one unit).
///
/// Units are held in memory, and when more than the maximum number of units are cached the oldest half is evicted.
/// With a persistent [`LocalCache`], units are stored there instead, keyed by `(url, unit offset, unit length)`.
#[derive(Debug)]
pub struct RemoteFile {
    size: u64,
    unit_size: u64,
    max_run_length: u64,
    increment_factor: f64,
    max_cache_units: usize,
    run_length: u64,
    last_end: Option<u64>,
    units: HashMap<u64, Bytes>,
    insertion_order: VecDeque<u64>,
    #[cfg(feature = "local-cache")]
    local_cache: Option<(String, Arc<LocalCache>)>,
}

impl RemoteFile {
    /// Create the state for a remote file of `size` bytes.
    #[must_use]
    pub fn new(size: u64, options: &RemoteReaderOptions) -> Self {
        let unit_size = options.min_chunk_size.max(1);
        Self {
            size,
            unit_size,
            max_run_length: (options.max_chunk_size / unit_size).max(1),
            increment_factor: options.chunk_increment_factor.max(1.0),
            max_cache_units: options.max_cache_num_chunks.max(1),
            run_length: 1,
            last_end: None,
            units: HashMap::new(),
            insertion_order: VecDeque::new(),
            #[cfg(feature = "local-cache")]
            local_cache: None,
        }
    }

    /// Store the units of the file at `url` in `local_cache` rather than in memory.
    #[cfg(feature = "local-cache")]
    #[must_use]
    pub fn with_local_cache(mut self, url: &str, local_cache: Arc<LocalCache>) -> Self {
        self.local_cache = Some((url.to_string(), local_cache));
        self
    }

    /// The size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The current number of units fetched per request.
    #[must_use]
    pub fn run_length(&self) -> u64 {
        self.run_length
    }

    /// The number of units held in memory.
    #[must_use]
    pub fn num_cached_units(&self) -> usize {
        self.units.len()
    }

    fn num_units(&self) -> u64 {
        self.size.div_ceil(self.unit_size)
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn update_run_length(&mut self, offset: u64) {
        let run_length = self.run_length as f64;
        self.run_length = if self.last_end == Some(offset) {
            ((run_length * self.increment_factor).ceil() as u64).min(self.max_run_length)
        } else {
            ((run_length / self.increment_factor) as u64).max(1)
        };
    }

    /// Read `byte_range`, calling `fetch` for every run of units not cached.
    ///
    /// `fetch` must return exactly the requested bytes.
    ///
    /// # Errors
    /// Returns [`RemoteError::InvalidByteRange`] if the byte range extends beyond the end of the file, or any error returned by `fetch` or the persistent cache.
    pub fn read(
        &mut self,
        byte_range: ByteRange,
        fetch: &mut dyn FnMut(ByteRange) -> Result<Bytes, RemoteError>,
    ) -> Result<Bytes, RemoteError> {
        if !byte_range.fits(self.size) {
            return Err(InvalidByteRangeError::new(byte_range, self.size).into());
        }
        if byte_range.length == 0 {
            return Ok(Bytes::new());
        }

        self.update_run_length(byte_range.offset);
        self.last_end = Some(byte_range.end());

        let first_unit = byte_range.offset / self.unit_size;
        let last_unit = (byte_range.end() - 1) / self.unit_size;
        let mut parts = Vec::new();
        let mut unit = first_unit;
        while unit <= last_unit {
            if let Some(bytes) = self.cached_unit(unit)? {
                parts.push(bytes);
                unit += 1;
                continue;
            }
            let needed = last_unit - unit + 1;
            let count = self.run_length.max(needed).min(self.num_units() - unit);
            let start = unit * self.unit_size;
            let end = ((unit + count) * self.unit_size).min(self.size);
            log::debug!(
                "fetching {count} units ({start}..{end}), run length {}",
                self.run_length
            );
            let mut fetched = fetch(ByteRange::new(start, end - start))?;
            for i in unit..unit + count {
                let unit_bytes = fetched.split_to(fetched.len().min(self.unit_len(i)));
                if i <= last_unit {
                    parts.push(unit_bytes.clone());
                }
                self.cache_unit(i, unit_bytes)?;
            }
            unit += count;
        }

        let out = self.assemble(byte_range, first_unit, &parts);
        self.evict();
        Ok(out)
    }

    fn cached_unit(&self, unit: u64) -> Result<Option<Bytes>, RemoteError> {
        #[cfg(feature = "local-cache")]
        if let Some((url, local_cache)) = &self.local_cache {
            let start = unit * self.unit_size;
            return Ok(local_cache.get(url, start, self.unit_len(unit) as u64)?);
        }
        Ok(self.units.get(&unit).cloned())
    }

    fn cache_unit(&mut self, unit: u64, bytes: Bytes) -> Result<(), RemoteError> {
        #[cfg(feature = "local-cache")]
        if let Some((url, local_cache)) = &self.local_cache {
            let start = unit * self.unit_size;
            return match local_cache.put(url, start, bytes.len() as u64, &bytes) {
                Ok(()) => Ok(()),
                Err(LocalCacheError::ChunkTooLarge { size, max }) => {
                    log::warn!("not caching {size} bytes of {url}, the maximum is {max}");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            };
        }
        if !self.units.contains_key(&unit) {
            self.units.insert(unit, bytes);
            self.insertion_order.push_back(unit);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn unit_len(&self, unit: u64) -> usize {
        let start = unit * self.unit_size;
        ((start + self.unit_size).min(self.size) - start) as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn assemble(&self, byte_range: ByteRange, first_unit: u64, parts: &[Bytes]) -> Bytes {
        let start_in_first = (byte_range.offset - first_unit * self.unit_size) as usize;
        let length = byte_range.length as usize;
        if let [unit] = parts {
            return unit.slice(start_in_first..start_in_first + length);
        }
        let mut out = BytesMut::with_capacity(length);
        for (i, bytes) in parts.iter().enumerate() {
            let from = if i == 0 { start_in_first } else { 0 };
            let to = bytes.len().min(from + length - out.len());
            out.extend_from_slice(&bytes[from..to]);
        }
        out.freeze()
    }

    fn evict(&mut self) {
        if self.units.len() <= self.max_cache_units {
            return;
        }
        let num_evict = self.units.len() / 2;
        for _ in 0..num_evict {
            if let Some(unit) = self.insertion_order.pop_front() {
                self.units.remove(&unit);
            }
        }
        log::debug!("evicted {num_evict} cached units");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(min_chunk_size: u64, max_chunk_size: u64, max_cache: usize) -> RemoteReaderOptions {
        let mut options = RemoteReaderOptions::default();
        options.min_chunk_size = min_chunk_size;
        options.max_chunk_size = max_chunk_size;
        options.max_cache_num_chunks = max_cache;
        options
    }

    fn data(size: u64) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn sequential_reads_grow_run_length() {
        let source = data(10_000);
        let mut file = RemoteFile::new(10_000, &options(100, 1_000, 1_000));
        let mut requests = Vec::new();
        let mut fetch = |range: ByteRange| {
            requests.push(range);
            Ok(Bytes::copy_from_slice(&source[range.to_range_usize().unwrap()]))
        };
        let mut offset = 0;
        for _ in 0..10 {
            let bytes = file.read(ByteRange::new(offset, 50), &mut fetch).unwrap();
            assert_eq!(&bytes[..], &source[offset as usize..offset as usize + 50]);
            offset += 50;
        }
        drop(fetch);
        // 1 unit, then ceil(1.7) = 2 units, then ceil(3.4) = 4 units...
        assert_eq!(requests[0], ByteRange::new(0, 100));
        assert!(requests.len() < 10);
        assert!(file.run_length() > 1);
        assert!(file.run_length() <= 10);
    }

    #[test]
    fn random_reads_shrink_run_length() {
        let source = data(100_000);
        let mut file = RemoteFile::new(100_000, &options(100, 100_000, 1_000));
        let mut fetch =
            |range: ByteRange| Ok(Bytes::copy_from_slice(&source[range.to_range_usize().unwrap()]));
        let mut offset = 0;
        for _ in 0..8 {
            file.read(ByteRange::new(offset, 100), &mut fetch).unwrap();
            offset += 100;
        }
        let grown = file.run_length();
        file.read(ByteRange::new(90_000, 10), &mut fetch).unwrap();
        assert!(file.run_length() < grown);
    }

    #[test]
    fn read_spanning_units_and_end_of_file() {
        let source = data(1_050);
        let mut file = RemoteFile::new(1_050, &options(100, 1_000, 1_000));
        let mut fetch =
            |range: ByteRange| Ok(Bytes::copy_from_slice(&source[range.to_range_usize().unwrap()]));
        let bytes = file.read(ByteRange::new(950, 100), &mut fetch).unwrap();
        assert_eq!(&bytes[..], &source[950..1_050]);
        let bytes = file.read(ByteRange::new(120, 300), &mut fetch).unwrap();
        assert_eq!(&bytes[..], &source[120..420]);
        assert!(file.read(ByteRange::new(1_000, 51), &mut fetch).is_err());
    }

    #[test]
    fn eviction_keeps_memory_bounded() {
        let source = data(10_000);
        let mut file = RemoteFile::new(10_000, &options(10, 10, 8));
        let mut fetch =
            |range: ByteRange| Ok(Bytes::copy_from_slice(&source[range.to_range_usize().unwrap()]));
        for i in 0..100 {
            file.read(ByteRange::new(i * 97 % 9_990, 10), &mut fetch).unwrap();
            assert!(file.num_cached_units() <= 8);
        }
    }
}
