//! Byte ranges.
//!
//! A [`ByteRange`] is an absolute `(offset, length)` window into a byte sequence, as recorded by a byte range reference in a reference manifest.
//!
//! [`extract_byte_range`] extracts a byte range from a slice, and [`extract_byte_range_read_seek`] reads one from anything implementing [`Read`] and [`Seek`].

use std::{
    io::{Read, Seek, SeekFrom},
    ops::Range,
};

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range with an absolute offset and a length.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ByteRange {
    /// The offset of the first byte.
    pub offset: ByteOffset,
    /// The number of bytes.
    pub length: ByteLength,
}

impl ByteRange {
    /// Create a new byte range.
    #[must_use]
    pub const fn new(offset: ByteOffset, length: ByteLength) -> Self {
        Self { offset, length }
    }

    /// Return the exclusive end of the byte range.
    ///
    /// Saturates at [`u64::MAX`].
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Returns true if the byte range fits within bytes of length `size`.
    #[must_use]
    pub const fn fits(&self, size: u64) -> bool {
        match self.offset.checked_add(self.length) {
            Some(end) => end <= size,
            None => false,
        }
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub const fn to_range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    /// Convert the byte range to a [`Range<usize>`].
    ///
    /// # Errors
    /// Returns [`InvalidByteRangeError`] if the byte range exceeds [`usize::MAX`].
    pub fn to_range_usize(&self) -> Result<Range<usize>, InvalidByteRangeError> {
        let start = usize::try_from(self.offset).map_err(|_| InvalidByteRangeError(*self, 0))?;
        let end = usize::try_from(self.end()).map_err(|_| InvalidByteRangeError(*self, 0))?;
        Ok(start..end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

/// Extract a byte range from bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] if any bytes are requested beyond the end of `bytes`.
pub fn extract_byte_range(
    bytes: &[u8],
    byte_range: ByteRange,
) -> Result<&[u8], InvalidByteRangeError> {
    if !byte_range.fits(bytes.len() as u64) {
        return Err(InvalidByteRangeError(byte_range, bytes.len() as u64));
    }
    Ok(&bytes[byte_range.to_range_usize()?])
}

/// Extract a byte range from bytes implementing [`Read`] and [`Seek`].
///
/// # Errors
/// Returns a [`std::io::Error`] if there is an error reading or seeking from `bytes`.
/// This can occur if the byte range is out-of-bounds of the `bytes`.
pub fn extract_byte_range_read_seek<T: Read + Seek>(
    bytes: &mut T,
    byte_range: ByteRange,
) -> std::io::Result<Vec<u8>> {
    let length = usize::try_from(byte_range.length)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    bytes.seek(SeekFrom::Start(byte_range.offset))?;
    let mut data = vec![0; length];
    bytes.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ranges() {
        let byte_range = ByteRange::new(1, 5);
        assert_eq!(byte_range.to_range(), 1..6);
        assert_eq!(byte_range.to_range_usize().unwrap(), 1..6);
        assert_eq!(byte_range.end(), 6);
        assert!(byte_range.fits(6));
        assert!(!byte_range.fits(5));
        assert!(!ByteRange::new(u64::MAX, 1).fits(u64::MAX));

        assert!(extract_byte_range(&[1, 2, 3], ByteRange::new(1, 2)).is_ok());
        let bytes = extract_byte_range(&[1, 2, 3], ByteRange::new(1, 4));
        assert_eq!(
            bytes.unwrap_err().to_string(),
            "invalid byte range 1..5 for bytes of length 3"
        );
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(format!("{}", ByteRange::new(0, 0)), "0..0");
        assert_eq!(format!("{}", ByteRange::new(5, 2)), "5..7");
    }

    #[test]
    fn test_extract_byte_range_read_seek() {
        let data: Vec<u8> = (0..10).collect();
        let mut read = std::io::Cursor::new(data);
        let out = extract_byte_range_read_seek(&mut read, ByteRange::new(3, 3)).unwrap();
        assert_eq!(out, vec![3, 4, 5]);
        assert!(extract_byte_range_read_seek(&mut read, ByteRange::new(8, 3)).is_err());
    }
}
