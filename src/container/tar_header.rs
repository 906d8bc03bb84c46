//! ustar headers.
//!
//! Headers are built with the `tar` crate. Renaming a header in place is a pure function of the 512 byte header buffer.

use tar::{EntryType, Header};

use super::ContainerError;

/// The size of a tar header and of a tar block.
pub const BLOCK_SIZE: u64 = 512;

/// A tar header.
pub type HeaderBytes = [u8; 512];

const NAME: std::ops::Range<usize> = 0..100;
const CHECKSUM: std::ops::Range<usize> = 148..156;
const PREFIX: std::ops::Range<usize> = 345..500;

/// Create a ustar header for a regular file.
///
/// # Errors
/// Returns [`ContainerError::InvalidName`] if `name` cannot be stored in a ustar header.
pub fn new_header(name: &str, size: u64) -> Result<HeaderBytes, ContainerError> {
    let mut header = Header::new_ustar();
    header
        .set_path(name)
        .map_err(|_| ContainerError::InvalidName(name.to_string()))?;
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    Ok(*header.as_bytes())
}

/// Return the path and size recorded in a header.
///
/// # Errors
/// Returns [`ContainerError::InvalidIndex`] if the header cannot be parsed or its checksum is invalid.
pub fn parse_header(header: &HeaderBytes) -> Result<(String, u64), ContainerError> {
    let invalid =
        |reason: &str| ContainerError::InvalidIndex(format!("invalid tar header: {reason}"));
    let parsed = Header::from_byte_slice(header);
    let recorded_checksum = parsed.cksum().map_err(|_| invalid("checksum"))?;
    if recorded_checksum != checksum(header) {
        return Err(invalid("checksum mismatch"));
    }
    let path = parsed.path().map_err(|_| invalid("path"))?;
    let size = parsed.entry_size().map_err(|_| invalid("size"))?;
    Ok((path.to_string_lossy().into_owned(), size))
}

/// Compute the checksum of a header: the sum of every byte, with the checksum field taken as spaces.
#[must_use]
pub fn checksum(header: &HeaderBytes) -> u32 {
    header
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            if CHECKSUM.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(byte)
            }
        })
        .sum()
}

/// Rename a header in place and recompute its checksum.
///
/// A name longer than the name field is split at a `/` into the ustar prefix and name fields.
///
/// # Errors
/// Returns [`ContainerError::InvalidName`] if `name` cannot be stored in a ustar header.
pub fn rename_header(header: &mut HeaderBytes, name: &str) -> Result<(), ContainerError> {
    let (prefix, base) =
        split_name(name).ok_or_else(|| ContainerError::InvalidName(name.to_string()))?;
    header[NAME].fill(0);
    header[..base.len()].copy_from_slice(base.as_bytes());
    header[PREFIX].fill(0);
    header[PREFIX.start..PREFIX.start + prefix.len()].copy_from_slice(prefix.as_bytes());
    let checksum = format!("{:07o}\0", checksum(header));
    header[CHECKSUM].copy_from_slice(checksum.as_bytes());
    Ok(())
}

/// Split `name` into the ustar prefix and name fields.
fn split_name(name: &str) -> Option<(&str, &str)> {
    if name.is_empty() {
        None
    } else if name.len() <= NAME.len() {
        Some(("", name))
    } else {
        name.match_indices('/')
            .map(|(i, _)| (&name[..i], &name[i + 1..]))
            .find(|(prefix, base)| {
                prefix.len() <= PREFIX.len() && !base.is_empty() && base.len() <= NAME.len()
            })
    }
}

/// Round `size` up to a multiple of [`BLOCK_SIZE`].
#[must_use]
pub fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_create_parse() {
        let header = new_header("lindi.json", 1024).unwrap();
        assert_eq!(&header[257..263], b"ustar\0");
        assert_eq!(parse_header(&header).unwrap(), ("lindi.json".to_string(), 1024));
    }

    #[test]
    fn header_rename() {
        let mut header = new_header(".tar_index.json", 1024).unwrap();
        rename_header(&mut header, ".trash/.tar_index.json.1536").unwrap();
        assert_eq!(
            parse_header(&header).unwrap(),
            (".trash/.tar_index.json.1536".to_string(), 1024)
        );
        assert!(rename_header(&mut header, &"x".repeat(101)).is_err());
    }

    #[test]
    fn header_rename_long_name() {
        let name = format!(".trash/dir/{}.4608", "a".repeat(90));
        let mut header = new_header("dir/a", 1024).unwrap();
        rename_header(&mut header, &name).unwrap();
        assert_eq!(parse_header(&header).unwrap(), (name, 1024));
        assert!(rename_header(&mut header, &format!("dir/{}", "a".repeat(101))).is_err());
    }

    #[test]
    fn header_checksum_mismatch() {
        let mut header = new_header("a", 1).unwrap();
        header[0] = b'b';
        assert!(parse_header(&header).is_err());
    }

    #[test]
    fn padding() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 512);
        assert_eq!(padded_size(1024), 1024);
    }
}
