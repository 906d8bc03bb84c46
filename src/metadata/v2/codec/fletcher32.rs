use crate::metadata::MetadataV2;

/// The identifier for the `fletcher32` codec.
///
/// The codec has no configuration. It verifies and strips the trailing 4 byte checksum HDF5 appends to each chunk.
pub const IDENTIFIER: &str = "fletcher32";

/// Create `fletcher32` codec metadata.
#[must_use]
pub fn fletcher32_metadata() -> MetadataV2 {
    MetadataV2::new(IDENTIFIER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_fletcher32() {
        assert_eq!(
            serde_json::to_string(&fletcher32_metadata()).unwrap(),
            r#"{"id":"fletcher32"}"#
        );
    }
}
