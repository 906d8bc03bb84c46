/// Zarr V2 group metadata.
pub mod group;

/// Zarr V2 array metadata.
pub mod array;

/// Zarr V2 codec metadata.
pub mod codec;

pub use array::{
    ArrayMetadataV2, ArrayMetadataV2DataType, ArrayMetadataV2Order, DataTypeMetadataV2Structured,
    FillValueMetadataV2,
};
pub use group::GroupMetadataV2;

mod metadata;
pub use metadata::MetadataV2;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ChunkKeySeparator;

    #[test]
    fn array_v2_config() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"
            {
                "chunks": [
                    1000,
                    1000
                ],
                "compressor": {
                    "id": "blosc",
                    "cname": "lz4",
                    "clevel": 5,
                    "shuffle": 1
                },
                "dtype": "<f8",
                "fill_value": "NaN",
                "filters": [
                    {"id": "shuffle", "elementsize": 8}
                ],
                "order": "C",
                "shape": [
                    10000,
                    10000
                ],
                "zarr_format": 2
            }"#;
        let array_metadata_v2: ArrayMetadataV2 = serde_json::from_str(json)?;
        assert_eq!(array_metadata_v2.chunks, vec![1000, 1000]);
        assert_eq!(array_metadata_v2.shape, vec![10000, 10000]);
        assert_eq!(
            array_metadata_v2.dimension_separator,
            ChunkKeySeparator::Dot
        );
        assert_eq!(array_metadata_v2.fill_value, FillValueMetadataV2::NaN);
        assert_eq!(array_metadata_v2.dtype.item_size(), Some(8));
        assert!(array_metadata_v2.dtype.is_numeric());
        assert!(array_metadata_v2.has_codecs());
        assert_eq!(
            array_metadata_v2.compressor.as_ref().map(MetadataV2::id),
            Some("blosc")
        );
        Ok(())
    }
}
