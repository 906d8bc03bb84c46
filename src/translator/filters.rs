//! Translation of source filters to Zarr V2 codecs.
//!
//! Each supported filter has a codec that decodes the stored chunk bytes unchanged, so chunks can be referenced at their original byte ranges.

use crate::metadata::{
    codec::{
        blosc::{
            BloscCodecConfigurationNumcodecs, BloscCompressionLevel, BloscCompressor,
            BloscShuffleModeNumCodecs,
        },
        fletcher32::fletcher32_metadata,
        shuffle::ShuffleCodecConfigurationNumcodecs,
        zlib::ZlibCodecConfigurationNumcodecs,
        zstd::ZstdCodecConfigurationNumcodecs,
    },
    MetadataV2,
};

use super::{SourceFilter, TranslatorError};

/// The deflate (gzip) filter.
pub const FILTER_DEFLATE: u32 = 1;
/// The shuffle filter.
pub const FILTER_SHUFFLE: u32 = 2;
/// The fletcher32 checksum filter.
pub const FILTER_FLETCHER32: u32 = 3;
/// The blosc filter.
pub const FILTER_BLOSC: u32 = 32001;
/// The zstd filter.
pub const FILTER_ZSTD: u32 = 32015;

const DEFLATE_DEFAULT_LEVEL: u32 = 4;

/// Translate a filter pipeline to the equivalent `filters` of a Zarr V2 array.
///
/// The filters are kept in pipeline order, so decoding applies them in reverse as the source does.
///
/// # Errors
/// Returns [`TranslatorError::UnsupportedFilter`] if any filter has no equivalent codec.
pub fn translate_filters(
    dataset: &str,
    filters: &[SourceFilter],
    item_size: u64,
) -> Result<Vec<MetadataV2>, TranslatorError> {
    filters
        .iter()
        .map(|filter| translate_filter(dataset, filter, item_size))
        .collect()
}

fn translate_filter(
    dataset: &str,
    filter: &SourceFilter,
    item_size: u64,
) -> Result<MetadataV2, TranslatorError> {
    let unsupported = |reason: &str| TranslatorError::UnsupportedFilter {
        dataset: dataset.to_string(),
        filter: format!("{} ({}): {reason}", filter.name, filter.id),
    };
    let cd = &filter.client_data;
    let metadata = match filter.id {
        FILTER_DEFLATE => ZlibCodecConfigurationNumcodecs {
            level: cd.first().copied().unwrap_or(DEFLATE_DEFAULT_LEVEL),
        }
        .to_metadata()?,
        FILTER_SHUFFLE => ShuffleCodecConfigurationNumcodecs {
            elementsize: item_size,
        }
        .to_metadata()?,
        FILTER_FLETCHER32 => fletcher32_metadata(),
        FILTER_BLOSC => {
            let level = u8::try_from(cd.get(4).copied().unwrap_or(5))
                .ok()
                .and_then(|level| BloscCompressionLevel::try_from(level).ok())
                .ok_or_else(|| unsupported("invalid compression level"))?;
            let shuffle_code = cd.get(5).copied().unwrap_or(1);
            let shuffle = BloscShuffleModeNumCodecs::from_filter_code(shuffle_code)
                .ok_or_else(|| unsupported("invalid shuffle mode"))?;
            let cname = BloscCompressor::from_filter_code(cd.get(6).copied().unwrap_or(0))
                .ok_or_else(|| unsupported("invalid compressor"))?;
            BloscCodecConfigurationNumcodecs {
                cname,
                clevel: level,
                shuffle,
                blocksize: 0,
            }
            .to_metadata()?
        }
        FILTER_ZSTD => ZstdCodecConfigurationNumcodecs {
            level: cd
                .first()
                .map_or(Ok(0), |&level| i32::try_from(level))
                .map_err(|_| unsupported("invalid compression level"))?,
        }
        .to_metadata()?,
        _ => return Err(unsupported("no equivalent codec")),
    };
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_shuffle_deflate() {
        let filters = [
            SourceFilter::new(FILTER_SHUFFLE, "shuffle", vec![]),
            SourceFilter::new(FILTER_DEFLATE, "deflate", vec![6]),
        ];
        let codecs = translate_filters("/x", &filters, 8).unwrap();
        assert_eq!(codecs[0].id(), "shuffle");
        assert_eq!(codecs[0].configuration()["elementsize"], 8);
        assert_eq!(codecs[1].id(), "zlib");
        assert_eq!(codecs[1].configuration()["level"], 6);
    }

    #[test]
    fn translate_blosc() {
        let filter = SourceFilter::new(FILTER_BLOSC, "blosc", vec![2, 2, 4, 40000, 9, 2, 1]);
        let codec = translate_filter("/x", &filter, 4).unwrap();
        assert_eq!(codec.id(), "blosc");
        assert_eq!(codec.configuration()["cname"], "lz4");
        assert_eq!(codec.configuration()["clevel"], 9);
        assert_eq!(codec.configuration()["shuffle"], 2);
    }

    #[test]
    fn translate_unsupported() {
        let scale_offset = SourceFilter::new(6, "scaleoffset", vec![]);
        assert!(matches!(
            translate_filters("/x", &[scale_offset], 4),
            Err(TranslatorError::UnsupportedFilter { .. })
        ));
        let bad_blosc = SourceFilter::new(FILTER_BLOSC, "blosc", vec![2, 2, 4, 0, 5, 1, 17]);
        assert!(translate_filter("/x", &bad_blosc, 4).is_err());
    }
}
