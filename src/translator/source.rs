//! The interface to a reader of the source file format.

use crate::{
    byte_range::ByteRange,
    manifest::{AttributeMap, AttributeValue},
    metadata::ArrayMetadataV2DataType,
};

/// An error reported by a source reader.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// The data type of a source dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDataType {
    /// A fixed size boolean, integer, float or complex type as a NumPy type string, such as `<f4` or `|b1`.
    Numeric(String),
    /// A fixed length byte string of the given length.
    FixedString(u64),
    /// A variable length string.
    VariableString,
    /// An object reference.
    Reference,
    /// A compound type with named fields.
    Compound(Vec<SourceField>),
}

/// A field of a compound data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceField {
    /// The field name.
    pub name: String,
    /// The field data type.
    pub dtype: SourceDataType,
}

impl SourceField {
    /// Create a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: SourceDataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

impl SourceDataType {
    /// Returns true if values of this type are stored with the `json2` object codec rather than as fixed size chunks.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::VariableString | Self::Reference | Self::Compound(_)
        )
    }

    /// The Zarr V2 data type of an array of this type.
    #[must_use]
    pub fn zarr_dtype(&self) -> ArrayMetadataV2DataType {
        match self {
            Self::Numeric(dtype) => ArrayMetadataV2DataType::simple(dtype),
            Self::FixedString(length) => ArrayMetadataV2DataType::simple(&format!("|S{length}")),
            Self::VariableString | Self::Reference | Self::Compound(_) => {
                ArrayMetadataV2DataType::simple(ArrayMetadataV2DataType::OBJECT)
            }
        }
    }
}

/// The fill value of a source dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFillValue {
    /// No fill value.
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A float.
    Float(f64),
    /// A byte string.
    Bytes(Vec<u8>),
}

/// A filter of the source filter pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    /// The registered filter identifier.
    pub id: u32,
    /// The filter name.
    pub name: String,
    /// The filter parameters.
    pub client_data: Vec<u32>,
}

impl SourceFilter {
    /// Create a new filter.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, client_data: Vec<u32>) -> Self {
        Self {
            id,
            name: name.into(),
            client_data,
        }
    }
}

/// A dataset of a source file, provided by a reader of the source file format.
///
/// Byte ranges are relative to the start of the source file.
pub trait SourceDataset {
    /// The path of the dataset in the source file.
    fn name(&self) -> &str;

    /// The shape. Scalars have an empty shape.
    fn shape(&self) -> &[u64];

    /// The chunk shape, or [`None`] for a contiguous dataset.
    fn chunk_shape(&self) -> Option<&[u64]>;

    /// The data type.
    fn dtype(&self) -> &SourceDataType;

    /// The fill value.
    fn fill_value(&self) -> SourceFillValue;

    /// The filter pipeline, in the order applied when writing.
    fn filters(&self) -> &[SourceFilter];

    /// The user attributes.
    fn attributes(&self) -> AttributeMap {
        AttributeMap::new()
    }

    /// The byte range of the chunk at `chunk_indices`, or [`None`] if the chunk is not allocated.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the chunk index cannot be read.
    fn chunk_byte_range(&self, chunk_indices: &[u64]) -> Result<Option<ByteRange>, SourceError>;

    /// The byte range of a contiguous dataset, or [`None`] if its storage is not allocated.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the layout cannot be read.
    fn contiguous_byte_range(&self) -> Result<Option<ByteRange>, SourceError>;

    /// Read the raw little-endian bytes of a fixed size dataset.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the data cannot be read.
    fn read_raw(&self) -> Result<Vec<u8>, SourceError>;

    /// Read every element in C order.
    ///
    /// Compound elements are lists of field values, and references are [`AttributeValue::Reference`].
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the data cannot be read.
    fn read_values(&self) -> Result<Vec<AttributeValue>, SourceError>;

    /// The identifier of the root object of the source file, checked against the `source_object_id` of translated references.
    fn file_object_id(&self) -> Option<String> {
        None
    }
}
