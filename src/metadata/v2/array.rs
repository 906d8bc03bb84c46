use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::metadata::ChunkKeySeparator;

use super::MetadataV2;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// The shape of a chunk.
pub type ChunkShape = Vec<u64>;

/// Zarr array metadata (storage specification v2).
///
/// An example `JSON` document for a Zarr V2 array:
/// ```json
/// {
///     "chunks": [
///         3,
///         7
///     ],
///     "compressor": null,
///     "dtype": "<f4",
///     "fill_value": "NaN",
///     "filters": [
///         {"id": "zlib", "level": 4}
///     ],
///     "order": "C",
///     "shape": [
///         3,
///         20
///     ],
///     "zarr_format": 2
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ArrayMetadataV2 {
    /// An integer defining the version of the storage specification to which the array adheres. Must be `2`.
    pub zarr_format: monostate::MustBe!(2u64),
    /// An array of integers providing the length of each dimension of the Zarr array.
    pub shape: ArrayShape,
    /// A list of integers defining the length of each dimension of a chunk of the array.
    pub chunks: ChunkShape,
    /// The data type of the Zarr array.
    pub dtype: ArrayMetadataV2DataType,
    /// A JSON object identifying the primary compression codec and providing configuration parameters, or null if no compressor is to be used.
    pub compressor: Option<MetadataV2>,
    /// A scalar value providing the default value to use for uninitialized portions of the array, or null if no fill value is to be used.
    pub fill_value: FillValueMetadataV2,
    /// Either “C” or “F”, defining the layout of bytes within each chunk of the array.
    pub order: ArrayMetadataV2Order,
    /// A list of JSON objects providing codec configurations, or null if no filters are to be applied.
    #[serde(default)]
    pub filters: Option<Vec<MetadataV2>>,
    /// If present, either the string "." or "/" defining the separator placed between the dimensions of a chunk.
    #[serde(default = "chunk_key_separator_default_zarr_v2")]
    pub dimension_separator: ChunkKeySeparator,
}

const fn chunk_key_separator_default_zarr_v2() -> ChunkKeySeparator {
    ChunkKeySeparator::Dot
}

impl ArrayMetadataV2 {
    /// Create Zarr V2 array metadata in C order with no compressor and no filters.
    #[must_use]
    pub fn new(
        shape: ArrayShape,
        chunks: ChunkShape,
        dtype: ArrayMetadataV2DataType,
        fill_value: FillValueMetadataV2,
    ) -> Self {
        Self {
            zarr_format: monostate::MustBe!(2u64),
            shape,
            chunks,
            dtype,
            compressor: None,
            fill_value,
            order: ArrayMetadataV2Order::C,
            filters: None,
            dimension_separator: ChunkKeySeparator::Dot,
        }
    }

    /// Set the compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<MetadataV2>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Set the filters. An empty list is stored as `null`.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<MetadataV2>) -> Self {
        self.filters = if filters.is_empty() {
            None
        } else {
            Some(filters)
        };
        self
    }

    /// Returns true if chunks pass through a compressor or any filter.
    #[must_use]
    pub fn has_codecs(&self) -> bool {
        self.compressor.is_some() || self.filters.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// The number of elements in a chunk.
    #[must_use]
    pub fn chunk_num_elements(&self) -> u64 {
        self.chunks.iter().product()
    }

    /// The encoded size of a full chunk in bytes, if the data type has a fixed size.
    #[must_use]
    pub fn chunk_size_bytes(&self) -> Option<u64> {
        self.dtype
            .item_size()
            .map(|item_size| item_size * self.chunk_num_elements())
    }
}

/// Zarr V2 data type metadata.
///
/// Simple data types are strings such as `<f4`, `|u1` or `|O`.
/// Structured data types are lists of `[fieldname, datatype]` pairs.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(untagged)]
pub enum ArrayMetadataV2DataType {
    /// A simple data type.
    Simple(String),
    /// A structured data type.
    Structured(Vec<DataTypeMetadataV2Structured>),
}

impl ArrayMetadataV2DataType {
    /// The data type of variable length objects, which numcodecs stores with an object codec.
    pub const OBJECT: &'static str = "|O";

    /// Create a simple data type.
    #[must_use]
    pub fn simple(data_type: &str) -> Self {
        Self::Simple(data_type.to_string())
    }

    /// Returns the simple data type string, if this is a simple data type.
    #[must_use]
    pub fn as_simple(&self) -> Option<&str> {
        match self {
            Self::Simple(data_type) => Some(data_type),
            Self::Structured(_) => None,
        }
    }

    /// Returns true for the `|O` object data type.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.as_simple() == Some(Self::OBJECT)
    }

    /// Returns true for fixed size boolean, integer, floating point and complex data types.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.as_simple()
            .and_then(|s| s.get(1..2))
            .is_some_and(|kind| matches!(kind, "b" | "i" | "u" | "f" | "c"))
    }

    /// The size of one element in bytes.
    ///
    /// Returns [`None`] for the object data type and for malformed data type strings.
    #[must_use]
    pub fn item_size(&self) -> Option<u64> {
        match self {
            Self::Simple(data_type) => {
                let endianness = data_type.get(0..1)?;
                if !matches!(endianness, "<" | ">" | "|") {
                    return None;
                }
                let kind = data_type.get(1..2)?;
                if !matches!(kind, "b" | "i" | "u" | "f" | "c" | "S" | "V") {
                    return None;
                }
                data_type.get(2..)?.parse().ok()
            }
            Self::Structured(fields) => fields
                .iter()
                .map(|field| Self::simple(&field.datatype).item_size())
                .sum(),
        }
    }
}

/// Structure data type metadata.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(
    from = "DataTypeMetadataV2StructuredTuple",
    into = "DataTypeMetadataV2StructuredTuple"
)]
pub struct DataTypeMetadataV2Structured {
    /// Field name.
    pub fieldname: String,
    /// Data type.
    pub datatype: String,
}

#[derive(Serialize, Deserialize)]
struct DataTypeMetadataV2StructuredTuple(String, String);

impl From<DataTypeMetadataV2StructuredTuple> for DataTypeMetadataV2Structured {
    fn from(value: DataTypeMetadataV2StructuredTuple) -> Self {
        let DataTypeMetadataV2StructuredTuple(fieldname, datatype) = value;
        Self {
            fieldname,
            datatype,
        }
    }
}

impl From<DataTypeMetadataV2Structured> for DataTypeMetadataV2StructuredTuple {
    fn from(value: DataTypeMetadataV2Structured) -> Self {
        Self(value.fieldname, value.datatype)
    }
}

/// A scalar value providing the default value to use for uninitialized portions of the array, or null if no fill value is to be used.
///
/// Non-finite floats are not valid JSON, so they are written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
#[derive(Clone, PartialEq, Debug)]
pub enum FillValueMetadataV2 {
    /// No fill value.
    Null,
    /// NaN (not-a-number).
    NaN,
    /// Positive infinity.
    Infinity,
    /// Negative infinity.
    NegInfinity,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(serde_json::Number),
    /// A string, used by fixed length byte string data types.
    String(String),
}

impl FillValueMetadataV2 {
    /// Create a fill value from a float, mapping non-finite values to their string sentinels.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::NaN
        } else if value == f64::INFINITY {
            Self::Infinity
        } else if value == f64::NEG_INFINITY {
            Self::NegInfinity
        } else {
            serde_json::Number::from_f64(value).map_or(Self::Null, Self::Number)
        }
    }
}

impl<'de> serde::Deserialize<'de> for FillValueMetadataV2 {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum FillValueMetadataV2Type {
            String(String),
            Bool(bool),
            Number(serde_json::Number),
            Null,
        }
        let fill_value = FillValueMetadataV2Type::deserialize(d)?;
        match fill_value {
            FillValueMetadataV2Type::String(string) => match string.as_str() {
                "NaN" => Ok(Self::NaN),
                "Infinity" => Ok(Self::Infinity),
                "-Infinity" => Ok(Self::NegInfinity),
                _ => Ok(Self::String(string)),
            },
            FillValueMetadataV2Type::Bool(bool) => Ok(Self::Bool(bool)),
            FillValueMetadataV2Type::Number(number) => Ok(Self::Number(number)),
            FillValueMetadataV2Type::Null => Ok(Self::Null),
        }
    }
}

impl Serialize for FillValueMetadataV2 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::NaN => serializer.serialize_str("NaN"),
            Self::Infinity => serializer.serialize_str("Infinity"),
            Self::NegInfinity => serializer.serialize_str("-Infinity"),
            Self::Bool(bool) => serializer.serialize_bool(*bool),
            Self::Number(number) => number.serialize(serializer),
            Self::String(string) => serializer.serialize_str(string),
        }
    }
}

/// The layout of bytes within each chunk of the array.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ArrayMetadataV2Order {
    /// Row-major order. The last dimension varies fastest.
    #[default]
    C,
    /// Column-major order. The first dimension varies fastest.
    F,
}
