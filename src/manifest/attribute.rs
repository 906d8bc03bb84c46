//! Attribute values and their JSON encoding.
//!
//! JSON has no representation for non-finite floats, so NaN and the infinities are written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
//! Object references are written as `{"_REFERENCE": {...}}` records.
//! Encoding rejects user values that would decode as one of these sentinels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ManifestError;

/// The key of an encoded object reference.
pub const REFERENCE_KEY: &str = "_REFERENCE";

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Attributes keyed by name.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A portable reference to another object in the same source file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    /// The file containing the target. Always `.` (the source file itself).
    pub source: String,
    /// The path of the target object.
    pub path: String,
    /// The identifier of the target object.
    pub object_id: String,
    /// The identifier of the root object of the file containing the target.
    pub source_object_id: String,
}

impl ObjectReference {
    /// Create a reference to the object at `path` in the source file.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        object_id: impl Into<String>,
        source_object_id: impl Into<String>,
    ) -> Self {
        Self {
            source: ".".to_string(),
            path: path.into(),
            object_id: object_id.into(),
            source_object_id: source_object_id.into(),
        }
    }
}

/// An attribute value, or an element of an object array.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer too large for [`AttributeValue::Int`].
    UInt(u64),
    /// A float, including NaN and the infinities.
    Float(f64),
    /// A string.
    String(String),
    /// A list.
    List(Vec<AttributeValue>),
    /// A map.
    Map(AttributeMap),
    /// An object reference.
    Reference(ObjectReference),
}

impl AttributeValue {
    /// Encode as JSON.
    ///
    /// # Errors
    /// Returns [`ManifestError::AmbiguousSentinel`] if a string equals a float sentinel, or a map has the single key `_REFERENCE`.
    pub fn encode(&self) -> Result<serde_json::Value, ManifestError> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::UInt(u) => serde_json::Value::from(*u),
            Self::Float(f) => {
                if f.is_nan() {
                    serde_json::Value::from(NAN)
                } else if *f == f64::INFINITY {
                    serde_json::Value::from(INFINITY)
                } else if *f == f64::NEG_INFINITY {
                    serde_json::Value::from(NEG_INFINITY)
                } else {
                    serde_json::Number::from_f64(*f)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number)
                }
            }
            Self::String(s) => {
                if matches!(s.as_str(), NAN | INFINITY | NEG_INFINITY) {
                    return Err(ManifestError::AmbiguousSentinel(s.clone()));
                }
                serde_json::Value::from(s.as_str())
            }
            Self::List(values) => serde_json::Value::Array(
                values.iter().map(Self::encode).collect::<Result<_, _>>()?,
            ),
            Self::Map(map) => {
                if map.len() == 1 && map.contains_key(REFERENCE_KEY) {
                    return Err(ManifestError::AmbiguousSentinel(REFERENCE_KEY.to_string()));
                }
                serde_json::Value::Object(encode_attributes(map)?)
            }
            Self::Reference(reference) => {
                let mut record = serde_json::Map::new();
                record.insert(REFERENCE_KEY.to_string(), serde_json::to_value(reference)?);
                serde_json::Value::Object(record)
            }
        })
    }

    /// Decode from JSON. Decoding is total: any JSON value has a decoding.
    #[must_use]
    pub fn decode(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => match s.as_str() {
                NAN => Self::Float(f64::NAN),
                INFINITY => Self::Float(f64::INFINITY),
                NEG_INFINITY => Self::Float(f64::NEG_INFINITY),
                _ => Self::String(s.clone()),
            },
            serde_json::Value::Array(values) => {
                Self::List(values.iter().map(Self::decode).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(reference) = map
                        .get(REFERENCE_KEY)
                        .and_then(|r| serde_json::from_value(r.clone()).ok())
                    {
                        return Self::Reference(reference);
                    }
                }
                Self::Map(decode_attributes(map))
            }
        }
    }

    /// Return all object references in this value, recursively.
    #[must_use]
    pub fn references(&self) -> Vec<&ObjectReference> {
        match self {
            Self::Reference(reference) => vec![reference],
            Self::List(values) => values.iter().flat_map(Self::references).collect(),
            Self::Map(map) => map.values().flat_map(Self::references).collect(),
            _ => vec![],
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Encode attributes as a JSON object.
///
/// # Errors
/// Returns [`ManifestError::AmbiguousSentinel`] if any value is ambiguous, see [`AttributeValue::encode`].
pub fn encode_attributes(
    attributes: &AttributeMap,
) -> Result<serde_json::Map<String, serde_json::Value>, ManifestError> {
    attributes
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.encode()?)))
        .collect()
}

/// Decode attributes from a JSON object.
#[must_use]
pub fn decode_attributes(attributes: &serde_json::Map<String, serde_json::Value>) -> AttributeMap {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), AttributeValue::decode(value)))
        .collect()
}
