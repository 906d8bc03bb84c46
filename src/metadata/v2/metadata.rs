use serde::{Deserialize, Serialize};

/// Metadata with an id and optional configuration.
///
/// Can be deserialised from a JSON object with an `id` and any other configuration fields.
/// For example:
/// ```json
/// {
///     "id": "blosc",
///     "cname": "lz4",
///     "clevel": 5,
///     "shuffle": 1
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct MetadataV2 {
    id: String,
    #[serde(flatten)]
    configuration: serde_json::Map<String, serde_json::Value>,
}

impl MetadataV2 {
    /// Create metadata from an `id` without configuration.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            configuration: serde_json::Map::new(),
        }
    }

    /// Convert a serializable configuration to [`MetadataV2`].
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `configuration` does not serialize to a JSON object.
    pub fn new_with_serializable_configuration<TConfiguration: Serialize>(
        id: &str,
        configuration: &TConfiguration,
    ) -> Result<Self, serde_json::Error> {
        let configuration = serde_json::to_value(configuration)?;
        let serde_json::Value::Object(configuration) = configuration else {
            return Err(serde::ser::Error::custom(
                "codec configuration must serialize to a JSON object",
            ));
        };
        Ok(Self {
            id: id.to_string(),
            configuration,
        })
    }

    /// Return the "id" key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the configuration, which includes all fields excluding the "id".
    #[must_use]
    pub fn configuration(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.configuration
    }
}
