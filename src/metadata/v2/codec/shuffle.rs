use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataV2;

/// The identifier for the `shuffle` codec.
pub const IDENTIFIER: &str = "shuffle";

/// `shuffle` codec configuration parameters (numcodecs).
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ShuffleCodecConfigurationNumcodecs {
    /// The element size.
    pub elementsize: u64,
}

impl ShuffleCodecConfigurationNumcodecs {
    /// Convert to [`MetadataV2`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if the configuration fails to serialize.
    pub fn to_metadata(&self) -> Result<MetadataV2, serde_json::Error> {
        MetadataV2::new_with_serializable_configuration(IDENTIFIER, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle() {
        let configuration = serde_json::from_str::<ShuffleCodecConfigurationNumcodecs>(
            r#"
        {
            "elementsize": 4
        }
        "#,
        )
        .unwrap();
        assert_eq!(configuration.elementsize, 4);
    }
}
