use crate::{
    byte_range::ByteRange,
    manifest::{
        encode_attributes, AttributeMap, AttributeValue, ByteRangeReference, ManifestReference,
        ReferenceManifest,
    },
    metadata::{
        codec::json2::{json2_encode, Json2CodecConfigurationNumcodecs},
        ArrayMetadataV2, FillValueMetadataV2, GroupMetadataV2, ZARRAY, ZATTRS, ZGROUP,
    },
    storage::StorePrefix,
};

use super::{
    chunk_grid::{chunk_grid_shape, chunk_indices, chunk_key, num_chunks},
    filters::translate_filters,
    SourceDataType, SourceDataset, SourceFillValue, TranslatorError, TranslatorOptions,
};

/// The attribute marking an array of shape `[1]` as a scalar.
pub const SCALAR_ATTRIBUTE: &str = "_SCALAR";

/// The attribute holding the `[name, dtype]` fields of a compound array.
pub const COMPOUND_DTYPE_ATTRIBUTE: &str = "_COMPOUND_DTYPE";

/// The attribute linking an array to its source dataset.
pub const EXTERNAL_ARRAY_LINK_ATTRIBUTE: &str = "_EXTERNAL_ARRAY_LINK";

/// The compound field data type of object references.
pub const REFERENCE_DTYPE: &str = "<REFERENCE>";

/// How the content of a dataset is represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetContent {
    /// Chunks referenced by byte range in the source file, keyed by chunk key.
    ///
    /// Unallocated chunks are omitted.
    ChunkRefs(Vec<(String, ByteRange)>),
    /// A single chunk stored inline.
    Inline {
        /// The chunk key.
        key: String,
        /// The encoded chunk.
        data: Vec<u8>,
    },
    /// No chunks: readers follow the link to the source dataset.
    ExternalLink {
        /// The source file URL.
        url: String,
        /// The source dataset name.
        name: String,
    },
}

/// The representation of a source dataset as a Zarr V2 array.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayoutDecision {
    /// The array metadata, including the codecs translated from the source filters.
    pub metadata: ArrayMetadataV2,
    /// The array attributes: the source attributes and the special attributes.
    pub attributes: AttributeMap,
    /// The chunks.
    pub content: DatasetContent,
}

impl DatasetLayoutDecision {
    /// Returns true if the source dataset is a scalar.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.attributes.get(SCALAR_ATTRIBUTE) == Some(&AttributeValue::Bool(true))
    }

    /// Returns true if the source dataset has a compound data type.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.attributes.contains_key(COMPOUND_DTYPE_ATTRIBUTE)
    }
}

/// Translates source datasets and groups into a reference manifest.
#[derive(Debug, Clone, Default)]
pub struct ChunkLayoutTranslator {
    options: TranslatorOptions,
}

impl ChunkLayoutTranslator {
    /// Create a new translator.
    #[must_use]
    pub fn new(options: TranslatorOptions) -> Self {
        Self { options }
    }

    /// Return the options.
    #[must_use]
    pub fn options(&self) -> &TranslatorOptions {
        &self.options
    }

    /// Decide how `dataset` is represented.
    ///
    /// # Errors
    /// Returns a [`TranslatorError`] if the dataset uses an unsupported filter, data type or dimensionality, its layout is inconsistent, or the source reader fails.
    pub fn decide(
        &self,
        dataset: &dyn SourceDataset,
    ) -> Result<DatasetLayoutDecision, TranslatorError> {
        let mut attributes = dataset.attributes();
        check_references(dataset, attributes.values())?;

        let shape = dataset.shape();
        let dtype = dataset.dtype();
        let (metadata, content) = if shape.is_empty() {
            attributes.insert(SCALAR_ATTRIBUTE.to_string(), AttributeValue::Bool(true));
            if let SourceDataType::Compound(_) = dtype {
                attributes.insert(
                    COMPOUND_DTYPE_ATTRIBUTE.to_string(),
                    compound_dtype_attribute(dataset)?,
                );
            }
            decide_scalar(dataset)?
        } else if let SourceDataType::Compound(_) = dtype {
            if shape.len() != 1 {
                return Err(TranslatorError::UnsupportedDimensionality {
                    dataset: dataset.name().to_string(),
                    dimensionality: shape.len(),
                });
            }
            attributes.insert(
                COMPOUND_DTYPE_ATTRIBUTE.to_string(),
                compound_dtype_attribute(dataset)?,
            );
            decide_object(dataset, shape)?
        } else if dtype.is_object() {
            decide_object(dataset, shape)?
        } else {
            let (metadata, content) = self.decide_chunked(dataset)?;
            if let DatasetContent::ExternalLink { url, name } = &content {
                attributes.insert(
                    EXTERNAL_ARRAY_LINK_ATTRIBUTE.to_string(),
                    AttributeValue::Map(AttributeMap::from([
                        ("link_type".to_string(), "hdf5_dataset".into()),
                        ("url".to_string(), url.as_str().into()),
                        ("name".to_string(), name.as_str().into()),
                    ])),
                );
            }
            (metadata, content)
        };

        Ok(DatasetLayoutDecision {
            metadata,
            attributes,
            content,
        })
    }

    fn decide_chunked(
        &self,
        dataset: &dyn SourceDataset,
    ) -> Result<(ArrayMetadataV2, DatasetContent), TranslatorError> {
        let name = dataset.name();
        let shape = dataset.shape().to_vec();
        let dtype = dataset.dtype().zarr_dtype();
        let item_size = dtype
            .item_size()
            .ok_or_else(|| TranslatorError::UnsupportedDataType {
                dataset: name.to_string(),
                reason: format!("{dtype:?} does not have a fixed size"),
            })?;
        let filters = translate_filters(name, dataset.filters(), item_size)?;

        let (chunk_shape, contiguous) = match dataset.chunk_shape() {
            Some(chunk_shape) => {
                if chunk_shape.len() != shape.len() || chunk_shape.contains(&0) {
                    return Err(TranslatorError::Integrity {
                        dataset: name.to_string(),
                        reason: format!("invalid chunk shape {chunk_shape:?} for shape {shape:?}"),
                    });
                }
                (chunk_shape.to_vec(), None)
            }
            None => {
                if !filters.is_empty() {
                    return Err(TranslatorError::Integrity {
                        dataset: name.to_string(),
                        reason: "a contiguous dataset cannot have filters".to_string(),
                    });
                }
                let chunk_shape = self.contiguous_chunk_shape(&shape, item_size);
                (chunk_shape, Some(dataset.contiguous_byte_range()?))
            }
        };

        let metadata = ArrayMetadataV2::new(
            shape.clone(),
            chunk_shape.clone(),
            dtype,
            fill_value(dataset),
        )
        .with_filters(filters);

        let grid_shape = chunk_grid_shape(&shape, &chunk_shape);
        let num_chunks = num_chunks(&grid_shape);
        if let (Some(threshold), Some(url)) = (
            self.options.num_dataset_chunks_threshold,
            &self.options.source_url,
        ) {
            if num_chunks > threshold {
                log::debug!("{name} has {num_chunks} chunks, linking to the source dataset");
                return Ok((
                    metadata,
                    DatasetContent::ExternalLink {
                        url: url.clone(),
                        name: name.to_string(),
                    },
                ));
            }
        }

        let chunk_refs = match contiguous {
            Some(byte_range) => {
                contiguous_chunk_refs(name, &metadata, &grid_shape, item_size, byte_range)?
            }
            None => {
                let expected_size = (!metadata.has_codecs())
                    .then(|| metadata.chunk_size_bytes())
                    .flatten();
                let mut chunk_refs = Vec::new();
                for indices in chunk_indices(&grid_shape) {
                    let Some(byte_range) = dataset.chunk_byte_range(&indices)? else {
                        continue;
                    };
                    if let Some(expected_size) = expected_size {
                        if byte_range.length != expected_size {
                            return Err(TranslatorError::Integrity {
                                dataset: name.to_string(),
                                reason: format!(
                                    "uncompressed chunk {indices:?} has {} bytes, expected {}",
                                    byte_range.length, expected_size
                                ),
                            });
                        }
                    }
                    chunk_refs.push((chunk_key(&indices), byte_range));
                }
                chunk_refs
            }
        };
        Ok((metadata, DatasetContent::ChunkRefs(chunk_refs)))
    }

    /// The chunk shape of a contiguous dataset: the whole shape, or rows of the first dimension up to the maximum chunk size.
    fn contiguous_chunk_shape(&self, shape: &[u64], item_size: u64) -> Vec<u64> {
        let mut chunk_shape: Vec<u64> = shape.iter().map(|&size| size.max(1)).collect();
        let row_size = item_size * shape[1..].iter().product::<u64>();
        let total_size = row_size * shape[0];
        if let Some(max_chunk_size) = self.options.contiguous_dataset_max_chunk_size {
            if total_size > max_chunk_size && row_size > 0 {
                chunk_shape[0] = (max_chunk_size / row_size).clamp(1, shape[0]);
            }
        }
        chunk_shape
    }

    /// Write the `.zgroup` and `.zattrs` of the group at `path`.
    ///
    /// # Errors
    /// Returns a [`TranslatorError`] if `path` is invalid or an attribute cannot be encoded.
    pub fn add_group(
        &self,
        manifest: &mut ReferenceManifest,
        path: &str,
        attributes: &AttributeMap,
    ) -> Result<(), TranslatorError> {
        let prefix = StorePrefix::from_node_path(path)?;
        manifest.insert(
            format!("{prefix}{ZGROUP}"),
            ManifestReference::inline_json(&GroupMetadataV2::new())?,
        )?;
        manifest.insert(
            format!("{prefix}{ZATTRS}"),
            ManifestReference::InlineObject(encode_attributes(attributes)?),
        )?;
        Ok(())
    }

    /// Write the `.zarray`, `.zattrs` and chunks of the array at `path`.
    ///
    /// # Errors
    /// Returns [`TranslatorError::MissingSourceUrl`] if chunks are referenced by byte range and no source URL is set, or an error if `path` is invalid or an attribute cannot be encoded.
    pub fn add_dataset(
        &self,
        manifest: &mut ReferenceManifest,
        path: &str,
        decision: &DatasetLayoutDecision,
    ) -> Result<(), TranslatorError> {
        let prefix = StorePrefix::from_node_path(path)?;
        if prefix == StorePrefix::root() {
            return Err(TranslatorError::InvalidPath(
                format!("an array cannot be the root node: {path:?}").into(),
            ));
        }
        let chunk_location = match &decision.content {
            DatasetContent::ChunkRefs(chunk_refs) if !chunk_refs.is_empty() => Some(
                self.options
                    .source_url
                    .as_ref()
                    .ok_or_else(|| TranslatorError::MissingSourceUrl(path.to_string()))?,
            ),
            _ => None,
        };

        manifest.insert(
            format!("{prefix}{ZARRAY}"),
            ManifestReference::inline_json(&decision.metadata)?,
        )?;
        manifest.insert(
            format!("{prefix}{ZATTRS}"),
            ManifestReference::InlineObject(encode_attributes(&decision.attributes)?),
        )?;
        match &decision.content {
            DatasetContent::ChunkRefs(chunk_refs) => {
                if let Some(location) = chunk_location {
                    for (key, byte_range) in chunk_refs {
                        manifest.insert(
                            format!("{prefix}{key}"),
                            ByteRangeReference::new(
                                location.as_str(),
                                byte_range.offset,
                                byte_range.length,
                            )
                            .into(),
                        )?;
                    }
                }
            }
            DatasetContent::Inline { key, data } => {
                manifest.insert(format!("{prefix}{key}"), ManifestReference::from_bytes(data))?;
            }
            DatasetContent::ExternalLink { .. } => {}
        }
        Ok(())
    }

    /// Decide how `dataset` is represented and write it at `path`.
    ///
    /// # Errors
    /// Returns a [`TranslatorError`] if [`decide`](Self::decide) or [`add_dataset`](Self::add_dataset) fails.
    pub fn translate_dataset(
        &self,
        manifest: &mut ReferenceManifest,
        path: &str,
        dataset: &dyn SourceDataset,
    ) -> Result<DatasetLayoutDecision, TranslatorError> {
        let decision = self.decide(dataset)?;
        self.add_dataset(manifest, path, &decision)?;
        Ok(decision)
    }

    /// Finish a translated manifest: introduce templates for repeated URLs and record how it was generated.
    pub fn finalize(&self, manifest: &mut ReferenceManifest) {
        manifest.extract_templates();
        let mut generation_metadata = serde_json::Map::new();
        generation_metadata.insert("generatedBy".to_string(), "lindi".into());
        generation_metadata.insert(
            "generatedByVersion".to_string(),
            env!("CARGO_PKG_VERSION").into(),
        );
        if let Some(source_url) = &self.options.source_url {
            generation_metadata.insert("sourceUrl".to_string(), source_url.as_str().into());
        }
        manifest.set_generation_metadata(generation_metadata);
    }
}

fn fill_value(dataset: &dyn SourceDataset) -> FillValueMetadataV2 {
    if dataset.dtype().is_object() {
        return FillValueMetadataV2::Null;
    }
    match dataset.fill_value() {
        SourceFillValue::None => FillValueMetadataV2::Null,
        SourceFillValue::Bool(value) => FillValueMetadataV2::Bool(value),
        SourceFillValue::Int(value) => FillValueMetadataV2::Number(value.into()),
        SourceFillValue::UInt(value) => FillValueMetadataV2::Number(value.into()),
        SourceFillValue::Float(value) => FillValueMetadataV2::from_f64(value),
        SourceFillValue::Bytes(value) => {
            FillValueMetadataV2::String(String::from_utf8_lossy(&value).into_owned())
        }
    }
}

/// The byte ranges of the chunks of a contiguous dataset. The final chunk may be shorter than the others.
fn contiguous_chunk_refs(
    name: &str,
    metadata: &ArrayMetadataV2,
    grid_shape: &[u64],
    item_size: u64,
    byte_range: Option<ByteRange>,
) -> Result<Vec<(String, ByteRange)>, TranslatorError> {
    let Some(byte_range) = byte_range else {
        return Ok(vec![]);
    };
    let total_size = item_size * metadata.shape.iter().product::<u64>();
    if total_size == 0 {
        return Ok(vec![]);
    }
    if byte_range.length != total_size {
        return Err(TranslatorError::Integrity {
            dataset: name.to_string(),
            reason: format!(
                "contiguous storage has {} bytes, expected {total_size}",
                byte_range.length
            ),
        });
    }
    let chunk_size = metadata.chunk_size_bytes().unwrap_or(total_size);
    let trailing_indices = vec![0; grid_shape.len() - 1];
    Ok((0..grid_shape[0])
        .map(|i| {
            let offset = i * chunk_size;
            let mut indices = vec![i];
            indices.extend_from_slice(&trailing_indices);
            (
                chunk_key(&indices),
                ByteRange::new(
                    byte_range.offset + offset,
                    chunk_size.min(total_size - offset),
                ),
            )
        })
        .collect())
}

fn decide_scalar(
    dataset: &dyn SourceDataset,
) -> Result<(ArrayMetadataV2, DatasetContent), TranslatorError> {
    let dtype = dataset.dtype();
    if dtype.is_object() {
        return decide_object(dataset, &[1]);
    }
    let zarr_dtype = dtype.zarr_dtype();
    let data = dataset.read_raw()?;
    if Some(data.len() as u64) != zarr_dtype.item_size() {
        return Err(TranslatorError::Integrity {
            dataset: dataset.name().to_string(),
            reason: format!(
                "scalar has {} bytes, expected {:?}",
                data.len(),
                zarr_dtype.item_size()
            ),
        });
    }
    let metadata = ArrayMetadataV2::new(vec![1], vec![1], zarr_dtype, fill_value(dataset));
    Ok((
        metadata,
        DatasetContent::Inline {
            key: "0".to_string(),
            data,
        },
    ))
}

/// Encode every element of an object or compound dataset inline with the `json2` codec.
fn decide_object(
    dataset: &dyn SourceDataset,
    shape: &[u64],
) -> Result<(ArrayMetadataV2, DatasetContent), TranslatorError> {
    let name = dataset.name();
    let dtype = dataset.dtype();
    let values = dataset.read_values()?;
    let num_elements: u64 = shape.iter().product();
    if values.len() as u64 != num_elements {
        return Err(TranslatorError::Integrity {
            dataset: name.to_string(),
            reason: format!("read {} values, expected {num_elements}", values.len()),
        });
    }
    check_references(dataset, values.iter())?;

    let encoded = values
        .iter()
        .map(|value| encode_element(name, dtype, value))
        .collect::<Result<Vec<_>, _>>()?;
    let zarr_dtype = dtype.zarr_dtype();
    let zarr_dtype_str = zarr_dtype.as_simple().unwrap_or_default().to_string();
    let data = json2_encode(encoded, &zarr_dtype_str, shape)?;

    let chunk_shape: Vec<u64> = shape.iter().map(|&size| size.max(1)).collect();
    let indices = vec![0; shape.len()];
    let metadata = ArrayMetadataV2::new(
        shape.to_vec(),
        chunk_shape,
        zarr_dtype,
        FillValueMetadataV2::Null,
    )
    .with_filters(vec![Json2CodecConfigurationNumcodecs::default().to_metadata()?]);
    Ok((
        metadata,
        DatasetContent::Inline {
            key: chunk_key(&indices),
            data,
        },
    ))
}

fn encode_element(
    name: &str,
    dtype: &SourceDataType,
    value: &AttributeValue,
) -> Result<serde_json::Value, TranslatorError> {
    match (dtype, value) {
        // strings are not floats, so the float sentinels are not ambiguous
        (
            SourceDataType::VariableString | SourceDataType::FixedString(_),
            AttributeValue::String(string),
        ) => Ok(serde_json::Value::String(string.clone())),
        (SourceDataType::Compound(fields), AttributeValue::List(field_values)) => {
            if fields.len() != field_values.len() {
                return Err(TranslatorError::Integrity {
                    dataset: name.to_string(),
                    reason: format!(
                        "compound element has {} fields, expected {}",
                        field_values.len(),
                        fields.len()
                    ),
                });
            }
            Ok(serde_json::Value::Array(
                std::iter::zip(fields, field_values)
                    .map(|(field, value)| encode_element(name, &field.dtype, value))
                    .collect::<Result<_, _>>()?,
            ))
        }
        (SourceDataType::Compound(_), _) => Err(TranslatorError::Integrity {
            dataset: name.to_string(),
            reason: "compound element is not a list of field values".to_string(),
        }),
        (_, value) => Ok(value.encode()?),
    }
}

fn compound_dtype_attribute(
    dataset: &dyn SourceDataset,
) -> Result<AttributeValue, TranslatorError> {
    let SourceDataType::Compound(fields) = dataset.dtype() else {
        return Ok(AttributeValue::Null);
    };
    let fields = fields
        .iter()
        .map(|field| {
            let dtype = match &field.dtype {
                SourceDataType::Reference => REFERENCE_DTYPE.to_string(),
                SourceDataType::Compound(_) => {
                    return Err(TranslatorError::UnsupportedDataType {
                        dataset: dataset.name().to_string(),
                        reason: format!("nested compound field {}", field.name),
                    })
                }
                dtype => dtype
                    .zarr_dtype()
                    .as_simple()
                    .unwrap_or_default()
                    .to_string(),
            };
            Ok(AttributeValue::List(vec![
                field.name.as_str().into(),
                dtype.as_str().into(),
            ]))
        })
        .collect::<Result<_, TranslatorError>>()?;
    Ok(AttributeValue::List(fields))
}

/// Check that every reference points into the source file.
fn check_references<'a>(
    dataset: &dyn SourceDataset,
    values: impl Iterator<Item = &'a AttributeValue>,
) -> Result<(), TranslatorError> {
    let Some(file_object_id) = dataset.file_object_id() else {
        return Ok(());
    };
    for value in values {
        for reference in value.references() {
            if reference.source_object_id != file_object_id {
                return Err(TranslatorError::Integrity {
                    dataset: dataset.name().to_string(),
                    reason: format!(
                        "reference to {} is from file {}, expected {file_object_id}",
                        reference.path, reference.source_object_id
                    ),
                });
            }
        }
    }
    Ok(())
}
