//! Model metadata codec
//!
//! This module serializes the descriptor tree into a TFLite metadata
//! flatbuffer (identifier `M001`), parses such a buffer back into the tree,
//! and renders the tree as JSON in the schema's field naming.

use flatbuffers::{FlatBufferBuilder, ForwardsUOffset, TableFinishedWIPOffset, Vector, WIPOffset};
use serde_json::{json, Map, Value};

use common::models::{
    AssociatedFile, ContentProperties, ModelMetadata, NormalizationOptions, ProcessUnit, Stats,
    SubGraphMetadata, TensorMetadata,
};
use common::types::{AssociatedFileType, ColorSpace};

use crate::error::{ModelError, Result};
use crate::flatbuf::{self, Table};
use crate::schema::{
    content_properties, process_unit_options, vt, METADATA_FILE_IDENTIFIER, MIN_PARSER_VERSION,
};

type TableOffset = WIPOffset<TableFinishedWIPOffset>;
type TableVector<'a> = WIPOffset<Vector<'a, ForwardsUOffset<TableFinishedWIPOffset>>>;

/// Serializes the descriptor tree into a metadata flatbuffer
///
/// `min_parser_version` is filled in when the tree does not set it.
pub fn create_metadata_buffer(metadata: &ModelMetadata) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::with_capacity(1024);

    let name = metadata.name.as_deref().map(|s| fbb.create_string(s));
    let description = metadata.description.as_deref().map(|s| fbb.create_string(s));
    let version = metadata.version.as_deref().map(|s| fbb.create_string(s));
    let author = metadata.author.as_deref().map(|s| fbb.create_string(s));
    let license = metadata.license.as_deref().map(|s| fbb.create_string(s));
    let min_parser_version = fbb.create_string(
        metadata
            .min_parser_version
            .as_deref()
            .unwrap_or(MIN_PARSER_VERSION),
    );

    let subgraphs: Vec<TableOffset> = metadata
        .subgraph_metadata
        .iter()
        .map(|subgraph| write_subgraph(&mut fbb, subgraph))
        .collect();
    let subgraphs = (!subgraphs.is_empty()).then(|| fbb.create_vector(&subgraphs));
    let associated_files = write_associated_files(&mut fbb, &metadata.associated_files);

    let start = fbb.start_table();
    if let Some(name) = name {
        fbb.push_slot_always(vt::model_metadata::NAME, name);
    }
    if let Some(description) = description {
        fbb.push_slot_always(vt::model_metadata::DESCRIPTION, description);
    }
    if let Some(version) = version {
        fbb.push_slot_always(vt::model_metadata::VERSION, version);
    }
    if let Some(subgraphs) = subgraphs {
        fbb.push_slot_always(vt::model_metadata::SUBGRAPH_METADATA, subgraphs);
    }
    if let Some(author) = author {
        fbb.push_slot_always(vt::model_metadata::AUTHOR, author);
    }
    if let Some(license) = license {
        fbb.push_slot_always(vt::model_metadata::LICENSE, license);
    }
    if let Some(files) = associated_files {
        fbb.push_slot_always(vt::model_metadata::ASSOCIATED_FILES, files);
    }
    fbb.push_slot_always(vt::model_metadata::MIN_PARSER_VERSION, min_parser_version);
    let root = fbb.end_table(start);

    fbb.finish(root, Some(METADATA_FILE_IDENTIFIER));
    fbb.finished_data().to_vec()
}

fn write_subgraph<'a>(fbb: &mut FlatBufferBuilder<'a>, subgraph: &SubGraphMetadata) -> TableOffset {
    let name = subgraph.name.as_deref().map(|s| fbb.create_string(s));
    let description = subgraph.description.as_deref().map(|s| fbb.create_string(s));
    let inputs = write_tensors(fbb, &subgraph.input_tensor_metadata);
    let outputs = write_tensors(fbb, &subgraph.output_tensor_metadata);
    let associated_files = write_associated_files(fbb, &subgraph.associated_files);

    let start = fbb.start_table();
    if let Some(name) = name {
        fbb.push_slot_always(vt::subgraph_metadata::NAME, name);
    }
    if let Some(description) = description {
        fbb.push_slot_always(vt::subgraph_metadata::DESCRIPTION, description);
    }
    if let Some(inputs) = inputs {
        fbb.push_slot_always(vt::subgraph_metadata::INPUT_TENSOR_METADATA, inputs);
    }
    if let Some(outputs) = outputs {
        fbb.push_slot_always(vt::subgraph_metadata::OUTPUT_TENSOR_METADATA, outputs);
    }
    if let Some(files) = associated_files {
        fbb.push_slot_always(vt::subgraph_metadata::ASSOCIATED_FILES, files);
    }
    fbb.end_table(start)
}

fn write_tensors<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    tensors: &[TensorMetadata],
) -> Option<TableVector<'a>> {
    if tensors.is_empty() {
        return None;
    }

    let tables: Vec<TableOffset> = tensors.iter().map(|tensor| write_tensor(fbb, tensor)).collect();
    Some(fbb.create_vector(&tables))
}

fn write_tensor<'a>(fbb: &mut FlatBufferBuilder<'a>, tensor: &TensorMetadata) -> TableOffset {
    let name = tensor.name.as_deref().map(|s| fbb.create_string(s));
    let description = tensor.description.as_deref().map(|s| fbb.create_string(s));
    let content = tensor.content.as_ref().map(|content| write_content(fbb, content));

    let units: Vec<TableOffset> = tensor
        .process_units
        .iter()
        .map(|unit| write_process_unit(fbb, unit))
        .collect();
    let process_units = (!units.is_empty()).then(|| fbb.create_vector(&units));

    let stats = tensor.stats.as_ref().map(|stats| write_stats(fbb, stats));
    let associated_files = write_associated_files(fbb, &tensor.associated_files);

    let start = fbb.start_table();
    if let Some(name) = name {
        fbb.push_slot_always(vt::tensor_metadata::NAME, name);
    }
    if let Some(description) = description {
        fbb.push_slot_always(vt::tensor_metadata::DESCRIPTION, description);
    }
    if let Some(content) = content {
        fbb.push_slot_always(vt::tensor_metadata::CONTENT, content);
    }
    if let Some(units) = process_units {
        fbb.push_slot_always(vt::tensor_metadata::PROCESS_UNITS, units);
    }
    if let Some(stats) = stats {
        fbb.push_slot_always(vt::tensor_metadata::STATS, stats);
    }
    if let Some(files) = associated_files {
        fbb.push_slot_always(vt::tensor_metadata::ASSOCIATED_FILES, files);
    }
    fbb.end_table(start)
}

fn write_content(fbb: &mut FlatBufferBuilder<'_>, content: &ContentProperties) -> TableOffset {
    let (kind, properties) = match content {
        ContentProperties::Feature => {
            let start = fbb.start_table();
            (content_properties::FEATURE_PROPERTIES, fbb.end_table(start))
        }
        ContentProperties::Image { color_space } => {
            let start = fbb.start_table();
            fbb.push_slot::<i8>(vt::image_properties::COLOR_SPACE, color_space.code(), 0);
            (content_properties::IMAGE_PROPERTIES, fbb.end_table(start))
        }
    };

    let start = fbb.start_table();
    fbb.push_slot::<u8>(vt::content::CONTENT_PROPERTIES_TYPE, kind, content_properties::NONE);
    fbb.push_slot_always(vt::content::CONTENT_PROPERTIES, properties);
    fbb.end_table(start)
}

fn write_process_unit(fbb: &mut FlatBufferBuilder<'_>, unit: &ProcessUnit) -> TableOffset {
    let ProcessUnit::Normalization(options) = unit;

    let mean = fbb.create_vector(&options.mean);
    let std = fbb.create_vector(&options.std);
    let start = fbb.start_table();
    fbb.push_slot_always(vt::normalization_options::MEAN, mean);
    fbb.push_slot_always(vt::normalization_options::STD, std);
    let normalization = fbb.end_table(start);

    let start = fbb.start_table();
    fbb.push_slot::<u8>(
        vt::process_unit::OPTIONS_TYPE,
        process_unit_options::NORMALIZATION_OPTIONS,
        process_unit_options::NONE,
    );
    fbb.push_slot_always(vt::process_unit::OPTIONS, normalization);
    fbb.end_table(start)
}

fn write_stats(fbb: &mut FlatBufferBuilder<'_>, stats: &Stats) -> TableOffset {
    let max = (!stats.max.is_empty()).then(|| fbb.create_vector(&stats.max));
    let min = (!stats.min.is_empty()).then(|| fbb.create_vector(&stats.min));

    let start = fbb.start_table();
    if let Some(max) = max {
        fbb.push_slot_always(vt::stats::MAX, max);
    }
    if let Some(min) = min {
        fbb.push_slot_always(vt::stats::MIN, min);
    }
    fbb.end_table(start)
}

fn write_associated_files<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    files: &[AssociatedFile],
) -> Option<TableVector<'a>> {
    if files.is_empty() {
        return None;
    }

    let tables: Vec<TableOffset> = files
        .iter()
        .map(|file| {
            let name = fbb.create_string(&file.name);
            let description = file.description.as_deref().map(|s| fbb.create_string(s));
            let locale = file.locale.as_deref().map(|s| fbb.create_string(s));
            let version = file.version.as_deref().map(|s| fbb.create_string(s));

            let start = fbb.start_table();
            fbb.push_slot_always(vt::associated_file::NAME, name);
            if let Some(description) = description {
                fbb.push_slot_always(vt::associated_file::DESCRIPTION, description);
            }
            fbb.push_slot::<i8>(vt::associated_file::TYPE, file.file_type.code(), 0);
            if let Some(locale) = locale {
                fbb.push_slot_always(vt::associated_file::LOCALE, locale);
            }
            if let Some(version) = version {
                fbb.push_slot_always(vt::associated_file::VERSION, version);
            }
            fbb.end_table(start)
        })
        .collect();

    Some(fbb.create_vector(&tables))
}

/// Parses a metadata flatbuffer back into the descriptor tree
pub fn parse_metadata_buffer(buffer: &[u8]) -> Result<ModelMetadata> {
    let root = flatbuf::root_table(buffer, Some(METADATA_FILE_IDENTIFIER))?;

    Ok(ModelMetadata {
        name: root.owned_string(vt::model_metadata::NAME)?,
        description: root.owned_string(vt::model_metadata::DESCRIPTION)?,
        version: root.owned_string(vt::model_metadata::VERSION)?,
        subgraph_metadata: read_tables(
            &root,
            vt::model_metadata::SUBGRAPH_METADATA,
            read_subgraph,
        )?,
        author: root.owned_string(vt::model_metadata::AUTHOR)?,
        license: root.owned_string(vt::model_metadata::LICENSE)?,
        associated_files: read_tables(
            &root,
            vt::model_metadata::ASSOCIATED_FILES,
            read_associated_file,
        )?,
        min_parser_version: root.owned_string(vt::model_metadata::MIN_PARSER_VERSION)?,
    })
}

fn read_tables<'a, T>(
    table: &Table<'a>,
    slot: flatbuffers::VOffsetT,
    read: impl Fn(&Table<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    match table.vector(slot)? {
        Some(vector) => vector.tables()?.iter().map(read).collect(),
        None => Ok(Vec::new()),
    }
}

fn read_subgraph(table: &Table<'_>) -> Result<SubGraphMetadata> {
    Ok(SubGraphMetadata {
        name: table.owned_string(vt::subgraph_metadata::NAME)?,
        description: table.owned_string(vt::subgraph_metadata::DESCRIPTION)?,
        input_tensor_metadata: read_tables(
            table,
            vt::subgraph_metadata::INPUT_TENSOR_METADATA,
            read_tensor,
        )?,
        output_tensor_metadata: read_tables(
            table,
            vt::subgraph_metadata::OUTPUT_TENSOR_METADATA,
            read_tensor,
        )?,
        associated_files: read_tables(
            table,
            vt::subgraph_metadata::ASSOCIATED_FILES,
            read_associated_file,
        )?,
    })
}

fn read_tensor(table: &Table<'_>) -> Result<TensorMetadata> {
    let content = match table.table(vt::tensor_metadata::CONTENT)? {
        Some(content) => read_content(&content)?,
        None => None,
    };

    let stats = match table.table(vt::tensor_metadata::STATS)? {
        Some(stats) => Some(Stats {
            max: read_floats(&stats, vt::stats::MAX)?,
            min: read_floats(&stats, vt::stats::MIN)?,
        }),
        None => None,
    };

    let units = read_tables(table, vt::tensor_metadata::PROCESS_UNITS, read_process_unit)?;

    Ok(TensorMetadata {
        name: table.owned_string(vt::tensor_metadata::NAME)?,
        description: table.owned_string(vt::tensor_metadata::DESCRIPTION)?,
        content,
        process_units: units.into_iter().flatten().collect(),
        stats,
        associated_files: read_tables(
            table,
            vt::tensor_metadata::ASSOCIATED_FILES,
            read_associated_file,
        )?,
    })
}

fn read_content(table: &Table<'_>) -> Result<Option<ContentProperties>> {
    let kind = table.u8(vt::content::CONTENT_PROPERTIES_TYPE, content_properties::NONE)?;
    match kind {
        content_properties::NONE => Ok(None),
        content_properties::FEATURE_PROPERTIES => Ok(Some(ContentProperties::Feature)),
        content_properties::IMAGE_PROPERTIES => {
            let color_space = match table.table(vt::content::CONTENT_PROPERTIES)? {
                Some(properties) => {
                    ColorSpace::from_code(properties.i8(vt::image_properties::COLOR_SPACE, 0)?)
                }
                None => ColorSpace::Unknown,
            };
            Ok(Some(ContentProperties::Image { color_space }))
        }
        other => Err(ModelError::Unsupported(format!("content properties type {}", other))),
    }
}

/// Reads a process unit; options this crate does not model are skipped
fn read_process_unit(table: &Table<'_>) -> Result<Option<ProcessUnit>> {
    let kind = table.u8(vt::process_unit::OPTIONS_TYPE, process_unit_options::NONE)?;
    if kind != process_unit_options::NORMALIZATION_OPTIONS {
        return Ok(None);
    }

    let options = table
        .table(vt::process_unit::OPTIONS)?
        .ok_or_else(|| ModelError::InvalidModel("normalization unit without options".to_string()))?;

    Ok(Some(ProcessUnit::Normalization(NormalizationOptions {
        mean: read_floats(&options, vt::normalization_options::MEAN)?,
        std: read_floats(&options, vt::normalization_options::STD)?,
    })))
}

fn read_associated_file(table: &Table<'_>) -> Result<AssociatedFile> {
    Ok(AssociatedFile {
        name: table.owned_string(vt::associated_file::NAME)?.unwrap_or_default(),
        description: table.owned_string(vt::associated_file::DESCRIPTION)?,
        file_type: AssociatedFileType::from_code(table.i8(vt::associated_file::TYPE, 0)?),
        locale: table.owned_string(vt::associated_file::LOCALE)?,
        version: table.owned_string(vt::associated_file::VERSION)?,
    })
}

fn read_floats(table: &Table<'_>, slot: flatbuffers::VOffsetT) -> Result<Vec<f32>> {
    match table.vector(slot)? {
        Some(vector) => Ok(vector.f32s()?),
        None => Ok(Vec::new()),
    }
}

/// Renders the descriptor tree as JSON with the schema's snake_case field names
///
/// Absent fields are omitted and union members are tagged by type name.
pub fn metadata_to_json(metadata: &ModelMetadata) -> Value {
    let mut root = Map::new();
    insert_str(&mut root, "name", &metadata.name);
    insert_str(&mut root, "description", &metadata.description);
    insert_str(&mut root, "version", &metadata.version);
    if !metadata.subgraph_metadata.is_empty() {
        root.insert(
            "subgraph_metadata".to_string(),
            Value::Array(metadata.subgraph_metadata.iter().map(subgraph_to_json).collect()),
        );
    }
    insert_str(&mut root, "author", &metadata.author);
    insert_str(&mut root, "license", &metadata.license);
    insert_files(&mut root, &metadata.associated_files);
    insert_str(&mut root, "min_parser_version", &metadata.min_parser_version);

    Value::Object(root)
}

fn subgraph_to_json(subgraph: &SubGraphMetadata) -> Value {
    let mut object = Map::new();
    insert_str(&mut object, "name", &subgraph.name);
    insert_str(&mut object, "description", &subgraph.description);
    if !subgraph.input_tensor_metadata.is_empty() {
        object.insert(
            "input_tensor_metadata".to_string(),
            Value::Array(subgraph.input_tensor_metadata.iter().map(tensor_to_json).collect()),
        );
    }
    if !subgraph.output_tensor_metadata.is_empty() {
        object.insert(
            "output_tensor_metadata".to_string(),
            Value::Array(subgraph.output_tensor_metadata.iter().map(tensor_to_json).collect()),
        );
    }
    insert_files(&mut object, &subgraph.associated_files);

    Value::Object(object)
}

fn tensor_to_json(tensor: &TensorMetadata) -> Value {
    let mut object = Map::new();
    insert_str(&mut object, "name", &tensor.name);
    insert_str(&mut object, "description", &tensor.description);

    if let Some(content) = &tensor.content {
        let content = match content {
            ContentProperties::Feature => json!({
                "content_properties_type": "FeatureProperties",
                "content_properties": {}
            }),
            ContentProperties::Image { color_space } => json!({
                "content_properties_type": "ImageProperties",
                "content_properties": { "color_space": color_space.to_string() }
            }),
        };
        object.insert("content".to_string(), content);
    }

    if !tensor.process_units.is_empty() {
        let units = tensor
            .process_units
            .iter()
            .map(|unit| match unit {
                ProcessUnit::Normalization(options) => json!({
                    "options_type": "NormalizationOptions",
                    "options": { "mean": options.mean, "std": options.std }
                }),
            })
            .collect();
        object.insert("process_units".to_string(), Value::Array(units));
    }

    if let Some(stats) = &tensor.stats {
        let mut stats_object = Map::new();
        if !stats.max.is_empty() {
            stats_object.insert("max".to_string(), json!(stats.max));
        }
        if !stats.min.is_empty() {
            stats_object.insert("min".to_string(), json!(stats.min));
        }
        object.insert("stats".to_string(), Value::Object(stats_object));
    }

    insert_files(&mut object, &tensor.associated_files);

    Value::Object(object)
}

fn insert_str(object: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value.clone()));
    }
}

fn insert_files(object: &mut Map<String, Value>, files: &[AssociatedFile]) {
    if files.is_empty() {
        return;
    }

    let files = files
        .iter()
        .map(|file| {
            let mut entry = Map::new();
            entry.insert("name".to_string(), Value::String(file.name.clone()));
            insert_str(&mut entry, "description", &file.description);
            entry.insert("type".to_string(), Value::String(file.file_type.to_string()));
            insert_str(&mut entry, "locale", &file.locale);
            insert_str(&mut entry, "version", &file.version);
            Value::Object(entry)
        })
        .collect();
    object.insert("associated_files".to_string(), Value::Array(files));
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::ModelDescriptor;

    fn sample_tree() -> ModelMetadata {
        let mut metadata = ModelMetadata::from_descriptor(&ModelDescriptor {
            name: "Leaf Classifier".into(),
            description: "Classifies leaves.".into(),
            version: "v0.3.0".into(),
            author: "Agronomy Lab".into(),
            license: "MIT".into(),
        });

        metadata.subgraph_metadata.push(SubGraphMetadata {
            input_tensor_metadata: vec![TensorMetadata {
                name: Some("image".into()),
                description: Some("RGB image".into()),
                content: Some(ContentProperties::Image { color_space: ColorSpace::Rgb }),
                process_units: vec![ProcessUnit::Normalization(NormalizationOptions {
                    mean: vec![127.5; 3],
                    std: vec![127.5; 3],
                })],
                stats: Some(Stats { max: vec![1.0; 3], min: vec![-1.0; 3] }),
                associated_files: Vec::new(),
            }],
            output_tensor_metadata: vec![TensorMetadata {
                name: Some("scores".into()),
                description: Some("Class scores".into()),
                content: Some(ContentProperties::Feature),
                associated_files: vec![AssociatedFile::new(
                    "labels.txt",
                    "Class names",
                    AssociatedFileType::TensorAxisLabels,
                )],
                ..Default::default()
            }],
            ..Default::default()
        });

        metadata
    }

    #[test]
    fn buffer_carries_the_metadata_identifier() {
        let buffer = create_metadata_buffer(&sample_tree());
        assert_eq!(&buffer[4..8], b"M001");
    }

    #[test]
    fn parsing_restores_the_tree() {
        let tree = sample_tree();
        let parsed = parse_metadata_buffer(&create_metadata_buffer(&tree)).unwrap();

        let mut expected = tree;
        expected.min_parser_version = Some(MIN_PARSER_VERSION.to_string());
        assert_eq!(parsed, expected);
    }

    #[test]
    fn model_flatbuffer_is_not_metadata() {
        let err = parse_metadata_buffer(b"\x0c\x00\x00\x00TFL3\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, ModelError::Flatbuffer(_)));
    }

    #[test]
    fn json_uses_schema_names_and_order() {
        let buffer = create_metadata_buffer(&sample_tree());
        let json = metadata_to_json(&parse_metadata_buffer(&buffer).unwrap());

        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "description",
                "version",
                "subgraph_metadata",
                "author",
                "license",
                "min_parser_version"
            ]
        );

        let input = &json["subgraph_metadata"][0]["input_tensor_metadata"][0];
        assert_eq!(input["content"]["content_properties_type"], "ImageProperties");
        assert_eq!(input["content"]["content_properties"]["color_space"], "RGB");
        assert_eq!(input["process_units"][0]["options_type"], "NormalizationOptions");
        assert_eq!(input["process_units"][0]["options"]["std"], json!([127.5, 127.5, 127.5]));
        assert_eq!(input["stats"]["min"], json!([-1.0, -1.0, -1.0]));

        let output = &json["subgraph_metadata"][0]["output_tensor_metadata"][0];
        assert_eq!(output["content"]["content_properties_type"], "FeatureProperties");
        assert_eq!(output["associated_files"][0]["type"], "TENSOR_AXIS_LABELS");
        assert!(output.get("stats").is_none());
    }
}
