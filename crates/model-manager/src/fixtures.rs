//! Synthetic TFLite models for tests
//!
//! Builds a single-subgraph classifier (`input -> FULLY_CONNECTED -> output`)
//! with the flatbuffers builder, so tests do not depend on binary model files.

use flatbuffers::{FlatBufferBuilder, TableFinishedWIPOffset, Vector, WIPOffset};

use common::models::{
    AssociatedFile, ContentProperties, ModelMetadata, NormalizationOptions, ProcessUnit, Stats,
    SubGraphMetadata, TensorMetadata,
};
use common::types::{AssociatedFileType, ColorSpace};

use crate::schema::{tensor_type, vt, TFLITE_FILE_IDENTIFIER};

const FULLY_CONNECTED: i32 = 9;

/// Shape of the synthetic classifier
#[derive(Debug, Clone)]
pub struct ClassifierSpec {
    /// Input image shape
    pub input_shape: Vec<i32>,

    /// Output scores shape; the last dimension is the class count
    pub output_shape: Vec<i32>,

    /// Extra metadata entries, each with its own buffer
    pub extra_metadata: Vec<(String, Vec<u8>)>,

    /// Keep the weights outside the flatbuffer (`Buffer.offset`)
    pub external_weights: bool,
}

impl Default for ClassifierSpec {
    fn default() -> Self {
        Self {
            input_shape: vec![1, 224, 224, 3],
            output_shape: vec![1, 10],
            extra_metadata: Vec::new(),
            external_weights: false,
        }
    }
}

/// Builds the model bytes for `spec`
pub fn build_classifier_model(spec: &ClassifierSpec) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::with_capacity(1024);

    let input_name = fbb.create_string("input_1");
    let weights_name = fbb.create_string("dense/kernel");
    let output_name = fbb.create_string("Identity");
    let description = fbb.create_string("synthetic classifier");
    let subgraph_name = fbb.create_string("main");

    let classes = spec.output_shape.last().copied().filter(|d| *d > 0).unwrap_or(1);
    let channels = spec.input_shape.last().copied().filter(|d| *d > 0).unwrap_or(1);
    let weights: Vec<u8> = (0..(classes * channels * 4)).map(|i| i as u8).collect();

    let input_shape = fbb.create_vector(&spec.input_shape);
    let weights_shape = fbb.create_vector(&[classes, channels]);
    let output_shape = fbb.create_vector(&spec.output_shape);

    let op_inputs = fbb.create_vector(&[0i32, 1]);
    let op_outputs = fbb.create_vector(&[2i32]);
    let sg_inputs = fbb.create_vector(&[0i32]);
    let sg_outputs = fbb.create_vector(&[2i32]);

    // Buffers: sentinel, weights, then one per extra metadata entry
    let mut buffer_offsets = Vec::new();
    buffer_offsets.push({
        let start = fbb.start_table();
        fbb.end_table(start)
    });
    buffer_offsets.push(if spec.external_weights {
        let start = fbb.start_table();
        fbb.push_slot::<u64>(vt::buffer::OFFSET, 4096, 0);
        fbb.push_slot::<u64>(vt::buffer::SIZE, weights.len() as u64, 0);
        fbb.end_table(start)
    } else {
        let data = fbb.create_vector(&weights);
        let start = fbb.start_table();
        fbb.push_slot_always(vt::buffer::DATA, data);
        fbb.end_table(start)
    });
    for (_, contents) in &spec.extra_metadata {
        let data = fbb.create_vector(contents);
        let start = fbb.start_table();
        fbb.push_slot_always(vt::buffer::DATA, data);
        buffer_offsets.push(fbb.end_table(start));
    }
    let buffers = fbb.create_vector(&buffer_offsets);

    let input = tensor(&mut fbb, input_shape, input_name, 0);
    let kernel = tensor(&mut fbb, weights_shape, weights_name, 1);
    let output = tensor(&mut fbb, output_shape, output_name, 0);
    let tensors = fbb.create_vector(&[input, kernel, output]);

    let opcode = {
        let start = fbb.start_table();
        fbb.push_slot::<i8>(vt::operator_code::DEPRECATED_BUILTIN_CODE, FULLY_CONNECTED as i8, 0);
        fbb.push_slot::<i32>(vt::operator_code::VERSION, 1, 1);
        fbb.push_slot::<i32>(vt::operator_code::BUILTIN_CODE, FULLY_CONNECTED, 0);
        fbb.end_table(start)
    };
    let operator_codes = fbb.create_vector(&[opcode]);

    let operator = {
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::operator::OPCODE_INDEX, 0, 0);
        fbb.push_slot_always(vt::operator::INPUTS, op_inputs);
        fbb.push_slot_always(vt::operator::OUTPUTS, op_outputs);
        fbb.end_table(start)
    };
    let operators = fbb.create_vector(&[operator]);

    let subgraph = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::sub_graph::TENSORS, tensors);
        fbb.push_slot_always(vt::sub_graph::INPUTS, sg_inputs);
        fbb.push_slot_always(vt::sub_graph::OUTPUTS, sg_outputs);
        fbb.push_slot_always(vt::sub_graph::OPERATORS, operators);
        fbb.push_slot_always(vt::sub_graph::NAME, subgraph_name);
        fbb.end_table(start)
    };
    let subgraphs = fbb.create_vector(&[subgraph]);

    let entries: Vec<WIPOffset<TableFinishedWIPOffset>> = spec
        .extra_metadata
        .iter()
        .enumerate()
        .map(|(index, (name, _))| {
            let name = fbb.create_string(name);
            let start = fbb.start_table();
            fbb.push_slot_always(vt::metadata::NAME, name);
            fbb.push_slot::<u32>(vt::metadata::BUFFER, (index + 2) as u32, 0);
            fbb.end_table(start)
        })
        .collect();
    let metadata = (!entries.is_empty()).then(|| fbb.create_vector(&entries));

    let model = {
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::model::VERSION, 3, 0);
        fbb.push_slot_always(vt::model::OPERATOR_CODES, operator_codes);
        fbb.push_slot_always(vt::model::SUBGRAPHS, subgraphs);
        fbb.push_slot_always(vt::model::DESCRIPTION, description);
        fbb.push_slot_always(vt::model::BUFFERS, buffers);
        if let Some(metadata) = metadata {
            fbb.push_slot_always(vt::model::METADATA, metadata);
        }
        fbb.end_table(start)
    };

    fbb.finish(model, Some(TFLITE_FILE_IDENTIFIER));
    fbb.finished_data().to_vec()
}

fn tensor<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    shape: WIPOffset<Vector<'a, i32>>,
    name: WIPOffset<&'a str>,
    buffer: u32,
) -> WIPOffset<TableFinishedWIPOffset> {
    let start = fbb.start_table();
    fbb.push_slot_always(vt::tensor::SHAPE, shape);
    fbb.push_slot::<i8>(vt::tensor::TYPE, tensor_type::FLOAT32, 0);
    fbb.push_slot::<u32>(vt::tensor::BUFFER, buffer, 0);
    fbb.push_slot_always(vt::tensor::NAME, name);
    fbb.end_table(start)
}

/// Writes the default classifier to `path`
pub fn write_classifier_model(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let bytes = build_classifier_model(&ClassifierSpec::default());
    std::fs::write(path, &bytes)?;
    Ok(bytes)
}

/// Metadata for a classifier with the given tensor counts
///
/// Every input is an RGB image; the first output records `labels.txt`.
pub fn classifier_metadata(inputs: usize, outputs: usize) -> ModelMetadata {
    let input = TensorMetadata {
        name: Some("image".to_string()),
        description: Some("Input image".to_string()),
        content: Some(ContentProperties::Image { color_space: ColorSpace::Rgb }),
        process_units: vec![ProcessUnit::Normalization(NormalizationOptions {
            mean: vec![0.0; 3],
            std: vec![255.0; 3],
        })],
        stats: Some(Stats { max: vec![255.0; 3], min: vec![0.0; 3] }),
        associated_files: Vec::new(),
    };

    let output_tensors = (0..outputs)
        .map(|index| TensorMetadata {
            name: Some(format!("scores_{}", index)),
            description: Some("Class probabilities".to_string()),
            content: Some(ContentProperties::Feature),
            associated_files: if index == 0 {
                vec![AssociatedFile::new(
                    "labels.txt",
                    "Class labels",
                    AssociatedFileType::TensorAxisLabels,
                )]
            } else {
                Vec::new()
            },
            ..Default::default()
        })
        .collect();

    ModelMetadata {
        name: Some("Synthetic classifier".to_string()),
        description: Some("Test model".to_string()),
        version: Some("v1".to_string()),
        author: Some("tests".to_string()),
        license: Some("MIT".to_string()),
        subgraph_metadata: vec![SubGraphMetadata {
            input_tensor_metadata: vec![input; inputs],
            output_tensor_metadata: output_tensors,
            ..Default::default()
        }],
        ..Default::default()
    }
}
