//! TFLite and TFLite-metadata schema constants
//!
//! Field slots are vtable offsets (`4 + 2 * field_index`) so they can be
//! passed straight to `FlatBufferBuilder::push_slot` and to the table reader.

/// File identifier of a TFLite model flatbuffer
pub const TFLITE_FILE_IDENTIFIER: &str = "TFL3";

/// File identifier of a metadata flatbuffer
pub const METADATA_FILE_IDENTIFIER: &str = "M001";

/// Name of the model metadata entry holding the metadata buffer
pub const METADATA_FIELD_NAME: &str = "TFLITE_METADATA";

/// Oldest metadata parser that understands the fields this crate writes
pub const MIN_PARSER_VERSION: &str = "1.0.0";

/// Alignment of buffer data in the model
pub const BUFFER_ALIGNMENT: usize = 16;

/// Vtable offsets, grouped by table
pub mod vt {
    use flatbuffers::VOffsetT;

    pub mod model {
        use super::VOffsetT;
        pub const VERSION: VOffsetT = 4;
        pub const OPERATOR_CODES: VOffsetT = 6;
        pub const SUBGRAPHS: VOffsetT = 8;
        pub const DESCRIPTION: VOffsetT = 10;
        pub const BUFFERS: VOffsetT = 12;
        pub const METADATA_BUFFER: VOffsetT = 14;
        pub const METADATA: VOffsetT = 16;
        pub const SIGNATURE_DEFS: VOffsetT = 18;

        /// Offset-typed fields carried over unchanged when the root is rewritten
        pub const PASSTHROUGH: [VOffsetT; 5] =
            [OPERATOR_CODES, SUBGRAPHS, DESCRIPTION, METADATA_BUFFER, SIGNATURE_DEFS];

        /// One past the last known slot
        pub const END: VOffsetT = 20;
    }

    pub mod sub_graph {
        use super::VOffsetT;
        pub const TENSORS: VOffsetT = 4;
        pub const INPUTS: VOffsetT = 6;
        pub const OUTPUTS: VOffsetT = 8;
        pub const OPERATORS: VOffsetT = 10;
        pub const NAME: VOffsetT = 12;
    }

    pub mod tensor {
        use super::VOffsetT;
        pub const SHAPE: VOffsetT = 4;
        pub const TYPE: VOffsetT = 6;
        pub const BUFFER: VOffsetT = 8;
        pub const NAME: VOffsetT = 10;
    }

    pub mod buffer {
        use super::VOffsetT;
        pub const DATA: VOffsetT = 4;
        pub const OFFSET: VOffsetT = 6;
        pub const SIZE: VOffsetT = 8;
    }

    pub mod metadata {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const BUFFER: VOffsetT = 6;
    }

    pub mod operator_code {
        use super::VOffsetT;
        pub const DEPRECATED_BUILTIN_CODE: VOffsetT = 4;
        pub const VERSION: VOffsetT = 8;
        pub const BUILTIN_CODE: VOffsetT = 10;
    }

    pub mod operator {
        use super::VOffsetT;
        pub const OPCODE_INDEX: VOffsetT = 4;
        pub const INPUTS: VOffsetT = 6;
        pub const OUTPUTS: VOffsetT = 8;
    }

    pub mod model_metadata {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const DESCRIPTION: VOffsetT = 6;
        pub const VERSION: VOffsetT = 8;
        pub const SUBGRAPH_METADATA: VOffsetT = 10;
        pub const AUTHOR: VOffsetT = 12;
        pub const LICENSE: VOffsetT = 14;
        pub const ASSOCIATED_FILES: VOffsetT = 16;
        pub const MIN_PARSER_VERSION: VOffsetT = 18;
    }

    pub mod subgraph_metadata {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const DESCRIPTION: VOffsetT = 6;
        pub const INPUT_TENSOR_METADATA: VOffsetT = 8;
        pub const OUTPUT_TENSOR_METADATA: VOffsetT = 10;
        pub const ASSOCIATED_FILES: VOffsetT = 12;
    }

    pub mod tensor_metadata {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const DESCRIPTION: VOffsetT = 6;
        pub const DIMENSION_NAMES: VOffsetT = 8;
        pub const CONTENT: VOffsetT = 10;
        pub const PROCESS_UNITS: VOffsetT = 12;
        pub const STATS: VOffsetT = 14;
        pub const ASSOCIATED_FILES: VOffsetT = 16;
    }

    pub mod content {
        use super::VOffsetT;
        pub const CONTENT_PROPERTIES_TYPE: VOffsetT = 4;
        pub const CONTENT_PROPERTIES: VOffsetT = 6;
    }

    pub mod image_properties {
        use super::VOffsetT;
        pub const COLOR_SPACE: VOffsetT = 4;
    }

    pub mod process_unit {
        use super::VOffsetT;
        pub const OPTIONS_TYPE: VOffsetT = 4;
        pub const OPTIONS: VOffsetT = 6;
    }

    pub mod normalization_options {
        use super::VOffsetT;
        pub const MEAN: VOffsetT = 4;
        pub const STD: VOffsetT = 6;
    }

    pub mod stats {
        use super::VOffsetT;
        pub const MAX: VOffsetT = 4;
        pub const MIN: VOffsetT = 6;
    }

    pub mod associated_file {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const DESCRIPTION: VOffsetT = 6;
        pub const TYPE: VOffsetT = 8;
        pub const LOCALE: VOffsetT = 10;
        pub const VERSION: VOffsetT = 12;
    }
}

/// `ContentProperties` union tags
pub mod content_properties {
    pub const NONE: u8 = 0;
    pub const FEATURE_PROPERTIES: u8 = 1;
    pub const IMAGE_PROPERTIES: u8 = 2;
}

/// `ProcessUnitOptions` union tags
pub mod process_unit_options {
    pub const NONE: u8 = 0;
    pub const NORMALIZATION_OPTIONS: u8 = 1;
}

/// `TensorType` values
pub mod tensor_type {
    pub const FLOAT32: i8 = 0;
}
