//! Common types for the metadata tooling
//!
//! Enumerations shared between the configuration layer and the metadata
//! schema codec. Each carries the numeric code used in the serialized schema.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Color space of an image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorSpace {
    /// Unspecified color space
    Unknown,
    /// Three channel RGB
    Rgb,
    /// Single channel grayscale
    Grayscale,
}

impl ColorSpace {
    /// Numeric code in the metadata schema
    pub fn code(self) -> i8 {
        match self {
            ColorSpace::Unknown => 0,
            ColorSpace::Rgb => 1,
            ColorSpace::Grayscale => 2,
        }
    }

    /// Decodes a schema code, mapping unknown values to `Unknown`
    pub fn from_code(code: i8) -> Self {
        match code {
            1 => ColorSpace::Rgb,
            2 => ColorSpace::Grayscale,
            _ => ColorSpace::Unknown,
        }
    }

    /// Number of channels implied by the color space, if fixed
    pub fn channels(self) -> Option<usize> {
        match self {
            ColorSpace::Unknown => None,
            ColorSpace::Rgb => Some(3),
            ColorSpace::Grayscale => Some(1),
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Unknown => write!(f, "UNKNOWN"),
            ColorSpace::Rgb => write!(f, "RGB"),
            ColorSpace::Grayscale => write!(f, "GRAYSCALE"),
        }
    }
}

/// Role of a file packed alongside the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociatedFileType {
    /// Unspecified
    Unknown,
    /// Free-form descriptions
    Descriptions,
    /// Labels along the axis of a tensor, one per line
    TensorAxisLabels,
    /// Labels for tensor values
    TensorValueLabels,
    /// Score calibration parameters
    TensorAxisScoreCalibration,
    /// Tokenizer vocabulary
    Vocabulary,
    /// ScaNN index
    ScannIndexFile,
}

impl AssociatedFileType {
    /// Numeric code in the metadata schema
    pub fn code(self) -> i8 {
        match self {
            AssociatedFileType::Unknown => 0,
            AssociatedFileType::Descriptions => 1,
            AssociatedFileType::TensorAxisLabels => 2,
            AssociatedFileType::TensorValueLabels => 3,
            AssociatedFileType::TensorAxisScoreCalibration => 4,
            AssociatedFileType::Vocabulary => 5,
            AssociatedFileType::ScannIndexFile => 6,
        }
    }

    /// Decodes a schema code, mapping unknown values to `Unknown`
    pub fn from_code(code: i8) -> Self {
        match code {
            1 => AssociatedFileType::Descriptions,
            2 => AssociatedFileType::TensorAxisLabels,
            3 => AssociatedFileType::TensorValueLabels,
            4 => AssociatedFileType::TensorAxisScoreCalibration,
            5 => AssociatedFileType::Vocabulary,
            6 => AssociatedFileType::ScannIndexFile,
            _ => AssociatedFileType::Unknown,
        }
    }
}

impl fmt::Display for AssociatedFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociatedFileType::Unknown => "UNKNOWN",
            AssociatedFileType::Descriptions => "DESCRIPTIONS",
            AssociatedFileType::TensorAxisLabels => "TENSOR_AXIS_LABELS",
            AssociatedFileType::TensorValueLabels => "TENSOR_VALUE_LABELS",
            AssociatedFileType::TensorAxisScoreCalibration => "TENSOR_AXIS_SCORE_CALIBRATION",
            AssociatedFileType::Vocabulary => "VOCABULARY",
            AssociatedFileType::ScannIndexFile => "SCANN_INDEX_FILE",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_space_codes_round_trip() {
        for space in [ColorSpace::Unknown, ColorSpace::Rgb, ColorSpace::Grayscale] {
            assert_eq!(ColorSpace::from_code(space.code()), space);
        }
        assert_eq!(ColorSpace::from_code(42), ColorSpace::Unknown);
    }

    #[test]
    fn associated_file_type_serializes_like_the_schema() {
        let json = serde_json::to_string(&AssociatedFileType::TensorAxisLabels).unwrap();
        assert_eq!(json, "\"TENSOR_AXIS_LABELS\"");
        assert_eq!(AssociatedFileType::TensorAxisLabels.to_string(), "TENSOR_AXIS_LABELS");
        assert_eq!(AssociatedFileType::from_code(2), AssociatedFileType::TensorAxisLabels);
    }
}
