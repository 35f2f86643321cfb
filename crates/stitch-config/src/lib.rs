//! Stitch job configuration.
//!
//! Turns the flat option set a user types (or a batch manifest carries) into a
//! validated [`JobConfiguration`] that an engine consumes. Building is a pure
//! function: lenient fallbacks are reported as [`BuildNote`]s instead of being
//! logged here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

mod builder;
mod parse;

pub use builder::{ConfigBuilder, RawOptions};
pub use parse::{parse_frame_indices, parse_int_lenient, parse_output_size};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("can not find input file")]
    MissingInput,
    #[error("can not find output file")]
    MissingOutput,
    #[error("unsupported input type '{0}'")]
    UnsupportedInput(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StitchType {
    Template,
    #[default]
    Optflow,
    DynamicStitch,
    AiStitch,
}

impl StitchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StitchType::Template => "template",
            StitchType::Optflow => "optflow",
            StitchType::DynamicStitch => "dynamicstitch",
            StitchType::AiStitch => "aistitch",
        }
    }

    /// Resolve a stitch type name. The versioned AI aliases also name the
    /// model file they expect to find in the model directory.
    pub fn resolve(name: &str) -> Option<(StitchType, Option<&'static str>)> {
        match name.trim().to_ascii_lowercase().as_str() {
            "template" => Some((StitchType::Template, None)),
            "optflow" => Some((StitchType::Optflow, None)),
            "dynamicstitch" => Some((StitchType::DynamicStitch, None)),
            "aistitch" => Some((StitchType::AiStitch, None)),
            "aistitchv1" => Some((StitchType::AiStitch, Some("ai_stitcher_v1.ins"))),
            "aistitchv2" => Some((StitchType::AiStitch, Some("ai_stitcher_v2.ins"))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageType {
    #[default]
    Jpeg,
    Png,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
        }
    }

    pub fn resolve(name: &str) -> Option<ImageType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpg" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            _ => None,
        }
    }
}

/// Lens accessory code understood by the engine; 0 is the bare camera.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessoryType(pub i32);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Single still stitch (`.insp`, `.jpg`).
    ImageStitch,
    /// Video to a stitched video file.
    VideoStitch,
    /// Video to a directory of stitched frames.
    ImageSequence,
    /// Live camera stream to an on-screen preview.
    LivePreview,
}

impl ProcessingMode {
    /// Pick the mode from the extension of the first input.
    pub fn for_input(path: &str, wants_sequence: bool) -> Result<Self, ConfigurationError> {
        let suffix = match path.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => path,
        }
        .to_ascii_lowercase();
        match suffix.as_str() {
            "insp" | "jpg" => Ok(ProcessingMode::ImageStitch),
            "mp4" | "insv" | "lrv" if wants_sequence => Ok(ProcessingMode::ImageSequence),
            "mp4" | "insv" | "lrv" => Ok(ProcessingMode::VideoStitch),
            _ => Err(ConfigurationError::UnsupportedInput(suffix)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 960,
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    ImageSequence {
        dir: PathBuf,
        image_type: ImageType,
        /// Frames to export; empty means every frame.
        frame_indices: Vec<u64>,
    },
    /// Frames go to the frame callback only.
    Preview,
}

/// A feature switch that may carry a model file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelToggle {
    pub enabled: bool,
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Feature {
    Denoise,
    ColorPlus,
    Deflicker,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Denoise => "denoise",
            Feature::ColorPlus => "colorplus",
            Feature::Deflicker => "deflicker",
        }
    }

    /// Whether the engine refuses to run this feature without a model.
    pub fn requires_model(&self) -> bool {
        matches!(self, Feature::ColorPlus | Feature::Deflicker)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Features {
    pub flowstate: bool,
    pub direction_lock: bool,
    pub stitch_fusion: bool,
    pub denoise: ModelToggle,
    pub colorplus: ModelToggle,
    pub deflicker: ModelToggle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodecOptions {
    pub h265: bool,
    pub cuda: bool,
    pub soft_encode: bool,
    pub soft_decode: bool,
    /// Output bitrate; 0 keeps the source bitrate.
    pub bitrate: u64,
}

/// Everything an engine needs to run one stitch job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfiguration {
    pub inputs: Vec<PathBuf>,
    pub mode: ProcessingMode,
    pub output: OutputTarget,
    pub output_size: OutputSize,
    pub stitch_type: StitchType,
    pub ai_model: Option<PathBuf>,
    pub features: Features,
    pub codec: CodecOptions,
    pub accessory: AccessoryType,
}

impl JobConfiguration {
    /// Live stitching of a camera stream with the settings the realtime
    /// preview uses: dynamic stitching with flowstate stabilisation.
    pub fn live_preview(source: impl Into<PathBuf>, output_size: OutputSize) -> Self {
        Self {
            inputs: vec![source.into()],
            mode: ProcessingMode::LivePreview,
            output: OutputTarget::Preview,
            output_size,
            stitch_type: StitchType::DynamicStitch,
            ai_model: None,
            features: Features {
                flowstate: true,
                direction_lock: false,
                stitch_fusion: true,
                denoise: ModelToggle::default(),
                colorplus: ModelToggle::default(),
                deflicker: ModelToggle::default(),
            },
            codec: CodecOptions {
                h265: false,
                cuda: true,
                soft_encode: false,
                soft_decode: false,
                bitrate: 0,
            },
            accessory: AccessoryType::default(),
        }
    }

    pub fn output_path(&self) -> Option<&std::path::Path> {
        match &self.output {
            OutputTarget::File(path) => Some(path),
            OutputTarget::ImageSequence { dir, .. } => Some(dir),
            OutputTarget::Preview => None,
        }
    }
}

/// A lenient fallback taken while building a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildNote {
    InvalidOutputSize(String),
    UnknownStitchType(String),
    UnknownImageType(String),
    MalformedNumber { field: &'static str, value: String },
    MalformedFrameIndex(String),
    FeatureDisabled(Feature),
    MissingAiModel,
    ImageSequenceIgnored,
}

impl fmt::Display for BuildNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildNote::InvalidOutputSize(v) => {
                write!(f, "output size '{v}' is not WIDTHxHEIGHT, keeping default")
            }
            BuildNote::UnknownStitchType(v) => {
                write!(f, "unknown stitch type '{v}', keeping default")
            }
            BuildNote::UnknownImageType(v) => write!(f, "unknown image type '{v}', using jpg"),
            BuildNote::MalformedNumber { field, value } => {
                write!(f, "{field} '{value}' is not a clean integer")
            }
            BuildNote::MalformedFrameIndex(v) => {
                write!(f, "frame index '{v}' is not a number, exporting frame 0")
            }
            BuildNote::FeatureDisabled(feature) => {
                write!(f, "{} disabled: no model file given", feature.as_str())
            }
            BuildNote::MissingAiModel => write!(f, "aistitch selected without a model file"),
            BuildNote::ImageSequenceIgnored => {
                write!(f, "image sequence output only applies to video inputs")
            }
        }
    }
}
