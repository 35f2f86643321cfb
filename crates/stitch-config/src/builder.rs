use serde::Deserialize;
use std::path::PathBuf;

use crate::parse::{parse_frame_indices, parse_int_lenient, parse_output_size};
use crate::{
    AccessoryType, BuildNote, CodecOptions, ConfigurationError, Feature, Features, ImageType,
    JobConfiguration, ModelToggle, OutputSize, OutputTarget, ProcessingMode, StitchType,
};

/// Option values as the user supplied them. Strings stay raw so the builder
/// can apply the same lenient parsing to flags and manifests alike.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub stitch_type: Option<String>,
    pub ai_stitching_model: Option<String>,
    pub bitrate: Option<String>,
    pub output_size: Option<String>,
    pub enable_flowstate: bool,
    pub enable_directionlock: bool,
    pub enable_stitchfusion: bool,
    pub enable_denoise: bool,
    pub image_denoise_model: Option<String>,
    pub enable_colorplus: bool,
    pub colorplus_model: Option<String>,
    pub enable_deflicker: bool,
    pub deflicker_model: Option<String>,
    pub enable_h265_encoder: bool,
    pub disable_cuda: bool,
    pub enable_soft_encode: bool,
    pub enable_soft_decode: bool,
    pub image_sequence_dir: Option<String>,
    pub image_type: Option<String>,
    pub camera_accessory_type: Option<String>,
    pub export_frame_index: Option<String>,
    /// Where versioned AI stitch models live.
    pub model_dir: Option<PathBuf>,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
            stitch_type: None,
            ai_stitching_model: None,
            bitrate: None,
            output_size: None,
            enable_flowstate: false,
            enable_directionlock: false,
            enable_stitchfusion: true,
            enable_denoise: false,
            image_denoise_model: None,
            enable_colorplus: false,
            colorplus_model: None,
            enable_deflicker: false,
            deflicker_model: None,
            enable_h265_encoder: false,
            disable_cuda: false,
            enable_soft_encode: false,
            enable_soft_decode: false,
            image_sequence_dir: None,
            image_type: None,
            camera_accessory_type: None,
            export_frame_index: None,
            model_dir: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub struct ConfigBuilder {
    raw: RawOptions,
    notes: Vec<BuildNote>,
}

impl ConfigBuilder {
    pub fn new(raw: RawOptions) -> Self {
        Self {
            raw,
            notes: Vec::new(),
        }
    }

    pub fn build(self) -> Result<JobConfiguration, ConfigurationError> {
        self.build_with_notes().map(|(config, _)| config)
    }

    pub fn build_with_notes(
        mut self,
    ) -> Result<(JobConfiguration, Vec<BuildNote>), ConfigurationError> {
        let inputs: Vec<String> = self
            .raw
            .inputs
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        let first = inputs.first().ok_or(ConfigurationError::MissingInput)?;

        let output = non_empty(&self.raw.output).map(PathBuf::from);
        let sequence_dir = non_empty(&self.raw.image_sequence_dir).map(PathBuf::from);
        if output.is_none() && sequence_dir.is_none() {
            return Err(ConfigurationError::MissingOutput);
        }

        let mode = ProcessingMode::for_input(first, sequence_dir.is_some())?;
        let output = match (mode, sequence_dir) {
            (ProcessingMode::ImageSequence, Some(dir)) => OutputTarget::ImageSequence {
                dir,
                image_type: self.image_type(),
                frame_indices: self.frame_indices(),
            },
            (ProcessingMode::ImageStitch, sequence_dir) => {
                if sequence_dir.is_some() {
                    self.notes.push(BuildNote::ImageSequenceIgnored);
                }
                OutputTarget::File(output.ok_or(ConfigurationError::MissingOutput)?)
            }
            (_, _) => OutputTarget::File(output.ok_or(ConfigurationError::MissingOutput)?),
        };

        let (stitch_type, ai_model) = self.stitch_type();
        let features = self.features();
        let codec = CodecOptions {
            h265: self.raw.enable_h265_encoder,
            cuda: !self.raw.disable_cuda,
            soft_encode: self.raw.enable_soft_encode,
            soft_decode: self.raw.enable_soft_decode,
            bitrate: self.bitrate(),
        };
        let accessory = self.accessory();
        let output_size = self.output_size();

        let config = JobConfiguration {
            inputs: inputs.into_iter().map(PathBuf::from).collect(),
            mode,
            output,
            output_size,
            stitch_type,
            ai_model,
            features,
            codec,
            accessory,
        };
        Ok((config, self.notes))
    }

    fn output_size(&mut self) -> OutputSize {
        match non_empty(&self.raw.output_size) {
            None => OutputSize::default(),
            Some(s) => match parse_output_size(s) {
                Some(size) => size,
                None => {
                    self.notes.push(BuildNote::InvalidOutputSize(s.to_string()));
                    OutputSize::default()
                }
            },
        }
    }

    fn stitch_type(&mut self) -> (StitchType, Option<PathBuf>) {
        let mut model = non_empty(&self.raw.ai_stitching_model).map(PathBuf::from);
        let stitch_type = match non_empty(&self.raw.stitch_type) {
            None => StitchType::default(),
            Some(name) => match StitchType::resolve(name) {
                Some((stitch_type, implied)) => {
                    if model.is_none() {
                        model = implied
                            .zip(self.raw.model_dir.as_ref())
                            .map(|(file, dir)| dir.join(file));
                    }
                    stitch_type
                }
                None => {
                    self.notes.push(BuildNote::UnknownStitchType(name.to_string()));
                    StitchType::default()
                }
            },
        };
        if stitch_type == StitchType::AiStitch && model.is_none() {
            self.notes.push(BuildNote::MissingAiModel);
        }
        (stitch_type, model)
    }

    fn features(&mut self) -> Features {
        let denoise = self.toggle(
            Feature::Denoise,
            self.raw.enable_denoise,
            self.raw.image_denoise_model.clone(),
        );
        let colorplus = self.toggle(
            Feature::ColorPlus,
            self.raw.enable_colorplus,
            self.raw.colorplus_model.clone(),
        );
        let deflicker = self.toggle(
            Feature::Deflicker,
            self.raw.enable_deflicker,
            self.raw.deflicker_model.clone(),
        );
        Features {
            flowstate: self.raw.enable_flowstate,
            direction_lock: self.raw.enable_directionlock,
            stitch_fusion: self.raw.enable_stitchfusion,
            denoise,
            colorplus,
            deflicker,
        }
    }

    fn toggle(&mut self, feature: Feature, enabled: bool, model: Option<String>) -> ModelToggle {
        let model = model.filter(|m| !m.is_empty()).map(PathBuf::from);
        if enabled && model.is_none() && feature.requires_model() {
            self.notes.push(BuildNote::FeatureDisabled(feature));
            return ModelToggle {
                enabled: false,
                model: None,
            };
        }
        ModelToggle { enabled, model }
    }

    fn bitrate(&mut self) -> u64 {
        let Some(raw) = non_empty(&self.raw.bitrate) else {
            return 0;
        };
        let (value, clean) = parse_int_lenient(raw);
        if !clean || value < 0 {
            self.notes.push(BuildNote::MalformedNumber {
                field: "bitrate",
                value: raw.to_string(),
            });
        }
        value.max(0) as u64
    }

    fn accessory(&mut self) -> AccessoryType {
        let Some(raw) = non_empty(&self.raw.camera_accessory_type) else {
            return AccessoryType::default();
        };
        let (value, clean) = parse_int_lenient(raw);
        if !clean {
            self.notes.push(BuildNote::MalformedNumber {
                field: "camera_accessory_type",
                value: raw.to_string(),
            });
        }
        AccessoryType(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
    }

    fn image_type(&mut self) -> ImageType {
        match non_empty(&self.raw.image_type) {
            None => ImageType::default(),
            Some(name) => ImageType::resolve(name).unwrap_or_else(|| {
                self.notes.push(BuildNote::UnknownImageType(name.to_string()));
                ImageType::default()
            }),
        }
    }

    fn frame_indices(&mut self) -> Vec<u64> {
        let raw = self.raw.export_frame_index.clone().unwrap_or_default();
        let (indices, malformed) = parse_frame_indices(&raw);
        self.notes
            .extend(malformed.into_iter().map(BuildNote::MalformedFrameIndex));
        indices
    }
}
