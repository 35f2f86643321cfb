use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use stitch_config::RawOptions;

use crate::settings::{EngineKind, Settings};

/// Stitch options, in the SDK stitcher's vocabulary.
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Input files; dual-lens footage takes both files
    #[arg(long, num_args = 1.., value_name = "FILE")]
    pub inputs: Vec<String>,

    /// Output file
    #[arg(long, value_name = "FILE")]
    pub output: Option<String>,

    /// template, optflow, dynamicstitch, aistitch, aistitchv1 or aistitchv2
    #[arg(long)]
    pub stitch_type: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub ai_stitching_model: Option<String>,

    /// Output bitrate in bits per second
    #[arg(long, allow_hyphen_values = true)]
    pub bitrate: Option<String>,

    /// WIDTHxHEIGHT, e.g. 5760x2880
    #[arg(long)]
    pub output_size: Option<String>,

    #[arg(long)]
    pub enable_flowstate: bool,

    #[arg(long)]
    pub enable_directionlock: bool,

    /// Accepted for compatibility; stitch fusion is on unless disabled
    #[arg(long, hide = true)]
    pub enable_stitchfusion: bool,

    #[arg(long, conflicts_with = "enable_stitchfusion")]
    pub disable_stitchfusion: bool,

    #[arg(long)]
    pub enable_denoise: bool,

    #[arg(long, value_name = "FILE")]
    pub image_denoise_model: Option<String>,

    /// Needs --colorplus-model
    #[arg(long)]
    pub enable_colorplus: bool,

    #[arg(long, value_name = "FILE")]
    pub colorplus_model: Option<String>,

    /// Needs --deflicker-model
    #[arg(long)]
    pub enable_deflicker: bool,

    #[arg(long, value_name = "FILE")]
    pub deflicker_model: Option<String>,

    #[arg(long)]
    pub enable_h265_encoder: bool,

    #[arg(long)]
    pub disable_cuda: bool,

    #[arg(long)]
    pub enable_soft_encode: bool,

    #[arg(long)]
    pub enable_soft_decode: bool,

    /// Write stitched frames here instead of a video (video inputs only)
    #[arg(long, value_name = "DIR")]
    pub image_sequence_dir: Option<String>,

    /// jpg or png
    #[arg(long)]
    pub image_type: Option<String>,

    /// Lens accessory code; 0 is the bare camera
    #[arg(long, allow_hyphen_values = true)]
    pub camera_accessory_type: Option<String>,

    /// Frame numbers joined by '-', e.g. 20-50-30
    #[arg(long)]
    pub export_frame_index: Option<String>,
}

impl JobArgs {
    pub fn into_raw(self, model_dir: Option<PathBuf>) -> RawOptions {
        RawOptions {
            inputs: self.inputs,
            output: self.output,
            stitch_type: self.stitch_type,
            ai_stitching_model: self.ai_stitching_model,
            bitrate: self.bitrate,
            output_size: self.output_size,
            enable_flowstate: self.enable_flowstate,
            enable_directionlock: self.enable_directionlock,
            enable_stitchfusion: self.enable_stitchfusion || !self.disable_stitchfusion,
            enable_denoise: self.enable_denoise,
            image_denoise_model: self.image_denoise_model,
            enable_colorplus: self.enable_colorplus,
            colorplus_model: self.colorplus_model,
            enable_deflicker: self.enable_deflicker,
            deflicker_model: self.deflicker_model,
            enable_h265_encoder: self.enable_h265_encoder,
            disable_cuda: self.disable_cuda,
            enable_soft_encode: self.enable_soft_encode,
            enable_soft_decode: self.enable_soft_decode,
            image_sequence_dir: self.image_sequence_dir,
            image_type: self.image_type,
            camera_accessory_type: self.camera_accessory_type,
            export_frame_index: self.export_frame_index,
            model_dir,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop waiting after this many seconds (0 waits forever)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Write a JSON summary of the run here
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Override the engine from the settings file
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,
}

impl RunArgs {
    pub fn engine(&self, settings: &Settings) -> EngineKind {
        self.engine.unwrap_or(settings.engine)
    }

    pub fn timeout(&self, settings: &Settings) -> Option<Duration> {
        self.timeout_secs
            .or(settings.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
