//! Live camera streaming into a realtime stitcher.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroSample {
    pub timestamp: i64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureSample {
    pub timestamp: i64,
    pub exposure_time: f64,
}

/// Receives raw samples from a streaming source such as a camera.
pub trait StreamDelegate: Send + Sync {
    fn on_audio_data(&self, data: &[u8], timestamp: i64);
    fn on_video_data(&self, data: &[u8], timestamp: i64, stream_type: u8, stream_index: i32);
    fn on_gyro_data(&self, samples: &[GyroSample]);
    fn on_exposure_data(&self, sample: ExposureSample);
}

/// Sample intake of an engine that stitches live.
pub trait RealtimeStitcher: Send + Sync {
    fn handle_video_data(&self, data: &[u8], timestamp: i64, stream_type: u8, stream_index: i32);
    fn handle_gyro_data(&self, samples: &[GyroSample]);
    fn handle_exposure_data(&self, sample: ExposureSample);
}

/// Forwards stream samples into a realtime stitcher. Audio is dropped; the
/// stitcher only consumes video and motion data.
pub struct StitchDelegate<S: ?Sized> {
    stitcher: Arc<S>,
}

impl<S: RealtimeStitcher + ?Sized> StitchDelegate<S> {
    pub fn new(stitcher: Arc<S>) -> Self {
        Self { stitcher }
    }
}

impl<S: RealtimeStitcher + ?Sized> StreamDelegate for StitchDelegate<S> {
    fn on_audio_data(&self, _data: &[u8], _timestamp: i64) {}

    fn on_video_data(&self, data: &[u8], timestamp: i64, stream_type: u8, stream_index: i32) {
        self.stitcher
            .handle_video_data(data, timestamp, stream_type, stream_index);
    }

    fn on_gyro_data(&self, samples: &[GyroSample]) {
        self.stitcher.handle_gyro_data(samples);
    }

    fn on_exposure_data(&self, sample: ExposureSample) {
        self.stitcher.handle_exposure_data(sample);
    }
}
