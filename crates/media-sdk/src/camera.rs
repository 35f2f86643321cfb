use jobs::realtime::{ExposureSample, GyroSample, RealtimeStitcher, StreamDelegate};
use jobs::{CompletionSignal, EngineError, FrameEvent, JobCallbacks, PixelFormat, StitchEngine};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stitch_config::{JobConfiguration, OutputSize, ProcessingMode};
use tracing::{debug, info};

use crate::{SPAWN_FAILED, UNSUPPORTED_JOB};

struct LiveJob {
    callbacks: JobCallbacks,
    size: OutputSize,
}

/// Realtime stitcher stand-in. Every packet of lens 0 produces one RGBA
/// frame of the configured size; lens 1 packets are consumed silently.
#[derive(Default)]
pub struct SimulatedRealtimeStitcher {
    live: Mutex<Option<LiveJob>>,
    gyro_samples: AtomicU64,
    exposures: AtomicU64,
}

impl SimulatedRealtimeStitcher {
    pub fn gyro_samples(&self) -> u64 {
        self.gyro_samples.load(Ordering::Relaxed)
    }

    pub fn exposures(&self) -> u64 {
        self.exposures.load(Ordering::Relaxed)
    }

    fn render(size: OutputSize, timestamp: i64) -> FrameEvent {
        let (w, h) = (size.width as usize, size.height as usize);
        let shade = (timestamp.rem_euclid(256)) as u8;
        let mut pixels = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                pixels.extend_from_slice(&[
                    (x * 255 / w.max(1)) as u8,
                    (y * 255 / h.max(1)) as u8,
                    shade,
                    255,
                ]);
            }
        }
        FrameEvent {
            planes: vec![pixels],
            strides: vec![w * 4],
            width: size.width,
            height: size.height,
            format: PixelFormat::Rgba,
            timestamp,
        }
    }
}

impl StitchEngine for SimulatedRealtimeStitcher {
    fn name(&self) -> &str {
        "simulated-realtime"
    }

    fn completion_signal(&self) -> CompletionSignal {
        CompletionSignal::Explicit
    }

    fn start(
        &self,
        config: Arc<JobConfiguration>,
        callbacks: JobCallbacks,
    ) -> Result<(), EngineError> {
        if config.mode != ProcessingMode::LivePreview {
            return Err(EngineError::new(
                UNSUPPORTED_JOB,
                "the realtime stitcher only handles live preview",
            ));
        }
        *self.live.lock() = Some(LiveJob {
            callbacks,
            size: config.output_size,
        });
        Ok(())
    }

    fn cancel(&self) {
        if let Some(job) = self.live.lock().take() {
            job.callbacks.on_cancelled();
        }
    }
}

impl RealtimeStitcher for SimulatedRealtimeStitcher {
    fn handle_video_data(&self, _data: &[u8], timestamp: i64, _stream_type: u8, stream_index: i32) {
        if stream_index != 0 {
            return;
        }
        let (callbacks, size) = match self.live.lock().as_ref() {
            Some(job) => (job.callbacks.clone(), job.size),
            None => return,
        };
        callbacks.on_frame(Self::render(size, timestamp));
    }

    fn handle_gyro_data(&self, samples: &[GyroSample]) {
        self.gyro_samples
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
    }

    fn handle_exposure_data(&self, _sample: ExposureSample) {
        self.exposures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fake dual-lens camera pushing packets to a delegate at a fixed rate.
pub struct SimulatedCamera {
    serial: String,
    fps: u32,
    streaming: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<u64>>>,
}

impl SimulatedCamera {
    pub fn new(serial: impl Into<String>, fps: u32) -> Self {
        Self {
            serial: serial.into(),
            fps: fps.max(1),
            streaming: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Start pushing packets. Returns `false` when already streaming.
    pub fn start_streaming(&self, delegate: Arc<dyn StreamDelegate>) -> Result<bool, EngineError> {
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let streaming = self.streaming.clone();
        let interval = Duration::from_secs(1) / self.fps;
        let frame_us = interval.as_micros() as i64;
        let handle = thread::Builder::new()
            .name(format!("camera-{}", self.serial))
            .spawn(move || {
                let mut sent = 0u64;
                let packet = vec![0u8; 1024];
                while streaming.load(Ordering::SeqCst) {
                    let timestamp = sent as i64 * frame_us;
                    delegate.on_video_data(&packet, timestamp, 1, 0);
                    delegate.on_video_data(&packet, timestamp, 1, 1);
                    delegate.on_audio_data(&packet[..64], timestamp);
                    let gyro: Vec<GyroSample> = (0..4)
                        .map(|i| GyroSample {
                            timestamp: timestamp + i * frame_us / 4,
                            az: 9.81,
                            ..GyroSample::default()
                        })
                        .collect();
                    delegate.on_gyro_data(&gyro);
                    delegate.on_exposure_data(ExposureSample {
                        timestamp,
                        exposure_time: 1.0 / 120.0,
                    });
                    sent += 1;
                    thread::sleep(interval);
                }
                sent
            })
            .map_err(|e| {
                self.streaming.store(false, Ordering::SeqCst);
                EngineError::new(SPAWN_FAILED, e.to_string())
            })?;
        *self.worker.lock() = Some(handle);
        info!(serial = %self.serial, fps = self.fps, "live stream started");
        Ok(true)
    }

    /// Stop streaming; returns how many frames were sent.
    pub fn stop_streaming(&self) -> u64 {
        self.streaming.store(false, Ordering::SeqCst);
        let sent = self
            .worker
            .lock()
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0);
        debug!(serial = %self.serial, sent, "live stream stopped");
        sent
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use jobs::preview::{FrameSlot, PreviewWorker};
    use jobs::realtime::StitchDelegate;
    use jobs::{JobController, Phase, TerminalStatus};

    #[test]
    fn test_live_preview_round_trip() {
        let stitcher = Arc::new(SimulatedRealtimeStitcher::default());
        let controller = JobController::new(stitcher.clone());
        let slot = FrameSlot::new();
        {
            let slot = slot.clone();
            controller.set_frame_sink(move |frame| slot.publish(frame));
        }
        let mut preview = PreviewWorker::new(slot);
        let (tx, rx) = unbounded();
        preview
            .start(move |frame: FrameEvent| {
                let _ = tx.send((frame.width, frame.height));
            })
            .unwrap();

        let size = OutputSize {
            width: 8,
            height: 4,
        };
        controller
            .submit(JobConfiguration::live_preview("sim-0001", size))
            .unwrap();
        assert_eq!(controller.phase(), Phase::Running);

        let camera = SimulatedCamera::new("sim-0001", 200);
        assert!(camera
            .start_streaming(Arc::new(StitchDelegate::new(stitcher.clone())))
            .unwrap());
        assert!(!camera
            .start_streaming(Arc::new(StitchDelegate::new(stitcher.clone())))
            .unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok((8, 4)));

        let sent = camera.stop_streaming();
        assert!(sent >= 1);
        preview.stop();
        controller.cancel().unwrap();
        let state = controller.wait_until_terminal(Some(Duration::from_secs(2)));
        assert_eq!(state.terminal, TerminalStatus::Cancelled);
        assert_eq!(stitcher.gyro_samples(), sent * 4);
        assert_eq!(stitcher.exposures(), sent);
    }

    #[test]
    fn test_rejects_file_jobs() {
        let stitcher = Arc::new(SimulatedRealtimeStitcher::default());
        let controller = JobController::new(stitcher);
        let config = stitch_config::ConfigBuilder::new(stitch_config::RawOptions {
            inputs: vec!["a.insv".into()],
            output: Some("out.mp4".into()),
            ..Default::default()
        })
        .build()
        .unwrap();
        assert!(controller.submit(config).is_err());
        assert_eq!(controller.phase(), Phase::Failed);
    }
}
