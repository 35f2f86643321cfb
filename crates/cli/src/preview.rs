use anyhow::{Context, Result};
use jobs::preview::{FrameSlot, PreviewWorker};
use jobs::realtime::StitchDelegate;
use jobs::{FrameEvent, JobController};
use media_sdk::{SimulatedCamera, SimulatedRealtimeStitcher};
use std::sync::Arc;
use stitch_config::{parse_output_size, JobConfiguration};
use tracing::{debug, info, trace};

use crate::runner::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSummary {
    pub sent: u64,
    pub shown: u64,
    pub replaced: u64,
    pub interrupted: bool,
}

/// Stream the simulated camera through the realtime stitcher until `frames`
/// frames were shown (0 means until Ctrl-C).
pub async fn run_preview(
    serial: &str,
    fps: u32,
    output_size: &str,
    frames: u64,
) -> Result<PreviewSummary> {
    let size = parse_output_size(output_size)
        .with_context(|| format!("output size '{output_size}' is not WIDTHxHEIGHT"))?;

    let stitcher = Arc::new(SimulatedRealtimeStitcher::default());
    let controller = JobController::new(stitcher.clone());
    let slot = FrameSlot::new();
    {
        let slot = slot.clone();
        controller.set_frame_sink(move |frame| slot.publish(frame));
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut worker = PreviewWorker::new(slot.clone());
    worker.start(move |frame: FrameEvent| {
        trace!(ts = frame.timestamp, width = frame.width, height = frame.height, "frame");
        let _ = tx.send(frame.timestamp);
    })?;

    controller.submit(JobConfiguration::live_preview(serial, size))?;
    let camera = SimulatedCamera::new(serial, fps);
    camera.start_streaming(Arc::new(StitchDelegate::new(stitcher.clone())))?;
    info!(serial, fps, %size, "previewing, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut received = 0u64;
    let interrupted = loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(ts) => {
                    received += 1;
                    if received == 1 {
                        info!(ts, "first stitched frame");
                    }
                    if frames > 0 && received >= frames {
                        break false;
                    }
                }
                None => break false,
            },
            _ = &mut ctrl_c => break true,
        }
    };

    let sent = camera.stop_streaming();
    let shown = worker.stop();
    controller.cancel()?;
    debug!(phase = ?controller.phase(), "preview job closed");

    Ok(PreviewSummary {
        sent,
        shown,
        replaced: slot.replaced_frames(),
        interrupted,
    })
}

impl PreviewSummary {
    pub fn outcome(&self, requested: u64) -> Outcome {
        if self.interrupted && requested > 0 && self.shown < requested {
            Outcome::Cancelled
        } else {
            Outcome::Completed
        }
    }
}
