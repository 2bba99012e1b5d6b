//! Background vision worker.
//!
//! The engine tick hands each corrected image to the worker through an input
//! [`Mailbox`] and later polls an output mailbox for the result.  Neither side
//! ever blocks the other: a new image overwrites one the worker has not picked
//! up yet, and "no result yet" is the normal answer to a poll.
//!
//! ```text
//!  engine tick ──set_next_image──▶ [input] ──▶ worker: VisionProcessor
//!  engine tick ◀──poll_result──── [output] ◀──┘
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};
use tread_types::{TimeStamp, TreadError};

use crate::mailbox::Mailbox;

/// One image queued for processing.
#[derive(Debug, Clone)]
pub struct VisionFrame {
    pub image_id: u32,
    pub timestamp: TimeStamp,
    pub image: GrayImage,
}

/// Work run on the vision thread for every frame.
pub trait VisionProcessor: Send + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &str;

    fn process(&mut self, frame: &VisionFrame) -> Result<Self::Output, TreadError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Illumination
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IlluminationState {
    Darkened,
    Normal,
    Illuminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlluminationResult {
    pub image_id: u32,
    pub timestamp: TimeStamp,
    pub mean_intensity: f32,
    pub state: IlluminationState,
}

/// Classifies each frame by its mean grey level.
#[derive(Debug, Clone)]
pub struct IlluminationProcessor {
    pub dark_threshold: f32,
    pub bright_threshold: f32,
}

impl Default for IlluminationProcessor {
    fn default() -> Self {
        Self {
            dark_threshold: 30.0,
            bright_threshold: 220.0,
        }
    }
}

impl VisionProcessor for IlluminationProcessor {
    type Output = IlluminationResult;

    fn name(&self) -> &str {
        "illumination"
    }

    fn process(&mut self, frame: &VisionFrame) -> Result<IlluminationResult, TreadError> {
        let pixels = frame.image.as_raw();
        if pixels.is_empty() {
            return Err(TreadError::Vision(format!(
                "image {} has no pixels",
                frame.image_id
            )));
        }

        let sum: u64 = pixels.iter().map(|&p| u64::from(p)).sum();
        let mean_intensity = sum as f32 / pixels.len() as f32;
        let state = if mean_intensity < self.dark_threshold {
            IlluminationState::Darkened
        } else if mean_intensity > self.bright_threshold {
            IlluminationState::Illuminated
        } else {
            IlluminationState::Normal
        };

        Ok(IlluminationResult {
            image_id: frame.image_id,
            timestamp: frame.timestamp,
            mean_intensity,
            state,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Worker thread
// ────────────────────────────────────────────────────────────────────────────

/// Handle to the running vision worker.  Stopping (explicitly or on drop)
/// closes the input mailbox and joins the thread.
pub struct VisionProcessingThread<O> {
    input: Arc<Mailbox<VisionFrame>>,
    output: Arc<Mailbox<O>>,
    handle: Option<JoinHandle<()>>,
}

impl<O: Send + 'static> VisionProcessingThread<O> {
    /// Spawn the worker thread around `processor`.
    pub fn spawn<P>(mut processor: P) -> Result<Self, TreadError>
    where
        P: VisionProcessor<Output = O>,
    {
        let input = Arc::new(Mailbox::<VisionFrame>::new());
        let output = Arc::new(Mailbox::<O>::new());

        let worker_input = Arc::clone(&input);
        let worker_output = Arc::clone(&output);
        let handle = thread::Builder::new()
            .name("vision".into())
            .spawn(move || {
                debug!(processor = processor.name(), "vision thread started");
                while let Some(frame) = worker_input.take() {
                    match processor.process(&frame) {
                        Ok(result) => {
                            worker_output.put(result);
                        }
                        Err(e) => {
                            warn!(image_id = frame.image_id, error = %e, "VisionProcessingThread.ProcessFailed");
                        }
                    }
                }
                debug!("vision thread exiting");
            })
            .map_err(|e| TreadError::Vision(format!("failed to spawn vision thread: {e}")))?;

        Ok(Self {
            input,
            output,
            handle: Some(handle),
        })
    }

    /// Queue `frame` for processing.  Returns `true` if it replaced a frame
    /// the worker had not started on yet.
    pub fn set_next_image(&self, frame: VisionFrame) -> bool {
        match self.input.put(frame) {
            Some(dropped) => {
                trace!(image_id = dropped.image_id, "vision frame superseded before processing");
                true
            }
            None => false,
        }
    }

    /// Latest finished result, if any.  Never blocks.
    pub fn poll_result(&self) -> Option<O> {
        self.output.try_take()
    }

    pub fn wait_result(&self, timeout: Duration) -> Option<O> {
        self.output.take_timeout(timeout)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<O> VisionProcessingThread<O> {
    pub fn stop(&mut self) {
        self.input.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("vision thread panicked");
            }
        }
    }
}

impl<O> Drop for VisionProcessingThread<O> {
    fn drop(&mut self) {
        self.stop();
    }
}
