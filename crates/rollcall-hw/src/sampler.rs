//! Frame sampler: every-Nth-frame throttle in front of a capture source.

use crate::camera::CameraError;
use crate::frame::Frame;

pub const DEFAULT_FRAME_STRIDE: u64 = 5;
pub const DEFAULT_SCALE_FACTOR: f32 = 0.25;

/// Anything that yields colour frames one at a time.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        (**self).read_frame()
    }
}

/// Output of one sampler step.
pub struct SampledFrame {
    /// Unscaled capture, always present.
    pub display: Frame,
    /// Downscaled RGB copy, present only on eligible frames.
    pub matching: Option<Frame>,
}

impl SampledFrame {
    pub fn eligible(&self) -> bool {
        self.matching.is_some()
    }
}

pub struct FrameSampler<S> {
    source: S,
    stride: u64,
    scale: f32,
    frame_count: u64,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, stride: u64, scale: f32) -> Self {
        Self {
            source,
            stride: stride.max(1),
            scale,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Read the next frame. `None` means the source is exhausted or failed;
    /// the caller must stop sampling. There is no retry.
    pub fn next(&mut self) -> Option<SampledFrame> {
        let display = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::info!(error = %err, frames = self.frame_count, "frame source ended");
                return None;
            }
        };

        self.frame_count += 1;
        if self.frame_count % self.stride != 0 {
            return Some(SampledFrame { display, matching: None });
        }

        match display.downscaled_rgb(self.scale) {
            Ok(matching) => Some(SampledFrame {
                display,
                matching: Some(matching),
            }),
            Err(err) => {
                tracing::warn!(error = %err, "malformed frame from source");
                None
            }
        }
    }

    /// Read one frame unconditionally and return its match-ready copy.
    pub fn capture_for_matching(&mut self) -> Result<Frame, CameraError> {
        let frame = self.source.read_frame()?;
        self.frame_count += 1;
        frame
            .downscaled_rgb(self.scale)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}
