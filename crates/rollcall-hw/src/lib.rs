//! rollcall-hw: Hardware abstraction for frame capture and the indicator link.
//!
//! Provides V4L2-based camera access, the throttling frame sampler that
//! feeds the matching oracle, and the serial link to the indicator device.

pub mod camera;
pub mod frame;
pub mod sampler;
pub mod serial;

pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::{ColorLayout, Frame, FrameError};
pub use sampler::{FrameSampler, FrameSource, SampledFrame, DEFAULT_FRAME_STRIDE, DEFAULT_SCALE_FACTOR};
pub use serial::{SerialLink, SignalError, DEFAULT_BAUD};
