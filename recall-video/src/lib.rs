pub mod frame;
pub mod sampler;
pub mod screen;
pub mod source;
pub mod still;

#[cfg(windows)]
pub mod gdi_screen;

pub use frame::{FrameEncoder, VideoFrame};
pub use sampler::{ChunkSink, SamplerHandle, VideoSampler};
pub use screen::{ScreenGrabber, ScreenShareDevice};
pub use source::{ActiveSource, FrameProvider, VideoDevice, VideoSourceSwitcher};
pub use still::StillFrameDevice;

#[cfg(windows)]
pub use gdi_screen::GdiScreen;
