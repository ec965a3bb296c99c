pub mod capture;
pub mod chunker;
pub mod error;
pub mod meter;
pub mod pcm;
pub mod resample;

// Device capture is implemented behind OS-specific backends.
#[cfg(any(windows, target_os = "macos"))]
pub mod cpal_backend;

pub use capture::{
    AudioCapture, AudioChunk, AudioEvent, AudioEventKind, MicrophoneBackend, MicrophoneStream,
};
pub use error::AudioCaptureError;
pub use meter::{VolumeSmoother, volume};

#[cfg(any(windows, target_os = "macos"))]
pub use cpal_backend::CpalMicrophone;
