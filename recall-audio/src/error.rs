use recall_core::{MediaAcquisitionError, MediaKind};

// Backend errors are carried as strings so this type is the same on every
// platform, whether or not a device backend is compiled in.
#[derive(Debug, thiserror::Error)]
pub enum AudioCaptureError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("failed to list input devices: {0}")]
    ListDevices(String),

    #[error("failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(String),

    #[error("failed to play stream: {0}")]
    PlayStream(String),

    #[error("audio worker failed: {0}")]
    Worker(String),

    #[error("audio worker startup timeout")]
    WorkerTimeout,

    #[error("failed to resample: {0}")]
    Resample(#[from] anyhow::Error),

    #[error("internal channel error")]
    Channel,
}

impl AudioCaptureError {
    fn looks_like_permission_denial(&self) -> bool {
        let text = self.to_string().to_ascii_lowercase();
        text.contains("permission") || text.contains("access denied") || text.contains("not authorized")
    }
}

impl From<AudioCaptureError> for MediaAcquisitionError {
    fn from(e: AudioCaptureError) -> Self {
        let kind = MediaKind::Microphone;
        if matches!(e, AudioCaptureError::NoInputDevice) {
            return MediaAcquisitionError::NoDevice(kind);
        }
        if e.looks_like_permission_denial() {
            return MediaAcquisitionError::PermissionDenied(kind);
        }
        MediaAcquisitionError::Device {
            kind,
            message: e.to_string(),
        }
    }
}
