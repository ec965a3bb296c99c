use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use recall_core::{MediaAcquisitionError, VideoSourceKind};

use crate::frame::VideoFrame;

/// Read side of a running video stream.
pub trait FrameProvider: Send + Sync {
    /// The most recent frame, or `None` before the device has produced one.
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// A video-producing capture device (webcam, screen share).
#[async_trait]
pub trait VideoDevice: Send + Sync {
    fn kind(&self) -> VideoSourceKind;

    async fn start(&self) -> Result<Arc<dyn FrameProvider>, MediaAcquisitionError>;

    /// Releases the device. Must be safe to call when not streaming.
    async fn stop(&self);

    fn is_streaming(&self) -> bool;
}

#[derive(Clone, Default)]
pub enum ActiveSource {
    #[default]
    None,
    Webcam(Arc<dyn FrameProvider>),
    ScreenShare(Arc<dyn FrameProvider>),
}

impl ActiveSource {
    fn new(kind: VideoSourceKind, provider: Arc<dyn FrameProvider>) -> Self {
        match kind {
            VideoSourceKind::Webcam => ActiveSource::Webcam(provider),
            VideoSourceKind::ScreenShare => ActiveSource::ScreenShare(provider),
        }
    }

    pub fn kind(&self) -> Option<VideoSourceKind> {
        match self {
            ActiveSource::None => None,
            ActiveSource::Webcam(_) => Some(VideoSourceKind::Webcam),
            ActiveSource::ScreenShare(_) => Some(VideoSourceKind::ScreenShare),
        }
    }

    pub fn provider(&self) -> Option<Arc<dyn FrameProvider>> {
        match self {
            ActiveSource::None => None,
            ActiveSource::Webcam(p) | ActiveSource::ScreenShare(p) => Some(p.clone()),
        }
    }
}

impl std::fmt::Debug for ActiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            None => f.write_str("ActiveSource::None"),
            Some(k) => write!(f, "ActiveSource({k})"),
        }
    }
}

/// Owns the video devices and guarantees at most one of them streams.
///
/// `active` is only written by `switch_to`; switches are serialized.
pub struct VideoSourceSwitcher {
    devices: Vec<Arc<dyn VideoDevice>>,
    active: Mutex<ActiveSource>,
    switching: tokio::sync::Mutex<()>,
}

impl VideoSourceSwitcher {
    pub fn new(devices: Vec<Arc<dyn VideoDevice>>) -> Self {
        Self {
            devices,
            active: Mutex::new(ActiveSource::None),
            switching: tokio::sync::Mutex::new(()),
        }
    }

    pub fn active(&self) -> ActiveSource {
        self.active.lock().clone()
    }

    pub fn active_kind(&self) -> Option<VideoSourceKind> {
        self.active.lock().kind()
    }

    pub fn available(&self) -> Vec<VideoSourceKind> {
        self.devices.iter().map(|d| d.kind()).collect()
    }

    /// Makes `target` the only streaming source. `None` stops everything.
    ///
    /// Every other device is stopped before the target is started. On
    /// failure the active source is left as `None`.
    pub async fn switch_to(
        &self,
        target: Option<VideoSourceKind>,
    ) -> Result<ActiveSource, MediaAcquisitionError> {
        let _guard = self.switching.lock().await;

        let current = self.active.lock().clone();
        if target.is_some() && current.kind() == target {
            return Ok(current);
        }

        *self.active.lock() = ActiveSource::None;

        for device in &self.devices {
            if Some(device.kind()) != target && device.is_streaming() {
                log::info!("Stopping {} capture", device.kind());
                device.stop().await;
            }
        }

        let Some(kind) = target else {
            return Ok(ActiveSource::None);
        };

        let device = self
            .devices
            .iter()
            .find(|d| d.kind() == kind)
            .ok_or(MediaAcquisitionError::NoDevice(kind.media_kind()))?;

        match device.start().await {
            Ok(provider) => {
                let next = ActiveSource::new(kind, provider);
                *self.active.lock() = next.clone();
                log::info!("Video source is now {kind}");
                Ok(next)
            }
            Err(e) => {
                log::warn!("Failed to start {kind} capture: {e}");
                device.stop().await;
                Err(e)
            }
        }
    }

    pub async fn stop_all(&self) {
        if let Err(e) = self.switch_to(None).await {
            // Stopping never acquires a device.
            log::warn!("Stopping video sources failed: {e}");
        }
    }
}
