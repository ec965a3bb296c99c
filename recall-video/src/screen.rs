//! Live screen sharing on top of a platform screen grabber.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use recall_core::{MediaAcquisitionError, MediaKind, VideoSourceKind};

use crate::frame::VideoFrame;
use crate::source::{FrameProvider, VideoDevice};

/// Grabs the current contents of the screen.
///
/// Called on the sampler's task at frame cadence, so a grab must be quick.
pub trait ScreenGrabber: Send + Sync {
    fn grab(&self) -> anyhow::Result<VideoFrame>;
}

/// Converts top-down BGRA rows (as GDI hands them out) into packed RGB.
pub fn bgra_to_frame(width: u32, height: u32, bgra: &[u8]) -> VideoFrame {
    let n = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(n * 3);
    for px in bgra.chunks_exact(4).take(n) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    VideoFrame::new(width, height, rgb)
}

/// Screen share that captures a fresh frame every time it is read.
pub struct ScreenShareDevice {
    grabber: Arc<dyn ScreenGrabber>,
    // Shared with the provider so a stopped share stops serving frames.
    active: Arc<AtomicBool>,
}

impl ScreenShareDevice {
    pub fn new(grabber: Arc<dyn ScreenGrabber>) -> Self {
        Self {
            grabber,
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct LiveScreen {
    grabber: Arc<dyn ScreenGrabber>,
    active: Arc<AtomicBool>,
}

impl FrameProvider for LiveScreen {
    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        match self.grabber.grab() {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::debug!("Screen grab failed: {e:#}");
                None
            }
        }
    }
}

#[async_trait]
impl VideoDevice for ScreenShareDevice {
    fn kind(&self) -> VideoSourceKind {
        VideoSourceKind::ScreenShare
    }

    async fn start(&self) -> Result<Arc<dyn FrameProvider>, MediaAcquisitionError> {
        // One grab up front so an unusable screen fails the switch.
        let grabber = self.grabber.clone();
        let first = tokio::task::spawn_blocking(move || grabber.grab())
            .await
            .map_err(|e| MediaAcquisitionError::Device {
                kind: MediaKind::ScreenShare,
                message: format!("capture task failed: {e}"),
            })?;

        match first {
            Ok(frame) if frame.has_pixels() => {}
            Ok(_) => return Err(MediaAcquisitionError::NoDevice(MediaKind::ScreenShare)),
            Err(e) => {
                return Err(MediaAcquisitionError::Device {
                    kind: MediaKind::ScreenShare,
                    message: format!("{e:#}"),
                });
            }
        }

        self.active.store(true, Ordering::Release);
        log::info!("Screen capture started");
        Ok(Arc::new(LiveScreen {
            grabber: self.grabber.clone(),
            active: self.active.clone(),
        }))
    }

    async fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            log::info!("Screen capture stopped");
        }
    }

    fn is_streaming(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
