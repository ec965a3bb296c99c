use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use recall_core::{MediaAcquisitionError, VideoSourceKind};

use crate::frame::VideoFrame;
use crate::source::{FrameProvider, VideoDevice};

/// A video device that keeps serving one fixed image.
///
/// Used by the CLI to feed a picture in place of a camera, and as a
/// deterministic source in tests.
pub struct StillFrameDevice {
    kind: VideoSourceKind,
    frame: Arc<VideoFrame>,
    streaming: AtomicBool,
}

impl StillFrameDevice {
    pub fn new(kind: VideoSourceKind, frame: VideoFrame) -> Self {
        Self {
            kind,
            frame: Arc::new(frame),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn from_image_file(kind: VideoSourceKind, path: &Path) -> anyhow::Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("failed to read image {}", path.display()))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        Ok(Self::new(kind, VideoFrame::new(w, h, img.into_raw())))
    }
}

struct StillFrame(Arc<VideoFrame>);

impl FrameProvider for StillFrame {
    fn current_frame(&self) -> Option<VideoFrame> {
        Some(self.0.as_ref().clone())
    }
}

#[async_trait]
impl VideoDevice for StillFrameDevice {
    fn kind(&self) -> VideoSourceKind {
        self.kind
    }

    async fn start(&self) -> Result<Arc<dyn FrameProvider>, MediaAcquisitionError> {
        self.streaming.store(true, Ordering::Release);
        Ok(Arc::new(StillFrame(self.frame.clone())))
    }

    async fn stop(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }
}
