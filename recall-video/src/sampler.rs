use std::sync::Arc;
use std::time::Duration;

use recall_core::{OutboundChunk, VideoSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::frame::FrameEncoder;
use crate::source::FrameProvider;

/// Where encoded frames go. Returns whether the chunk was accepted.
pub type ChunkSink = Arc<dyn Fn(OutboundChunk) -> bool + Send + Sync>;

pub struct VideoSampler;

impl VideoSampler {
    /// Starts sampling `provider` on the current runtime.
    ///
    /// The first frame is read after `initial_delay_ms`. A missing or empty
    /// frame is retried after `retry_delay_ms`; otherwise the next frame is
    /// read after `frame_interval_ms`.
    pub fn start(
        provider: Arc<dyn FrameProvider>,
        sink: ChunkSink,
        settings: &VideoSettings,
    ) -> SamplerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sampler(
            provider,
            sink,
            settings.clone(),
            cancel.clone(),
        ));
        SamplerHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Running sampler. Stopping (or dropping) it cancels the pending tick
/// before returning, so no frame is sent afterwards.
pub struct SamplerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_sampler(
    provider: Arc<dyn FrameProvider>,
    sink: ChunkSink,
    settings: VideoSettings,
    cancel: CancellationToken,
) {
    let mut encoder = FrameEncoder::new(settings.scale, settings.jpeg_quality);
    let mut delay = Duration::from_millis(settings.initial_delay_ms);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let frame = provider.current_frame().filter(|f| f.has_pixels());
        let Some(frame) = frame else {
            log::debug!("No video frame yet, retrying");
            delay = Duration::from_millis(settings.retry_delay_ms);
            continue;
        };

        match encoder.encode(&frame) {
            Ok(data) => {
                if cancel.is_cancelled() {
                    return;
                }
                if !sink(OutboundChunk::jpeg(data)) {
                    log::debug!("Video frame not accepted by the connection");
                }
            }
            Err(e) => log::warn!("Skipping video frame: {e}"),
        }
        delay = Duration::from_millis(settings.frame_interval_ms);
    }
}
