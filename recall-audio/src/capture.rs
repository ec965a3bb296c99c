use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use recall_core::{EventRegistry, OutboundChunk, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chunker::WindowPipeline;
use crate::error::AudioCaptureError;

/// Samples per outbound window (128 ms at 16 kHz).
pub const CHUNK_SAMPLES: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Base64 of 16 kHz mono s16le PCM.
    pub data: String,
    /// RMS of the same window, in `[0, 1]`.
    pub volume: f32,
}

impl AudioChunk {
    pub fn to_outbound(&self) -> OutboundChunk {
        OutboundChunk::audio(self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Data(AudioChunk),
    Volume(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioEventKind {
    Data,
    Volume,
}

impl AudioEvent {
    pub fn kind(&self) -> AudioEventKind {
        match self {
            AudioEvent::Data(_) => AudioEventKind::Data,
            AudioEvent::Volume(_) => AudioEventKind::Volume,
        }
    }
}

/// Opens a capture device and pushes mono `f32` callbacks into `sink`.
///
/// `open` may block (device negotiation); callers run it off the async
/// executor.
pub trait MicrophoneBackend: Send + Sync {
    fn open(
        &self,
        sink: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn MicrophoneStream>, AudioCaptureError>;
}

/// A running device stream. Dropping it releases the device.
pub trait MicrophoneStream: Send {
    fn sample_rate_hz(&self) -> u32;
}

struct Running {
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    stream: Box<dyn MicrophoneStream>,
}

pub struct AudioCapture {
    backend: Arc<dyn MicrophoneBackend>,
    events: EventRegistry<AudioEventKind, AudioEvent>,
    running: tokio::sync::Mutex<Option<Running>>,
    streaming: AtomicBool,
}

impl AudioCapture {
    pub fn new(backend: Arc<dyn MicrophoneBackend>) -> Self {
        Self {
            backend,
            events: EventRegistry::new(),
            running: tokio::sync::Mutex::new(None),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn subscribe<F>(&self, kind: AudioEventKind, callback: F) -> Subscription
    where
        F: Fn(&AudioEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Acquires the microphone and starts emitting events. No-op if already
    /// running.
    pub async fn start(&self) -> Result<(), AudioCaptureError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let backend = self.backend.clone();
        let stream = tokio::task::spawn_blocking(move || backend.open(tx))
            .await
            .map_err(|e| AudioCaptureError::Worker(format!("open task failed: {e}")))??;

        let rate = stream.sample_rate_hz();
        // On failure the stream is dropped here, which releases the device.
        let pipeline = WindowPipeline::new(rate)?;
        log::info!("Microphone capture started ({rate} Hz)");

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump_audio(rx, pipeline, self.events.clone(), cancel.clone()));

        *running = Some(Running {
            cancel,
            pump,
            stream,
        });
        self.streaming.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops emitting and releases the device. Safe to call in any state.
    pub async fn stop(&self) {
        let Some(r) = self.running.lock().await.take() else {
            return;
        };
        self.streaming.store(false, Ordering::Release);

        r.cancel.cancel();
        r.pump.abort();
        drop(r.stream);
        log::info!("Microphone capture stopped");
    }
}

async fn pump_audio(
    mut rx: mpsc::UnboundedReceiver<Vec<f32>>,
    mut pipeline: WindowPipeline,
    events: EventRegistry<AudioEventKind, AudioEvent>,
    cancel: CancellationToken,
) {
    loop {
        let samples = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            s = rx.recv() => match s {
                Some(s) => s,
                None => {
                    log::warn!("Microphone stream ended");
                    break;
                }
            },
        };

        for chunk in pipeline.push(&samples) {
            if cancel.is_cancelled() {
                return;
            }
            let level = chunk.volume;
            events.emit(AudioEventKind::Data, &AudioEvent::Data(chunk));
            events.emit(AudioEventKind::Volume, &AudioEvent::Volume(level));
        }
    }
}
