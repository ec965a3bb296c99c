//! One live session and the media pipelines feeding it.
//!
//! `LiveSession` owns the connection, the microphone capture, the video
//! source switcher with its sampler, and the tool dispatcher. Pipelines run
//! only while the connection is open; they are torn down on `disconnect()`
//! and on an unexpected drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use recall_audio::{AudioCapture, AudioEvent, AudioEventKind, MicrophoneBackend, VolumeSmoother};
use recall_core::{
    ACTIVITY_TOOL_NAME, AppConfig, InboundKind, LiveConfig, LiveEvent, MediaAcquisitionError,
    MediaKind, OutboundChunk, Subscription, ToolCall, ToolResult, VideoSettings, VideoSourceKind,
};
use recall_video::{ChunkSink, SamplerHandle, VideoDevice, VideoSampler, VideoSourceSwitcher};
use tokio::sync::{broadcast, watch};

use crate::activity::{ActivityEvent, ActivityMonitor};
use crate::connection::{ConnectionManager, ConnectionOptions, ConnectionState};
use crate::dispatcher::{ToolCallDispatcher, ToolResponder};
use crate::error::LiveError;
use crate::traits::{ActivityStore, IdentityProvider, LiveTransport};

/// Something the front end should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    MediaUnavailable { kind: MediaKind, message: String },
    ConnectionLost { reason: String },
    ServerGoingAway { time_left: Option<String> },
}

/// Collaborators a session is built from.
pub struct SessionParts {
    pub transport: Arc<dyn LiveTransport>,
    pub microphone: Arc<dyn MicrophoneBackend>,
    pub video_devices: Vec<Arc<dyn VideoDevice>>,
    pub store: Arc<dyn ActivityStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub live: LiveConfig,
    pub video: VideoSettings,
    pub tool_reply_delay: Duration,
    pub connection: ConnectionOptions,
    pub start_muted: bool,
}

impl SessionOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            live: cfg.live.clone(),
            video: cfg.video.clone(),
            tool_reply_delay: cfg.tool_reply_delay(),
            connection: ConnectionOptions {
                reconnect: cfg.reconnect,
                ..ConnectionOptions::default()
            },
            start_muted: cfg.start_muted,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct Inner {
    connection: ConnectionManager,
    audio: AudioCapture,
    video: VideoSourceSwitcher,
    sampler: Mutex<Option<SamplerHandle>>,
    // Serializes pipeline start/stop so the sampler always follows the
    // active source and nothing is started after teardown.
    media: tokio::sync::Mutex<()>,
    dispatcher: ToolCallDispatcher,
    activities: ActivityMonitor,
    identity: Arc<dyn IdentityProvider>,
    options: SessionOptions,
    muted: AtomicBool,
    // Set by a remote close so the next setup resumes the pipelines.
    dropped: AtomicBool,
    volume: Arc<Mutex<VolumeSmoother>>,
    live_subs: Mutex<Vec<Subscription>>,
    _audio_subs: Vec<Subscription>,
    notices: broadcast::Sender<SessionNotice>,
}

pub struct LiveSession {
    inner: Arc<Inner>,
}

impl LiveSession {
    pub fn new(parts: SessionParts, options: SessionOptions) -> Self {
        let connection = ConnectionManager::new(parts.transport, options.connection.clone());
        let audio = AudioCapture::new(parts.microphone);
        let volume = Arc::new(Mutex::new(VolumeSmoother::new()));

        let audio_subs = {
            let conn = connection.clone();
            let data = audio.subscribe(AudioEventKind::Data, move |evt| {
                if let AudioEvent::Data(chunk) = evt {
                    conn.send(chunk.to_outbound());
                }
            });
            let meter = volume.clone();
            let level = audio.subscribe(AudioEventKind::Volume, move |evt| {
                if let AudioEvent::Volume(v) = evt {
                    meter.lock().update(*v);
                }
            });
            vec![data, level]
        };

        let activities = ActivityMonitor::new(parts.store);
        let dispatcher = ToolCallDispatcher::new(options.tool_reply_delay);
        dispatcher.register(ACTIVITY_TOOL_NAME, activities.handler());

        let (notices, _) = broadcast::channel(32);

        Self {
            inner: Arc::new(Inner {
                connection,
                audio,
                video: VideoSourceSwitcher::new(parts.video_devices),
                sampler: Mutex::new(None),
                media: tokio::sync::Mutex::new(()),
                dispatcher,
                activities,
                identity: parts.identity,
                muted: AtomicBool::new(options.start_muted),
                options,
                dropped: AtomicBool::new(false),
                volume,
                live_subs: Mutex::new(Vec::new()),
                _audio_subs: audio_subs,
                notices,
            }),
        }
    }

    /// Opens the session, then starts audio (unless muted) and the video
    /// sampler (if a source is active). Media failures become notices.
    pub async fn connect(&self) -> Result<(), LiveError> {
        let inner = &self.inner;
        if !inner.identity.is_authenticated() {
            log::warn!("Refusing to connect: not signed in");
            return Err(LiveError::NotAuthenticated);
        }

        let state = inner.connection.state();
        if !matches!(state, ConnectionState::Idle | ConnectionState::Closed) {
            return Err(LiveError::InvalidState(state));
        }

        *inner.live_subs.lock() = register_listeners(inner);
        inner.dropped.store(false, Ordering::Release);

        inner.connection.connect(inner.options.live.clone()).await?;
        inner.resume_pipelines(inner.connection.generation()).await;
        Ok(())
    }

    /// Stops the sampler, then audio, drops pending tool replies and closes
    /// the connection. Safe in any state.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.dropped.store(false, Ordering::Release);
        let _media = inner.media.lock().await;
        inner.stop_sampler();
        inner.audio.stop().await;
        inner.dispatcher.cancel_pending();
        inner.connection.disconnect().await;
        inner.live_subs.lock().clear();
        inner.volume.lock().reset();
    }

    /// Disconnects and releases every video device.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.inner.video.stop_all().await;
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), MediaAcquisitionError> {
        let inner = &self.inner;
        let _media = inner.media.lock().await;
        let was = inner.muted.swap(muted, Ordering::AcqRel);
        if was != muted {
            log::info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        }

        if muted {
            inner.audio.stop().await;
            inner.volume.lock().reset();
            Ok(())
        } else {
            inner.start_audio().await
        }
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::Acquire)
    }

    /// Makes `kind` the only active video source and points the sampler at
    /// it. `None` stops all video.
    pub async fn switch_video(
        &self,
        kind: Option<VideoSourceKind>,
    ) -> Result<Option<VideoSourceKind>, MediaAcquisitionError> {
        let inner = &self.inner;
        let _media = inner.media.lock().await;
        inner.stop_sampler();

        match inner.video.switch_to(kind).await {
            Ok(active) => {
                inner.start_sampler();
                Ok(active.kind())
            }
            Err(e) => {
                inner.report_media_error(&e);
                Err(e)
            }
        }
    }

    pub fn active_video(&self) -> Option<VideoSourceKind> {
        self.inner.video.active_kind()
    }

    pub fn available_video(&self) -> Vec<VideoSourceKind> {
        self.inner.video.available()
    }

    /// Smoothed microphone level in `[0, 1]`.
    pub fn input_volume(&self) -> f32 {
        self.inner.volume.lock().level()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    pub fn is_audio_streaming(&self) -> bool {
        self.inner.audio.is_streaming()
    }

    pub fn is_sampling(&self) -> bool {
        self.inner
            .sampler
            .lock()
            .as_ref()
            .is_some_and(SamplerHandle::is_running)
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn activity_events(&self) -> broadcast::Receiver<ActivityEvent> {
        self.inner.activities.subscribe()
    }

    pub fn activities(&self) -> &ActivityMonitor {
        &self.inner.activities
    }

    /// Listeners registered here are released on `disconnect()`.
    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }
}

impl Inner {
    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    fn report_media_error(&self, e: &MediaAcquisitionError) {
        log::warn!("Media unavailable: {e}");
        self.notify(SessionNotice::MediaUnavailable {
            kind: e.kind(),
            message: e.user_message(),
        });
    }

    async fn start_audio(&self) -> Result<(), MediaAcquisitionError> {
        if self.muted.load(Ordering::Acquire) || !self.connection.is_open() {
            return Ok(());
        }
        match self.audio.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let e = MediaAcquisitionError::from(e);
                self.report_media_error(&e);
                Err(e)
            }
        }
    }

    fn start_sampler(&self) {
        if !self.connection.is_open() {
            return;
        }
        let Some(provider) = self.video.active().provider() else {
            return;
        };

        let mut slot = self.sampler.lock();
        if slot.as_ref().is_some_and(SamplerHandle::is_running) {
            return;
        }
        let conn = self.connection.clone();
        let sink: ChunkSink = Arc::new(move |chunk: OutboundChunk| conn.send(chunk));
        *slot = Some(VideoSampler::start(provider, sink, &self.options.video));
        log::debug!("Video sampler started");
    }

    fn stop_sampler(&self) {
        let handle = self.sampler.lock().take();
        if let Some(handle) = handle {
            handle.stop();
            log::debug!("Video sampler stopped");
        }
    }

    /// Starts audio and the sampler for connection `generation`. Does
    /// nothing once that connection has been torn down or replaced.
    async fn resume_pipelines(&self, generation: u64) {
        let _media = self.media.lock().await;
        if self.connection.generation() != generation {
            return;
        }
        // Failures were already reported as notices.
        let _ = self.start_audio().await;
        if self.connection.generation() == generation {
            self.start_sampler();
        }
    }

    fn dispatch_tool_call(&self, call: &ToolCall) {
        let conn = self.connection.clone();
        let responder: ToolResponder = Arc::new(move |results: Vec<ToolResult>| {
            conn.send_tool_response(results)
        });
        self.dispatcher.dispatch(call, responder);
    }

    /// Synchronous half of the teardown after a remote close; the device
    /// release runs on a task.
    fn on_remote_close(self: Arc<Self>, reason: &str) {
        self.dropped.store(true, Ordering::Release);
        self.stop_sampler();
        self.dispatcher.cancel_pending();
        self.notify(SessionNotice::ConnectionLost {
            reason: reason.to_string(),
        });
        spawn_audio_release(self);
    }
}

fn spawn_audio_release(inner: Arc<Inner>) {
    let generation = inner.connection.generation();
    tokio::spawn(async move {
        let _media = inner.media.lock().await;
        // A reconnect already owns the microphone again.
        if inner.connection.generation() != generation {
            return;
        }
        inner.audio.stop().await;
        inner.volume.lock().reset();
    });
}

fn spawn_resume(inner: Arc<Inner>) {
    let generation = inner.connection.generation();
    tokio::spawn(async move {
        log::info!("Session re-established, resuming media");
        inner.resume_pipelines(generation).await;
    });
}

fn register_listeners(inner: &Arc<Inner>) -> Vec<Subscription> {
    let conn = &inner.connection;
    let mut subs = Vec::with_capacity(6);

    let weak = Arc::downgrade(inner);
    subs.push(conn.on(InboundKind::ToolCall, move |evt| {
        if let (Some(inner), LiveEvent::ToolCall(call)) = (weak.upgrade(), evt) {
            inner.dispatch_tool_call(call);
        }
    }));

    subs.push(conn.on(InboundKind::ToolCallCancellation, |evt| {
        if let LiveEvent::ToolCallCancellation { ids } = evt {
            log::info!("Server cancelled tool calls: {}", ids.join(", "));
        }
    }));

    subs.push(conn.on(InboundKind::Content, |evt| {
        if let LiveEvent::Content(content) = evt {
            let text = content.text();
            if !text.is_empty() {
                log::info!("Model: {text}");
            }
            if content.interrupted {
                log::debug!("Model turn interrupted");
            }
        }
    }));

    let weak = Arc::downgrade(inner);
    subs.push(conn.on(InboundKind::GoAway, move |evt| {
        if let (Some(inner), LiveEvent::GoAway { time_left }) = (weak.upgrade(), evt) {
            log::warn!("Server is going away (time left: {time_left:?})");
            inner.notify(SessionNotice::ServerGoingAway {
                time_left: time_left.clone(),
            });
        }
    }));

    let weak: Weak<Inner> = Arc::downgrade(inner);
    subs.push(conn.on(InboundKind::Close, move |evt| {
        if let (Some(inner), LiveEvent::Closed { reason }) = (weak.upgrade(), evt) {
            inner.on_remote_close(reason);
        }
    }));

    let weak = Arc::downgrade(inner);
    subs.push(conn.on(InboundKind::SetupComplete, move |_| {
        if let Some(inner) = weak.upgrade() {
            if inner.dropped.swap(false, Ordering::AcqRel) {
                spawn_resume(inner);
            }
        }
    }));

    subs
}
