//! Lifecycle of the duplex session with the live service.
//!
//! States move `Idle -> Connecting -> Open -> Closing -> Closed`, and
//! `Closed -> Connecting` for a new attempt. Every attempt bumps a
//! generation counter; work belonging to an older generation (a late
//! handshake, a pump draining a dead link) is discarded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use recall_core::{
    EventRegistry, InboundKind, LiveConfig, LiveEvent, OutboundChunk, ReconnectPolicy,
    Subscription, ToolResult,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{HandshakeError, LiveError};
use crate::traits::{LiveLink, LiveSender, LiveTransport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::Never,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    sender: Option<Arc<dyn LiveSender>>,
    pump: Option<JoinHandle<()>>,
    // Cancels an in-flight handshake or a scheduled reconnect.
    attempt: Option<CancellationToken>,
    config: Option<LiveConfig>,
}

struct Shared {
    transport: Arc<dyn LiveTransport>,
    options: ConnectionOptions,
    events: EventRegistry<InboundKind, LiveEvent>,
    state_tx: watch::Sender<ConnectionState>,
    slot: Mutex<Slot>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn LiveTransport>, options: ConnectionOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                transport,
                options,
                events: EventRegistry::new(),
                state_tx,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.shared.slot.lock().generation
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Registers a listener for inbound events of `kind`.
    pub fn on<F>(&self, kind: InboundKind, callback: F) -> Subscription
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(kind, callback)
    }

    pub fn listener_count(&self, kind: InboundKind) -> usize {
        self.shared.events.listener_count(kind)
    }

    /// Opens a new session. Only valid from `Idle` or `Closed`.
    pub async fn connect(&self, config: LiveConfig) -> Result<(), LiveError> {
        self.shared
            .attempt(config, CancellationToken::new(), true)
            .await
    }

    /// Queues a media chunk. Returns false (and sends nothing) unless open.
    pub fn send(&self, chunk: OutboundChunk) -> bool {
        let Some(sender) = self.shared.open_sender() else {
            return false;
        };
        let accepted = sender.send_realtime_input(chunk);
        if !accepted {
            log::debug!("Outbound chunk dropped by transport");
        }
        accepted
    }

    pub fn send_tool_response(&self, results: Vec<ToolResult>) -> bool {
        let Some(sender) = self.shared.open_sender() else {
            log::debug!("Dropping {} tool results: not connected", results.len());
            return false;
        };
        sender.send_tool_response(results)
    }

    /// Closes the session and releases every listener. Safe in any state;
    /// aborts an in-flight `connect` and any pending reconnect.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        let (sender, pump) = {
            let mut slot = shared.slot.lock();
            if let Some(token) = slot.attempt.take() {
                token.cancel();
            }
            let state = shared.state();
            if matches!(state, ConnectionState::Idle | ConnectionState::Closed) {
                drop(slot);
                shared.events.clear();
                return;
            }
            slot.generation += 1;
            shared.set_state(ConnectionState::Closing);
            (slot.sender.take(), slot.pump.take())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(sender) = sender {
            sender.close().await;
        }

        {
            let _slot = shared.slot.lock();
            shared.set_state(ConnectionState::Closed);
        }
        shared.events.clear();
        log::info!("Live session disconnected");
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            log::debug!("Live connection {prev} -> {next}");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation == generation
    }

    fn open_sender(&self) -> Option<Arc<dyn LiveSender>> {
        let slot = self.slot.lock();
        if self.state() != ConnectionState::Open {
            return None;
        }
        slot.sender.clone()
    }

    fn begin_attempt(
        &self,
        config: &LiveConfig,
        token: CancellationToken,
        explicit: bool,
    ) -> Result<u64, LiveError> {
        let mut slot = self.slot.lock();
        let state = self.state();
        if !matches!(state, ConnectionState::Idle | ConnectionState::Closed) {
            return Err(LiveError::InvalidState(state));
        }

        let previous = slot.attempt.replace(token);
        if explicit {
            // A user-initiated connect supersedes a scheduled reconnect.
            if let Some(previous) = previous {
                previous.cancel();
            }
        }

        slot.generation += 1;
        slot.config = Some(config.clone());
        self.set_state(ConnectionState::Connecting);
        Ok(slot.generation)
    }

    fn fail_attempt(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.generation == generation && self.state() == ConnectionState::Connecting {
            slot.attempt = None;
            self.set_state(ConnectionState::Closed);
        }
    }

    async fn attempt(
        self: &Arc<Self>,
        config: LiveConfig,
        token: CancellationToken,
        explicit: bool,
    ) -> Result<(), LiveError> {
        let generation = self.begin_attempt(&config, token.clone(), explicit)?;
        log::info!("Connecting live session (model {})", config.model);

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(LiveError::Cancelled),
            r = tokio::time::timeout(self.options.connect_timeout, self.transport.open(&config)) => r,
        };

        let link = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.fail_attempt(generation);
                log::warn!("Live handshake failed: {e:#}");
                return Err(HandshakeError::new(format!("{e:#}")).into());
            }
            Err(_) => {
                self.fail_attempt(generation);
                log::warn!("Live handshake timed out");
                return Err(HandshakeError::new("timed out waiting for the session to open").into());
            }
        };

        if let Err(link) = self.install(generation, link) {
            link.outbound.close().await;
            return Err(LiveError::Cancelled);
        }
        Ok(())
    }

    /// Publishes an opened link, unless the attempt was superseded.
    fn install(self: &Arc<Self>, generation: u64, link: LiveLink) -> Result<(), LiveLink> {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation || self.state() != ConnectionState::Connecting {
                return Err(link);
            }
            slot.attempt = None;
            slot.sender = Some(link.outbound);
            self.set_state(ConnectionState::Open);
            slot.pump = Some(tokio::spawn(pump_inbound(
                self.clone(),
                generation,
                link.inbound,
            )));
        }

        log::info!("Live session open");
        self.events
            .emit(InboundKind::SetupComplete, &LiveEvent::SetupComplete);
        Ok(())
    }

    fn on_remote_close(self: &Arc<Self>, generation: u64, reason: &str) {
        let (sender, retry) = {
            let mut slot = self.slot.lock();
            if slot.generation != generation || self.state() != ConnectionState::Open {
                return;
            }
            // This runs on the pump task itself; just detach it.
            slot.pump = None;
            let sender = slot.sender.take();
            self.set_state(ConnectionState::Closed);

            let retry = match self.options.reconnect {
                ReconnectPolicy::Retry {
                    max_attempts,
                    delay_ms,
                } if max_attempts > 0 => slot.config.clone().map(|config| {
                    let token = CancellationToken::new();
                    slot.attempt = Some(token.clone());
                    (config, max_attempts, Duration::from_millis(delay_ms), token)
                }),
                _ => None,
            };
            (sender, retry)
        };

        log::warn!("Live session closed by remote: {reason}");
        if let Some(sender) = sender {
            tokio::spawn(async move { sender.close().await });
        }
        if let Some((config, max_attempts, delay, token)) = retry {
            schedule_reconnect(self.clone(), config, max_attempts, delay, token);
        }
    }
}

async fn pump_inbound(
    shared: Arc<Shared>,
    generation: u64,
    mut inbound: mpsc::Receiver<LiveEvent>,
) {
    let reason = loop {
        let Some(evt) = inbound.recv().await else {
            if !shared.is_current(generation) {
                return;
            }
            let reason = "connection lost".to_string();
            shared.events.emit(
                InboundKind::Close,
                &LiveEvent::Closed {
                    reason: reason.clone(),
                },
            );
            break reason;
        };

        if !shared.is_current(generation) {
            return;
        }
        shared.events.emit(evt.kind(), &evt);
        if let LiveEvent::Closed { reason } = evt {
            break reason;
        }
    };

    shared.on_remote_close(generation, &reason);
}

fn schedule_reconnect(
    shared: Arc<Shared>,
    config: LiveConfig,
    max_attempts: u32,
    delay: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            log::info!("Reconnecting live session (attempt {attempt}/{max_attempts})");
            match shared.attempt(config.clone(), token.clone(), false).await {
                Ok(()) => return,
                Err(LiveError::Cancelled) | Err(LiveError::InvalidState(_)) => return,
                Err(e) => log::warn!("Reconnect attempt {attempt} failed: {e}"),
            }
        }
        log::warn!("Giving up on the live session after {max_attempts} reconnect attempts");
    });
}
