use crate::activity::activity_live_config;
use crate::live::LiveConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Fixed delay before tool responses are sent back.
pub const DEFAULT_TOOL_REPLY_DELAY_MS: u64 = 200;

/// Replies never go out sooner than this, whatever the config says.
pub const MIN_TOOL_REPLY_DELAY_MS: u64 = DEFAULT_TOOL_REPLY_DELAY_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_live_url")]
    pub live_url: String,

    #[serde(default = "activity_live_config")]
    pub live: LiveConfig,

    #[serde(default)]
    pub video: VideoSettings,

    // Values below MIN_TOOL_REPLY_DELAY_MS are raised to it.
    #[serde(default = "default_tool_reply_delay_ms")]
    pub tool_reply_delay_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    #[serde(default)]
    pub start_muted: bool,

    #[serde(default)]
    pub microphone_device: Option<String>,

    // None means "next to the config file".
    #[serde(default)]
    pub activity_log_path: Option<String>,

    // Secrets are read from the environment, never stored here.
    #[serde(default)]
    pub rest_store: Option<RestStoreSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            live_url: default_live_url(),
            live: activity_live_config(),
            video: VideoSettings::default(),
            tool_reply_delay_ms: DEFAULT_TOOL_REPLY_DELAY_MS,
            reconnect: ReconnectPolicy::default(),
            start_muted: false,
            microphone_device: None,
            activity_log_path: None,
            rest_store: None,
        }
    }
}

impl AppConfig {
    pub fn tool_reply_delay(&self) -> Duration {
        Duration::from_millis(self.tool_reply_delay_ms.max(MIN_TOOL_REPLY_DELAY_MS))
    }
}

fn default_live_url() -> String {
    DEFAULT_LIVE_URL.into()
}

fn default_tool_reply_delay_ms() -> u64 {
    DEFAULT_TOOL_REPLY_DELAY_MS
}

/// Frame sampling parameters. Defaults give 2 fps at half resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub frame_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub initial_delay_ms: u64,
    pub scale: f32,
    pub jpeg_quality: u8,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 500,
            retry_delay_ms: 500,
            initial_delay_ms: 1000,
            scale: 0.5,
            jpeg_quality: 90,
        }
    }
}

/// What to do when the remote end drops the connection on its own.
/// An explicit disconnect never reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    #[default]
    Never,
    Retry { max_attempts: u32, delay_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestStoreSettings {
    pub base_url: String,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "activities".into()
}
