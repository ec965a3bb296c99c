use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use recall_audio::MicrophoneBackend;
use recall_core::AppConfig;
use recall_engine::session::{LiveSession, SessionOptions, SessionParts};
use recall_engine::traits::{ActivityStore, IdentityProvider, LiveTransport};
use recall_providers::gemini_live::GeminiLiveConfig;
use recall_providers::rest_store::RestStoreConfig;
use recall_video::VideoDevice;

use crate::activity_log::{JsonActivityLog, LocalUser};
use crate::defaults::activity_log_path;
use crate::live::GeminiLiveTransport;
use crate::rest::RestActivityStore;
use crate::secrets::{GEMINI_API_KEY_ENV, REST_API_KEY_ENV, Secrets};

/// Capture devices supplied by the front end.
pub struct MediaDevices {
    pub microphone: Arc<dyn MicrophoneBackend>,
    pub video: Vec<Arc<dyn VideoDevice>>,
}

/// Where accepted activities are recorded, and who is recording them.
pub struct ActivityBackend {
    pub store: Arc<dyn ActivityStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// The REST table when configured, otherwise the local JSON log.
pub fn build_activity_backend(
    cfg: &AppConfig,
    config_path: &Path,
    secrets: &Secrets,
) -> anyhow::Result<ActivityBackend> {
    match &cfg.rest_store {
        Some(rest) => {
            let api_key = secrets
                .rest_api_key
                .clone()
                .ok_or_else(|| anyhow!("REST store configured but {REST_API_KEY_ENV} is not set"))?;
            let session = secrets.rest_session();
            if session.is_none() {
                log::warn!("No REST session; activities cannot be stored until you sign in");
            }
            let store = Arc::new(RestActivityStore::new(
                RestStoreConfig {
                    base_url: rest.base_url.clone(),
                    api_key,
                    table: rest.table.clone(),
                },
                session,
            ));
            Ok(ActivityBackend {
                store: store.clone(),
                identity: store,
            })
        }
        None => {
            let path = activity_log_path(cfg, config_path);
            log::info!("Activity log: {}", path.display());
            Ok(ActivityBackend {
                store: Arc::new(JsonActivityLog::at_path(path)),
                identity: Arc::new(LocalUser),
            })
        }
    }
}

/// Builds a session from config, credentials and the platform's devices.
pub fn build_session_from_config(
    cfg: &AppConfig,
    config_path: &Path,
    secrets: &Secrets,
    devices: MediaDevices,
) -> anyhow::Result<LiveSession> {
    let api_key = secrets
        .gemini_api_key
        .clone()
        .ok_or_else(|| anyhow!("missing Gemini API key: set {GEMINI_API_KEY_ENV}"))?;
    let live_cfg = GeminiLiveConfig::new(&cfg.live_url, api_key).context("live endpoint")?;
    let transport: Arc<dyn LiveTransport> = Arc::new(GeminiLiveTransport::new(live_cfg));

    let backend = build_activity_backend(cfg, config_path, secrets)?;

    Ok(LiveSession::new(
        SessionParts {
            transport,
            microphone: devices.microphone,
            video_devices: devices.video,
            store: backend.store,
            identity: backend.identity,
        },
        SessionOptions::from_config(cfg),
    ))
}
