use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use recall_core::{ActivityRecord, AppConfig, ReconnectPolicy, VideoSourceKind};
use recall_engine::activity::ActivityEvent;
use recall_engine::connection::ConnectionState;
use recall_engine::session::{LiveSession, SessionNotice};
use recall_runtime::activity_log::JsonActivityLog;
use recall_runtime::config_store::ConfigStore;
use recall_runtime::defaults::{activity_log_path, default_app_config, default_config_path};
use recall_runtime::secrets::Secrets;
use recall_runtime::session_builder::{MediaDevices, build_activity_backend, build_session_from_config};

mod devices;

#[derive(Parser)]
#[command(name = "recall", about = "Live activity monitoring with DailyRecall", version)]
struct Cli {
    /// Config file (defaults to the per-user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a live session and stream microphone and video until interrupted.
    Run {
        /// Image sent as the webcam feed.
        #[arg(long)]
        frame_image: Option<PathBuf>,
        /// Image sent as the shared screen instead of a live capture.
        #[arg(long)]
        screen_image: Option<PathBuf>,
        #[arg(long)]
        muted: bool,
        /// Microphone name; see `recall devices`.
        #[arg(long)]
        device: Option<String>,
        /// Stop after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Print recorded activities, newest first.
    Activities {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Empty the local activity log.
    Clear,
    /// List microphones.
    Devices,
    /// Write a default config file.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let store = ConfigStore::at_path(&config_path);

    match cli.command {
        Commands::Run {
            frame_image,
            screen_image,
            muted,
            device,
            duration_secs,
        } => {
            let mut cfg = store.load_or_default()?;
            if muted {
                cfg.start_muted = true;
            }
            let device = device.or_else(|| cfg.microphone_device.clone());
            let devices = MediaDevices {
                microphone: devices::microphone(device),
                video: devices::video_sources(frame_image.as_deref(), screen_image.as_deref())?,
            };
            let session =
                build_session_from_config(&cfg, &config_path, &Secrets::from_env(), devices)?;
            run(&session, &cfg, duration_secs.map(Duration::from_secs)).await
        }
        Commands::Activities { limit } => {
            let cfg = store.load_or_default()?;
            let backend = build_activity_backend(&cfg, &config_path, &Secrets::from_env())?;
            let records = backend
                .store
                .list_events()
                .await
                .context("list activities")?;
            if records.is_empty() {
                println!("No activities recorded yet.");
            }
            for r in records.iter().take(limit) {
                println!("{}", format_record(r));
            }
            Ok(())
        }
        Commands::Clear => {
            let cfg = store.load_or_default()?;
            if cfg.rest_store.is_some() {
                bail!("activities are stored remotely; clear them from the REST table instead");
            }
            let log = JsonActivityLog::at_path(activity_log_path(&cfg, &config_path));
            log.clear()?;
            println!("Cleared {}", log.path().display());
            Ok(())
        }
        Commands::Devices => {
            let names = devices::input_device_names()?;
            if names.is_empty() {
                println!("No input devices found.");
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Commands::InitConfig { force } => init_config(&store, force),
    }
}

async fn run(
    session: &LiveSession,
    cfg: &AppConfig,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    let mut notices = session.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                SessionNotice::MediaUnavailable { kind, message } => {
                    eprintln!("[{kind}] {message}")
                }
                SessionNotice::ConnectionLost { reason } => {
                    eprintln!("Connection lost: {reason}")
                }
                SessionNotice::ServerGoingAway { time_left } => match time_left {
                    Some(t) => eprintln!("Server closing the session in {t}"),
                    None => eprintln!("Server closing the session"),
                },
            }
        }
    });

    let mut events = session.activity_events();
    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            match ev {
                ActivityEvent::Logged(r) => println!("{}", format_record(&r)),
                ActivityEvent::Ignored {
                    activity,
                    confidence,
                } => log::debug!("Ignored {activity} at {confidence:.2}"),
                ActivityEvent::Invalid(msg) => log::warn!("Malformed activity report: {msg}"),
                ActivityEvent::Stored(r) => log::debug!("Stored activity {}", r.id),
                ActivityEvent::PersistFailed(e) => eprintln!("Could not save activity: {e}"),
            }
        }
    });

    session.connect().await.context("connect")?;
    log::info!("Connected; press Ctrl+C to stop");

    for kind in [VideoSourceKind::Webcam, VideoSourceKind::ScreenShare] {
        if session.available_video().contains(&kind) {
            // Failures are already reported as notices.
            if session.switch_video(Some(kind)).await.is_ok() {
                break;
            }
        }
    }

    let mut state = session.watch_state();
    let follow_reconnects = !matches!(cfg.reconnect, ReconnectPolicy::Never);
    let closed = async {
        loop {
            if state.changed().await.is_err() {
                return;
            }
            if *state.borrow() == ConnectionState::Closed && !follow_reconnects {
                return;
            }
        }
    };
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        r = tokio::signal::ctrl_c() => r.context("wait for Ctrl+C")?,
        _ = deadline => log::info!("Duration elapsed"),
        _ = closed => log::info!("Session closed by the server"),
    }

    session.shutdown().await;
    Ok(())
}

fn init_config(store: &ConfigStore, force: bool) -> anyhow::Result<()> {
    if store.path().exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            store.path().display()
        );
    }
    store.save(&default_app_config())?;
    println!("Wrote {}", store.path().display());
    Ok(())
}

fn format_record(r: &ActivityRecord) -> String {
    let when = Local
        .timestamp_millis_opt(r.recorded_at_unix_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".into());
    let mut line = format!("{when}  {}", r.activity);
    if let Some(c) = r.confidence {
        line.push_str(&format!(" ({:.0}%)", c * 100.0));
    }
    if let Some(n) = &r.notes {
        line.push_str(&format!(": {n}"));
    }
    line
}
