use std::path::{Path, PathBuf};

use recall_core::AppConfig;

pub const CONFIG_DIR_ENV: &str = "DAILYRECALL_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ACTIVITY_LOG_FILE_NAME: &str = "activities.json";

/// Local log entries kept before the oldest are dropped.
pub const ACTIVITY_LOG_MAX_ENTRIES: usize = 500;

pub fn default_app_config() -> AppConfig {
    AppConfig::default()
}

/// `$DAILYRECALL_CONFIG_DIR`, else `~/.config/dailyrecall` (`%APPDATA%` on
/// Windows), else the working directory.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(appdata) = std::env::var_os("APPDATA").filter(|v| !v.is_empty()) {
        return PathBuf::from(appdata).join("DailyRecall");
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".config").join("dailyrecall");
    }
    PathBuf::from(".")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

/// The configured log path, or `activities.json` next to the config file.
pub fn activity_log_path(cfg: &AppConfig, config_path: &Path) -> PathBuf {
    match cfg.activity_log_path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(p) => PathBuf::from(p),
        None => config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(ACTIVITY_LOG_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_log_defaults_next_to_config() {
        let cfg = AppConfig::default();
        let p = activity_log_path(&cfg, Path::new("/tmp/recall/config.json"));
        assert_eq!(p, Path::new("/tmp/recall/activities.json"));
    }

    #[test]
    fn explicit_activity_log_path_wins() {
        let cfg = AppConfig {
            activity_log_path: Some("/data/log.json".into()),
            ..AppConfig::default()
        };
        let p = activity_log_path(&cfg, Path::new("/tmp/recall/config.json"));
        assert_eq!(p, Path::new("/data/log.json"));
    }
}
