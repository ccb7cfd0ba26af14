//! Process-wide configuration (A3), read from environment once at startup.
//!
//! Every secret-bearing key accepts an optional `_FILE`-suffixed sibling
//! that takes precedence when present, for mounted-secret deployments.

use std::path::PathBuf;

use crate::notify::{CompositeNotifier, NoopNotifier, Notifier, Severity, SmtpConfig, SmtpNotifier, TelegramConfig, TelegramNotifier};

fn env_or_file(key: &str) -> Option<String> {
    let file_key = format!("{key}_FILE");
    if let Ok(path) = std::env::var(&file_key) {
        return std::fs::read_to_string(path).ok().map(|s| s.trim().to_string());
    }
    std::env::var(key).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMode {
    Api,
    Direct,
}

/// Tunables for the scheduler/runner tick loop (C2).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub interval_seconds: u64,
    pub mode: RunnerMode,
    pub max_schedules: usize,
    pub drain_mode: bool,
    pub drain_max_batches: usize,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let mode = match std::env::var("RUNNER_MODE").as_deref() {
            Ok("direct") => RunnerMode::Direct,
            _ => RunnerMode::Api,
        };
        Self {
            interval_seconds: env_parsed("RUNNER_INTERVAL", 60),
            mode,
            max_schedules: env_parsed("RUNNER_MAX_SCHEDULES", 10),
            drain_mode: env_parsed("RUNNER_DRAIN_MODE", true),
            drain_max_batches: env_parsed("RUNNER_DRAIN_MAX_BATCHES", 20),
        }
    }
}

/// Tunables for `tracing-subscriber` initialization (A2).
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_filename: Option<String>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_dir: std::env::var("LOG_DIR").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_filename: std::env::var("LOG_FILENAME").ok(),
        }
    }
}

/// Process-wide engine configuration: master key, data dir, auth token,
/// runner tunables, logging tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub master_encryption_key: Option<String>,
    pub data_dir: PathBuf,
    pub auth_token: Option<String>,
    pub runner: RunnerConfig,
    pub log: LogConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("BACKUP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("backup-automation"));
        Self {
            master_encryption_key: env_or_file("MASTER_ENCRYPTION_KEY"),
            data_dir,
            auth_token: env_or_file("BACKUP_AUTH_TOKEN"),
            runner: RunnerConfig::from_env(),
            log: LogConfig::from_env(),
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.sqlite3")
    }
}

fn parse_severity(key: &str, default: Severity) -> Severity {
    match std::env::var(key).as_deref() {
        Ok("success") => Severity::Success,
        Ok("failure") => Severity::Failure,
        _ => default,
    }
}

/// Build the composite notifier from whichever transports are configured;
/// absence of configuration degrades to a no-op notifier rather than a
/// startup failure.
pub fn build_notifier_from_env() -> Box<dyn Notifier> {
    let mut transports: Vec<Box<dyn Notifier>> = Vec::new();

    if let Some(host) = std::env::var("SMTP_HOST").ok() {
        let to: Vec<String> = std::env::var("SMTP_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !to.is_empty() {
            transports.push(Box::new(SmtpNotifier::new(SmtpConfig {
                host,
                port: env_parsed("SMTP_PORT", 25),
                username: std::env::var("SMTP_USERNAME").ok(),
                password: env_or_file("SMTP_PASSWORD"),
                from: std::env::var("SMTP_FROM").unwrap_or_else(|_| "backup-automation@localhost".to_string()),
                to,
                min_severity: parse_severity("SMTP_MIN_SEVERITY", Severity::Failure),
            })));
        }
    }

    if let (Some(bot_token), Some(chat_id)) = (env_or_file("TELEGRAM_BOT_TOKEN"), std::env::var("TELEGRAM_CHAT_ID").ok()) {
        transports.push(Box::new(TelegramNotifier::new(TelegramConfig {
            bot_token,
            chat_id,
            min_severity: parse_severity("TELEGRAM_MIN_SEVERITY", Severity::Failure),
        })));
    }

    if transports.is_empty() {
        transports.push(Box::new(NoopNotifier));
    }
    Box::new(CompositeNotifier::new(transports))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_config_defaults_match_spec() {
        std::env::remove_var("RUNNER_INTERVAL");
        std::env::remove_var("RUNNER_MODE");
        std::env::remove_var("RUNNER_MAX_SCHEDULES");
        std::env::remove_var("RUNNER_DRAIN_MODE");
        std::env::remove_var("RUNNER_DRAIN_MAX_BATCHES");
        let cfg = RunnerConfig::from_env();
        assert_eq!(cfg.interval_seconds, 60);
        assert_eq!(cfg.mode, RunnerMode::Api);
        assert_eq!(cfg.max_schedules, 10);
        assert!(cfg.drain_mode);
        assert_eq!(cfg.drain_max_batches, 20);
    }

    #[test]
    fn unconfigured_notifier_degrades_to_noop() {
        std::env::remove_var("SMTP_HOST");
        std::env::remove_var("TELEGRAM_BOT_TOKEN");
        // build_notifier_from_env never panics when nothing is configured.
        let _notifier = build_notifier_from_env();
    }
}
