//! Configuration module for the EventDesk backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Remote verify-entry endpoint tried first by the scan flow
    pub verify_entry_url: Option<String>,
    /// How long a check-in can be undone, in seconds
    pub undo_window_secs: i64,
    /// Sessions that started longer ago than this need operator confirmation
    pub late_checkin_hours: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("EVENTDESK_API_PSK").ok();

        let db_path = env::var("EVENTDESK_DB_PATH")
            .unwrap_or_else(|_| "./data/eventdesk.sqlite".to_string())
            .into();

        let bind_addr = env::var("EVENTDESK_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid EVENTDESK_BIND_ADDR format");

        let log_level = env::var("EVENTDESK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let verify_entry_url = env::var("EVENTDESK_VERIFY_ENTRY_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let undo_window_secs = env_i64("EVENTDESK_UNDO_WINDOW_SECS", 30);
        let late_checkin_hours = env_i64("EVENTDESK_LATE_CHECKIN_HOURS", 3);

        Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            verify_entry_url,
            undo_window_secs,
            late_checkin_hours,
        }
    }

    pub fn undo_window(&self) -> Duration {
        Duration::seconds(self.undo_window_secs)
    }

    pub fn late_checkin_threshold(&self) -> Duration {
        Duration::hours(self.late_checkin_hours)
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
