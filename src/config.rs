// Configuration file format and its resolved, typed form

use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::LineLetter;

// ============================================================================
// File Format
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub board: BoardConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub stop_id: String,
    pub lines: Vec<String>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            url: "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-bdfm".to_string(),
            stop_id: "D21N".to_string(),
            lines: vec!["B".to_string(), "D".to_string()],
            request_timeout_secs: 10,
            user_agent: "Mozilla/5.0 (compatible; SubwayBoard/1.0)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub station: String,
    pub direction: String,
    pub per_line_cap: usize,
    pub safety_buffer_minutes: u32,
    pub track_max_minutes: u32,
    pub timezone: String,
    pub poll_interval_ms: u64,
    pub render_interval_ms: u64,
    pub stale_after_secs: u64,
    /// Read arrivals from a running server instead of the upstream feed.
    pub api_url: Option<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            station: "Grand St".to_string(),
            direction: "Uptown & The Bronx".to_string(),
            per_line_cap: 3,
            safety_buffer_minutes: 2,
            track_max_minutes: 20,
            timezone: "America/New_York".to_string(),
            poll_interval_ms: 30_000,
            render_interval_ms: 1_000,
            stale_after_secs: 120,
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub layout_store: LayoutBackend,
    pub layout_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            layout_store: LayoutBackend::Memory,
            layout_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validates every value and produces the settings the rest of the
    /// program runs on.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let lines = self
            .feed
            .lines
            .iter()
            .map(|l| l.parse::<LineLetter>().map_err(ConfigError::Invalid))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if lines.is_empty() {
            return Err(ConfigError::Invalid("feed.lines must name at least one line".to_string()));
        }
        if self.feed.stop_id.trim().is_empty() {
            return Err(ConfigError::Invalid("feed.stop_id must not be empty".to_string()));
        }
        if self.feed.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("feed.request_timeout_secs must be positive".to_string()));
        }
        if self.board.per_line_cap == 0 {
            return Err(ConfigError::Invalid("board.per_line_cap must be positive".to_string()));
        }
        if self.board.track_max_minutes == 0 {
            return Err(ConfigError::Invalid("board.track_max_minutes must be positive".to_string()));
        }
        if self.board.poll_interval_ms == 0 || self.board.render_interval_ms == 0 {
            return Err(ConfigError::Invalid("board intervals must be positive".to_string()));
        }
        let stale_after_secs = i64::try_from(self.board.stale_after_secs).map_err(|_| {
            ConfigError::Invalid(format!("board.stale_after_secs {} is too large", self.board.stale_after_secs))
        })?;
        let timezone: Tz = self.board.timezone.parse().map_err(|e| {
            ConfigError::Invalid(format!("unknown timezone '{}': {}", self.board.timezone, e))
        })?;

        Ok(Settings {
            feed: FeedSettings {
                url: self.feed.url,
                stop_id: self.feed.stop_id,
                lines,
                request_timeout: Duration::from_secs(self.feed.request_timeout_secs),
                user_agent: self.feed.user_agent,
            },
            board: BoardSettings {
                station: self.board.station,
                direction: self.board.direction,
                per_line_cap: self.board.per_line_cap,
                safety_buffer_secs: i64::from(self.board.safety_buffer_minutes) * 60,
                track_max_minutes: i64::from(self.board.track_max_minutes),
                timezone,
                poll_interval: Duration::from_millis(self.board.poll_interval_ms),
                render_interval: Duration::from_millis(self.board.render_interval_ms),
                stale_after_secs,
                api_url: self.board.api_url,
            },
            server: self.server,
        })
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    pub feed: FeedSettings,
    pub board: BoardSettings,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub stop_id: String,
    pub lines: BTreeSet<LineLetter>,
    pub request_timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct BoardSettings {
    pub station: String,
    pub direction: String,
    pub per_line_cap: usize,
    pub safety_buffer_secs: i64,
    pub track_max_minutes: i64,
    pub timezone: Tz,
    pub poll_interval: Duration,
    pub render_interval: Duration,
    pub stale_after_secs: i64,
    pub api_url: Option<String>,
}

impl Settings {
    pub fn defaults() -> Result<Self, ConfigError> {
        Config::default().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.feed.stop_id, "D21N");
        assert_eq!(
            settings.feed.lines.iter().map(|l| l.as_char()).collect::<Vec<_>>(),
            vec!['B', 'D']
        );
        assert_eq!(settings.board.per_line_cap, 3);
        assert_eq!(settings.board.safety_buffer_secs, 120);
        assert_eq!(settings.board.track_max_minutes, 20);
        assert_eq!(settings.board.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.board.render_interval, Duration::from_secs(1));
        assert_eq!(settings.board.timezone, chrono_tz::America::New_York);
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            stop_id = "F14S"
            lines = ["f", "M"]

            [board]
            safety_buffer_minutes = 0

            [server]
            layout_store = "file"
            "#,
        )
        .unwrap();
        let settings = config.resolve().unwrap();

        assert_eq!(settings.feed.stop_id, "F14S");
        assert_eq!(
            settings.feed.lines.iter().map(|l| l.as_char()).collect::<Vec<_>>(),
            vec!['F', 'M']
        );
        assert_eq!(settings.board.safety_buffer_secs, 0);
        assert_eq!(settings.board.station, "Grand St");
        assert_eq!(settings.server.layout_store, LayoutBackend::File);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.feed.lines = vec!["BD".to_string()];
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.feed.lines.clear();
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.board.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.board.track_max_minutes = 0;
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_stale_after_range() {
        let mut config = Config::default();
        config.board.stale_after_secs = u64::MAX;
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.board.stale_after_secs = i64::MAX as u64;
        assert_eq!(config.resolve().unwrap().board.stale_after_secs, i64::MAX);
    }
}
