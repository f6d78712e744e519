use std::{ops::RangeInclusive, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::domain::DispatchLimits;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: String,
    pub scrape: ScrapeConfig,
    pub dispatch: DispatchConfig,
    pub duplicate_window_days: u32,
    pub export: ExportConfig,
    pub heuristics_file: Option<PathBuf>,
    pub skip_process_guard: bool,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub search_base_url: String,
    pub city_query: Option<String>,
    pub zip_codes: Vec<String>,
    pub max_price: Option<u32>,
    pub min_bedrooms: Option<u32>,
    pub owners_only: bool,
    pub limit: usize,
    pub cron_specs: Vec<String>,
    pub render: RenderConfig,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub settle_jitter: Duration,
    pub user_agent: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(800),
            settle_jitter: Duration::from_millis(600),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    DryRun,
    Browser,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub initial_limits: DispatchLimits,
    pub pacing: PacingConfig,
    pub mode: DispatchMode,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub message_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub jitter: RangeInclusive<Duration>,
    pub micro_break: RangeInclusive<Duration>,
    pub micro_break_every: RangeInclusive<u32>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            jitter: Duration::from_secs(20)..=Duration::from_secs(50),
            micro_break: Duration::from_secs(60)..=Duration::from_secs(180),
            micro_break_every: 6..=10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} requires {1} to be set")]
    Requires(&'static str, &'static str),
}
