use std::{env, path::PathBuf, str::FromStr, time::Duration};

use super::env::{
    AppConfig, ConfigError, DirectoryConfig, DispatchConfig, DispatchMode, ExportConfig,
    LoggingConfig, PacingConfig, RenderConfig, ScrapeConfig, DEFAULT_USER_AGENT,
};
use crate::domain::{DispatchLimits, DEFAULT_CAP_DAY, DEFAULT_CAP_HOUR};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "leads.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let timezone =
            env::var("PIPELINE_TIMEZONE").unwrap_or_else(|_| "America/Chicago".to_string());

        let render = RenderConfig {
            navigation_timeout: Duration::from_millis(parse_or("NAVIGATION_TIMEOUT_MS", 60_000)?),
            settle_delay: Duration::from_millis(parse_or("SETTLE_DELAY_MS", 800)?),
            settle_jitter: Duration::from_millis(parse_or("SETTLE_JITTER_MS", 600)?),
            user_agent: non_empty("SCRAPE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        let scrape = ScrapeConfig {
            search_base_url: non_empty("SEARCH_BASE_URL")
                .unwrap_or_else(|| "https://www.zillow.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            city_query: non_empty("SCRAPE_CITY"),
            zip_codes: split_list("SCRAPE_ZIPS", ','),
            max_price: parse_opt("SCRAPE_MAX_PRICE")?,
            min_bedrooms: parse_opt("SCRAPE_MIN_BEDROOMS")?,
            owners_only: parse_bool("SCRAPE_OWNERS_ONLY", true)?,
            limit: parse_or("SCRAPE_LIMIT", 40)?,
            cron_specs: split_list("SCRAPE_CRONS", ';'),
            render,
        };

        let pacing = PacingConfig {
            jitter: secs_range("JITTER_MIN_SECS", 20, "JITTER_MAX_SECS", 50)?,
            micro_break: secs_range("MICRO_BREAK_MIN_SECS", 60, "MICRO_BREAK_MAX_SECS", 180)?,
            micro_break_every: ordered(
                ("MICRO_BREAK_EVERY_MIN", parse_or("MICRO_BREAK_EVERY_MIN", 6)?),
                ("MICRO_BREAK_EVERY_MAX", parse_or("MICRO_BREAK_EVERY_MAX", 10)?),
            )?,
        };

        let mode = match non_empty("DISPATCH_MODE").as_deref() {
            None | Some("dry-run") => DispatchMode::DryRun,
            Some("browser") => DispatchMode::Browser,
            Some("webhook") => DispatchMode::Webhook,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "DISPATCH_MODE",
                    value: other.to_string(),
                })
            }
        };
        let webhook_url = non_empty("OUTBOUND_WEBHOOK_URL");
        if mode == DispatchMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::Requires("DISPATCH_MODE=webhook", "OUTBOUND_WEBHOOK_URL"));
        }

        let dispatch = DispatchConfig {
            initial_limits: DispatchLimits {
                per_hour: parse_or("CAP_HOUR", DEFAULT_CAP_HOUR)?,
                per_day: parse_or("CAP_DAY", DEFAULT_CAP_DAY)?,
            },
            pacing,
            mode,
            webhook_url,
            webhook_timeout: Duration::from_secs(15),
            message_template: non_empty("MESSAGE_TEMPLATE"),
        };

        let export = ExportConfig {
            webhook_url: non_empty("EXPORT_WEBHOOK_URL"),
            timeout: Duration::from_secs(10),
        };

        Ok(Self {
            directories,
            logging,
            timezone,
            scrape,
            dispatch,
            duplicate_window_days: parse_or("DUPLICATE_WINDOW_DAYS", 30)?,
            export,
            heuristics_file: non_empty("HEURISTICS_FILE").map(PathBuf::from),
            skip_process_guard: parse_bool("SKIP_PROCESS_GUARD", false)?,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty(key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(key)?.unwrap_or(default))
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match non_empty(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Ok(false),
        Some(value) => Err(ConfigError::Invalid { key, value }),
    }
}

fn split_list(key: &str, separator: char) -> Vec<String> {
    env::var(key)
        .map(|value| {
            value
                .split(separator)
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

fn ordered<T: PartialOrd + ToString>(
    low: (&'static str, T),
    high: (&'static str, T),
) -> Result<std::ops::RangeInclusive<T>, ConfigError> {
    if low.1 > high.1 {
        return Err(ConfigError::Invalid {
            key: high.0,
            value: high.1.to_string(),
        });
    }
    Ok(low.1..=high.1)
}

fn secs_range(
    min_key: &'static str,
    min_default: u64,
    max_key: &'static str,
    max_default: u64,
) -> Result<std::ops::RangeInclusive<Duration>, ConfigError> {
    let range = ordered(
        (min_key, parse_or(min_key, min_default)?),
        (max_key, parse_or(max_key, max_default)?),
    )?;
    Ok(Duration::from_secs(*range.start())..=Duration::from_secs(*range.end()))
}
