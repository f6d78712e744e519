use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::message_log::MessageLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DuplicateCheck {
    pub duplicate: bool,
    pub window_days: u32,
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("message log is not configured")]
    Unconfigured,
    #[error("message log lookup failed: {0}")]
    Unavailable(#[source] anyhow::Error),
}

#[derive(Clone)]
pub struct DuplicateGuard {
    log: Option<Arc<dyn MessageLog>>,
    default_window_days: u32,
}

impl DuplicateGuard {
    pub fn new(log: Option<Arc<dyn MessageLog>>, default_window_days: u32) -> Self {
        Self {
            log,
            default_window_days,
        }
    }

    pub fn default_window_days(&self) -> u32 {
        self.default_window_days
    }

    /// Fails open: when the log cannot be consulted the listing is reported
    /// as not duplicate.
    pub async fn check_duplicate(&self, listing_id: &str, window_days: Option<u32>) -> DuplicateCheck {
        let window_days = window_days.unwrap_or(self.default_window_days);
        match self.try_check(listing_id, window_days).await {
            Ok(check) => check,
            Err(err) => {
                tracing::warn!(
                    target: "guard",
                    listing_id,
                    error = %err,
                    "duplicate check unavailable; treating listing as not contacted"
                );
                DuplicateCheck {
                    duplicate: false,
                    window_days,
                }
            }
        }
    }

    pub async fn try_check(
        &self,
        listing_id: &str,
        window_days: u32,
    ) -> Result<DuplicateCheck, GuardError> {
        let log = self.log.as_ref().ok_or(GuardError::Unconfigured)?;
        let since = Utc::now() - Duration::days(i64::from(window_days));
        let duplicate = log
            .has_sent_since(listing_id, since)
            .await
            .map_err(GuardError::Unavailable)?;
        Ok(DuplicateCheck {
            duplicate,
            window_days,
        })
    }
}
