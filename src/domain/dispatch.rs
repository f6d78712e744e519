use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchItem {
    pub url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: BTreeMap::new(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn dedupe_key(&self) -> &str {
        self.meta("listing_id").unwrap_or(&self.url)
    }
}

pub const DEFAULT_CAP_HOUR: u32 = 25;
pub const DEFAULT_CAP_DAY: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchLimits {
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            per_hour: DEFAULT_CAP_HOUR,
            per_day: DEFAULT_CAP_DAY,
        }
    }
}

impl DispatchLimits {
    pub fn merged(self, update: LimitsUpdate) -> Self {
        Self {
            per_hour: update.per_hour.unwrap_or(self.per_hour),
            per_day: update.per_day.unwrap_or(self.per_day),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsUpdate {
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    BlockedDup,
    Failed,
    ConfirmedButNotSent,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "SENT",
            MessageStatus::BlockedDup => "BLOCKED_DUP",
            MessageStatus::Failed => "FAILED",
            MessageStatus::ConfirmedButNotSent => "CONFIRMED_BUT_NOT_SENT",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SENT" => Ok(MessageStatus::Sent),
            "BLOCKED_DUP" => Ok(MessageStatus::BlockedDup),
            "FAILED" => Ok(MessageStatus::Failed),
            "CONFIRMED_BUT_NOT_SENT" => Ok(MessageStatus::ConfirmedButNotSent),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub listing_id: String,
    pub listing_url: String,
    pub address: Option<String>,
    pub owner_name: Option<String>,
    pub message_text: String,
    pub status: MessageStatus,
    pub reason: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MessageLogEntry {
    pub fn new(
        listing_id: impl Into<String>,
        listing_url: impl Into<String>,
        message_text: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            listing_id: listing_id.into(),
            listing_url: listing_url.into(),
            address: None,
            owner_name: None,
            message_text: message_text.into(),
            status,
            reason: None,
            meta: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn has_absolute_url(&self) -> bool {
        url::Url::parse(&self.listing_url).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        (self.status == MessageStatus::Sent).then_some(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_label() {
        for status in [
            MessageStatus::Sent,
            MessageStatus::BlockedDup,
            MessageStatus::Failed,
            MessageStatus::ConfirmedButNotSent,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
        }
        assert!("sent".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn only_sent_entries_have_sent_at() {
        let sent = MessageLogEntry::new("A", "https://x.test/A", "hi", MessageStatus::Sent);
        let failed = MessageLogEntry::new("A", "https://x.test/A", "hi", MessageStatus::Failed);
        assert_eq!(sent.sent_at(), Some(sent.created_at));
        assert_eq!(failed.sent_at(), None);
    }
}
