use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::DispatchItem;

pub const DEFAULT_TEMPLATE: &str = "Hi! Saw your {beds}/{baths} at {address} in {city}. Is it still available? I have qualified tenants. Price shows {price}.";

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

#[derive(Debug, Clone)]
pub struct MessageTemplate {
    body: String,
}

impl MessageTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Unknown or missing keys render as empty strings.
    pub fn render(&self, item: &DispatchItem) -> String {
        PLACEHOLDER_REGEX
            .replace_all(&self.body, |caps: &Captures| {
                item.meta(&caps[1]).unwrap_or_default().to_string()
            })
            .into_owned()
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}
