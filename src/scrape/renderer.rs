use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("not a navigable url: {0}")]
    InvalidUrl(String),
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("navigation to {url} failed: {source}")]
    Failed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("navigation to {url} returned {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: Url,
    pub html: String,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, NavigationError>;
}

pub struct HttpRenderer {
    client: Client,
    user_agent: String,
}

impl HttpRenderer {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, raw_url: &str, timeout: Duration) -> Result<RenderedPage, NavigationError> {
        let url = match Url::parse(raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return Err(NavigationError::InvalidUrl(raw_url.to_string())),
        };

        let failed = |source: reqwest::Error| {
            if source.is_timeout() {
                NavigationError::Timeout {
                    url: raw_url.to_string(),
                    timeout,
                }
            } else {
                NavigationError::Failed {
                    url: raw_url.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, self.user_agent.as_str())
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NavigationError::Status {
                url: raw_url.to_string(),
                status,
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(failed)?;
        Ok(RenderedPage { final_url, html })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct StaticRenderer {
        pages: HashMap<String, String>,
        pub visited: Mutex<Vec<String>>,
    }

    impl StaticRenderer {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, NavigationError> {
            self.visited.lock().push(url.to_string());
            let html = self.pages.get(url).ok_or_else(|| NavigationError::Timeout {
                url: url.to_string(),
                timeout,
            })?;
            let final_url =
                Url::parse(url).map_err(|_| NavigationError::InvalidUrl(url.to_string()))?;
            Ok(RenderedPage {
                final_url,
                html: html.clone(),
            })
        }
    }
}
