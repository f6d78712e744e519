use std::{sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{config::RenderConfig, domain::SignalBundle};

use super::renderer::{NavigationError, PageRenderer};

static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid h1 selector"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="home-description-text"]"#).expect("valid description selector")
});
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid body selector"));
static BODY_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body *").expect("valid element selector"));
static PRICE_ELEMENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="price"]"#).expect("valid price selector"));
static LISTING_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="/homedetails/"]"#).expect("valid listing link selector")
});

static LISTED_BY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)listed by|brokered by|agent").expect("valid listed-by regex"));
static PRICE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)").expect("valid price regex"));
static MONTHLY_RENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s?(\d{1,3}(?:,\d{3})+|\d+)\s*(?:/\s*mo\b|per month|a month)")
        .expect("valid monthly rent regex")
});
static BEDROOMS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:bd|bds|beds?|bedrooms?)\b").expect("valid bedrooms regex")
});

const HIDDEN_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub bundle: SignalBundle,
    pub price: Option<u32>,
    pub bedrooms: Option<u32>,
}

pub struct PageSignalExtractor {
    renderer: Arc<dyn PageRenderer>,
    config: RenderConfig,
    rng: Mutex<StdRng>,
}

impl PageSignalExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: RenderConfig) -> Self {
        Self {
            renderer,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub async fn extract(&self, url: &str) -> Result<PageSignals, NavigationError> {
        let page = self.renderer.render(url, self.config.navigation_timeout).await?;
        tokio::time::sleep(self.settle_delay()).await;
        Ok(parse_listing_page(&page.html))
    }

    pub async fn discover_listing_links(&self, search_url: &str) -> Result<Vec<String>, NavigationError> {
        let page = self.renderer.render(search_url, self.config.navigation_timeout).await?;
        Ok(listing_links(&page.html, &page.final_url))
    }

    fn settle_delay(&self) -> Duration {
        let jitter_ms = self.config.settle_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            self.rng.lock().gen_range(0..jitter_ms)
        };
        self.config.settle_delay + Duration::from_millis(extra)
    }
}

pub fn parse_listing_page(html: &str) -> PageSignals {
    let document = Html::parse_document(html);

    let address = document.select(&HEADING).next().map(visible_text).and_then(non_empty);
    let description = document
        .select(&DESCRIPTION)
        .next()
        .map(visible_text)
        .and_then(non_empty);
    let listed_by_text = smallest_listed_by(&document);
    let full_text = document.select(&BODY).next().map(visible_text).unwrap_or_default();

    let price = listing_price(&document, &full_text);
    let bedrooms = BEDROOMS_REGEX
        .captures(&full_text)
        .and_then(|caps| caps[1].parse().ok());

    PageSignals {
        bundle: SignalBundle {
            address,
            description,
            listed_by_text,
            full_text,
        },
        price,
        bedrooms,
    }
}

pub fn listing_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&LISTING_LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if !links.contains(&resolved) {
            links.push(resolved);
        }
    }
    links
}

/// Fees and link text also carry dollar figures, so outside the price
/// element only a monthly rent counts.
fn listing_price(document: &Html, full_text: &str) -> Option<u32> {
    let element_text;
    let caps = match document.select(&PRICE_ELEMENT).next() {
        Some(element) => {
            element_text = visible_text(element);
            PRICE_REGEX.captures(&element_text)?
        }
        None => MONTHLY_RENT_REGEX.captures(full_text)?,
    };
    caps[1].replace(',', "").parse().ok()
}

fn smallest_listed_by(document: &Html) -> Option<String> {
    document
        .select(&BODY_ELEMENTS)
        .filter(|element| !HIDDEN_TAGS.contains(&element.value().name()))
        .map(visible_text)
        .filter(|text| LISTED_BY_REGEX.is_match(text))
        .min_by_key(|text| text.len())
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| HIDDEN_TAGS.contains(&name));
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
