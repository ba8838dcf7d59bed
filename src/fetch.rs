use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::{TrackerError, TrackerResult};
use crate::models::RawPosting;

// --- Source trait ---

/// A place job postings can be discovered. `search` never fails: an
/// unreachable source yields an empty batch.
pub trait JobSource {
    fn search(&self, query: &str, location: &str, max_results: usize) -> Vec<RawPosting>;
    fn name(&self) -> &str;
}

pub fn resolve_source(name: &str, config: &Config) -> TrackerResult<Box<dyn JobSource>> {
    match name.trim().to_lowercase().as_str() {
        "mock" => Ok(Box::new(MockSource)),
        "indeed" => Ok(Box::new(
            IndeedSource::new(&config.indeed_url, &config.user_agent, config.fetch_timeout)
                .map_err(TrackerError::Internal)?,
        )),
        other => Err(TrackerError::Validation(format!(
            "unknown source '{}' (expected one of: mock, indeed)",
            other
        ))),
    }
}

// --- Deterministic stub ---

pub const MOCK_BASE_URL: &str = "https://example.com";

/// Offline source that always produces the same three cards for a given
/// query and location.
pub struct MockSource;

impl JobSource for MockSource {
    fn search(&self, query: &str, location: &str, max_results: usize) -> Vec<RawPosting> {
        let location = location.trim();
        let pick = |fallback: &str| {
            if location.is_empty() {
                fallback.to_string()
            } else {
                location.to_string()
            }
        };

        let fixtures = [
            (
                format!("{} - Position 1", query),
                "Tech Corp",
                pick("Remote"),
                format!("Great opportunity for {} role", query),
            ),
            (
                format!("{} - Position 2", query),
                "StartupXYZ",
                pick("San Francisco, CA"),
                format!("Exciting {} position at a growing startup", query),
            ),
            (
                format!("Senior {}", query),
                "Big Tech Inc",
                pick("New York, NY"),
                format!("Senior level {} role with competitive pay", query),
            ),
        ];

        fixtures
            .iter()
            .enumerate()
            .take(max_results)
            .map(|(i, (title, company, location, description))| RawPosting {
                source: self.name().to_string(),
                base_url: MOCK_BASE_URL.to_string(),
                markup: format!(
                    r#"<div class="job_seen_beacon"><h2 class="jobTitle"><a href="{}/job{}">{}</a></h2><span data-testid="company-name">{}</span><div data-testid="text-location">{}</div><div class="job-snippet">{}</div></div>"#,
                    MOCK_BASE_URL,
                    i + 1,
                    escape_html(title),
                    escape_html(company),
                    escape_html(location),
                    escape_html(description),
                ),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// --- Live listing-site scraper ---

const CARD_SELECTORS: &[&str] = &["div.job_seen_beacon", "td.resultContent"];
const PAGE_LIMIT: &str = "50";

pub struct IndeedSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl IndeedSource {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fetches the result page. Returns the final page URL (after redirects)
    /// along with the body, since card links are relative to it.
    fn fetch_page(&self, query: &str, location: &str) -> Result<(String, String)> {
        let response = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .query(&[("q", query), ("l", location), ("limit", PAGE_LIMIT)])
            .send()
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            return Err(anyhow!("Search request failed with status {}", response.status()));
        }

        let page_url = response.url().to_string();
        let body = response.text().context("Failed to read search response")?;
        Ok((page_url, body))
    }
}

impl JobSource for IndeedSource {
    fn search(&self, query: &str, location: &str, max_results: usize) -> Vec<RawPosting> {
        info!(query, location, "searching {}", self.base_url);
        match self.fetch_page(query, location) {
            Ok((page_url, page)) => {
                let cards = extract_cards(&page, max_results);
                info!(cards = cards.len(), "found job cards");
                cards
                    .into_iter()
                    .map(|markup| RawPosting {
                        source: self.name().to_string(),
                        base_url: page_url.clone(),
                        markup,
                    })
                    .collect()
            }
            Err(e) => {
                error!("Error scraping {}: {:#}", self.base_url, e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        "indeed"
    }
}

/// Splits a result page into per-card markup, trying each card selector in
/// turn until one matches.
pub fn extract_cards(page: &str, max_results: usize) -> Vec<String> {
    let document = Html::parse_document(page);
    for (i, raw_selector) in CARD_SELECTORS.iter().enumerate() {
        let Ok(selector) = Selector::parse(raw_selector) else {
            continue;
        };
        let cards: Vec<String> = document
            .select(&selector)
            .take(max_results)
            .map(|card| card.html())
            .collect();
        if !cards.is_empty() {
            if i > 0 {
                warn!(selector = raw_selector, "primary card selector missed, used fallback");
            }
            return cards;
        }
    }
    Vec::new()
}
