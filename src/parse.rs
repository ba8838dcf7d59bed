use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::{ParsedPosting, RawPosting};

const UNKNOWN_COMPANY: &str = "Unknown";

// Listing markup is inconsistent across page versions, so every field has
// an ordered list of selectors. The first one that yields text wins.
const TITLE_LINK_SELECTORS: &[&str] = &["h2.jobTitle a", "a.jcs-JobTitle", "h2 a"];
const COMPANY_SELECTORS: &[&str] = &["span[data-testid='company-name']", "span.companyName"];
const LOCATION_SELECTORS: &[&str] = &["[data-testid='text-location']", "div.companyLocation"];
const DESCRIPTION_SELECTORS: &[&str] = &["div.job-snippet", "[data-testid='job-snippet']"];
const POSTED_DATE_SELECTORS: &[&str] = &["span.date", "[data-testid='myJobsStateDate']"];

type UrlRule = fn(&ElementRef, &Url) -> Option<String>;

/// URL rules, applied to the title link in order.
const URL_RULES: &[UrlRule] = &[url_from_job_key, url_from_element_id, url_from_href];

pub struct PostingParser {
    title_link: Vec<Selector>,
    company: Vec<Selector>,
    location: Vec<Selector>,
    description: Vec<Selector>,
    posted_date: Vec<Selector>,
}

impl Default for PostingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingParser {
    pub fn new() -> Self {
        Self {
            title_link: compile(TITLE_LINK_SELECTORS),
            company: compile(COMPANY_SELECTORS),
            location: compile(LOCATION_SELECTORS),
            description: compile(DESCRIPTION_SELECTORS),
            posted_date: compile(POSTED_DATE_SELECTORS),
        }
    }

    /// Extracts one posting from a raw unit. Returns `None` when the title or
    /// URL cannot be found; callers skip such units and carry on.
    pub fn parse(&self, raw: &RawPosting) -> Option<ParsedPosting> {
        let Ok(base) = Url::parse(&raw.base_url) else {
            debug!(source = %raw.source, base_url = %raw.base_url, "skipping unit with a bad base url");
            return None;
        };

        let fragment = Html::parse_fragment(&raw.markup);
        let card = fragment.root_element();

        let Some(link) = first_match(&card, &self.title_link) else {
            debug!(source = %raw.source, "skipping unit without a title link");
            return None;
        };

        let title = element_text(&link);
        if title.is_empty() {
            debug!(source = %raw.source, "skipping unit with an empty title");
            return None;
        }

        let Some(url) = URL_RULES.iter().find_map(|rule| rule(&link, &base)) else {
            debug!(source = %raw.source, %title, "skipping unit without a url");
            return None;
        };

        let company = first_text(&card, &self.company).unwrap_or_else(|| UNKNOWN_COMPANY.to_string());

        Some(ParsedPosting {
            title,
            company,
            location: first_text(&card, &self.location),
            description: first_text(&card, &self.description),
            url,
            posted_date: first_text(&card, &self.posted_date),
            source: raw.source.clone(),
        })
    }
}

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn first_match<'a>(scope: &ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|selector| scope.select(selector).next())
}

fn first_text(scope: &ElementRef, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        scope
            .select(selector)
            .map(|el| element_text(&el))
            .find(|text| !text.is_empty())
    })
}

fn element_text(el: &ElementRef) -> String {
    // Text nodes are adjacent in the source; markup whitespace is already in them
    collapse_whitespace(&el.text().collect::<String>())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn view_job_url(base: &Url, job_key: &str) -> Option<String> {
    let mut url = base.join("/viewjob").ok()?;
    url.query_pairs_mut().append_pair("jk", job_key);
    Some(url.into())
}

fn url_from_job_key(link: &ElementRef, base: &Url) -> Option<String> {
    let key = link.value().attr("data-jk")?.trim();
    if key.is_empty() {
        return None;
    }
    view_job_url(base, key)
}

fn url_from_element_id(link: &ElementRef, base: &Url) -> Option<String> {
    let key = link.value().attr("id")?.trim().strip_prefix("job_")?;
    if key.is_empty() {
        return None;
    }
    view_job_url(base, key)
}

/// Resolves the link's href against the page it came from. Only web links
/// count; fragments and `javascript:`/`mailto:` targets do not.
fn url_from_href(link: &ElementRef, base: &Url) -> Option<String> {
    let href = link.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.into())
}
