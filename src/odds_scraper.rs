use anyhow::{Context, Result};
use log::{info, warn};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use odds_pipeline::OddsTable;

pub const BASE_URL: &str = "https://www.oddschecker.com/motorsport/formula-1";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Oddschecker odds-comparison scraper for one race
pub struct OddscheckerScraper {
    client: Client,
    base_url: String,
    race: String,
    request_delay: Duration,
}

impl OddscheckerScraper {
    pub fn new(race: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            race: race.into(),
            request_delay: Duration::from_secs(5),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Pause between consecutive category requests
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn race(&self) -> &str {
        &self.race
    }

    pub fn odds_url(&self, category: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.race, category)
    }

    /// Fetch one market page and parse its odds grid
    pub async fn scrape_odds(&self, category: &str) -> Result<OddsTable> {
        let url = self.odds_url(category);
        info!("Scraping {} odds from {}", category, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP request for {} failed with status: {}", url, response.status());
        }

        let html = response.text().await.context("Failed to read response body")?;
        info!("Fetched HTML ({} bytes)", html.len());

        let table = parse_odds_page(&html)?;
        info!("Found odds for {} drivers from {} providers", table.len(), table.providers().len());
        Ok(table)
    }

    /// Scrape each category in turn. Failed or empty categories are logged and left out.
    pub async fn scrape_all_categories(&self, categories: &[String]) -> BTreeMap<String, OddsTable> {
        let mut results = BTreeMap::new();

        for (idx, category) in categories.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.request_delay).await;
            }

            match self.scrape_odds(category).await {
                Ok(table) if table.is_empty() => warn!("No odds data found for {}", category),
                Ok(table) => {
                    results.insert(category.clone(), table);
                }
                Err(e) => warn!("Error scraping {} odds: {:#}", category, e),
            }
        }

        results
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Failed to create selector '{}': {}", css, e))
}

/// Parse the odds grid of a market page.
///
/// Rows are `tr.diff-row.evTabRow.bc`; each bookmaker cell carries its code in
/// `data-bk` and the quotation in `data-o` (or as text). Providers keep the
/// order in which they first appear.
pub fn parse_odds_page(html: &str) -> Result<OddsTable> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr.diff-row.evTabRow.bc")?;
    let cell_selector = selector("td")?;
    let odds_selector = selector("td[data-bk]")?;
    let inner_selector = selector("p")?;

    let mut providers: Vec<String> = Vec::new();
    let mut parsed: Vec<(String, Vec<(usize, String)>)> = Vec::new();

    for row in document.select(&row_selector) {
        let Some(driver) = driver_name(&row, &cell_selector) else {
            continue;
        };

        let mut quotes = Vec::new();
        for cell in row.select(&odds_selector) {
            let Some(provider) = cell.value().attr("data-bk").map(str::trim).filter(|p| !p.is_empty()) else {
                continue;
            };
            let Some(quote) = cell_quotation(&cell, &inner_selector) else {
                continue;
            };

            let idx = match providers.iter().position(|p| p == provider) {
                Some(idx) => idx,
                None => {
                    providers.push(provider.to_string());
                    providers.len() - 1
                }
            };
            quotes.push((idx, quote));
        }

        if quotes.is_empty() {
            continue;
        }
        parsed.push((driver, quotes));
    }

    let mut table = OddsTable::new(providers.clone());
    for (driver, quotes) in parsed {
        let mut cells = vec![None; providers.len()];
        for (idx, quote) in quotes {
            cells[idx] = Some(quote);
        }
        if let Err(e) = table.push_row(driver, cells) {
            warn!("Skipping row: {}", e);
        }
    }

    Ok(table)
}

fn driver_name(row: &ElementRef, cell_selector: &Selector) -> Option<String> {
    let from_attr = row.value().attr("data-bname").map(str::trim).filter(|n| !n.is_empty());
    let name = match from_attr {
        Some(name) => name.to_string(),
        None => row.select(cell_selector).next()?.text().collect::<String>().trim().to_string(),
    };
    (!name.is_empty()).then_some(name)
}

fn cell_quotation(cell: &ElementRef, inner_selector: &Selector) -> Option<String> {
    if let Some(quote) = cell.value().attr("data-o").and_then(normalize_quotation) {
        return Some(quote);
    }
    let text = match cell.select(inner_selector).next() {
        Some(p) => p.text().collect::<String>(),
        None => cell.text().collect::<String>(),
    };
    normalize_quotation(&text)
}

fn fraction_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").expect("fraction pattern is valid")
    })
}

/// Reduce a bookmaker quotation to profit per unit stake.
///
/// `"5/2"` becomes `"2.5"`, `"EVS"` becomes `"1"`, positive numbers are kept as
/// they are. Anything else (suspended, `SP`, blank) is dropped.
pub fn normalize_quotation(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("evs") || raw.eq_ignore_ascii_case("evens") {
        return Some("1".to_string());
    }

    if let Some(caps) = fraction_pattern().captures(raw) {
        let numerator: f64 = caps[1].parse().ok()?;
        let denominator: f64 = caps[2].parse().ok()?;
        if denominator <= 0.0 || numerator <= 0.0 {
            return None;
        }
        return Some(format!("{}", numerator / denominator));
    }

    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value > 0.0).then(|| raw.to_string())
}
