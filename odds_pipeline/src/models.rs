use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{PipelineError, Result};

pub const DRIVER_COLUMN: &str = "Driver";
pub const PROBABILITY_SUFFIX: &str = "_probability";
pub const AVERAGE_PROBABILITY: &str = "average_probability";
pub const NORMALIZED_PROBABILITY: &str = "normalized_probability";
pub const DEFAULT_POINTS_COLUMN: &str = "game_points";
pub const EXPECTED_POINTS: &str = "xPts";

/// How the numbers in an odds table are quoted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    /// Profit per unit stake, i.e. fractional `a/b` reduced to `a÷b`
    #[default]
    Fractional,
    /// Total return per unit stake, stake included
    Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub odds_format: OddsFormat,
    pub points_column: String,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            odds_format: OddsFormat::Fractional,
            points_column: DEFAULT_POINTS_COLUMN.to_string(),
            top_n: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRow {
    pub driver: String,
    /// One entry per provider column, aligned with `OddsTable::providers`
    pub quotes: Vec<Option<String>>,
}

/// Raw quotations keyed by driver, one column per provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsTable {
    providers: Vec<String>,
    rows: Vec<OddsRow>,
}

impl OddsTable {
    pub fn new(providers: Vec<String>) -> Self {
        Self { providers, rows: Vec::new() }
    }

    /// Append a row. Short quote lists are padded with absent quotes.
    pub fn push_row(&mut self, driver: impl Into<String>, mut quotes: Vec<Option<String>>) -> Result<()> {
        let driver = driver.into();
        if driver.trim().is_empty() {
            return Err(PipelineError::invalid_table("empty driver name"));
        }
        if self.rows.iter().any(|r| r.driver == driver) {
            return Err(PipelineError::invalid_table(format!("duplicate driver '{}'", driver)));
        }
        if quotes.len() > self.providers.len() {
            return Err(PipelineError::invalid_table(format!(
                "row for '{}' has {} quotes but only {} providers",
                driver,
                quotes.len(),
                self.providers.len()
            )));
        }
        quotes.resize(self.providers.len(), None);
        self.rows.push(OddsRow { driver, quotes });
        Ok(())
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn rows(&self) -> &[OddsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRow {
    pub driver: String,
    /// Quotations the probabilities were derived from, aligned with the providers
    #[serde(default)]
    pub quotes: Vec<Option<String>>,
    pub provider_probabilities: Vec<Option<f64>>,
    pub average_probability: Option<f64>,
    pub normalized_probability: Option<f64>,
}

impl ProbabilityRow {
    pub fn new(driver: impl Into<String>, provider_probabilities: Vec<Option<f64>>) -> Self {
        Self {
            driver: driver.into(),
            quotes: Vec::new(),
            provider_probabilities,
            average_probability: None,
            normalized_probability: None,
        }
    }

    pub fn with_quotes(mut self, quotes: Vec<Option<String>>) -> Self {
        self.quotes = quotes;
        self
    }
}

/// Per-provider implied probabilities plus the derived columns.
///
/// `has_average` / `has_normalized` record whether a derived column has been
/// computed; a `None` cell inside a computed column means "undefined".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    pub providers: Vec<String>,
    pub rows: Vec<ProbabilityRow>,
    #[serde(skip)]
    pub(crate) has_average: bool,
    #[serde(skip)]
    pub(crate) has_normalized: bool,
}

impl ProbabilityTable {
    pub fn new(providers: Vec<String>, rows: Vec<ProbabilityRow>) -> Self {
        Self { providers, rows, has_average: false, has_normalized: false }
    }

    /// Build a table that already carries an average column and nothing else.
    pub fn from_averages(averages: Vec<(String, Option<f64>)>) -> Self {
        let rows = averages
            .into_iter()
            .map(|(driver, avg)| ProbabilityRow {
                driver,
                quotes: Vec::new(),
                provider_probabilities: Vec::new(),
                average_probability: avg,
                normalized_probability: None,
            })
            .collect();
        Self { providers: Vec::new(), rows, has_average: true, has_normalized: false }
    }

    /// Build a table that already carries a normalized column.
    pub fn from_normalized(normalized: Vec<(String, Option<f64>)>) -> Self {
        let rows = normalized
            .into_iter()
            .map(|(driver, norm)| ProbabilityRow {
                driver,
                quotes: Vec::new(),
                provider_probabilities: Vec::new(),
                average_probability: None,
                normalized_probability: norm,
            })
            .collect();
        Self { providers: Vec::new(), rows, has_average: false, has_normalized: true }
    }

    pub fn has_average(&self) -> bool {
        self.has_average
    }

    pub fn has_normalized(&self) -> bool {
        self.has_normalized
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn driver(&self, name: &str) -> Result<&ProbabilityRow> {
        self.rows
            .iter()
            .find(|r| r.driver == name)
            .ok_or_else(|| PipelineError::DriverNotFound(name.to_string()))
    }

    pub fn normalized_column(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.normalized_probability).collect()
    }

    /// Analysis without expected points; game points are looked up if supplied.
    pub fn driver_analysis(
        &self,
        name: &str,
        game_odds: Option<&crate::game_points::GameOdds>,
    ) -> Result<DriverAnalysis> {
        let row = self.driver(name)?;
        let game_points = game_odds.and_then(|g| g.points_for(name));
        Ok(DriverAnalysis::new(row, &self.providers, game_points, None))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPointsRow {
    #[serde(flatten)]
    pub probability: ProbabilityRow,
    pub game_points: Option<f64>,
    pub expected_points: Option<f64>,
}

impl ExpectedPointsRow {
    pub fn driver(&self) -> &str {
        &self.probability.driver
    }

    pub fn normalized_probability(&self) -> Option<f64> {
        self.probability.normalized_probability
    }
}

/// Final output of the pipeline, sorted by normalized probability (highest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPointsTable {
    pub points_column: String,
    pub providers: Vec<String>,
    pub rows: Vec<ExpectedPointsRow>,
    #[serde(skip)]
    pub(crate) has_average: bool,
}

impl ExpectedPointsTable {
    /// Sorts `rows` descending by normalized probability. The sort is stable and
    /// undefined probabilities go last.
    pub fn new(
        points_column: impl Into<String>,
        providers: Vec<String>,
        mut rows: Vec<ExpectedPointsRow>,
        has_average: bool,
    ) -> Self {
        rows.sort_by(|a, b| descending(a.normalized_probability(), b.normalized_probability()));
        Self { points_column: points_column.into(), providers, rows, has_average }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows; all rows when `n` exceeds the row count.
    pub fn top(&self, n: usize) -> &[ExpectedPointsRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn driver(&self, name: &str) -> Result<&ExpectedPointsRow> {
        self.rows
            .iter()
            .find(|r| r.driver() == name)
            .ok_or_else(|| PipelineError::DriverNotFound(name.to_string()))
    }

    pub fn driver_analysis(&self, name: &str) -> Result<DriverAnalysis> {
        let row = self.driver(name)?;
        Ok(DriverAnalysis::new(
            &row.probability,
            &self.providers,
            row.game_points,
            row.expected_points,
        ))
    }

    pub fn total_expected_points(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.expected_points).sum()
    }
}

fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProbability {
    pub provider: String,
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverAnalysis {
    pub driver: String,
    pub normalized_probability: Option<f64>,
    pub expected_points: Option<f64>,
    pub game_points: Option<f64>,
    pub provider_probabilities: Vec<ProviderProbability>,
}

impl DriverAnalysis {
    fn new(
        row: &ProbabilityRow,
        providers: &[String],
        game_points: Option<f64>,
        expected_points: Option<f64>,
    ) -> Self {
        let provider_probabilities = providers
            .iter()
            .zip(&row.provider_probabilities)
            .map(|(provider, probability)| ProviderProbability {
                provider: provider.clone(),
                probability: *probability,
            })
            .collect();

        Self {
            driver: row.driver.clone(),
            normalized_probability: row.normalized_probability,
            expected_points,
            game_points,
            provider_probabilities,
        }
    }
}

/// Provider column names must be unique and must not collide with the driver
/// column or with the columns derived from them.
pub fn validate_providers(providers: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for provider in providers {
        if provider.trim().is_empty() {
            return Err(PipelineError::invalid_table("empty provider column name"));
        }
        if provider == DRIVER_COLUMN {
            return Err(PipelineError::invalid_table("provider column named 'Driver'"));
        }
        if provider.ends_with(PROBABILITY_SUFFIX) || provider == EXPECTED_POINTS {
            return Err(PipelineError::invalid_table(format!(
                "provider column '{}' collides with a derived column",
                provider
            )));
        }
        if !seen.insert(provider.as_str()) {
            return Err(PipelineError::invalid_table(format!("duplicate provider '{}'", provider)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(driver: &str, normalized: Option<f64>) -> ExpectedPointsRow {
        let mut probability = ProbabilityRow::new(driver, vec![]);
        probability.normalized_probability = normalized;
        ExpectedPointsRow { probability, game_points: None, expected_points: None }
    }

    #[test]
    fn test_duplicate_driver_rejected() {
        let mut table = OddsTable::new(vec!["B3".to_string()]);
        table.push_row("Lando Norris", vec![Some("2".to_string())]).unwrap();

        let err = table.push_row("Lando Norris", vec![Some("3".to_string())]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTable(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut table = OddsTable::new(vec!["B3".to_string(), "SK".to_string()]);
        table.push_row("Oscar Piastri", vec![Some("5/2".to_string())]).unwrap();

        assert_eq!(table.rows()[0].quotes, vec![Some("5/2".to_string()), None]);
    }

    #[test]
    fn test_sort_is_stable_with_undefined_last() {
        let table = ExpectedPointsTable::new(
            DEFAULT_POINTS_COLUMN,
            vec![],
            vec![
                row("A", Some(20.0)),
                row("B", None),
                row("C", Some(50.0)),
                row("D", Some(20.0)),
            ],
            false,
        );

        let order: Vec<&str> = table.rows.iter().map(|r| r.driver()).collect();
        assert_eq!(order, vec!["C", "A", "D", "B"]);
    }

    #[test]
    fn test_top_n_larger_than_table() {
        let table = ExpectedPointsTable::new(
            DEFAULT_POINTS_COLUMN,
            vec![],
            vec![row("A", Some(60.0)), row("B", Some(40.0))],
            false,
        );

        let top = table.top(10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].driver(), "A");
        assert_eq!(top[1].driver(), "B");
        assert_eq!(table.top(1).len(), 1);
    }

    #[test]
    fn test_lookup_miss_is_not_found() {
        let table = ProbabilityTable::from_normalized(vec![("A".to_string(), Some(100.0))]);

        assert!(table.driver("A").is_ok());
        assert!(matches!(table.driver("Z"), Err(PipelineError::DriverNotFound(name)) if name == "Z"));
    }

    #[test]
    fn test_validate_providers() {
        assert!(validate_providers(&["B3".to_string(), "SK".to_string()]).is_ok());
        assert!(validate_providers(&["B3".to_string(), "B3".to_string()]).is_err());
        assert!(validate_providers(&["Driver".to_string()]).is_err());
        assert!(validate_providers(&["B3".to_string(), "B3_probability".to_string()]).is_err());
    }

    #[test]
    fn test_internal_flags_not_serialized() {
        let table = ExpectedPointsTable::new(DEFAULT_POINTS_COLUMN, vec![], vec![row("A", Some(100.0))], true);
        let json = serde_json::to_value(&table).unwrap();
        assert!(json.get("has_average").is_none());
        assert_eq!(json["rows"][0]["driver"], "A");

        let json = serde_json::to_value(ProbabilityTable::from_normalized(vec![("A".to_string(), Some(100.0))])).unwrap();
        assert!(json.get("has_average").is_none());
        assert!(json.get("has_normalized").is_none());
    }
}
