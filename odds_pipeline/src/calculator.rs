use crate::error::{PipelineError, Result};
use crate::game_points::GameOdds;
use crate::models::{
    ExpectedPointsRow, ExpectedPointsTable, OddsFormat, OddsTable, PipelineConfig, ProbabilityRow,
    ProbabilityTable,
};

const NOT_AVAILABLE: &str = "N/A";

/// Implied probability of a profit-per-stake quotation: `1 / (d + 1)`.
///
/// Missing, `"N/A"`, unparseable, non-finite and non-positive inputs are undefined.
pub fn odds_to_probability(raw: Option<&str>) -> Option<f64> {
    implied_probability(raw, OddsFormat::Fractional)
}

pub fn probability_from_odds(odds: f64) -> Option<f64> {
    probability_from_quote(odds, OddsFormat::Fractional)
}

pub fn implied_probability(raw: Option<&str>, format: OddsFormat) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() || raw == NOT_AVAILABLE {
        return None;
    }
    let odds: f64 = raw.parse().ok()?;
    probability_from_quote(odds, format)
}

fn probability_from_quote(odds: f64, format: OddsFormat) -> Option<f64> {
    if !odds.is_finite() || odds <= 0.0 {
        return None;
    }
    match format {
        OddsFormat::Fractional => Some(1.0 / (odds + 1.0)),
        // a decimal quote below 1.0 would imply a probability above 1
        OddsFormat::Decimal if odds >= 1.0 => Some(1.0 / odds),
        OddsFormat::Decimal => None,
    }
}

/// Mean of the defined values; undefined if none are defined.
pub fn average_probability(values: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if defined.is_empty() {
        return None;
    }
    Some(defined.iter().sum::<f64>() / defined.len() as f64)
}

/// Rescale the defined values so they sum to 100.
///
/// Undefined entries stay undefined and are left out of the total. A zero total
/// makes every entry undefined.
pub fn normalize_probabilities(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let defined = |v: &Option<f64>| v.filter(|x| x.is_finite());
    let total: f64 = values.iter().filter_map(defined).sum();

    if total == 0.0 || !total.is_finite() {
        if values.iter().any(|v| defined(v).is_some()) {
            log::warn!("Average probabilities sum to {}; normalized probabilities are undefined", total);
        }
        return vec![None; values.len()];
    }

    values
        .iter()
        .map(|v| defined(v).map(|p| p / total * 100.0))
        .collect()
}

pub struct OddsCalculator {
    config: PipelineConfig,
}

impl OddsCalculator {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert every quotation into an implied probability column per provider
    pub fn to_probabilities(&self, odds: &OddsTable) -> ProbabilityTable {
        let rows = odds
            .rows()
            .iter()
            .map(|row| {
                let probabilities = row
                    .quotes
                    .iter()
                    .map(|q| implied_probability(q.as_deref(), self.config.odds_format))
                    .collect();
                ProbabilityRow::new(row.driver.clone(), probabilities).with_quotes(row.quotes.clone())
            })
            .collect();

        ProbabilityTable::new(odds.providers().to_vec(), rows)
    }

    /// Recomputes the average column. Any normalized column is dropped since it
    /// was derived from the previous averages.
    pub fn with_average_probabilities(&self, table: &ProbabilityTable) -> ProbabilityTable {
        let mut averaged = table.clone();
        for row in &mut averaged.rows {
            row.average_probability = average_probability(&row.provider_probabilities);
            row.normalized_probability = None;
        }
        averaged.has_average = true;
        averaged.has_normalized = false;
        averaged
    }

    /// Adds the normalized column, computing averages first if the table has none.
    pub fn normalize(&self, table: &ProbabilityTable) -> ProbabilityTable {
        let mut normalized = if table.has_average() {
            table.clone()
        } else {
            self.with_average_probabilities(table)
        };

        let averages: Vec<Option<f64>> = normalized.rows.iter().map(|r| r.average_probability).collect();
        for (row, value) in normalized.rows.iter_mut().zip(normalize_probabilities(&averages)) {
            row.normalized_probability = value;
        }
        normalized.has_normalized = true;
        normalized
    }

    /// Expected points per driver, sorted by normalized probability.
    ///
    /// Drivers missing from `game_odds` are kept with undefined points.
    pub fn expected_points(
        &self,
        table: &ProbabilityTable,
        game_odds: Option<&GameOdds>,
    ) -> Result<ExpectedPointsTable> {
        let game_odds = match game_odds {
            Some(g) if !g.is_empty() => g,
            _ => return Err(PipelineError::config("Game odds not set")),
        };

        let normalized;
        let table = if table.has_normalized() {
            table
        } else {
            normalized = self.normalize(table);
            &normalized
        };

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let game_points = game_odds.points_for(&row.driver);
                let expected_points = match (row.normalized_probability, game_points) {
                    (Some(p), Some(points)) => Some(p * points / 100.0),
                    _ => None,
                };
                ExpectedPointsRow { probability: row.clone(), game_points, expected_points }
            })
            .collect();

        let unmapped = table.rows.iter().filter(|r| game_odds.points_for(&r.driver).is_none()).count();
        if unmapped > 0 {
            log::warn!("{} drivers have no game points", unmapped);
        }

        Ok(ExpectedPointsTable::new(
            self.config.points_column.clone(),
            table.providers.clone(),
            rows,
            table.has_average(),
        ))
    }

    /// Probabilities, averages and normalization, without expected points
    pub fn probabilities(&self, odds: &OddsTable) -> ProbabilityTable {
        self.normalize(&self.to_probabilities(odds))
    }

    /// The whole chain from raw quotations to sorted expected points
    pub fn process(&self, odds: &OddsTable, game_odds: Option<&GameOdds>) -> Result<ExpectedPointsTable> {
        let probabilities = self.probabilities(odds);
        self.expected_points(&probabilities, game_odds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const EPS: f64 = 1e-9;

    fn game_odds(entries: &[(&str, f64)]) -> GameOdds {
        GameOdds::new(entries.iter().map(|(d, p)| (d.to_string(), *p)).collect::<HashMap<_, _>>()).unwrap()
    }

    fn odds_table() -> OddsTable {
        let mut table = OddsTable::new(vec!["B3".to_string(), "SK".to_string(), "PP".to_string()]);
        let q = |s: &str| Some(s.to_string());
        table.push_row("Max Verstappen", vec![q("1"), q("1.5"), q("N/A")]).unwrap();
        table.push_row("Lando Norris", vec![q("3"), None, q("4")]).unwrap();
        table.push_row("Lance Stroll", vec![q("N/A"), q("SP"), None]).unwrap();
        table
    }

    #[test]
    fn test_odds_to_probability() {
        assert!((odds_to_probability(Some("1")).unwrap() - 0.5).abs() < EPS);
        assert!((odds_to_probability(Some(" 0.25 ")).unwrap() - 0.8).abs() < EPS);
        assert_eq!(odds_to_probability(Some("N/A")), None);
        assert_eq!(odds_to_probability(Some("-1")), None);
        assert_eq!(odds_to_probability(Some("0")), None);
        assert_eq!(odds_to_probability(Some("abc")), None);
        assert_eq!(odds_to_probability(Some("inf")), None);
        assert_eq!(odds_to_probability(Some("")), None);
        assert_eq!(odds_to_probability(None), None);
    }

    #[test]
    fn test_probability_stays_in_unit_interval() {
        for d in [0.0001, 0.5, 1.0, 2.5, 100.0, 1e9] {
            let p = probability_from_odds(d).unwrap();
            assert!(p > 0.0 && p < 1.0, "{} -> {}", d, p);
            assert!((p - 1.0 / (d + 1.0)).abs() < EPS);
        }
        assert_eq!(probability_from_odds(-3.0), None);
    }

    #[test]
    fn test_decimal_format() {
        assert!((implied_probability(Some("2.0"), OddsFormat::Decimal).unwrap() - 0.5).abs() < EPS);
        assert!((implied_probability(Some("1"), OddsFormat::Decimal).unwrap() - 1.0).abs() < EPS);
        assert_eq!(implied_probability(Some("0.5"), OddsFormat::Decimal), None);
    }

    #[test]
    fn test_average_ignores_undefined() {
        let avg = average_probability(&[Some(0.4), Some(0.5), None]).unwrap();
        assert!((avg - 0.45).abs() < EPS);
        assert_eq!(average_probability(&[None, None]), None);
        assert_eq!(average_probability(&[]), None);
    }

    #[test]
    fn test_normalize_sums_to_100() {
        let normalized = normalize_probabilities(&[Some(0.4), Some(0.2), None]);
        let total: f64 = normalized.iter().flatten().sum();

        assert!((total - 100.0).abs() < EPS);
        assert!((normalized[0].unwrap() - 200.0 / 3.0).abs() < EPS);
        assert_eq!(normalized[2], None);
    }

    #[test]
    fn test_normalize_zero_total_is_undefined() {
        assert_eq!(normalize_probabilities(&[Some(0.0), Some(0.0)]), vec![None, None]);
        assert_eq!(normalize_probabilities(&[None, None]), vec![None, None]);
        assert!(normalize_probabilities(&[]).is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let once = calculator.probabilities(&odds_table());

        let again = ProbabilityTable::from_averages(
            once.rows.iter().map(|r| (r.driver.clone(), r.normalized_probability)).collect(),
        );
        let twice = calculator.normalize(&again);
        let total: f64 = twice.normalized_column().iter().flatten().sum();

        assert!((total - 100.0).abs() < 1e-6);
        for (a, b) in once.normalized_column().iter().zip(twice.normalized_column()) {
            assert_eq!(a.is_some(), b.is_some());
            if let (Some(a), Some(b)) = (a, b) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_pipeline_on_table() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let table = calculator.probabilities(&odds_table());

        let max = table.driver("Max Verstappen").unwrap();
        assert!((max.provider_probabilities[0].unwrap() - 0.5).abs() < EPS);
        assert!((max.provider_probabilities[1].unwrap() - 0.4).abs() < EPS);
        assert_eq!(max.provider_probabilities[2], None);
        assert!((max.average_probability.unwrap() - 0.45).abs() < EPS);

        let lando = table.driver("Lando Norris").unwrap();
        assert!((lando.average_probability.unwrap() - 0.225).abs() < EPS);

        let stroll = table.driver("Lance Stroll").unwrap();
        assert_eq!(stroll.average_probability, None);
        assert_eq!(stroll.normalized_probability, None);

        let total: f64 = table.normalized_column().iter().flatten().sum();
        assert!((total - 100.0).abs() < EPS);
    }

    #[test]
    fn test_expected_points() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let table = ProbabilityTable::from_normalized(vec![
            ("B".to_string(), Some(40.0)),
            ("A".to_string(), Some(60.0)),
        ]);

        let result = calculator
            .expected_points(&table, Some(&game_odds(&[("A", 10.0), ("B", 12.0)])))
            .unwrap();

        assert_eq!(result.rows[0].driver(), "A");
        assert!((result.driver("A").unwrap().expected_points.unwrap() - 6.0).abs() < EPS);
        assert!((result.driver("B").unwrap().expected_points.unwrap() - 4.8).abs() < EPS);
        assert!((result.total_expected_points() - 10.8).abs() < EPS);
    }

    #[test]
    fn test_unmapped_driver_kept() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let result = calculator
            .process(&odds_table(), Some(&game_odds(&[("Max Verstappen", 12.0)])))
            .unwrap();

        assert_eq!(result.len(), 3);
        let lando = result.driver("Lando Norris").unwrap();
        assert_eq!(lando.game_points, None);
        assert_eq!(lando.expected_points, None);
        assert!(lando.normalized_probability().is_some());

        assert_eq!(result.rows[0].driver(), "Max Verstappen");
        assert_eq!(result.rows[2].driver(), "Lance Stroll");
    }

    #[test]
    fn test_expected_points_without_game_odds_is_config_error() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let table = calculator.probabilities(&odds_table());

        let err = calculator.expected_points(&table, None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_driver_analysis() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let result = calculator
            .process(&odds_table(), Some(&game_odds(&[("Max Verstappen", 10.0)])))
            .unwrap();

        let analysis = result.driver_analysis("Max Verstappen").unwrap();
        assert_eq!(analysis.game_points, Some(10.0));
        assert_eq!(analysis.provider_probabilities.len(), 3);
        assert_eq!(analysis.provider_probabilities[0].provider, "B3");
        let expected = analysis.normalized_probability.unwrap() * 10.0 / 100.0;
        assert!((analysis.expected_points.unwrap() - expected).abs() < EPS);

        assert!(matches!(
            result.driver_analysis("Nico Rosberg"),
            Err(PipelineError::DriverNotFound(_))
        ));
    }

    #[test]
    fn test_transforms_do_not_mutate_input() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let raw = calculator.to_probabilities(&odds_table());
        let before = raw.clone();

        let _ = calculator.normalize(&raw);
        assert_eq!(raw, before);
        assert!(!raw.has_average());
    }

    #[test]
    fn test_quotes_carried_into_probabilities() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let table = calculator.probabilities(&odds_table());

        let lando = table.driver("Lando Norris").unwrap();
        assert_eq!(lando.quotes, vec![Some("3".to_string()), None, Some("4".to_string())]);
    }

    #[test]
    fn test_reaveraging_drops_stale_normalized_column() {
        let calculator = OddsCalculator::new(PipelineConfig::default());
        let normalized = calculator.probabilities(&odds_table());
        assert!(normalized.has_normalized());

        let averaged = calculator.with_average_probabilities(&normalized);
        assert!(averaged.has_average());
        assert!(!averaged.has_normalized());
        assert!(averaged.normalized_column().iter().all(Option::is_none));

        // expected points renormalizes from the fresh averages
        let result = calculator
            .expected_points(&averaged, Some(&game_odds(&[("Max Verstappen", 10.0)])))
            .unwrap();
        let total: f64 = result.rows.iter().filter_map(|r| r.normalized_probability()).sum();
        assert!((total - 100.0).abs() < EPS);
    }
}
