use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::models::DRIVER_COLUMN;

/// Fantasy points awarded per driver for one scoring category.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOdds {
    points: HashMap<String, f64>,
}

impl GameOdds {
    /// Rejects an empty map and any non-positive or non-finite value.
    pub fn new(points: HashMap<String, f64>) -> Result<Self> {
        if points.is_empty() {
            return Err(PipelineError::config("Game odds not set: no drivers supplied"));
        }
        if let Some((driver, value)) = points.iter().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
            return Err(PipelineError::config(format!(
                "Game points for {} must be a positive number, got {}",
                driver, value
            )));
        }
        Ok(Self { points })
    }

    /// Load a `Driver,points` CSV for a single category
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        #[derive(Deserialize)]
        struct PointsRecord {
            #[serde(rename = "Driver")]
            driver: String,
            points: f64,
        }

        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut points = HashMap::new();
        for record in reader.deserialize() {
            let record: PointsRecord = record?;
            points.insert(record.driver.trim().to_string(), record.points);
        }

        log::debug!("Loaded {} game point entries from {}", points.len(), path.display());
        Self::new(points)
    }

    pub fn points_for(&self, driver: &str) -> Option<f64> {
        self.points.get(driver).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Game points for every scoring category, e.g. `config/game_points.json`:
///
/// ```json
/// { "qualifying": { "Lando Norris": 10, "Charles Leclerc": 12 } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct GamePointsBook {
    categories: BTreeMap<String, GameOdds>,
}

impl GamePointsBook {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, HashMap<String, f64>> = serde_json::from_str(json)?;
        let mut categories = BTreeMap::new();
        for (category, points) in raw {
            let odds = GameOdds::new(points).map_err(|e| match e {
                PipelineError::Config(msg) => PipelineError::Config(format!("{} ({})", msg, category)),
                other => other,
            })?;
            categories.insert(category, odds);
        }
        Ok(Self { categories })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        let book = Self::from_json_str(&fs::read_to_string(path)?)?;
        log::info!("Loaded game points for {} categories from {}", book.len(), path.display());
        Ok(book)
    }

    pub fn get(&self, category: &str) -> Option<&GameOdds> {
        self.categories.get(category)
    }

    /// Like `get`, but a missing category is a configuration error
    pub fn require(&self, category: &str) -> Result<&GameOdds> {
        self.get(category)
            .ok_or_else(|| PipelineError::config(format!("No game odds defined for {}", category)))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Header expected in single-category points CSV files
pub const POINTS_CSV_HEADER: [&str; 2] = [DRIVER_COLUMN, "points"];
