use chrono::Datelike;
use polars::prelude::*;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::{
    validate_providers, ExpectedPointsTable, OddsTable, ProbabilityRow, ProbabilityTable, AVERAGE_PROBABILITY,
    DRIVER_COLUMN, EXPECTED_POINTS, NORMALIZED_PROBABILITY, PROBABILITY_SUFFIX,
};

pub const ODDS_FILE_SUFFIX: &str = "_odds.csv";
pub const PROCESSED_FILE_SUFFIX: &str = "_processed.csv";

/// On-disk layout: `<data_dir>/<year>/<race>/<category>_odds.csv`
#[derive(Debug, Clone)]
pub struct RaceStore {
    data_dir: PathBuf,
    year: i32,
}

impl RaceStore {
    /// `year` defaults to the current year
    pub fn new(data_dir: impl Into<PathBuf>, year: Option<i32>) -> Self {
        Self {
            data_dir: data_dir.into(),
            year: year.unwrap_or_else(|| chrono::Local::now().year()),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn year_dir(&self) -> PathBuf {
        self.data_dir.join(self.year.to_string())
    }

    pub fn race_dir(&self, race: &str) -> PathBuf {
        self.year_dir().join(race)
    }

    pub fn odds_path(&self, race: &str, category: &str) -> PathBuf {
        self.race_dir(race).join(format!("{}{}", category, ODDS_FILE_SUFFIX))
    }

    pub fn processed_path(&self, race: &str, category: &str) -> PathBuf {
        self.race_dir(race).join(format!("{}{}", category, PROCESSED_FILE_SUFFIX))
    }

    fn ensure_race_dir(&self, race: &str) -> Result<PathBuf> {
        let dir = self.race_dir(race);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Load a stored odds table. A missing file is `SourceNotFound`.
    pub fn load_odds(&self, race: &str, category: &str) -> Result<OddsTable> {
        read_odds_csv(self.odds_path(race, category))
    }

    pub fn save_odds(&self, race: &str, category: &str, table: &OddsTable) -> Result<PathBuf> {
        self.ensure_race_dir(race)?;
        let path = self.odds_path(race, category);
        write_odds_csv(&path, table)?;
        log::info!("Saved {} odds for {} drivers to {}", category, table.len(), path.display());
        Ok(path)
    }

    pub fn save_processed(&self, race: &str, category: &str, table: &ExpectedPointsTable) -> Result<PathBuf> {
        let frame = expected_points_frame(table)?;
        self.save_frame(race, category, frame)
    }

    /// For categories processed without game points
    pub fn save_probabilities(&self, race: &str, category: &str, table: &ProbabilityTable) -> Result<PathBuf> {
        let frame = probability_frame(table)?;
        self.save_frame(race, category, frame)
    }

    fn save_frame(&self, race: &str, category: &str, mut frame: DataFrame) -> Result<PathBuf> {
        self.ensure_race_dir(race)?;
        let path = self.processed_path(race, category);
        write_frame_csv(&path, &mut frame)?;
        log::info!("Saved processed {} odds to {}", category, path.display());
        Ok(path)
    }
}

pub fn read_odds_csv(path: impl AsRef<Path>) -> Result<OddsTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    let table = read_odds(File::open(path)?)?;
    log::debug!("Read {} rows x {} providers from {}", table.len(), table.providers().len(), path.display());
    Ok(table)
}

/// First column is the driver, every other column a provider. Empty cells are absent quotes.
pub fn read_odds<R: io::Read>(reader: R) -> Result<OddsTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(PipelineError::invalid_table("missing header row"));
    }

    let providers: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    validate_providers(&providers)?;

    let mut table = OddsTable::new(providers);
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let driver = record.get(0).unwrap_or_default();
        let quotes = record
            .iter()
            .skip(1)
            .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
            .collect();
        table.push_row(driver, quotes)?;
    }

    Ok(table)
}

pub fn write_odds_csv(path: impl AsRef<Path>, table: &OddsTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    write_odds(&mut writer, table)?;
    writer.flush()?;
    Ok(())
}

pub fn write_odds<W: io::Write>(writer: &mut csv::Writer<W>, table: &OddsTable) -> Result<()> {
    let header = std::iter::once(DRIVER_COLUMN).chain(table.providers().iter().map(String::as_str));
    writer.write_record(header)?;
    for row in table.rows() {
        let cells = std::iter::once(row.driver.as_str())
            .chain(row.quotes.iter().map(|q| q.as_deref().unwrap_or("")));
        writer.write_record(cells)?;
    }
    Ok(())
}

pub fn write_frame_csv(path: impl AsRef<Path>, frame: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(frame)?;
    Ok(())
}

fn float_column(name: &str, values: Vec<Option<f64>>) -> Series {
    Series::new(name.into(), values)
}

/// The raw quotation columns followed by one `<provider>_probability` column per provider
fn provider_columns(providers: &[String], rows: &[&ProbabilityRow]) -> Vec<Series> {
    let quotes = providers.iter().enumerate().map(|(idx, provider)| {
        let values: Vec<Option<&str>> = rows
            .iter()
            .map(|r| r.quotes.get(idx).and_then(|q| q.as_deref()))
            .collect();
        Series::new(provider.as_str().into(), values)
    });
    let probabilities = providers.iter().enumerate().map(|(idx, provider)| {
        let values = rows
            .iter()
            .map(|r| r.provider_probabilities.get(idx).copied().flatten())
            .collect();
        float_column(&format!("{}{}", provider, PROBABILITY_SUFFIX), values)
    });
    quotes.chain(probabilities).collect()
}

/// `Driver`, the raw quotes, `<provider>_probability`..., then the derived columns
/// that have been computed
pub fn probability_frame(table: &ProbabilityTable) -> Result<DataFrame> {
    let rows: Vec<_> = table.rows.iter().collect();
    let drivers: Vec<String> = rows.iter().map(|r| r.driver.clone()).collect();

    let mut columns = vec![Series::new(DRIVER_COLUMN.into(), drivers)];
    columns.extend(provider_columns(&table.providers, &rows));
    if table.has_average() {
        columns.push(float_column(AVERAGE_PROBABILITY, rows.iter().map(|r| r.average_probability).collect()));
    }
    if table.has_normalized() {
        columns.push(float_column(NORMALIZED_PROBABILITY, table.normalized_column()));
    }

    Ok(DataFrame::new(columns)?)
}

pub fn expected_points_frame(table: &ExpectedPointsTable) -> Result<DataFrame> {
    let rows: Vec<_> = table.rows.iter().map(|r| &r.probability).collect();
    let drivers: Vec<String> = rows.iter().map(|r| r.driver.clone()).collect();

    let mut columns = vec![Series::new(DRIVER_COLUMN.into(), drivers)];
    columns.extend(provider_columns(&table.providers, &rows));
    if table.has_average {
        columns.push(float_column(AVERAGE_PROBABILITY, rows.iter().map(|r| r.average_probability).collect()));
    }
    columns.push(float_column(NORMALIZED_PROBABILITY, rows.iter().map(|r| r.normalized_probability).collect()));
    columns.push(float_column(&table.points_column, table.rows.iter().map(|r| r.game_points).collect()));
    columns.push(float_column(EXPECTED_POINTS, table.rows.iter().map(|r| r.expected_points).collect()));

    Ok(DataFrame::new(columns)?)
}

/// The `Driver`, `normalized_probability`, `xPts` view of the first `n` rows
pub fn top_drivers_frame(table: &ExpectedPointsTable, n: usize) -> Result<DataFrame> {
    let top = table.top(n);
    let drivers: Vec<String> = top.iter().map(|r| r.driver().to_string()).collect();

    Ok(DataFrame::new(vec![
        Series::new(DRIVER_COLUMN.into(), drivers),
        float_column(NORMALIZED_PROBABILITY, top.iter().map(|r| r.normalized_probability()).collect()),
        float_column(EXPECTED_POINTS, top.iter().map(|r| r.expected_points).collect()),
    ])?)
}
