use anyhow::{Context, Result};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use odds_pipeline::race_store::ODDS_FILE_SUFFIX;
use odds_pipeline::{
    ExpectedPointsTable, GamePointsBook, OddsCalculator, PipelineConfig, ProbabilityTable, RaceStore,
};

/// One stored odds file waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OddsJob {
    pub race: String,
    pub category: String,
    pub path: PathBuf,
}

impl OddsJob {
    /// `<year_dir>/<race>/<category>_odds.csv` -> job
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let category = file_name.strip_suffix(ODDS_FILE_SUFFIX)?;
        let race = path.parent()?.file_name()?.to_str()?;
        if category.is_empty() {
            return None;
        }
        Some(Self {
            race: race.to_string(),
            category: category.to_string(),
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug)]
pub enum CategoryResult {
    Scored(ExpectedPointsTable),
    /// No game points for this category, so no expected points
    Unscored(ProbabilityTable),
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Scored { drivers: usize, favourite: Option<String>, total_expected_points: f64 },
    Unscored { drivers: usize },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: OddsJob,
    pub outcome: JobOutcome,
    pub output: Option<PathBuf>,
}

pub struct RaceProcessor<'a> {
    store: &'a RaceStore,
    book: &'a GamePointsBook,
    calculator: OddsCalculator,
}

impl<'a> RaceProcessor<'a> {
    pub fn new(store: &'a RaceStore, book: &'a GamePointsBook, config: PipelineConfig) -> Self {
        Self { store, book, calculator: OddsCalculator::new(config) }
    }

    pub fn calculator(&self) -> &OddsCalculator {
        &self.calculator
    }

    /// Load and process one category of one race without writing anything
    pub fn evaluate_category(&self, race: &str, category: &str) -> Result<CategoryResult> {
        let odds = self.store.load_odds(race, category)?;
        let probabilities = self.calculator.probabilities(&odds);

        match self.book.get(category) {
            Some(game_odds) => Ok(CategoryResult::Scored(
                self.calculator.expected_points(&probabilities, Some(game_odds))?,
            )),
            None => {
                warn!("No game odds defined for {}; probabilities only", category);
                Ok(CategoryResult::Unscored(probabilities))
            }
        }
    }

    /// Load, process and save one category of one race
    pub fn process_category(&self, race: &str, category: &str) -> Result<(CategoryResult, PathBuf)> {
        let result = self.evaluate_category(race, category)?;
        let path = match &result {
            CategoryResult::Scored(table) => self.store.save_processed(race, category, table)?,
            CategoryResult::Unscored(table) => self.store.save_probabilities(race, category, table)?,
        };
        Ok((result, path))
    }

    /// Every `<race>/<category>_odds.csv` under the store's year directory, sorted
    pub fn discover_jobs(&self) -> Result<Vec<OddsJob>> {
        let pattern = self.store.year_dir().join("*").join(format!("*{}", ODDS_FILE_SUFFIX));
        let pattern = pattern.to_str().context("Data directory is not valid UTF-8")?;

        let mut jobs: Vec<OddsJob> = glob(pattern)?
            .filter_map(|entry| entry.ok())
            .filter_map(|path| OddsJob::from_path(&path))
            .collect();
        jobs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(jobs)
    }

    /// Process jobs in parallel. A failing job is reported, not fatal.
    pub fn process_all(&self, jobs: &[OddsJob]) -> Vec<JobReport> {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let reports: Vec<JobReport> = jobs
            .par_iter()
            .map(|job| {
                let report = self.run_job(job);
                pb.inc(1);
                pb.set_message(format!("{}/{}", job.race, job.category));
                report
            })
            .collect();

        let failed = reports.iter().filter(|r| matches!(r.outcome, JobOutcome::Failed(_))).count();
        pb.finish_with_message(format!("Processed {} files, {} failed", reports.len(), failed));
        info!("Batch complete: {} files, {} failed", reports.len(), failed);
        reports
    }

    fn run_job(&self, job: &OddsJob) -> JobReport {
        match self.process_category(&job.race, &job.category) {
            Ok((CategoryResult::Scored(table), path)) => JobReport {
                job: job.clone(),
                outcome: JobOutcome::Scored {
                    drivers: table.len(),
                    favourite: table.top(1).first().map(|r| r.driver().to_string()),
                    total_expected_points: table.total_expected_points(),
                },
                output: Some(path),
            },
            Ok((CategoryResult::Unscored(table), path)) => JobReport {
                job: job.clone(),
                outcome: JobOutcome::Unscored { drivers: table.len() },
                output: Some(path),
            },
            Err(e) => {
                warn!("Failed to process {}: {:#}", job.path.display(), e);
                JobReport { job: job.clone(), outcome: JobOutcome::Failed(format!("{:#}", e)), output: None }
            }
        }
    }
}
