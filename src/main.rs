use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

mod odds_scraper;
mod race_processor;

use odds_pipeline::race_store::top_drivers_frame;
use odds_pipeline::{GamePointsBook, OddsFormat, PipelineConfig, RaceStore};
use odds_scraper::OddscheckerScraper;
use race_processor::{CategoryResult, JobOutcome, RaceProcessor};

const DEFAULT_CATEGORIES: [&str; 3] = ["race-winner", "qualifying", "podium-finish"];

#[derive(Parser)]
#[command(name = "f1_odds")]
#[command(about = "Scrape F1 betting odds and turn them into expected fantasy points")]
struct Cli {
    /// Base directory for scraped and processed data
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Season year (defaults to the current year)
    #[arg(long, global = true)]
    year: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape odds pages and store them as CSV
    Scrape {
        #[arg(short, long)]
        race: String,

        #[command(flatten)]
        categories: CategoryArgs,

        #[command(flatten)]
        scrape: ScrapeArgs,
    },
    /// Process stored odds into probabilities and expected points
    Process {
        #[arg(short, long)]
        race: String,

        #[command(flatten)]
        categories: CategoryArgs,

        #[command(flatten)]
        processing: ProcessingArgs,
    },
    /// Scrape and then process one or more races
    Run {
        #[arg(short, long = "race", required = true)]
        races: Vec<String>,

        #[command(flatten)]
        categories: CategoryArgs,

        #[command(flatten)]
        scrape: ScrapeArgs,

        #[command(flatten)]
        processing: ProcessingArgs,
    },
    /// Show the analysis for a single driver as JSON
    Analyze {
        #[arg(short, long)]
        race: String,

        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        driver: String,

        #[command(flatten)]
        processing: ProcessingArgs,
    },
    /// Process every stored odds file for the season in parallel
    ProcessAll {
        #[command(flatten)]
        processing: ProcessingArgs,
    },
}

#[derive(Args)]
struct CategoryArgs {
    /// Market slugs as used in the odds site URLs
    #[arg(short, long = "category", num_args = 1.., default_values_t = DEFAULT_CATEGORIES.map(String::from))]
    categories: Vec<String>,
}

#[derive(Args)]
struct ScrapeArgs {
    /// Override the odds site base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Seconds to wait between page requests
    #[arg(long, default_value = "5")]
    delay_secs: u64,
}

#[derive(Args)]
struct ProcessingArgs {
    /// JSON file mapping category -> driver -> game points
    #[arg(long, default_value = "config/game_points.json")]
    game_points: PathBuf,

    /// Quotation convention of the stored odds
    #[arg(long, value_enum, default_value = "fractional")]
    odds_format: OddsFormat,

    #[arg(long, default_value = "game_points")]
    points_column: String,

    /// Number of drivers to print per category
    #[arg(short, long, default_value = "5")]
    top: usize,
}

impl ProcessingArgs {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            odds_format: self.odds_format,
            points_column: self.points_column.clone(),
            top_n: self.top,
        }
    }

    fn book(&self) -> Result<GamePointsBook> {
        GamePointsBook::from_json_file(&self.game_points)
            .with_context(|| format!("Failed to load game points from {}", self.game_points.display()))
    }
}

fn build_scraper(race: &str, args: &ScrapeArgs) -> Result<OddscheckerScraper> {
    let mut scraper = OddscheckerScraper::new(race)?.with_request_delay(Duration::from_secs(args.delay_secs));
    if let Some(base_url) = &args.base_url {
        scraper = scraper.with_base_url(base_url.clone());
    }
    Ok(scraper)
}

/// Scrape and store every category; returns the categories that produced data
async fn scrape_race(store: &RaceStore, race: &str, categories: &[String], args: &ScrapeArgs) -> Result<Vec<String>> {
    let scraper = build_scraper(race, args)?;
    info!("Scraping {} categories for {}", categories.len(), scraper.race());
    let results = scraper.scrape_all_categories(categories).await;

    let mut saved = Vec::new();
    for (category, table) in &results {
        let path = store.save_odds(race, category, table)?;
        println!("  Saved {} odds to {}", category, path.display());
        saved.push(category.clone());
    }
    println!("Successfully scraped odds for {} out of {} categories", saved.len(), categories.len());
    Ok(saved)
}

fn process_race(processor: &RaceProcessor, race: &str, categories: &[String]) {
    let top_n = processor.calculator().config().top_n;

    for category in categories {
        println!("\nProcessing {}...", category);
        match processor.process_category(race, category) {
            Ok((CategoryResult::Scored(table), path)) => {
                println!("Saved processed odds to {}", path.display());
                match top_drivers_frame(&table, top_n) {
                    Ok(frame) => println!("\nTop {} drivers for {}:\n{}", top_n, category, frame),
                    Err(e) => warn!("Failed to build summary for {}: {}", category, e),
                }
            }
            Ok((CategoryResult::Unscored(table), path)) => {
                println!("Warning: No game odds defined for {}", category);
                println!("Saved probabilities for {} drivers to {}", table.len(), path.display());
            }
            Err(e) => println!("Error processing {}: {:#}", category, e),
        }
    }
}

fn analyze(store: &RaceStore, race: &str, category: &str, driver: &str, processing: &ProcessingArgs) -> Result<()> {
    let book = processing.book()?;
    let processor = RaceProcessor::new(store, &book, processing.config());

    let analysis = match processor.evaluate_category(race, category)? {
        CategoryResult::Scored(table) => table.driver_analysis(driver)?,
        CategoryResult::Unscored(table) => table.driver_analysis(driver, None)?,
    };
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn process_all(store: &RaceStore, processing: &ProcessingArgs) -> Result<()> {
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(num_cpus::get()).build_global() {
        warn!("Could not configure thread pool: {}", e);
    }
    println!("Using {} threads", rayon::current_num_threads());

    let book = processing.book()?;
    let processor = RaceProcessor::new(store, &book, processing.config());
    let jobs = processor.discover_jobs()?;
    println!("Found {} odds files under {}", jobs.len(), store.year_dir().display());
    if jobs.is_empty() {
        return Ok(());
    }

    let start = std::time::Instant::now();
    let reports = processor.process_all(&jobs);

    println!("\n{:<32} {:<16} {:<22} {:>8}", "Race", "Category", "Favourite", "xPts");
    println!("{}", "=".repeat(82));
    for report in &reports {
        let job = &report.job;
        match &report.outcome {
            JobOutcome::Scored { favourite, total_expected_points, .. } => println!(
                "{:<32} {:<16} {:<22} {:>8.2}",
                job.race,
                job.category,
                favourite.as_deref().unwrap_or("-"),
                total_expected_points
            ),
            JobOutcome::Unscored { drivers } => println!(
                "{:<32} {:<16} {:<22} {:>8}",
                job.race,
                job.category,
                format!("({} drivers)", drivers),
                "-"
            ),
            JobOutcome::Failed(msg) => println!("{:<32} {:<16} FAILED: {}", job.race, job.category, msg),
        }
    }
    println!("\nProcessing complete in {:?}", start.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let store = RaceStore::new(cli.data_dir.clone(), cli.year);
    info!("Using data directory {} for {}", store.year_dir().display(), store.year());

    match &cli.command {
        Command::Scrape { race, categories, scrape } => {
            println!("Scraping {} for {}", race, store.year());
            scrape_race(&store, race, &categories.categories, scrape).await?;
        }
        Command::Process { race, categories, processing } => {
            let book = processing.book()?;
            let processor = RaceProcessor::new(&store, &book, processing.config());
            process_race(&processor, race, &categories.categories);
        }
        Command::Run { races, categories, scrape, processing } => {
            println!("\nStarting F1 odds scraping and processing for {}", store.year());
            println!("{}", "=".repeat(50));

            let book = processing.book()?;
            let processor = RaceProcessor::new(&store, &book, processing.config());
            for race in races {
                println!("\nProcessing race: {}", race);
                println!("{}", "-".repeat(30));

                let scraped = scrape_race(&store, race, &categories.categories, scrape).await?;
                if scraped.is_empty() {
                    println!("No odds data found for {}", race);
                    continue;
                }
                process_race(&processor, race, &scraped);
            }

            println!("\nProcessing complete!");
            println!("{}", "=".repeat(50));
        }
        Command::Analyze { race, category, driver, processing } => {
            analyze(&store, race, category, driver, processing)?;
        }
        Command::ProcessAll { processing } => {
            process_all(&store, processing)?;
        }
    }

    Ok(())
}
