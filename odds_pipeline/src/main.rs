use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use polars::prelude::{CsvWriter, SerWriter};
use std::path::PathBuf;

use odds_pipeline::race_store::{expected_points_frame, read_odds_csv, top_drivers_frame};
use odds_pipeline::{GameOdds, GamePointsBook, OddsCalculator, OddsFormat, PipelineConfig};

#[derive(Parser)]
#[command(name = "odds_pipeline")]
#[command(about = "Convert an odds table to normalized probabilities and expected fantasy points")]
struct Args {
    /// Odds CSV: first column Driver, one column per provider
    #[arg(long)]
    odds_file: PathBuf,

    /// JSON file mapping category -> driver -> points
    #[arg(long, requires = "category", conflicts_with = "points_csv")]
    game_points: Option<PathBuf>,

    /// Category to take from the game points file
    #[arg(short, long)]
    category: Option<String>,

    /// Single-category points CSV (Driver,points)
    #[arg(long)]
    points_csv: Option<PathBuf>,

    /// Quotation convention of the odds file
    #[arg(long, value_enum, default_value = "fractional")]
    odds_format: OddsFormat,

    /// Name of the points column in the output
    #[arg(long, default_value = "game_points")]
    points_column: String,

    /// Number of drivers in the summary
    #[arg(short, long, default_value = "5")]
    top: usize,

    #[arg(short, long, value_enum, default_value = "summary")]
    output: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Summary,
}

fn load_game_odds(args: &Args) -> Result<GameOdds> {
    if let Some(path) = &args.points_csv {
        return GameOdds::from_csv_path(path)
            .with_context(|| format!("Failed to load game points from {}", path.display()));
    }
    if let (Some(path), Some(category)) = (&args.game_points, &args.category) {
        let book = GamePointsBook::from_json_file(path)
            .with_context(|| format!("Failed to load game points from {}", path.display()))?;
        return Ok(book.require(category)?.clone());
    }
    anyhow::bail!("Game odds not set: pass --points-csv or --game-points with --category")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig {
        odds_format: args.odds_format,
        points_column: args.points_column.clone(),
        top_n: args.top,
    };

    info!("Processing {}", args.odds_file.display());
    let odds = read_odds_csv(&args.odds_file)?;
    info!("Loaded odds for {} drivers from {} providers", odds.len(), odds.providers().len());

    let game_odds = load_game_odds(&args)?;
    let calculator = OddsCalculator::new(config);
    let result = calculator.process(&odds, Some(&game_odds))?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Csv => {
            let mut frame = expected_points_frame(&result)?;
            CsvWriter::new(std::io::stdout())
                .include_header(true)
                .finish(&mut frame)?;
        }
        OutputFormat::Summary => {
            println!("Odds Summary");
            println!("============");
            println!("File: {}", args.odds_file.display());
            println!("Drivers: {}  Providers: {}", odds.len(), odds.providers().len());
            println!("Total expected points: {:.2}", result.total_expected_points());
            println!();
            println!("Top {} drivers:", calculator.config().top_n);
            println!("{}", top_drivers_frame(&result, calculator.config().top_n)?);
        }
    }

    Ok(())
}
