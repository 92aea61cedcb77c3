pub mod calculator;
pub mod error;
pub mod game_points;
pub mod models;
pub mod race_store;

pub use calculator::{
    average_probability, implied_probability, normalize_probabilities, odds_to_probability,
    probability_from_odds, OddsCalculator,
};
pub use error::{PipelineError, Result};
pub use game_points::{GameOdds, GamePointsBook};
pub use models::{
    DriverAnalysis, ExpectedPointsRow, ExpectedPointsTable, OddsFormat, OddsTable, PipelineConfig,
    ProbabilityRow, ProbabilityTable,
};
pub use race_store::RaceStore;
