use std::collections::HashMap;

use odds_pipeline::{GameOdds, OddsCalculator, OddsTable, PipelineConfig};

fn main() -> odds_pipeline::Result<()> {
    // Qualifying odds from three bookmakers, already reduced to profit per unit stake
    let mut odds = OddsTable::new(vec!["B3".to_string(), "SK".to_string(), "PP".to_string()]);
    let q = |s: &str| Some(s.to_string());
    odds.push_row("Lando Norris", vec![q("1.25"), q("1.2"), q("1.375")])?;
    odds.push_row("Oscar Piastri", vec![q("2.5"), q("2.25"), None])?;
    odds.push_row("Max Verstappen", vec![q("4"), q("4.5"), q("4")])?;
    odds.push_row("Charles Leclerc", vec![q("8"), q("N/A"), q("7")])?;
    odds.push_row("George Russell", vec![q("10"), q("9"), q("11")])?;

    let game_odds = GameOdds::new(HashMap::from([
        ("Lando Norris".to_string(), 10.0),
        ("Oscar Piastri".to_string(), 14.0),
        ("Max Verstappen".to_string(), 12.0),
        ("Charles Leclerc".to_string(), 12.0),
    ]))?;

    let calculator = OddsCalculator::new(PipelineConfig::default());
    let result = calculator.process(&odds, Some(&game_odds))?;

    println!("{:<18} {:>8} {:>7} {:>7}", "Driver", "Prob %", "Points", "xPts");
    println!("{}", "-".repeat(44));
    for row in &result.rows {
        let fmt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<18} {:>8} {:>7} {:>7}",
            row.driver(),
            fmt(row.normalized_probability()),
            fmt(row.game_points),
            fmt(row.expected_points)
        );
    }
    println!();
    println!("Total expected points: {:.2}", result.total_expected_points());

    Ok(())
}
