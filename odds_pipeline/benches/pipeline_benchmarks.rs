use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

use odds_pipeline::race_store::read_odds;
use odds_pipeline::{
    normalize_probabilities, odds_to_probability, GameOdds, OddsCalculator, OddsTable, PipelineConfig,
};

fn grid_table(drivers: usize, providers: usize) -> OddsTable {
    let mut table = OddsTable::new((0..providers).map(|p| format!("P{}", p)).collect());
    for d in 0..drivers {
        let quotes = (0..providers)
            .map(|p| if (d + p) % 7 == 0 { None } else { Some(format!("{}", 0.5 + d as f64 + p as f64 * 0.1)) })
            .collect();
        table.push_row(format!("Driver {}", d), quotes).unwrap();
    }
    table
}

fn benchmark_conversion(c: &mut Criterion) {
    let quotes: Vec<String> = (1..=200).map(|i| format!("{}", i as f64 / 8.0)).collect();

    c.bench_function("odds_to_probability", |b| {
        b.iter(|| {
            for q in &quotes {
                black_box(odds_to_probability(Some(q.as_str())));
            }
        });
    });
}

fn benchmark_normalization(c: &mut Criterion) {
    let averages: Vec<Option<f64>> = (0..40).map(|i| if i % 5 == 0 { None } else { Some(1.0 / (i as f64 + 2.0)) }).collect();

    c.bench_function("normalize_probabilities", |b| {
        b.iter(|| black_box(normalize_probabilities(&averages)));
    });
}

fn benchmark_full_pipeline(c: &mut Criterion) {
    let table = grid_table(20, 25);
    let game_odds = GameOdds::new(
        (0..20).map(|d| (format!("Driver {}", d), 10.0 + d as f64 * 2.0)).collect::<HashMap<_, _>>(),
    )
    .unwrap();
    let calculator = OddsCalculator::new(PipelineConfig::default());

    c.bench_function("process_20x25", |b| {
        b.iter(|| black_box(calculator.process(&table, Some(&game_odds)).unwrap()));
    });
}

fn benchmark_csv_loading(c: &mut Criterion) {
    let mut csv = String::from("Driver,B3,SK,PP,WH\n");
    for d in 0..20 {
        csv.push_str(&format!("Driver {},{},{},N/A,\n", d, d + 1, d + 2));
    }

    c.bench_function("read_odds_csv", |b| {
        b.iter(|| black_box(read_odds(csv.as_bytes()).unwrap()));
    });
}

criterion_group!(
    benches,
    benchmark_conversion,
    benchmark_normalization,
    benchmark_full_pipeline,
    benchmark_csv_loading
);
criterion_main!(benches);
