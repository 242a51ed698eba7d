//! Quick comparison of plain CGP, predictors and Baldwin

use std::sync::Arc;
use std::time::Instant;

use coco::{
    Coevolution, SymbolicDataset,
    schema::{Algorithm, CgpConfig, RunConfig},
};

fn main() {
    println!("=== Coevolution Performance Test ===\n");

    let dataset = Arc::new(SymbolicDataset::from_fn(1, 200, 0.01, |x| {
        x[0].powi(4) + x[0].powi(3) + x[0] * x[0] + x[0]
    }));

    for algorithm in [Algorithm::Cgp, Algorithm::Predictors, Algorithm::Baldwin] {
        println!("Algorithm: {:?}", algorithm);

        let config = RunConfig {
            algorithm,
            max_generations: 20_000,
            target_fitness: Some(100.0),
            cgp: CgpConfig {
                cols: 10,
                rows: 2,
                levels_back: 10,
                ..Default::default()
            },
            random_seed: Some(42),
            ..Default::default()
        };

        let start = Instant::now();
        let mut run = match Coevolution::new(config, Arc::clone(&dataset)) {
            Ok(run) => run,
            Err(e) => {
                eprintln!("  Setup failed: {}", e);
                continue;
            }
        };
        let summary = match run.run() {
            Ok(summary) => summary,
            Err(e) => {
                eprintln!("  Run failed: {}", e);
                continue;
            }
        };
        let elapsed = start.elapsed();

        println!("  Stopped:        {}", summary.stop_reason);
        println!("  Generations:    {}", summary.generations);
        println!("  Evaluations:    {}", summary.evaluations);
        println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
        println!(
            "  Evals/sec:      {:.1}",
            summary.evaluations as f64 / elapsed.as_secs_f64()
        );
        println!("  Best fitness:   {:.2}", summary.best_fitness);
        if let Some(length) = summary.predictor_length {
            println!("  Predictor size: {}", length);
        }
        println!();
    }
}
