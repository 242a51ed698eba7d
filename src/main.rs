//! coco CLI - Evolve symbolic regression circuits from a JSON configuration.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use coco::{
    Coevolution, SymbolicDataset,
    compute::coevolution::{HistoryJournal, PredictorJournal},
    compute::fitness::Dataset,
    schema::RunConfig,
    vault::write_chromosome,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 3 {
        eprintln!("Usage: {} <config.json> <data.txt> [--resume]", args[0]);
        eprintln!();
        eprintln!("Evolve a symbolic regression circuit with CGP and fitness predictors.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to run configuration file");
        eprintln!("  data.txt     Fitness cases: 'cases variables' header, then one");
        eprintln!("               row of inputs followed by the target per case");
        eprintln!("  --resume     Continue from the latest state in the vault directory");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let data_path = PathBuf::from(&args[2]);
    let resume = args[3..].iter().any(|a| a == "--resume");

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: RunConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    let dataset = SymbolicDataset::load(&data_path, config.dataset.epsilon).unwrap_or_else(|e| {
        eprintln!("Error loading fitness cases: {}", e);
        std::process::exit(1);
    });

    println!("coco - CGP with coevolved fitness predictors");
    println!("============================================");
    println!("Algorithm: {:?}", config.algorithm);
    println!(
        "Grid: {}x{} (levels back {}), population {}",
        config.cgp.cols, config.cgp.rows, config.cgp.levels_back, config.cgp.population_size
    );
    println!(
        "Fitness cases: {} with {} variables",
        dataset.case_count(),
        dataset.input_count()
    );
    println!("Max generations: {}", config.max_generations);
    println!();

    let mut run = Coevolution::new(config, Arc::new(dataset)).unwrap_or_else(|e| {
        eprintln!("Error setting up run: {}", e);
        std::process::exit(1);
    });
    if run.config().algorithm.uses_predictors() {
        run = run.with_predictor_journal(PredictorJournal::new(io::stderr()));
    }
    if run.config().algorithm == coco::Algorithm::Baldwin {
        let history_path = config_path.with_extension("history.jsonl");
        match fs::File::create(&history_path) {
            Ok(file) => run = run.with_history_journal(HistoryJournal::new(file)),
            Err(e) => eprintln!("Not writing history log to {}: {}", history_path.display(), e),
        }
    }

    if resume {
        match run.resume_from_vault() {
            Ok(Some(generation)) => println!("Resumed from generation {generation}"),
            Ok(None) => println!("No saved state, starting fresh"),
            Err(e) => {
                eprintln!("Error resuming: {}", e);
                std::process::exit(1);
            }
        }
    }

    let cancel = run.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
        eprintln!("Ctrl-C will not stop the run cleanly: {}", e);
    }

    println!("Running...");
    let summary = run
        .run_with_callback(|progress| {
            if progress.improved {
                println!(
                    "  Generation {}: fitness {:.3}, real {:.3}{}",
                    progress.generation,
                    progress.best_fitness,
                    progress.best_real_fitness,
                    progress
                        .predictor_length
                        .map(|l| format!(", predictor length {l}"))
                        .unwrap_or_default()
                );
            }
        })
        .unwrap_or_else(|e| {
            eprintln!("Error during run: {}", e);
            std::process::exit(1);
        });

    println!();
    println!("Stopped: {}", summary.stop_reason);
    println!("Generations: {}", summary.generations);
    println!("Best real fitness: {:.4}", summary.best_fitness);
    println!("Circuit evaluations: {}", summary.evaluations);
    println!(
        "Time: {:.2}s ({:.0} evaluations/s)",
        summary.elapsed_seconds,
        summary.evaluations as f64 / summary.elapsed_seconds.max(f64::EPSILON)
    );
    println!();
    println!("Best chromosome:");
    let mut stdout = io::stdout();
    if let Err(e) = write_chromosome(&mut stdout, &summary.best_genome, run.layout().shape()) {
        eprintln!("Error printing chromosome: {}", e);
    }
    println!();
}

fn print_example_config() {
    let config = RunConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
