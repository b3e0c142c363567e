//! phylo-evolve CLI - Search gene trees from a JSON run file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use phylo_evolve::{
    Genome,
    polysolver::build_engine,
    schema::{CacheConfig, EngineConfig, RateConfig, ReconciliationConfig, RunFile},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <run.json>", args[0]);
        eprintln!();
        eprintln!("Evolve gene trees described by a JSON run file.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json  Path to the run file");
        eprintln!();
        eprintln!("Example run file is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_run();
        return;
    }

    let run_path = PathBuf::from(&args[1]);
    let run = RunFile::load(&run_path).unwrap_or_else(|e| {
        eprintln!("Error loading run file: {}", e);
        std::process::exit(1);
    });

    println!("phylo-evolve");
    println!("============");
    println!("Species: {}", run.gene_map.len());
    println!(
        "Population: {}, generations: {}",
        run.engine.population_size, run.engine.generations
    );
    println!("Selector: {:?}", run.engine.selector);
    println!(
        "Reconciliation: {}",
        if run.reconciliation.is_some() { "on" } else { "off" }
    );
    println!();

    let mut engine = build_engine(&run).unwrap_or_else(|e| {
        eprintln!("Error assembling run: {}", e);
        std::process::exit(1);
    });

    let generations = run.engine.generations;
    let report_every = (generations / 10).max(1);
    let start = Instant::now();
    engine.set_step_callback(move |engine| {
        let generation = engine.current_generation();
        if generation > 0 && generation % report_every == 0 {
            let stats = engine.statistics();
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Generation {}/{}: best={:.4}, mean={:.4}, {:.1} gen/s",
                generation,
                generations,
                stats.fit_max,
                stats.fit_ave,
                generation as f32 / elapsed.max(f32::EPSILON)
            );
        }
        false
    });

    println!("Evolving...");
    let outcome = engine.evolve().unwrap_or_else(|e| {
        eprintln!("Run failed: {}", e);
        std::process::exit(1);
    });

    println!();
    println!("Stopped: {:?} after {} generations", outcome.stop_reason, outcome.generations);
    println!("Best score: {:?}", outcome.best.score());
    println!("Best tree: {}", outcome.best.tree().to_newick(true));
    println!();
    println!("{}", outcome.statistics);
    println!("Time: {:.2}s", outcome.elapsed_secs);
}

fn print_example_run() {
    let mut gene_map = BTreeMap::new();
    gene_map.insert("a".to_string(), vec!["a1".to_string(), "a2".to_string()]);
    gene_map.insert("b".to_string(), vec!["b1".to_string(), "b2".to_string()]);
    gene_map.insert("c".to_string(), vec!["c1".to_string()]);

    let example = RunFile {
        engine: EngineConfig {
            generations: 50,
            population_size: 40,
            seed: Some(1),
            ..Default::default()
        },
        gene_tree: "((a,b),((a,c),b));".to_string(),
        gene_map,
        reference_tree: "((a1,b1),((a2,c1),b2));".to_string(),
        is_init: false,
        intbrnp: 0.95,
        reconciliation: Some(ReconciliationConfig {
            species_tree: "((a,b),c);".to_string(),
            duplication_cost: 1.0,
            loss_cost: 1.0,
            event_weights: Default::default(),
        }),
        rates: RateConfig::default(),
        cache: Some(CacheConfig {
            max_entries: 10_000,
            dir: None,
        }),
    };

    match serde_json::to_string_pretty(&example) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
