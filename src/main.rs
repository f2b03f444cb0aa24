//! Tile Coherence Simulator CLI.
//!
//! Loads a configuration, builds the multi-tile system and replays an access
//! trace against it, one issuing thread per tile. Statistics are printed as
//! a text summary or as JSON.
//!
//! # Usage
//!
//! ```text
//! tile-coherence --config configs/default.toml --trace accesses.trace [--json] [--check]
//! ```
//!
//! Log output is controlled by the `COHERENCE_LOG` environment variable.

use clap::Parser;
use env_logger::Env;
use std::process;

extern crate tile_coherence;

use tile_coherence::config::Config;
use tile_coherence::sim::{load_trace, run_trace};
use tile_coherence::soc::System;

/// Command-line arguments for the coherence simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tiled Multicore Directory Coherence Simulator")]
struct Args {
    #[arg(short, long, default_value = "configs/default.toml")]
    config: String,

    #[arg(short, long)]
    trace: String,

    /// Print statistics as JSON.
    #[arg(long)]
    json: bool,

    /// Verify the coherence invariants after the run.
    #[arg(long)]
    check: bool,
}

fn main() {
    let env = Env::default().filter_or("COHERENCE_LOG", "warn");
    env_logger::init_from_env(env);

    let args = Args::parse();
    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("[!] FATAL: {}", e);
        process::exit(1);
    });
    let ops = load_trace(&args.trace).unwrap_or_else(|e| {
        eprintln!("[!] FATAL: {}", e);
        process::exit(1);
    });

    if !args.json {
        println!("Global Configuration");
        println!("--------------------");
        println!("General:");
        println!("  Tiles:              {}", config.general.num_tiles);
        println!("  Line Size:          {} B", config.general.line_bytes);
        println!("  Home Tiles:         {:?}", config.home_tiles());
        println!("Cache Hierarchy:");
        for (name, cache) in [
            ("L1-I", &config.cache.l1_i),
            ("L1-D", &config.cache.l1_d),
            ("L2", &config.cache.l2),
        ] {
            println!(
                "  {:<20}{} KB, {} ways, {:?}",
                format!("{}:", name),
                cache.size_bytes / 1024,
                cache.ways,
                cache.policy
            );
        }
        println!("Directory:");
        println!("  Entries:            {}", config.directory.total_entries);
        println!("  Associativity:      {}", config.directory.associativity);
        println!("  HW Sharers:         {}", config.directory.max_hw_sharers);
        println!("  Sharer Policy:      {:?}", config.directory.sharer_policy);
        println!("--------------------");
        println!("[*] Replaying {} accesses from {}", ops.len(), args.trace);
    }

    let system = System::new(&config).unwrap_or_else(|e| {
        eprintln!("[!] FATAL: {}", e);
        process::exit(1);
    });

    let summary = match run_trace(&system, &ops) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            system.stats().print();
            process::exit(1);
        }
    };

    if args.check {
        if let Err(e) = system.check_coherence() {
            eprintln!("\n[!] COHERENCE VIOLATION: {}", e);
            process::exit(2);
        }
    }

    let stats = system.stats();
    if args.json {
        let report = serde_json::json!({ "summary": summary, "stats": stats });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("[!] FATAL: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!(
            "\n[*] {} accesses, {} L1 hits{}",
            summary.accesses,
            summary.l1_hits,
            if args.check { ", coherence verified" } else { "" }
        );
        stats.print();
    }
}
