//! HER-DDPG demos
//!
//! ```bash
//! # Train with config/config.yml
//! cargo run --release --bin train-reach -- train
//!
//! # Train with another configuration file
//! cargo run --release --bin train-reach -- train path/to/config.yml
//!
//! # Print the resolved configuration (defaults filled in)
//! cargo run --release --bin train-reach -- show-config
//! ```
//!
//! Exit codes: 0 on completion, 1 on configuration errors, 2 on training failure.

mod train_reach;

use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "config/config.yml";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = PathBuf::from(args.get(2).map(String::as_str).unwrap_or(DEFAULT_CONFIG));

    let code = match args.get(1).map(String::as_str) {
        None | Some("train") => train_reach::run(&config_path),
        Some("show-config") => train_reach::show_config(&config_path),
        Some(other) => {
            println!("Unknown command: {}", other);
            println!();
            print_usage();
            1
        }
    };
    std::process::exit(code);
}

fn print_usage() {
    println!("Usage: train-reach [command] [config]");
    println!();
    println!("  train [config]        Train a reach policy (default {})", DEFAULT_CONFIG);
    println!("  show-config [config]  Print the configuration with defaults resolved");
}
