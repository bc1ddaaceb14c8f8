use std::env;
use std::io::Read;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use mcshell::{build_engine, Config};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Monte Carlo simulations of classical statistical-mechanical systems.
/// Reads a single JSON configuration and runs it to completion.
struct Args {
    /// input file name; standard input when omitted
    #[clap(short = 'i', long)]
    infile: Option<String>,
    /// be more verbose and log program actions on the screen
    #[clap(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    if args.verbose {
        env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let text = match &args.infile {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                error!("cannot read {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                error!("cannot read standard input: {}", e);
                return ExitCode::FAILURE;
            }
            buffer
        }
    };

    let config = match Config::from_json(&text) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration is not valid JSON: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(errors) => {
            error!("configuration failed validation:");
            for e in &errors {
                error!("  {}", e);
            }
            return ExitCode::FAILURE;
        }
    };

    info!("configuration valid; starting simulation");
    engine.run();
    info!("simulation finished");
    ExitCode::SUCCESS
}
