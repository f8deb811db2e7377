mod cli;
mod config;

use std::fs;
use std::io::{self, Read};
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use elig_core::catalog::Catalog;
use elig_core::interpret::Interpreter;
use elig_core::study::{parse_studies, Study};

use crate::cli::Cli;
use crate::config::Config;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Cli::parse();
    if let Err(err) = run(&args) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(args: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&args.conf)?;
    let variables = Catalog::load_variables(&config.variable_file)?;
    let units = Catalog::load_units(&config.unit_file)?;
    let interpreter = Interpreter::new(&variables, &units);

    let data = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading input {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let studies: Vec<Study> = serde_json::from_str(&data).map_err(elig_core::EligError::Ingest)?;

    let parsed = parse_studies(&studies, &interpreter, &config.pipeline_options());
    let json = serde_json::to_string_pretty(&parsed)?;
    match &args.output {
        Some(path) => fs::write(path, json.as_bytes())
            .with_context(|| format!("writing output {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
