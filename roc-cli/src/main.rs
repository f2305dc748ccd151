//! roc-cli: command-line host for the regenerator optimization core.
//!
//! # Commands
//!
//! - `solve`: run one optimization from a JSON request file (or stdin)
//! - `validate`: check a request without solving
//! - `schema`: print the JSON schema for the request/result formats
//!
//! An infeasible-but-completed run is data, not an error: `solve` prints the
//! result envelope with `success: false` and exits 0, mirroring the HTTP
//! surface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roc_core::models::{OptimizationRequest, OptimizationResult};
use roc_core::validation::validate_request;
use roc_core::run_optimization;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "roc-cli")]
#[command(version = "0.1.0")]
#[command(about = "Regenerator optimization core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the optimizer on a request file
    Solve {
        /// Input JSON file path (use --stdin to read from stdin)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Read input from stdin instead of a file
        #[arg(long)]
        stdin: bool,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a request file without solving
    Validate {
        /// Input JSON file path
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Read input from stdin instead of a file
        #[arg(long)]
        stdin: bool,
    },

    /// Print the JSON schema for the request/result formats
    Schema {
        /// Which schema to print: request, result, or all
        #[arg(value_name = "TYPE", default_value = "all")]
        schema_type: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            input,
            stdin,
            output,
            pretty,
        } => cmd_solve(input, stdin, output, pretty),

        Commands::Validate { input, stdin } => cmd_validate(input, stdin),

        Commands::Schema { schema_type } => cmd_schema(&schema_type),
    }
}

fn read_input(file: Option<PathBuf>, use_stdin: bool) -> Result<String> {
    if use_stdin {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if let Some(path) = file {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path))
    } else {
        anyhow::bail!("Either provide an input file or use --stdin")
    }
}

fn solve_from_json(json_str: &str) -> Result<OptimizationResult> {
    let request: OptimizationRequest =
        serde_json::from_str(json_str).context("Failed to parse request JSON")?;
    run_optimization(&request).map_err(|e| anyhow::anyhow!("Optimizer error: {e}"))
}

fn cmd_solve(
    input: Option<PathBuf>,
    stdin: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    let json_str = read_input(input, stdin)?;

    eprintln!("Running optimizer...");
    let result = solve_from_json(&json_str)?;

    let output_json = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };

    if let Some(output_path) = output {
        fs::write(&output_path, &output_json)
            .with_context(|| format!("Failed to write output to {:?}", output_path))?;
        eprintln!("Result written to {:?}", output_path);
    } else {
        println!("{}", output_json);
    }

    Ok(())
}

fn cmd_validate(input: Option<PathBuf>, stdin: bool) -> Result<()> {
    let json_str = read_input(input, stdin)?;

    let request: OptimizationRequest =
        serde_json::from_str(&json_str).context("JSON parse error")?;

    match validate_request(&request) {
        Ok(resolved) => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "variables": resolved.variable_order,
                })
            );
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": false,
                    "error": e.to_string(),
                })
            );
        }
    }
    Ok(())
}

fn cmd_schema(schema_type: &str) -> Result<()> {
    match schema_type {
        "request" => print_request_schema(),
        "result" => print_result_schema(),
        "all" => {
            println!("=== REQUEST SCHEMA ===\n");
            print_request_schema()?;
            println!("\n=== RESULT SCHEMA ===\n");
            print_result_schema()?;
            Ok(())
        }
        _ => anyhow::bail!(
            "Unknown schema type: {}. Use: request, result, or all",
            schema_type
        ),
    }
}

fn print_request_schema() -> Result<()> {
    let schema = schemars::schema_for!(OptimizationRequest);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn print_result_schema() -> Result<()> {
    let schema = schemars::schema_for!(OptimizationResult);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
