//! ingot-load: load a line-delimited record stream into a columnar warehouse
//!
//! Usage:
//!   # Read the message stream from stdin
//!   tap-something | ingot-load --config config.json
//!
//!   # Or from a file
//!   ingot-load --config config.json messages.stream
//!
//! The config file is JSON: {"database": "warehouse.db", "schema": "tap"}
//! plus optional batch_size, timestamp_column and buffer_ttl_seconds.
//!
//! After a clean run the final checkpoint is written to stdout as a STATE
//! line; diagnostics go to stderr so stdout stays a pure protocol channel.

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use ingot::{load_stream, DuckDbWarehouse, TargetConfig, TargetEngine};
use serde_json::json;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingot-load")]
#[command(about = "Load a line-delimited record stream into a columnar warehouse", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Path to the JSON config file
    #[arg(long, short = 'c')]
    config: String,

    /// Override the configured flush threshold (rows per batch)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Don't emit the final STATE line to stdout
    #[arg(long)]
    no_state: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = TargetConfig::from_file(&args.config)?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    let warehouse = DuckDbWarehouse::open(&config.database)
        .with_context(|| format!("failed to open warehouse database: {}", config.database))?;
    let mut engine = TargetEngine::new(config, warehouse);

    let reader: Box<dyn BufRead> = if let Some(file_path) = &args.input {
        let file = File::open(file_path)
            .with_context(|| format!("failed to open input file: {}", file_path))?;
        Box::new(BufReader::new(file))
    } else {
        Box::new(std::io::stdin().lock())
    };

    load_stream(reader, &mut engine)?;

    if !args.no_state {
        // The caller is expected to forward this as the protocol's own
        // checkpoint.
        println!("{}", json!({"type": "STATE", "value": engine.state()}));
    }

    Ok(())
}
