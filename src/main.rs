use std::process::ExitCode;

use anyhow::Context;
use json_index_cache::{CacheConfig, IndexCache, Navigate};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: json-index-cache [--index-dir DIR] [--max-depth N] FILE [POINTER]";

struct Args {
    config: CacheConfig,
    file: String,
    pointer: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = CacheConfig::new();
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--index-dir" => {
                let dir = args.next().context("--index-dir needs a value")?;
                config = config.index_directory(dir);
            }
            "--max-depth" => {
                let depth = args.next().context("--max-depth needs a value")?;
                config = config.max_depth(depth.parse().context("invalid --max-depth")?);
            }
            "-h" | "--help" => anyhow::bail!("{USAGE}"),
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let file = positional.next().context(USAGE)?;
    let pointer = positional.next().unwrap_or_default();
    Ok(Args {
        config,
        file,
        pointer,
    })
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let cache = IndexCache::new(args.config);
    let view = cache
        .load(&args.file)
        .with_context(|| format!("loading {}", args.file))?;
    let value = view
        .pointer(&args.pointer)
        .with_context(|| format!("resolving {:?}", args.pointer))?
        .materialize()?;
    println!("{}", serde_json::to_string_pretty(&*value)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
