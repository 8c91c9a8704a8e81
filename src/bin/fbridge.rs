//! fbridge - talk to an external interpreter through a shared directory
//!
//! Each invocation builds a bridge, runs one request, prints the records
//! and cleans up. The interpreter must already be watching the channel
//! directory.
//!
//! # Usage
//!
//! ```text
//! fbridge read game.exe+0x10            # one READ, printed as a result line
//! fbridge read game.exe+0x10 -r 3       # retry up to 3 times
//! fbridge exec "READ A" "READ B" --json # raw batch, JSON output
//! fbridge stop                          # ask the interpreter to exit
//! fbridge config                        # print the effective configuration
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fbridge_client::Bridge;
use fbridge_core::{ChannelConfig, ResponseBatch, ResponseRecord};

/// Environment variable naming a config file.
const CONFIG_ENV: &str = "FBRIDGE_CONFIG";

/// Environment variable overriding the channel directory.
const DIR_ENV: &str = "FBRIDGE_DIR";

// ============================================================================
// CLI Arguments
// ============================================================================

/// fbridge - request/response over a shared directory
#[derive(Parser, Debug)]
#[command(name = "fbridge")]
#[command(about = "Send commands to an external interpreter through channel files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (TOML). Defaults to $FBRIDGE_CONFIG, then the user config dir
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Channel directory, overriding the config file and $FBRIDGE_DIR
    #[arg(long, short = 'd', global = true)]
    dir: Option<PathBuf>,

    /// Wait deadline per request in milliseconds
    #[arg(long, short = 't', global = true)]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show debug-level bridge events on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send raw commands as one batch
    Exec {
        /// Commands, one per line in the command file
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Read an address
    Read {
        address: String,
        /// Attempts before giving up
        #[arg(long, short = 'r', default_value_t = 1)]
        retries: u32,
    },
    /// Write a value to an address
    Write { address: String, value: String },
    /// Resolve a module base address
    Module { name: String },
    /// Follow a pointer chain
    Pointer {
        base: String,
        #[arg(required = true)]
        offsets: Vec<String>,
    },
    /// Ask the interpreter to stop
    Stop,
    /// Print the effective configuration as TOML
    Config,
}

// ============================================================================
// Configuration
// ============================================================================

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("fbridge").join("config.toml"))
        .filter(|path| path.exists())
}

/// `--config`, then `$FBRIDGE_CONFIG`, then the user config dir, then defaults.
fn resolve_config(args: &Args) -> Result<ChannelConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match path {
        Some(path) => ChannelConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ChannelConfig::default(),
    };

    if let Some(dir) = args
        .dir
        .clone()
        .or_else(|| env::var_os(DIR_ENV).map(PathBuf::from))
    {
        config.base_dir = dir;
    }
    if args.verbose {
        config.verbose = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct StopReport {
    stop_file: PathBuf,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode JSON")?
    );
    Ok(())
}

fn print_batch(batch: &ResponseBatch, json: bool) -> Result<()> {
    if json {
        return print_json(batch);
    }
    for record in batch.iter() {
        println!("{record}");
    }
    Ok(())
}

fn print_record(record: &ResponseRecord, json: bool) -> Result<()> {
    if json {
        return print_json(record);
    }
    println!("{record}");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

/// Subscriber directives used when `RUST_LOG` is unset.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "fbridge=debug,fbridge_client=debug"
    } else {
        "fbridge=info,fbridge_client=info"
    }
}

/// The subscriber already writes bridge events to stderr.
fn without_stderr_echo(mut config: ChannelConfig) -> ChannelConfig {
    config.verbose = false;
    config
}

fn run(args: Args, config: ChannelConfig) -> Result<()> {
    if let Command::Config = args.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    debug!(base_dir = %config.base_dir.display(), "Using channel directory");
    let bridge = Bridge::new(without_stderr_echo(config)).context("Failed to create bridge")?;

    if let Command::Stop = args.command {
        bridge
            .send_stop_signal()
            .context("Failed to send stop signal")?;
        let stop_file = bridge.config().stop_path();
        if args.json {
            return print_json(&StopReport { stop_file });
        }
        println!("Stop signal written to {}", stop_file.display());
        return Ok(());
    }

    bridge
        .initialize()
        .context("Failed to initialize channel directory")?;
    let timeout = args.timeout_ms.map(Duration::from_millis);

    let outcome = match &args.command {
        Command::Exec { commands } => bridge
            .execute_commands(commands, timeout)
            .map(|batch| print_batch(&batch, args.json)),
        Command::Read { address, retries } => bridge
            .read_with_retry(address, *retries, timeout)
            .map(|record| print_record(&record, args.json)),
        Command::Write { address, value } => bridge
            .write(address, value, timeout)
            .map(|record| print_record(&record, args.json)),
        Command::Module { name } => bridge
            .module_base(name, timeout)
            .map(|record| print_record(&record, args.json)),
        Command::Pointer { base, offsets } => bridge
            .read_pointer(base, offsets, timeout)
            .map(|record| print_record(&record, args.json)),
        Command::Stop | Command::Config => Ok(Ok(())),
    };

    bridge.cleanup();
    outcome.context("Request failed")?
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
