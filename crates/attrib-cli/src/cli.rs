// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command definitions and handlers.

use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attrib_bridge::{encode_with, ArenaBoundary, RecordingBoundary};
use attrib_links::DdlTimeout;
use attrib_sdk::config::DEFAULT_PROFILE;
use attrib_sdk::{logging, ConfigService, FsConfigStore, SdkConfig};
use attrib_value::{Dictionary, Value};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use crate::timeline::{simulate, Step};

/// Top-level arguments.
#[derive(Parser)]
#[command(name = "attrib")]
#[command(about = "Attribution SDK developer tools")]
pub struct Cli {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Encode a JSON object as boundary calls
    Encode {
        /// JSON file to read ("-" or absent for stdin)
        input: Option<PathBuf>,
        /// What to print
        #[arg(long, value_enum, default_value_t = EncodeFormat::Trace)]
        format: EncodeFormat,
    },
    /// Replay a deferred-link timeline, e.g. `link@0:app://x deferred@59`
    SimulateDdl {
        /// Deferred deep-link TTL in seconds (non-positive: 60)
        #[arg(long)]
        ttl: Option<i64>,
        /// Steps, applied in order
        #[arg(required = true)]
        steps: Vec<Step>,
    },
    /// Inspect or write the stored SDK config
    Config {
        /// Config directory (defaults to the platform config dir)
        #[arg(long, global = true)]
        dir: Option<PathBuf>,
        /// Profile to read or write
        #[arg(long, global = true, default_value = DEFAULT_PROFILE)]
        profile: String,
        /// What to do with it.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// `config` subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the native JSON the SDK would send at session start
    Show,
    /// Write a config with the given credentials
    Init {
        /// API key
        #[arg(long)]
        api_key: String,
        /// API secret
        #[arg(long)]
        secret: String,
        /// Deferred deep-link TTL in seconds
        #[arg(long)]
        ddl_timeout: Option<i64>,
    },
}

/// Output of `encode`.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EncodeFormat {
    /// One line per boundary call
    Trace,
    /// The tree rebuilt on the far side of the boundary, as JSON
    Json,
}

/// Parse the command line, run, and print the result.
#[allow(clippy::print_stdout)]
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => logging::level_from_native(5),
        1 => logging::level_from_native(3),
        _ => logging::level_from_native(2),
    };
    logging::init(level);
    let out = run(cli.command)?;
    print!("{out}");
    Ok(())
}

/// Execute a command and return what it prints.
pub fn run(command: Commands) -> Result<String> {
    match command {
        Commands::Encode { input, format } => {
            let text = read_input(input.as_deref())?;
            let root = Dictionary::from_json_str(&text).context("input must be a JSON object")?;
            encode(&root, format)
        }
        Commands::SimulateDdl { ttl, steps } => {
            let ttl = ttl.map_or_else(DdlTimeout::unset, DdlTimeout::from_secs);
            Ok(simulate(&steps, ttl))
        }
        Commands::Config {
            dir,
            profile,
            action,
        } => {
            let store = match dir {
                Some(dir) => FsConfigStore::at(dir)?,
                None => FsConfigStore::new()?,
            };
            let svc = ConfigService::new(store);
            debug!(base = %svc.store().base().display(), %profile, "config store");
            config(&svc, &profile, action)
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display()))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn encode(root: &Dictionary, format: EncodeFormat) -> Result<String> {
    match format {
        EncodeFormat::Trace => {
            let mut rec = RecordingBoundary::default();
            encode_with(&mut rec, root, |_| ())?;
            let mut out = String::new();
            for call in rec.calls() {
                writeln!(out, "{call}")?;
            }
            Ok(out)
        }
        EncodeFormat::Json => {
            let mut arena = ArenaBoundary::new();
            let rebuilt = encode_with(&mut arena, root, ArenaBoundary::take_root)?;
            let json = Value::Dict(rebuilt).to_json();
            Ok(format!("{}\n", serde_json::to_string_pretty(&json)?))
        }
    }
}

fn config(
    svc: &ConfigService<FsConfigStore>,
    profile: &str,
    action: ConfigAction,
) -> Result<String> {
    match action {
        ConfigAction::Show => {
            let cfg = svc.load(profile)?;
            Ok(format!("{}\n", serde_json::to_string_pretty(&cfg.to_native_json())?))
        }
        ConfigAction::Init {
            api_key,
            secret,
            ddl_timeout,
        } => {
            let mut cfg = SdkConfig::new(api_key, secret);
            cfg.ddl_timeout_sec = ddl_timeout;
            svc.save(profile, &cfg)?;
            Ok(format!("wrote {profile}\n"))
        }
    }
}
