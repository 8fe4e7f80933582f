//! Neurlang Bridge CLI
//!
//! Inspects the library units the bridge registers for interpreted programs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neurlang_bridge::{Bridge, BridgeConfig, SymbolKind};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl-bridge")]
#[command(version)]
#[command(about = "Inspect compiled library units exposed to the interpreter", long_about = None)]
struct Cli {
    /// Config file (default: nearest nl-bridge.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint of a unit's symbol table
    Fingerprint {
        /// Unit identifier (e.g. net/smtp)
        unit: String,
    },

    /// List the symbols of a unit
    Symbols {
        /// Unit identifier (e.g. net/smtp)
        unit: String,

        /// Output JSON
        #[arg(long)]
        json: bool,

        /// Only symbols of this kind (function, constant, variable, type, interface-wrapper)
        #[arg(long)]
        kind: Option<String>,
    },

    /// List registered units
    Units {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct UnitInfo<'a> {
    id: &'a str,
    version: Option<&'a str>,
    symbols: usize,
    fingerprint: String,
}

#[derive(Serialize)]
struct SymbolInfo<'a> {
    name: &'a str,
    kind: &'static str,
    shape: String,
}

fn load_config(path: Option<&PathBuf>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => BridgeConfig::load_from_cwd().context("Failed to load nl-bridge.toml"),
    }
}

fn init_tracing(config: &BridgeConfig) {
    // NL_BRIDGE_LOG overrides the configured filter
    let filter = EnvFilter::try_from_env("NL_BRIDGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_kind(kind: &str) -> Result<SymbolKind> {
    [
        SymbolKind::Function,
        SymbolKind::Constant,
        SymbolKind::Variable,
        SymbolKind::Type,
        SymbolKind::InterfaceWrapper,
    ]
    .into_iter()
    .find(|k| k.as_str() == kind)
    .with_context(|| format!("Unknown symbol kind: {}", kind))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    let bridge = Bridge::with_stdlib(config).context("Failed to register library units")?;
    let registry = bridge.registry();

    match cli.command {
        Commands::Units { json } => {
            let units: Vec<_> = registry
                .unit_ids()
                .into_iter()
                .filter_map(|id| registry.unit(&id))
                .collect();
            let infos: Vec<UnitInfo> = units
                .iter()
                .map(|u| UnitInfo {
                    id: u.id(),
                    version: u.version(),
                    symbols: u.len(),
                    fingerprint: u.fingerprint(),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for info in &infos {
                    println!(
                        "{}\t{}\t{} symbols",
                        info.id,
                        info.version.unwrap_or("-"),
                        info.symbols
                    );
                }
            }
        }

        Commands::Symbols { unit, json, kind } => {
            let lib = registry
                .unit(&unit)
                .with_context(|| format!("Unknown library unit: {}", unit))?;
            let kind = kind.as_deref().map(parse_kind).transpose()?;
            let infos: Vec<SymbolInfo> = lib
                .symbols()
                .filter(|(_, c)| kind.is_none_or(|k| c.kind() == k))
                .map(|(name, c)| SymbolInfo {
                    name,
                    kind: c.kind().as_str(),
                    shape: c.describe(),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for info in &infos {
                    println!("{:<12} {:<18} {}", info.name, info.kind, info.shape);
                }
            }
        }

        Commands::Fingerprint { unit } => {
            let lib = registry
                .unit(&unit)
                .with_context(|| format!("Unknown library unit: {}", unit))?;
            println!("{}", lib.fingerprint());
        }
    }

    Ok(())
}
