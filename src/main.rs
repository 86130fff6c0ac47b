mod analysis;
mod clean;
mod correlate;
mod direct;
mod dispatch;
mod extract;
mod report;
mod similarity;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::{run_direct, run_dispatch, ModeParams};
use crate::direct::CallPattern;
use crate::dispatch::DispatchRoots;
use crate::extract::extract;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Direct call-site extraction (recvops)
    Recv,
    /// Dispatch branch-table traversal (sendops)
    Send,
    /// Both analyses, one after the other
    Both,
}

/// Takes two decompiled dumps of different client versions and produces a
/// list of opcode changes between them, matched by handler-body similarity.
#[derive(Parser)]
#[command(name = "opdiff", version)]
struct Cli {
    /// Decompiled dump of the lower (older) version
    old: PathBuf,

    /// Decompiled dump of the newer version
    new: PathBuf,

    /// Which detection strategy to run
    #[arg(short, long, value_enum, default_value = "both")]
    mode: Mode,

    /// Maximum allowed opcode variance in percent (defaults: 15 recv, 25 send)
    #[arg(long)]
    variance: Option<u32>,

    /// Certainty threshold in percent; guesses below it are discarded
    /// (defaults: 30 recv, 40 send)
    #[arg(long)]
    threshold: Option<u32>,

    /// Class part of the packet-construction call scanned for in recv mode
    #[arg(long, value_name = "IDENT", default_value = "COutPacket")]
    call_class: String,

    /// Constructor part of the packet-construction call
    #[arg(long, value_name = "IDENT", default_value = "COutPacket_0")]
    call_ctor: String,

    /// Dispatch-root function name; repeatable, replaces the built-in list
    #[arg(long = "root", value_name = "NAME")]
    roots: Vec<String>,

    /// Directory the report files are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let old_text = fs::read_to_string(&cli.old)
        .with_context(|| format!("reading {}", cli.old.display()))?;
    let new_text = fs::read_to_string(&cli.new)
        .with_context(|| format!("reading {}", cli.new.display()))?;

    let (old_records, new_records) = rayon::join(|| extract(&old_text), || extract(&new_text));
    let old_records = old_records.with_context(|| format!("parsing {}", cli.old.display()))?;
    let new_records = new_records.with_context(|| format!("parsing {}", cli.new.display()))?;
    info!(
        old = old_records.len(),
        new = new_records.len(),
        "built function lists"
    );

    if cli.mode == Mode::Recv || cli.mode == Mode::Both {
        let pattern = CallPattern::new(&cli.call_class, &cli.call_ctor)?;
        let params = ModeParams::DIRECT.with_overrides(cli.variance, cli.threshold);
        let matched = run_direct(&old_records, &new_records, &pattern, params, &cli.out_dir)?;
        info!(matched, "recv analysis completed");
    }

    if cli.mode == Mode::Send || cli.mode == Mode::Both {
        let params = ModeParams::DISPATCH.with_overrides(cli.variance, cli.threshold);
        let roots = if cli.roots.is_empty() {
            DispatchRoots::default()
        } else {
            DispatchRoots::new(cli.roots.clone())
        };
        let matched = run_dispatch(&old_records, &new_records, params, &roots, &cli.out_dir)?;
        info!(matched, "send analysis completed");
    }

    Ok(())
}
