//! Command-line surface: one uniform entry point for all four roles.
//! The teacher's per-role example binaries each
//! parsed a single positional uid with `env::args()`; this spec's
//! single binary has several named, optional, validated flags, which
//! is squarely `clap`'s derive API's job.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    Client,
    Proposer,
    Acceptor,
    Learner,
}

/// A replicated total-order broadcast node speaking Multi-Paxos.
#[derive(Debug, Parser)]
#[command(name = "paxos-node", version, about)]
pub struct Cli {
    /// Which of the four roles this process plays.
    #[arg(short = 'r', long = "role", value_enum)]
    pub role: Role,

    /// Numeric process id: becomes the proposer/acceptor/learner/client id.
    #[arg(short = 'p', long = "pid")]
    pub pid: u64,

    /// Enable debug logging.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    pub debug: bool,

    /// Batch size (proposer only).
    #[arg(short = 'b', long = "batch-size", default_value_t = 1)]
    pub batch_size: usize,

    /// Path to the cluster configuration JSON file. Defaults to
    /// `<exec_dir>/../logs/config.json`.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Enable latency measurement mode (client only): append a
    /// microsecond sample per submission to `logs/latency_client<pid>`.
    #[arg(short = 'm', long = "measure", default_value_t = false)]
    pub measure: bool,
}
