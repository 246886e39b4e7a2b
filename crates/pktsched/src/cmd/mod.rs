use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod generate;
pub mod inspect;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesise per-lane stream files.
    Generate(GenerateArgs),
    /// Replay lane stream files through the scheduler.
    Run(RunArgs),
    /// Decode a stream file and print its records.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Generate(args) => generate::run(args, format),
        Command::Run(args) => run::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory to write `lane<N>.pw` files into.
    #[arg(long, short = 'o', default_value = ".")]
    pub out_dir: PathBuf,
    /// Number of lanes.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..1024))]
    pub lanes: u16,
    /// Frames per lane.
    #[arg(long, default_value_t = 4)]
    pub frames: u32,
    /// Subheader slots per frame.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub slots: u16,
    /// Hits per block.
    #[arg(long, default_value_t = 3)]
    pub hits: u16,
    /// Timestamp of the first frame.
    #[arg(long, default_value_t = 0)]
    pub start_ts: u64,
    /// Seed for empty-block and error choices.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Chance, in percent, that a block carries no hits.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub empty_percent: u8,
    /// Chance, in percent, that a hit word carries a hit error.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub error_percent: u8,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Lane stream files, in lane order.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Scheduler configuration (JSON). Flags below override it.
    #[arg(long, env = "PKTSCHED_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Write the egress stream to this file.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Descriptor queue depth per lane.
    #[arg(long)]
    pub descriptor_depth: Option<usize>,
    /// Payload queue depth per lane, in words.
    #[arg(long)]
    pub payload_depth: Option<usize>,
    /// Shared storage size, in words.
    #[arg(long)]
    pub storage_words: Option<usize>,
    /// Number of storage tiles.
    #[arg(long)]
    pub tiles: Option<usize>,
    /// Idle-slot gap stepped through before the allocator jumps ahead.
    #[arg(long)]
    pub future_slack: Option<u64>,
    /// Write port words per lane per slot.
    #[arg(long)]
    pub quantum: Option<u32>,
    /// Presenter pipeline depth.
    #[arg(long)]
    pub pipeline_depth: Option<usize>,
    /// Stall egress for `--stall-for` rounds out of every N.
    #[arg(long, value_name = "N", requires = "stall_for")]
    pub stall_every: Option<u64>,
    /// Rounds per `--stall-every` period the consumer is not ready.
    #[arg(long, value_name = "M", requires = "stall_every")]
    pub stall_for: Option<u64>,
    /// Give up after this many rounds.
    #[arg(long)]
    pub max_rounds: Option<u64>,
    /// Exit non-zero if any hit or frame was dropped.
    #[arg(long)]
    pub fail_on_drop: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Stream file to decode.
    pub path: PathBuf,
    /// Print at most N records.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
