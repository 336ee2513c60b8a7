// Commandline argument parser using clap for the ghosts binary

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GhostArgs {
    #[command(subcommand, long_about)]
    /// Which flow to run: hosting a new anchor, or resolving stored ones
    pub command: CommandTask,

    /// Config file in RON format. Defaults are used for anything it omits
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// File holding the anchors hosted so far
    #[arg(short = 'p', long = "prefs", global = true, default_value = "anchors.ron")]
    pub prefs: PathBuf,

    /// Seed for the simulated AR session, for reproducible runs
    #[arg(long = "seed", global = true)]
    pub seed: Option<u64>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Place an anchor, map it from all sides and host it
    #[command(about)]
    Host(HostCommand),

    /// Resolve previously hosted anchors
    #[command(about)]
    Resolve(ResolveCommand),

    /// List the stored anchors that can still be resolved
    #[command(about)]
    List,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct HostCommand {
    /// Nickname saved with the hosted anchor
    #[arg(short = 'n', long = "name", default_value = "Ghost")]
    pub name: String,

    /// Stop after this many frames
    #[arg(short = 'f', long = "frames", default_value_t = 3000)]
    pub frames: u64,

    /// Log progress instead of drawing the terminal ui
    #[arg(long)]
    pub headless: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ResolveCommand {
    /// Comma separated anchor ids, as typed in the resolve dialog
    #[arg(short = 'i', long = "ids")]
    pub ids: Option<String>,

    /// Pick the anchors from the stored list
    #[arg(long)]
    pub pick: bool,

    /// Stop after this many frames
    #[arg(short = 'f', long = "frames", default_value_t = 600)]
    pub frames: u64,

    /// Log progress instead of drawing the terminal ui
    #[arg(long)]
    pub headless: bool,
}
