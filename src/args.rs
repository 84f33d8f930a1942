//! Commandline argument parser using clap for mindball

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Everything given on the command line.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MindballArgs {
    #[command(subcommand)]
    /// What to do, playing the game if left out
    pub command: Option<CommandTask>,

    /// RON file with monitor settings
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Serial device of a player, once per player (at most two)
    #[arg(short = 'd', long = "device", global = true)]
    pub devices: Vec<String>,

    /// Baud rate for every device
    #[arg(short = 'b', long = "baud", global = true)]
    pub baud: Option<u32>,

    /// Play against generated signals instead of real sensors
    #[arg(long, global = true)]
    pub simulate: bool,
}

/// What the binary should do.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Run the game in the terminal
    #[command(about)]
    Play(PlayCommand),

    /// Record a device for a while and print the decoded samples
    #[command(about)]
    Capture(CaptureCommand),

    /// List the serial ports on this machine
    #[command(about)]
    Devices,
}

/// Options of `play`.
#[derive(Debug, Args, Clone, Default)]
pub struct PlayCommand {
    /// Pick the devices from a list instead of the configured ones
    #[arg(short = 'p', long = "pick")]
    pub pick: bool,
}

/// Options of `capture`.
#[derive(Debug, Args, Clone)]
pub struct CaptureCommand {
    /// How long to record, in seconds
    #[arg(short = 's', long = "seconds", default_value_t = 10.0)]
    pub seconds: f64,
}
