use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod envinfo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transmit one command and wait for its outcome.
    Send(SendArgs),
    /// Connect to a PIM and print every received frame.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Bridge endpoint (tcp://host:port, unix://path, or a socket path).
    pub endpoint: String,
    /// UPB network id.
    #[arg(long, short = 'n')]
    pub network: u8,
    /// Destination unit id.
    #[arg(long, short = 'd', conflicts_with = "link", required_unless_present = "link")]
    pub device: Option<u8>,
    /// Destination link (group) id.
    #[arg(long, short = 'l')]
    pub link: Option<u8>,
    /// Message data as hex, MDID first (e.g. 2264 for Goto 100%).
    #[arg(long, short = 'm')]
    pub message: String,
    /// Source unit id presented on the powerline.
    #[arg(long)]
    pub source: Option<u8>,
    /// Ack wait per attempt (e.g. 500ms, 2s).
    #[arg(long, default_value = "500ms")]
    pub ack_timeout: String,
    /// Total transmit attempts.
    #[arg(long, default_value = "3")]
    pub attempts: u32,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Bridge endpoint (tcp://host:port, unix://path, or a socket path).
    pub endpoint: String,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Only print powerline data reports, not PIM control responses.
    #[arg(long)]
    pub reports_only: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
