use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Upper bound for `--mb`; the read buffer is allocated up front.
pub const MAX_CHUNK_MB: i64 = 1024;

/// Measure data bandwidth through a file, socket, port or stdin.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// File to read from
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Unix socket to read from
    #[arg(short, long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// TCP port to accept a single connection on and read from
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind when reading from a port
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Read up to this many MiB at a time (0 means 1)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(0..=MAX_CHUNK_MB))]
    pub mb: u16,
}

impl Cli {
    pub fn chunk_size(&self) -> usize {
        usize::from(self.mb.max(1)) * 1024 * 1024
    }
}
