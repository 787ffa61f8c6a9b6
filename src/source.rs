use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::cli::Cli;

/// Where the byte stream comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Stdin,
    File(PathBuf),
    Socket(PathBuf),
    Port(SocketAddr),
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Stdin => f.write_str("stdin"),
            SourceSpec::File(p) => write!(f, "file {}", p.display()),
            SourceSpec::Socket(p) => write!(f, "unix socket {}", p.display()),
            SourceSpec::Port(addr) => write!(f, "tcp {addr}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("must only specify one of a file, socket or port (got {})", .given.join(", "))]
    ConflictingSources { given: Vec<&'static str> },
    #[error("must provide a file, unix socket, port, or pipe data to stdin")]
    MissingSource,
    #[error("port must be between 1 and 65535")]
    ZeroPort,
}

#[derive(Debug, Error)]
#[error("opening {what}")]
pub struct OpenError {
    pub what: String,
    #[source]
    pub source: io::Error,
}

impl OpenError {
    fn new(spec: &SourceSpec, source: io::Error) -> Self {
        Self { what: spec.to_string(), source }
    }
}

pub type BoxedSource = Box<dyn Read + Send>;

/// Pick exactly one source from the flags. Stdin is only accepted when it
/// is not attached to a terminal.
pub fn resolve(cli: &Cli, stdin_is_terminal: bool) -> Result<SourceSpec, ConfigError> {
    let mut given = Vec::new();
    if cli.file.is_some() {
        given.push("--file");
    }
    if cli.socket.is_some() {
        given.push("--socket");
    }
    if cli.port.is_some() {
        given.push("--port");
    }
    if given.len() > 1 {
        return Err(ConfigError::ConflictingSources { given });
    }

    if let Some(path) = &cli.file {
        return Ok(SourceSpec::File(path.clone()));
    }
    if let Some(path) = &cli.socket {
        return Ok(SourceSpec::Socket(path.clone()));
    }
    if let Some(port) = cli.port {
        if port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        return Ok(SourceSpec::Port(SocketAddr::new(cli.bind, port)));
    }
    if stdin_is_terminal {
        return Err(ConfigError::MissingSource);
    }
    Ok(SourceSpec::Stdin)
}

/// Turn a resolved source into a readable handle. For a port this blocks
/// until one peer has connected.
pub fn open(spec: &SourceSpec) -> Result<BoxedSource, OpenError> {
    let err = |e| OpenError::new(spec, e);
    match spec {
        SourceSpec::Stdin => Ok(Box::new(io::stdin())),
        SourceSpec::File(path) => Ok(Box::new(File::open(path).map_err(err)?)),
        SourceSpec::Socket(path) => open_unix(path).map_err(err),
        SourceSpec::Port(addr) => {
            let listener = TcpListener::bind(addr).map_err(err)?;
            info!(addr = %addr, "Waiting for connection");
            let (stream, peer) = listener.accept().map_err(err)?;
            info!(%peer, "Accepted connection");
            Ok(Box::new(stream))
        }
    }
}

#[cfg(unix)]
fn open_unix(path: &std::path::Path) -> io::Result<BoxedSource> {
    let stream = std::os::unix::net::UnixStream::connect(path)?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
fn open_unix(_path: &std::path::Path) -> io::Result<BoxedSource> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}
