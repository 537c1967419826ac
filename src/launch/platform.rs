//! Per platform choice of the debugging backend and its server executable.

use crate::adapter::Backend;
use crate::error::Error;
use crate::ld_debug;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const GDBSERVER: &str = "gdbserver";
const DEBUGSERVER: &str = "debugserver";

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Backend used when configuration does not name one.
    pub fn default_backend(&self) -> Result<Backend, Error> {
        match self {
            Platform::Windows => Ok(Backend::Native),
            Platform::MacOs => Ok(Backend::Lldb),
            Platform::Linux => Ok(Backend::Gdb),
            Platform::Other(os) => Err(Error::PlatformUnsupported(os.clone())),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => f.write_str("windows"),
            Platform::MacOs => f.write_str("macos"),
            Platform::Linux => f.write_str("linux"),
            Platform::Other(os) => f.write_str(os),
        }
    }
}

/// Debug server executable with the command line convention of its backend.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerCommand {
    pub backend: Backend,
    pub program: PathBuf,
}

impl ServerCommand {
    /// Arguments that make the server listen at `host:port` and start `target`.
    pub fn args(&self, host: &str, port: u16, target: &Path) -> Vec<String> {
        let listen = format!("{host}:{port}");
        let target = target.to_string_lossy().into_owned();
        match self.backend {
            Backend::Gdb => vec![
                "--once".to_string(),
                "--no-startup-with-shell".to_string(),
                listen,
                target,
            ],
            Backend::Lldb | Backend::Native => vec![listen, target],
        }
    }
}

/// Locate the server executable of a remote backend.
/// `debugserver` is looked up in `PATH` first, then at `fallback`.
pub fn resolve_server(backend: Backend, fallback: &Path) -> Result<ServerCommand, Error> {
    let name = match backend {
        Backend::Gdb => GDBSERVER,
        Backend::Lldb => DEBUGSERVER,
        Backend::Native => return Err(Error::Unsupported("debug server for native backend")),
    };

    let program = match which::which(name) {
        Ok(path) => path,
        Err(e) => {
            ld_debug!("{name} not found in PATH: {e}");
            match backend {
                Backend::Lldb if fallback.is_file() => fallback.to_path_buf(),
                _ => return Err(Error::ServerBinaryNotFound(name)),
            }
        }
    };
    Ok(ServerCommand { backend, program })
}
