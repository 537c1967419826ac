use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("not connected to a live process")]
    NotConnected,

    // --------------------------------- launch errors ---------------------------------------------
    #[error("unsupported system: {0}")]
    PlatformUnsupported(String),
    #[error("cannot locate {0}, install it or add it to PATH")]
    ServerBinaryNotFound(&'static str),
    #[error("no available ports in range {start}..{}", range_end(.start, .size))]
    PortExhausted { start: u16, size: u16 },
    #[error("invoking {} failed: {source}", .path.display())]
    SpawnFailed { path: PathBuf, source: io::Error },

    // --------------------------------- connection errors -----------------------------------------
    #[error("connection to {host}:{port} refused after {attempts} attempts")]
    ConnectionRefused {
        host: String,
        port: u16,
        attempts: u32,
    },
    #[error("remote protocol: {0}")]
    Protocol(String),
    #[error("remote stub replied with error code {0:#04x}")]
    RemoteError(u8),
    #[error("remote stub does not support `{0}`")]
    Unsupported(&'static str),

    // --------------------------------- debugee errors --------------------------------------------
    #[error("ptrace syscall error: {0}")]
    Ptrace(nix::Error),
    #[error("waitpid syscall error: {0}")]
    Waitpid(nix::Error),
    #[error("debugee process exit with code {0}")]
    ProcessExited(i32),
    #[error("unknown register {0}")]
    RegisterNotFound(String),
    #[error("module `{0}` is not loaded")]
    UnknownModule(String),

    // --------------------------------- parsing errors --------------------------------------------
    #[error("object file parsing error: {0}")]
    ObjParsing(#[from] object::Error),
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("config: {0}")]
    Config(String),

    // --------------------------------- disasm ----------------------------------------------------
    #[error("install disassembler: {0}")]
    DisAsmInit(capstone::Error),
}

fn range_end(start: &u16, size: &u16) -> u32 {
    *start as u32 + *size as u32
}

impl Error {
    /// Return a hint to an interface - continue after error or abort the whole attach.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::NotConnected => false,
            Error::RemoteError(_) => false,
            Error::Unsupported(_) => false,
            Error::Ptrace(_) => false,
            Error::Waitpid(_) => false,
            Error::ProcessExited(_) => false,
            Error::RegisterNotFound(_) => false,
            Error::UnknownModule(_) => false,
            Error::InvalidAddress(_) => false,
            Error::Config(_) => false,
            Error::PortExhausted { .. } => false,

            // abort current attach
            Error::PlatformUnsupported(_) => true,
            Error::ServerBinaryNotFound(_) => true,
            Error::SpawnFailed { .. } => true,
            Error::ConnectionRefused { .. } => true,
            Error::Protocol(_) => true,
            Error::ObjParsing(_) => true,
            Error::DisAsmInit(_) => true,
        }
    }

    /// True if the peer is not (yet) listening.
    /// Only these errors are worth a reconnect attempt.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Error::IO(err) => err.kind() == io::ErrorKind::ConnectionRefused,
            Error::ConnectionRefused { .. } => true,
            _ => false,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: $crate::log::TARGET, "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: $crate::log::TARGET, concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
