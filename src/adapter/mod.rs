//! Uniform access to a debugging backend.
//!
//! Exactly one backend is chosen when the session is created, after that callers use
//! the [`DebugAdapter`] interface only.

pub mod gdb;
pub mod lldb;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub mod native;
pub mod rsp;

use crate::disasm::Arch;
use crate::error::Error;
use crate::register::{Register, RegisterMap};
use crate::weak_error;
use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::process::Child;
use strum_macros::{Display, EnumString};

/// Reason of the last debugee stop.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
    /// Debugee stopped by a signal (SIGTRAP for breakpoints and steps).
    Signal(i32),
    /// Debugee exited with code.
    Exited(i32),
    /// Debugee killed by a signal.
    Terminated(i32),
}

impl StopReason {
    /// True if no process remains after this stop.
    pub fn is_terminal(self) -> bool {
        matches!(self, StopReason::Exited(_) | StopReason::Terminated(_))
    }
}

/// Capability over a concrete debugging backend.
pub trait DebugAdapter: Send {
    /// Pid of the debugee, if the backend is able to report it.
    fn pid(&self) -> Option<u32>;

    /// Read `len` bytes of debugee memory. May return less bytes if the tail is unreadable.
    fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error>;

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), Error>;

    fn registers(&mut self) -> Result<RegisterMap, Error>;

    fn read_register(&mut self, register: Register) -> Result<u64, Error> {
        self.registers()?.value(register)
    }

    fn write_register(&mut self, register: Register, value: u64) -> Result<(), Error>;

    /// Current program counter.
    fn pc(&mut self) -> Result<u64, Error> {
        self.read_register(Register::Rip)
    }

    /// Resume debugee and block until the next stop.
    fn cont(&mut self) -> Result<StopReason, Error>;

    /// Execute single instruction.
    fn step(&mut self) -> Result<StopReason, Error>;

    fn kill(&mut self) -> Result<(), Error>;

    fn set_breakpoint(&mut self, addr: u64) -> Result<(), Error>;

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Error>;

    /// Reason of the last observed stop.
    fn last_stop(&self) -> Option<StopReason>;
}

/// Debugging backend kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString, Display, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process debugger, debugee is executed directly by the adapter.
    Native,
    /// `gdbserver` remote stub.
    Gdb,
    /// lldb `debugserver` remote stub.
    Lldb,
}

impl Backend {
    /// Create an adapter connected to a remote stub listening at `host:port`.
    pub fn connect(self, host: &str, port: u16, arch: Arch) -> Result<Box<dyn DebugAdapter>, Error> {
        match self {
            Backend::Gdb => Ok(Box::new(gdb::GdbAdapter::connect(host, port, arch)?)),
            Backend::Lldb => Ok(Box::new(lldb::LldbAdapter::connect(host, port, arch)?)),
            Backend::Native => Err(Error::Unsupported("remote connection for native backend")),
        }
    }
}

/// Owned handle of a debugging backend and, if one was spawned, its debug server process.
pub struct AdapterHandle {
    adapter: Box<dyn DebugAdapter>,
    backend: Backend,
    server: Option<Child>,
}

impl AdapterHandle {
    pub fn new(adapter: Box<dyn DebugAdapter>, backend: Backend) -> Self {
        Self {
            adapter,
            backend,
            server: None,
        }
    }

    /// Take ownership of a spawned debug server.
    pub fn with_server(mut self, server: Child) -> Self {
        self.server = Some(server);
        self
    }

    /// Backend kind, for diagnostics only.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Pid of the debug server process, if any.
    pub fn server_pid(&self) -> Option<u32> {
        self.server.as_ref().map(Child::id)
    }
}

impl Deref for AdapterHandle {
    type Target = dyn DebugAdapter;

    fn deref(&self) -> &Self::Target {
        self.adapter.as_ref()
    }
}

impl DerefMut for AdapterHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.adapter.as_mut()
    }
}

impl Drop for AdapterHandle {
    fn drop(&mut self) {
        // reap the server if it already finished, never block here
        if let Some(server) = self.server.as_mut() {
            weak_error!(server.try_wait(), "debug server status:");
        }
    }
}
