//! Debug adapter acquisition: backend choice, debug server spawn and connection.

pub mod connect;
pub mod platform;
pub mod port;

use crate::adapter::{AdapterHandle, Backend};
use crate::config::Config;
use crate::disasm::Arch;
use crate::error::Error;
use crate::launch::connect::Connector;
use crate::launch::platform::{resolve_server, Platform, ServerCommand};
use crate::launch::port::find_free_port;
use crate::{ld_info, weak_error};
use nix::unistd::{setpgid, Pid};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

const LOCALHOST: &str = "localhost";

/// Starts a debugee under the backend suitable for the current platform.
pub struct Launcher {
    platform: Platform,
    backend: Option<Backend>,
    arch: Arch,
    port_range: (u16, u16),
    connector_retry: (u32, Duration),
    debugserver_fallback: PathBuf,
}

impl Launcher {
    pub fn new(config: &Config) -> Self {
        Self {
            platform: Platform::current(),
            backend: config.launch.backend,
            arch: config.disasm.arch,
            port_range: (
                config.launch.port_range_start,
                config.launch.port_range_size,
            ),
            connector_retry: (config.launch.connect_attempts, config.connect_backoff()),
            debugserver_fallback: config.launch.debugserver_fallback.clone(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Backend chosen for launch, configured one wins over the platform default.
    pub fn backend(&self) -> Result<Backend, Error> {
        match self.backend {
            Some(backend) => Ok(backend),
            None => self.platform.default_backend(),
        }
    }

    /// Connector of the chosen backend, configured with launch retry policy.
    pub fn connector(&self) -> Result<Connector, Error> {
        let (attempts, backoff) = self.connector_retry;
        Ok(Connector::new(self.backend()?, self.arch).with_retry(attempts, backoff))
    }

    /// Start `target` and return a connected adapter.
    pub fn launch(&self, target: &Path) -> Result<AdapterHandle, Error> {
        let backend = self.backend()?;
        if backend == Backend::Native {
            return self.launch_native(target);
        }

        let server = resolve_server(backend, &self.debugserver_fallback)?;
        let (start, size) = self.port_range;
        let port = find_free_port(start, size).ok_or(Error::PortExhausted { start, size })?;

        let mut child = spawn_detached(&server, port, target)?;
        ld_info!(
            "{} started with pid {}, listening at {LOCALHOST}:{port}",
            server.program.display(),
            child.id()
        );

        match self.connector()?.connect(LOCALHOST, port) {
            Ok(handle) => Ok(handle.with_server(child)),
            Err(e) => {
                weak_error!(child.kill(), "kill debug server:");
                weak_error!(child.wait(), "wait debug server:");
                Err(e)
            }
        }
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    fn launch_native(&self, target: &Path) -> Result<AdapterHandle, Error> {
        let adapter = crate::adapter::native::NativeAdapter::exec(target)?;
        Ok(AdapterHandle::new(Box::new(adapter), Backend::Native))
    }

    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    fn launch_native(&self, _target: &Path) -> Result<AdapterHandle, Error> {
        Err(Error::PlatformUnsupported(format!(
            "native backend on {}",
            self.platform
        )))
    }
}

/// Spawn debug server in its own process group, so terminal signals of the
/// launcher (like ctrl+c) are not delivered to it.
fn spawn_detached(server: &ServerCommand, port: u16, target: &Path) -> Result<Child, Error> {
    let mut cmd = Command::new(&server.program);
    cmd.args(server.args(LOCALHOST, port, target))
        .stdin(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
            Ok(())
        });
    }
    cmd.spawn().map_err(|source| Error::SpawnFailed {
        path: server.program.clone(),
        source,
    })
}
