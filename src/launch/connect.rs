use crate::adapter::{AdapterHandle, Backend};
use crate::disasm::Arch;
use crate::error::Error;
use crate::{ld_debug, ld_info};
use std::thread;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 4;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);

/// Connects a remote backend to a stub that may not listen yet.
#[derive(Clone, Debug)]
pub struct Connector {
    backend: Backend,
    arch: Arch,
    attempts: u32,
    backoff: Duration,
}

impl Connector {
    pub fn new(backend: Backend, arch: Arch) -> Self {
        Self {
            backend,
            arch,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Connect to `host:port`. Only refused connections are retried, other errors return at once.
    pub fn connect(&self, host: &str, port: u16) -> Result<AdapterHandle, Error> {
        for attempt in 1..=self.attempts {
            match self.backend.connect(host, port, self.arch) {
                Ok(adapter) => {
                    ld_info!("connected to {host}:{port} with {} backend", self.backend);
                    return Ok(AdapterHandle::new(adapter, self.backend));
                }
                Err(e) if e.is_connection_refused() => {
                    ld_debug!("attempt {attempt}/{}: {host}:{port} refused", self.attempts);
                    if attempt < self.attempts {
                        thread::sleep(self.backoff);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConnectionRefused {
            host: host.to_string(),
            port,
            attempts: self.attempts,
        })
    }
}
