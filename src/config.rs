//! User configuration, loaded from `~/.config/livedis/config.toml`.

use crate::adapter::Backend;
use crate::disasm::{Arch, Syntax};
use crate::error::Error;
use crate::{ld_error, muted_error, weak_error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Debug server used on macOS when there is no `debugserver` in `PATH`.
pub const DEBUGSERVER_FALLBACK: &str = "/Library/Developer/CommandLineTools/Library/PrivateFrameworks/LLDB.framework/Versions/A/Resources/debugserver";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// First port probed for the debug server.
    pub port_range_start: u16,
    pub port_range_size: u16,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    /// Overrides the platform default backend.
    pub backend: Option<Backend>,
    pub debugserver_fallback: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port_range_start: 31337,
            port_range_size: 256,
            connect_attempts: 4,
            connect_backoff_ms: 250,
            backend: None,
            debugserver_fallback: PathBuf::from(DEBUGSERVER_FALLBACK),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisasmConfig {
    pub arch: Arch,
    pub syntax: Syntax,
    /// Instructions per raw listing.
    pub instruction_count: usize,
    pub sign_bit_fixup: bool,
}

impl Default for DisasmConfig {
    fn default() -> Self {
        Self {
            arch: Arch::host(),
            syntax: Syntax::default(),
            instruction_count: 50,
            sign_bit_fixup: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub launch: LaunchConfig,
    pub disasm: DisasmConfig,
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/livedis/config.toml";

    /// Load configuration from file. Return [`None`] on errors.
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    ld_error!("Error while load config file {}: {err}", path.display());
                    return None;
                }
            },
        };

        weak_error!(Self::from_toml(&data), "parse config:")
    }

    /// Load configuration, fall back to defaults if there is none.
    pub fn load(path: Option<&Path>) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    pub fn from_toml(data: &str) -> Result<Self, Error> {
        toml::from_str(data).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.launch.connect_backoff_ms)
    }
}
