use crate::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Represent address in running program.
/// Valid only for the current run of the debugee, module bases move between runs.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct LiveAddress(u64);

impl LiveAddress {
    /// Convert into an offset from a module loaded at `base`.
    /// Return [`None`] if address lies below the module base.
    pub fn relative_to(self, module: impl Into<String>, base: LiveAddress) -> Option<ModuleOffset> {
        let offset = self.0.checked_sub(base.0)?;
        Some(ModuleOffset {
            module: module.into(),
            offset,
        })
    }

    pub fn offset(self, offset: u64) -> LiveAddress {
        LiveAddress(self.0.wrapping_add(offset))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for LiveAddress {
    fn from(addr: u64) -> Self {
        LiveAddress(addr)
    }
}

impl From<usize> for LiveAddress {
    fn from(addr: usize) -> Self {
        LiveAddress(addr as u64)
    }
}

impl From<LiveAddress> for u64 {
    fn from(addr: LiveAddress) -> Self {
        addr.0
    }
}

impl Display for LiveAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl FromStr for LiveAddress {
    type Err = Error;

    /// Parse hexadecimal (with or without `0x` prefix) address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(LiveAddress)
            .map_err(|_| Error::InvalidAddress(s.to_string()))
    }
}

/// Represent address as an offset from a module load base.
/// Unlike [`LiveAddress`] stays meaningful across debugee restarts.
#[derive(Clone, Hash, PartialEq, Eq, Debug)]
pub struct ModuleOffset {
    pub module: String,
    pub offset: u64,
}

impl ModuleOffset {
    /// Resolve into a live address using current module base.
    pub fn relocate(&self, base: LiveAddress) -> LiveAddress {
        base.offset(self.offset)
    }
}

impl Display for ModuleOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{:#x}", self.module, self.offset)
    }
}
