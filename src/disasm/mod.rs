pub mod decoder;
pub mod render;
pub mod token;

use serde::Deserialize;
use strum_macros::{Display, EnumString};

/// Architectures supported by the instruction decoder.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString, Display, Deserialize)]
pub enum Arch {
    #[strum(serialize = "x86")]
    #[serde(rename = "x86")]
    X86,
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "aarch64")]
    #[serde(rename = "aarch64")]
    Aarch64,
    #[strum(serialize = "arm")]
    #[serde(rename = "arm")]
    Arm,
}

impl Arch {
    /// Architecture of the running host, [`Arch::X86_64`] for unknown ones.
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::X86,
            "aarch64" => Arch::Aarch64,
            "arm" => Arch::Arm,
            _ => Arch::X86_64,
        }
    }

    /// Longest possible encoding of a single instruction.
    pub fn max_instruction_length(self) -> usize {
        match self {
            Arch::X86 | Arch::X86_64 => 15,
            Arch::Aarch64 | Arch::Arm => 4,
        }
    }

    /// Instruction alignment in bytes.
    pub fn alignment(self) -> usize {
        match self {
            Arch::X86 | Arch::X86_64 => 1,
            Arch::Aarch64 | Arch::Arm => 4,
        }
    }

    /// Width of an address in bytes.
    pub fn address_size(self) -> usize {
        match self {
            Arch::X86 | Arch::Arm => 4,
            Arch::X86_64 | Arch::Aarch64 => 8,
        }
    }

    /// `kind` argument of remote protocol software breakpoint packets.
    pub fn breakpoint_kind(self) -> u8 {
        match self {
            Arch::X86 | Arch::X86_64 => 1,
            Arch::Aarch64 | Arch::Arm => 4,
        }
    }
}

/// Assembly syntax for x86 targets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, EnumString, Display, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    Intel,
    #[default]
    Att,
}
