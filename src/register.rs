use crate::error::Error;
use indexmap::IndexMap;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    #[strum(to_string = "eflags", serialize = "rflags")]
    Eflags,
    Cs,
    OrigRax,
    FsBase,
    GsBase,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,
}

impl Register {
    /// Parse register name as reported by a debug stub, [`None`] for registers outside the set.
    pub fn from_stub_name(name: &str) -> Option<Self> {
        Register::from_str(&name.to_ascii_lowercase()).ok()
    }
}

/// Register order and byte width inside an x86_64 gdbserver `g` packet.
pub const GDB_X86_64_LAYOUT: [(Register, usize); 24] = [
    (Register::Rax, 8),
    (Register::Rbx, 8),
    (Register::Rcx, 8),
    (Register::Rdx, 8),
    (Register::Rsi, 8),
    (Register::Rdi, 8),
    (Register::Rbp, 8),
    (Register::Rsp, 8),
    (Register::R8, 8),
    (Register::R9, 8),
    (Register::R10, 8),
    (Register::R11, 8),
    (Register::R12, 8),
    (Register::R13, 8),
    (Register::R14, 8),
    (Register::R15, 8),
    (Register::Rip, 8),
    (Register::Eflags, 4),
    (Register::Cs, 4),
    (Register::Ss, 4),
    (Register::Ds, 4),
    (Register::Es, 4),
    (Register::Fs, 4),
    (Register::Gs, 4),
];

/// Snapshot of debugee registers, in the order the backend reported them.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RegisterMap {
    values: IndexMap<Register, u64>,
}

impl RegisterMap {
    /// Decode little-endian register block laid out as `layout`.
    /// Trailing registers missing from a short block are left out.
    pub fn from_block(block: &[u8], layout: &[(Register, usize)]) -> Self {
        let mut map = RegisterMap::default();
        let mut offset = 0;
        for &(reg, size) in layout {
            let Some(bytes) = block.get(offset..offset + size) else {
                break;
            };
            map.update(reg, le_value(bytes));
            offset += size;
        }
        map
    }

    pub fn value(&self, register: Register) -> Result<u64, Error> {
        self.values
            .get(&register)
            .copied()
            .ok_or_else(|| Error::RegisterNotFound(register.to_string()))
    }

    pub fn update(&mut self, register: Register, value: u64) {
        self.values.insert(register, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, u64)> + '_ {
        self.values.iter().map(|(r, v)| (*r, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Interpret up to 8 little-endian bytes as an unsigned value.
pub fn le_value(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0, |acc, (i, b)| acc | (*b as u64) << (8 * i))
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod native {
    use super::{Register, RegisterMap};
    use nix::libc::user_regs_struct;

    impl From<user_regs_struct> for RegisterMap {
        fn from(value: user_regs_struct) -> Self {
            let mut map = RegisterMap::default();
            for (reg, v) in [
                (Register::Rax, value.rax),
                (Register::Rbx, value.rbx),
                (Register::Rcx, value.rcx),
                (Register::Rdx, value.rdx),
                (Register::Rdi, value.rdi),
                (Register::Rsi, value.rsi),
                (Register::Rbp, value.rbp),
                (Register::Rsp, value.rsp),
                (Register::R8, value.r8),
                (Register::R9, value.r9),
                (Register::R10, value.r10),
                (Register::R11, value.r11),
                (Register::R12, value.r12),
                (Register::R13, value.r13),
                (Register::R14, value.r14),
                (Register::R15, value.r15),
                (Register::Rip, value.rip),
                (Register::Eflags, value.eflags),
                (Register::Cs, value.cs),
                (Register::OrigRax, value.orig_rax),
                (Register::FsBase, value.fs_base),
                (Register::GsBase, value.gs_base),
                (Register::Fs, value.fs),
                (Register::Gs, value.gs),
                (Register::Ss, value.ss),
                (Register::Ds, value.ds),
                (Register::Es, value.es),
            ] {
                map.update(reg, v);
            }
            map
        }
    }

    /// Overwrite single register inside a raw ptrace register block.
    pub fn patch(regs: &mut user_regs_struct, register: Register, value: u64) {
        match register {
            Register::Rax => regs.rax = value,
            Register::Rbx => regs.rbx = value,
            Register::Rcx => regs.rcx = value,
            Register::Rdx => regs.rdx = value,
            Register::Rdi => regs.rdi = value,
            Register::Rsi => regs.rsi = value,
            Register::Rbp => regs.rbp = value,
            Register::Rsp => regs.rsp = value,
            Register::R8 => regs.r8 = value,
            Register::R9 => regs.r9 = value,
            Register::R10 => regs.r10 = value,
            Register::R11 => regs.r11 = value,
            Register::R12 => regs.r12 = value,
            Register::R13 => regs.r13 = value,
            Register::R14 => regs.r14 = value,
            Register::R15 => regs.r15 = value,
            Register::Rip => regs.rip = value,
            Register::Eflags => regs.eflags = value,
            Register::Cs => regs.cs = value,
            Register::OrigRax => regs.orig_rax = value,
            Register::FsBase => regs.fs_base = value,
            Register::GsBase => regs.gs_base = value,
            Register::Fs => regs.fs = value,
            Register::Gs => regs.gs = value,
            Register::Ss => regs.ss = value,
            Register::Ds => regs.ds = value,
            Register::Es => regs.es = value,
        }
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use native::patch as patch_user_regs;
