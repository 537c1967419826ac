use crate::disasm::token::{tokenize, Token};
use crate::disasm::{Arch, Syntax};
use crate::error::Error;
use capstone::prelude::*;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Text shown in place of bytes that are not a valid instruction.
pub const PLACEHOLDER: &str = "??";

/// Single decoded instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub tokens: Vec<Token>,
    pub text: String,
    /// Instruction length in bytes, never zero.
    pub length: usize,
}

/// Line of a [`Decoder::decode_block`] listing.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockLine {
    pub address: u64,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl Display for BlockLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:016X}: {:<16} {}",
            self.address,
            hex::encode(&self.bytes),
            self.text
        )
    }
}

/// Join block lines into a multi-line listing.
pub fn listing(lines: &[BlockLine]) -> String {
    lines.iter().join("\n")
}

/// Architecture specific instruction decoder.
pub struct Decoder {
    cs: Capstone,
    arch: Arch,
}

impl Decoder {
    /// Create a new [`Decoder`].
    pub fn new(arch: Arch, syntax: Syntax) -> Result<Self, Error> {
        let x86_syntax = match syntax {
            Syntax::Intel => arch::x86::ArchSyntax::Intel,
            Syntax::Att => arch::x86::ArchSyntax::Att,
        };
        let cs = match arch {
            Arch::X86_64 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .syntax(x86_syntax)
                .build(),
            Arch::X86 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .syntax(x86_syntax)
                .build(),
            Arch::Aarch64 => Capstone::new()
                .arm64()
                .mode(arch::arm64::ArchMode::Arm)
                .build(),
            Arch::Arm => Capstone::new()
                .arm()
                .mode(arch::arm::ArchMode::Arm)
                .build(),
        }
        .map_err(Error::DisAsmInit)?;

        Ok(Self { cs, arch })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Decode a single instruction at the start of `bytes`.
    /// Return [`None`] if bytes do not form a complete instruction.
    pub fn decode_one(&self, bytes: &[u8], addr: u64) -> Option<Decoded> {
        if bytes.is_empty() {
            return None;
        }
        let insns = self.cs.disasm_count(bytes, addr, 1).ok()?;
        let insn = insns.iter().next()?;
        let length = insn.bytes().len();
        if length == 0 {
            return None;
        }

        let mnemonic = insn.mnemonic().unwrap_or_default();
        let operands = insn.op_str().unwrap_or_default();
        let text = if operands.is_empty() {
            mnemonic.to_string()
        } else {
            format!("{mnemonic} {operands}")
        };
        let decoded = Decoded {
            tokens: tokenize(mnemonic, operands, self.arch.address_size()),
            text,
            length,
        };
        Some(decoded)
    }

    /// Stand-in for an undecodable instruction, one alignment unit long (at least one byte).
    pub fn placeholder(&self) -> Decoded {
        Decoded {
            tokens: vec![Token::text(PLACEHOLDER)],
            text: PLACEHOLDER.to_string(),
            length: self.arch.alignment().max(1),
        }
    }

    /// Decode whole buffer. Undecodable bytes become placeholder lines,
    /// so every byte of `bytes` belongs to exactly one line.
    pub fn decode_block(&self, bytes: &[u8], addr: u64) -> Vec<BlockLine> {
        let mut lines = vec![];
        let mut offset = 0;
        while offset < bytes.len() {
            let rest = &bytes[offset..];
            let line_addr = addr.wrapping_add(offset as u64);
            let decoded = self
                .decode_one(rest, line_addr)
                .unwrap_or_else(|| self.placeholder());
            let length = decoded.length.min(rest.len());

            lines.push(BlockLine {
                address: line_addr,
                bytes: rest[..length].to_vec(),
                text: decoded.text,
            });
            offset += length;
        }
        lines
    }
}

#[cfg(test)]
mod test {
    use super::{listing, Decoder, PLACEHOLDER};
    use crate::disasm::{Arch, Syntax};

    fn x86_64() -> Decoder {
        Decoder::new(Arch::X86_64, Syntax::Intel).unwrap()
    }

    #[test]
    fn test_decode_one() {
        let decoder = x86_64();
        let ret = decoder.decode_one(&[0xc3], 0x1000).unwrap();
        assert_eq!(ret.text, "ret");
        assert_eq!(ret.length, 1);

        let mov = decoder
            .decode_one(&[0x48, 0x89, 0xe5, 0x90], 0x1000)
            .unwrap();
        assert_eq!(mov.text, "mov rbp, rsp");
        assert_eq!(mov.length, 3);

        assert!(decoder.decode_one(&[], 0x1000).is_none());
        // `add [rax], al` needs two bytes
        assert!(decoder.decode_one(&[0x00], 0x1000).is_none());
    }

    #[test]
    fn test_single_undecodable_byte() {
        let decoder = x86_64();
        let lines = decoder.decode_block(&[0x00], 0x1000);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, PLACEHOLDER);
        assert_eq!(lines[0].bytes, vec![0x00]);
    }

    #[test]
    fn test_block_consumes_whole_buffer() {
        struct TestCase {
            arch: Arch,
            bytes: Vec<u8>,
        }

        let cases = [
            TestCase {
                arch: Arch::X86_64,
                bytes: vec![0x55, 0x48, 0x89, 0xe5, 0x90, 0xc3],
            },
            TestCase {
                arch: Arch::X86_64,
                bytes: vec![0x0f; 7],
            },
            TestCase {
                arch: Arch::X86_64,
                bytes: vec![0x48, 0x89],
            },
            TestCase {
                arch: Arch::Aarch64,
                bytes: vec![0xff, 0xff, 0xff, 0xff, 0x1f, 0x20, 0x03, 0xd5, 0xaa],
            },
        ];

        for tc in cases {
            let decoder = Decoder::new(tc.arch, Syntax::Intel).unwrap();
            let lines = decoder.decode_block(&tc.bytes, 0x4000);
            let consumed: usize = lines.iter().map(|l| l.bytes.len()).sum();
            assert_eq!(consumed, tc.bytes.len());
            assert!(lines.iter().all(|l| !l.bytes.is_empty()));

            let mut expected_addr = 0x4000;
            for line in &lines {
                assert_eq!(line.address, expected_addr);
                expected_addr += line.bytes.len() as u64;
            }
        }
    }

    #[test]
    fn test_listing_format() {
        let decoder = x86_64();
        let lines = decoder.decode_block(&[0x90, 0xc3], 0x401000);
        assert_eq!(
            listing(&lines),
            "0000000000401000: 90               nop\n0000000000401001: c3               ret"
        );
    }
}
