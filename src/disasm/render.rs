//! Linear listing of code that is not backed by the static image.

use crate::disasm::decoder::Decoder;
use crate::disasm::token::Token;
use crate::session::breakpoints::BreakpointLookup;
use crate::session::DebugState;
use crate::weak_error;
use itertools::Itertools;

/// Header line of every raw listing.
pub const BANNER: &str = "(Code not backed by loaded file, showing only raw disassembly)";
pub const BREAKPOINT_GLYPH: &str = "●";

const GLYPH_WIDTH: usize = 5;
const PC_MARKER: &str = " ==> ";
const BLANK_LEAD: &str = "     ";
const ADDRESS_GAP: &str = "  ";
const SIGN_BIT_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Highlight {
    None,
    ProgramCounter,
    Breakpoint,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineKind {
    Banner,
    Code,
}

/// One line of a raw listing.
#[derive(Clone, Debug, PartialEq)]
pub struct DisassemblyLine {
    pub kind: LineKind,
    /// Instruction address, [`None`] for the banner.
    pub address: Option<u64>,
    pub tokens: Vec<Token>,
    pub highlight: Highlight,
}

impl DisassemblyLine {
    fn banner() -> Self {
        Self {
            kind: LineKind::Banner,
            address: None,
            tokens: vec![Token::text(BANNER)],
            highlight: Highlight::None,
        }
    }

    /// Line text as displayed, tokens concatenated.
    pub fn text(&self) -> String {
        self.tokens.iter().join("")
    }
}

/// Builds raw listings starting at an arbitrary live address.
pub struct Renderer {
    decoder: Decoder,
    sign_bit_fixup: bool,
}

impl Renderer {
    pub fn new(decoder: Decoder) -> Self {
        Self {
            decoder,
            sign_bit_fixup: false,
        }
    }

    /// Clear bit 63 of a trailing 8-byte value on every line.
    pub fn with_sign_bit_fixup(mut self, enabled: bool) -> Self {
        self.sign_bit_fixup = enabled;
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Render `count` instructions starting at live address `start`.
    /// Unreadable memory is rendered as placeholders.
    pub fn render(
        &self,
        state: &mut dyn DebugState,
        start: u64,
        count: usize,
    ) -> Vec<DisassemblyLine> {
        let pc = state.ip();
        let read_len = count * self.decoder.arch().max_instruction_length();
        let data = weak_error!(
            state.memory().read(start, read_len),
            "read raw disassembly memory:"
        )
        .unwrap_or_default();
        self.render_bytes(&data, start, count, pc, state.breakpoints())
    }

    /// Render `count` instructions of `data`, which is located at live address `start`.
    pub fn render_bytes(
        &self,
        data: &[u8],
        start: u64,
        count: usize,
        pc: Option<u64>,
        breakpoints: &dyn BreakpointLookup,
    ) -> Vec<DisassemblyLine> {
        let mut lines = Vec::with_capacity(count + 1);
        lines.push(DisassemblyLine::banner());

        let mut total_read = 0;
        for _ in 0..count {
            let line_addr = start.wrapping_add(total_read as u64);
            let rest = data.get(total_read..).unwrap_or_default();
            let insn = self
                .decoder
                .decode_one(rest, line_addr)
                .unwrap_or_else(|| self.decoder.placeholder());

            let is_pc = pc == Some(line_addr);
            let is_bp = breakpoints.contains_absolute(line_addr);
            let (lead, highlight) = match (is_pc, is_bp) {
                (true, true) => (
                    Token::tag(format!("{BREAKPOINT_GLYPH}>"), GLYPH_WIDTH),
                    Highlight::Breakpoint,
                ),
                (true, false) => (Token::text(PC_MARKER), Highlight::ProgramCounter),
                (false, true) => (
                    Token::tag(BREAKPOINT_GLYPH, GLYPH_WIDTH),
                    Highlight::Breakpoint,
                ),
                (false, false) => (Token::text(BLANK_LEAD), Highlight::None),
            };

            let mut tokens = vec![
                lead,
                Token::address_display(line_addr),
                Token::text(ADDRESS_GAP),
            ];
            tokens.extend(insn.tokens);

            lines.push(DisassemblyLine {
                kind: LineKind::Code,
                address: Some(line_addr),
                tokens,
                highlight,
            });
            total_read += insn.length;
        }

        if self.sign_bit_fixup {
            lines.iter_mut().for_each(fix_sign_bit);
        }
        lines
    }
}

fn fix_sign_bit(line: &mut DisassemblyLine) {
    if let Some(last) = line.tokens.last_mut() {
        if last.size == 8 {
            last.value &= SIGN_BIT_MASK;
        }
    }
}
