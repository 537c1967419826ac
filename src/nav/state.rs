use crate::disasm::Arch;
use crate::image::Function;

/// Which view currently shows the code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// Code backed by the static image, shown by the host symbolic view.
    Symbolicated,
    /// Raw live bytes decoded on the fly.
    Raw,
}

/// Analysis context of a symbolicated location.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolContext {
    /// Address in static image space.
    pub address: u64,
    pub function: Option<Function>,
    pub arch: Arch,
}

/// Current navigation position.
/// Analysis data exists for the symbolicated variant only.
#[derive(Clone, Debug, PartialEq)]
pub enum NavState {
    Symbolicated(SymbolContext),
    Raw { address: u64 },
}

impl NavState {
    pub fn mode(&self) -> Mode {
        match self {
            NavState::Symbolicated(_) => Mode::Symbolicated,
            NavState::Raw { .. } => Mode::Raw,
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            NavState::Symbolicated(ctx) => ctx.address,
            NavState::Raw { address } => *address,
        }
    }

    pub fn symbol_context(&self) -> Option<&SymbolContext> {
        match self {
            NavState::Symbolicated(ctx) => Some(ctx),
            NavState::Raw { .. } => None,
        }
    }
}
