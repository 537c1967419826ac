use crate::address::ModuleOffset;
use crate::nav::state::Mode;

/// Code location of a history entry.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryPayload {
    /// Static image address shown by the symbolic view.
    Code(u64),
    /// Raw location, stored relative to its module so it survives a rebase.
    Raw(ModuleOffset),
    /// Raw location outside of any module (heap, JIT code). Valid for the current run only.
    Live(u64),
}

/// Snapshot of a navigation position.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// Memory pane position.
    pub memory_address: u64,
    pub payload: HistoryPayload,
}

impl HistoryEntry {
    pub fn mode(&self) -> Mode {
        match self.payload {
            HistoryPayload::Code(_) => Mode::Symbolicated,
            HistoryPayload::Raw(_) | HistoryPayload::Live(_) => Mode::Raw,
        }
    }
}

/// Back and forward stacks of navigation positions.
#[derive(Default, Debug)]
pub struct NavigationHistory {
    back: Vec<HistoryEntry>,
    forward: Vec<HistoryEntry>,
}

impl NavigationHistory {
    /// Remember a position left by a user navigation, forward history is dropped.
    pub fn record(&mut self, entry: Option<HistoryEntry>) {
        if let Some(entry) = entry {
            self.back.push(entry);
            self.forward.clear();
        }
    }

    pub fn pop_back(&mut self) -> Option<HistoryEntry> {
        self.back.pop()
    }

    pub fn pop_forward(&mut self) -> Option<HistoryEntry> {
        self.forward.pop()
    }

    pub fn push_back(&mut self, entry: HistoryEntry) {
        self.back.push(entry);
    }

    pub fn push_forward(&mut self, entry: HistoryEntry) {
        self.forward.push(entry);
    }

    pub fn back_len(&self) -> usize {
        self.back.len()
    }

    pub fn forward_len(&self) -> usize {
        self.forward.len()
    }
}
