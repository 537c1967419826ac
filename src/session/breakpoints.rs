use std::collections::BTreeSet;

/// Read-only breakpoint query used while rendering.
pub trait BreakpointLookup {
    /// True if an active breakpoint exists at live address `addr`.
    fn contains_absolute(&self, addr: u64) -> bool;
}

/// Live addresses of user breakpoints.
#[derive(Default, Debug, Clone)]
pub struct BreakpointSet {
    addresses: BTreeSet<u64>,
}

impl BreakpointSet {
    /// Return `false` if breakpoint already exists.
    pub fn insert(&mut self, addr: u64) -> bool {
        self.addresses.insert(addr)
    }

    /// Return `false` if there was no breakpoint.
    pub fn remove(&mut self, addr: u64) -> bool {
        self.addresses.remove(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.addresses.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn clear(&mut self) {
        self.addresses.clear()
    }
}

impl BreakpointLookup for BreakpointSet {
    fn contains_absolute(&self, addr: u64) -> bool {
        self.addresses.contains(&addr)
    }
}

impl<const N: usize> From<[u64; N]> for BreakpointSet {
    fn from(addresses: [u64; N]) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }
}
