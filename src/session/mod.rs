//! Debug session: adapter handle plus everything navigation asks about the live process.

pub mod breakpoints;
pub mod modules;
pub mod registry;

use crate::adapter::{AdapterHandle, StopReason};
use crate::error::Error;
use crate::image::StaticImage;
use crate::session::breakpoints::{BreakpointLookup, BreakpointSet};
use crate::session::modules::{ModuleMap, ModuleTable};
use crate::{ld_info, muted_error, weak_error};
use std::path::Path;

/// Sole source of live debugee bytes.
pub trait MemoryView {
    fn read(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error>;

    /// True if live `addr` lies inside the loaded static image.
    fn is_local_addr(&self, addr: u64) -> bool;

    /// Translate live address into static image address space.
    fn remote_addr_to_local(&self, addr: u64) -> u64;
}

/// Everything navigation and rendering query about the debugged process.
pub trait DebugState {
    fn is_connected(&self) -> bool;

    /// Current instruction pointer, [`None`] without a stopped live process.
    fn ip(&mut self) -> Option<u64>;

    fn memory(&mut self) -> &mut dyn MemoryView;

    fn breakpoints(&self) -> &dyn BreakpointLookup;

    fn modules(&self) -> &dyn ModuleTable;
}

/// Location of the static image inside the debugee.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMapping {
    /// Module identifier of the image as reported by the module map.
    pub module: String,
    pub static_base: u64,
    pub size: u64,
}

impl ImageMapping {
    pub fn new(module: impl Into<String>, static_base: u64, size: u64) -> Self {
        Self {
            module: module.into(),
            static_base,
            size,
        }
    }

    /// Mapping of an image loaded from `path`.
    pub fn for_image(path: &Path, image: &dyn StaticImage) -> Result<Self, Error> {
        let module = path.canonicalize()?;
        Ok(Self::new(
            module.to_string_lossy(),
            image.base(),
            image.size(),
        ))
    }
}

/// Memory view backed by a debug adapter.
#[derive(Default)]
pub struct LiveMemory {
    adapter: Option<AdapterHandle>,
    image: Option<ImageMapping>,
    /// Live load base of the static image.
    live_base: Option<u64>,
}

impl LiveMemory {
    fn image_range(&self) -> Option<(u64, &ImageMapping)> {
        Some((self.live_base?, self.image.as_ref()?))
    }
}

impl MemoryView for LiveMemory {
    fn read(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, Error> {
        self.adapter
            .as_mut()
            .ok_or(Error::NotConnected)?
            .read_memory(addr, len)
    }

    fn is_local_addr(&self, addr: u64) -> bool {
        self.image_range()
            .map(|(base, image)| addr >= base && addr - base < image.size)
            .unwrap_or(false)
    }

    fn remote_addr_to_local(&self, addr: u64) -> u64 {
        match self.image_range() {
            Some((base, image)) if self.is_local_addr(addr) => addr - base + image.static_base,
            _ => addr,
        }
    }
}

/// Live debug session. Owns the adapter exclusively, the adapter is dropped on
/// disconnect or debugee exit.
#[derive(Default)]
pub struct DebugSession {
    memory: LiveMemory,
    breakpoints: BreakpointSet,
    modules: ModuleMap,
}

impl DebugSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set location of the static image, used to decide which live addresses it backs.
    pub fn with_image(mut self, image: ImageMapping) -> Self {
        self.memory.image = Some(image);
        self
    }

    /// Start working with a connected adapter.
    pub fn attach(&mut self, adapter: AdapterHandle) -> Result<(), Error> {
        ld_info!(
            "attached to {} backend, debugee pid {:?}",
            adapter.backend(),
            adapter.pid()
        );
        self.memory.adapter = Some(adapter);
        self.refresh_modules()
    }

    /// Rebuild module map, must be called whenever modules are (re)loaded.
    pub fn refresh_modules(&mut self) -> Result<(), Error> {
        let pid = self
            .memory
            .adapter
            .as_ref()
            .ok_or(Error::NotConnected)?
            .pid();
        // debugee may live in another pid namespace or on another host
        self.modules = pid
            .and_then(|pid| weak_error!(ModuleMap::from_process(pid), "read process memory maps:"))
            .unwrap_or_default();
        self.memory.live_base = self
            .memory
            .image
            .as_ref()
            .and_then(|image| muted_error!(self.modules.base_of(&image.module)))
            .map(u64::from);
        Ok(())
    }

    /// Forget the adapter, killing a still running debugee.
    pub fn disconnect(&mut self) {
        if let Some(mut adapter) = self.memory.adapter.take() {
            if adapter.last_stop().map_or(true, |s| !s.is_terminal()) {
                weak_error!(adapter.kill(), "kill debugee:");
            }
        }
        self.memory.live_base = None;
        self.modules = ModuleMap::default();
    }

    pub fn adapter_mut(&mut self) -> Result<&mut AdapterHandle, Error> {
        self.memory.adapter.as_mut().ok_or(Error::NotConnected)
    }

    pub fn module_map(&self) -> &ModuleMap {
        &self.modules
    }

    pub fn breakpoint_set(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn image(&self) -> Option<&ImageMapping> {
        self.memory.image.as_ref()
    }

    pub fn add_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        self.adapter_mut()?.set_breakpoint(addr)?;
        self.breakpoints.insert(addr);
        Ok(())
    }

    pub fn remove_breakpoint(&mut self, addr: u64) -> Result<(), Error> {
        if self.breakpoints.contains_absolute(addr) {
            self.adapter_mut()?.remove_breakpoint(addr)?;
            self.breakpoints.remove(addr);
        }
        Ok(())
    }

    /// Add breakpoint if there is none at `addr`, remove it otherwise.
    pub fn toggle_breakpoint(&mut self, addr: u64) -> Result<bool, Error> {
        if self.breakpoints.contains_absolute(addr) {
            self.remove_breakpoint(addr)?;
            Ok(false)
        } else {
            self.add_breakpoint(addr)?;
            Ok(true)
        }
    }

    pub fn cont(&mut self) -> Result<StopReason, Error> {
        let stop = self.adapter_mut()?.cont()?;
        self.after_stop(stop);
        Ok(stop)
    }

    pub fn step(&mut self) -> Result<StopReason, Error> {
        let stop = self.adapter_mut()?.step()?;
        self.after_stop(stop);
        Ok(stop)
    }

    fn after_stop(&mut self, stop: StopReason) {
        if stop.is_terminal() {
            ld_info!("debugee finished: {stop:?}");
            self.memory.adapter = None;
            self.memory.live_base = None;
            self.modules = ModuleMap::default();
            self.breakpoints.clear();
        } else {
            // shared libraries may be loaded since the last stop
            weak_error!(self.refresh_modules(), "refresh modules:");
        }
    }
}

impl DebugState for DebugSession {
    fn is_connected(&self) -> bool {
        self.memory
            .adapter
            .as_ref()
            .map(|a| a.last_stop().map_or(true, |s| !s.is_terminal()))
            .unwrap_or(false)
    }

    fn ip(&mut self) -> Option<u64> {
        let adapter = self.memory.adapter.as_mut()?;
        muted_error!(adapter.pc(), "read pc:")
    }

    fn memory(&mut self) -> &mut dyn MemoryView {
        &mut self.memory
    }

    fn breakpoints(&self) -> &dyn BreakpointLookup {
        &self.breakpoints
    }

    fn modules(&self) -> &dyn ModuleTable {
        &self.modules
    }
}
