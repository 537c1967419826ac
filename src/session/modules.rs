use crate::address::LiveAddress;
use crate::error::Error;
use indexmap::IndexMap;

/// Mapping between module identifiers and their load addresses.
pub trait ModuleTable {
    /// Current load base of a module.
    fn load_base(&self, module: &str) -> Option<LiveAddress>;

    /// Identifier of a module containing `addr`.
    fn module_for_address(&self, addr: u64) -> Option<&str>;
}

/// Module loaded into debugee address space.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub name: String,
    pub base: LiveAddress,
    /// First address after the module.
    pub end: LiveAddress,
}

impl Module {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base.as_u64() && addr < self.end.as_u64()
    }
}

/// Modules of the current debugee run.
/// Bases are valid only until the debugee restarts, rebuild the map after each (re)load.
#[derive(Default, Debug, Clone)]
pub struct ModuleMap {
    modules: IndexMap<String, Module>,
}

impl ModuleMap {
    /// Add a mapped region to the module, extending already known bounds.
    pub fn insert(&mut self, name: impl Into<String>, start: u64, end: u64) {
        let name = name.into();
        self.modules
            .entry(name.clone())
            .and_modify(|m| {
                m.base = m.base.min(LiveAddress::from(start));
                m.end = m.end.max(LiveAddress::from(end));
            })
            .or_insert_with(|| Module {
                name,
                base: start.into(),
                end: end.into(),
            });
    }

    /// Build map from memory mappings of a running process.
    /// Only file backed mappings are taken into account.
    pub fn from_process(pid: u32) -> Result<Self, Error> {
        let maps = proc_maps::get_process_maps(pid as proc_maps::Pid)?;

        let mut modules = ModuleMap::default();
        for map in maps {
            let Some(path) = map.filename().filter(|p| p.is_absolute()) else {
                continue;
            };
            let start = map.start() as u64;
            modules.insert(path.to_string_lossy(), start, start + map.size() as u64);
        }
        Ok(modules)
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Load base of a module that must be mapped.
    pub fn base_of(&self, name: &str) -> Result<LiveAddress, Error> {
        self.load_base(name)
            .ok_or_else(|| Error::UnknownModule(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleTable for ModuleMap {
    fn load_base(&self, module: &str) -> Option<LiveAddress> {
        self.modules.get(module).map(|m| m.base)
    }

    fn module_for_address(&self, addr: u64) -> Option<&str> {
        self.modules
            .values()
            .find(|m| m.contains(addr))
            .map(|m| m.name.as_str())
    }
}
