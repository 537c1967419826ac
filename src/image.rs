//! Statically loaded binary image.

use crate::error::Error;
use memmap2::Mmap;
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Function known from the static image.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl Function {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Read-only view of the analyzed binary.
pub trait StaticImage {
    /// True if the image has file bytes at `addr`.
    fn contains_bytes(&self, addr: u64) -> bool;

    /// Known function covering `addr`.
    fn function_containing(&self, addr: u64) -> Option<&Function>;

    /// Lowest address of the image.
    fn base(&self) -> u64;

    /// Size of the image address range.
    fn size(&self) -> u64;
}

/// Object file (ELF, Mach-O or PE) parsed once into address ranges and function symbols.
#[derive(Debug, Clone)]
pub struct ObjectImage {
    path: PathBuf,
    base: u64,
    size: u64,
    sections: Vec<Range<u64>>,
    /// Sorted by start address.
    functions: Vec<Function>,
}

impl ObjectImage {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let object = object::File::parse(&*mmap)?;

        // zero fill segments (Mach-O `__PAGEZERO`) are never mapped from the file
        let (base, end) = object
            .segments()
            .filter(|s| s.size() > 0 && s.file_range().1 > 0)
            .fold((u64::MAX, 0), |(lo, hi), s| {
                (lo.min(s.address()), hi.max(s.address() + s.size()))
            });
        let base = if end == 0 { 0 } else { base };

        let sections = object
            .sections()
            .filter(|s| s.address() != 0 && s.file_range().is_some())
            .map(|s| s.address()..s.address() + s.size())
            .collect();

        let mut functions: Vec<Function> = object
            .symbols()
            .chain(object.dynamic_symbols())
            .filter(|s| s.kind() == SymbolKind::Text && s.is_definition() && s.size() > 0)
            .filter_map(|s| {
                let name = s.name().ok()?;
                Some(Function {
                    name: rustc_demangle::demangle(name).to_string(),
                    start: s.address(),
                    end: s.address() + s.size(),
                })
            })
            .collect();
        functions.sort_by_key(|f| f.start);
        functions.dedup_by_key(|f| f.start);

        Ok(Self::new(path, base, end.saturating_sub(base), sections, functions))
    }

    pub fn new(
        path: impl Into<PathBuf>,
        base: u64,
        size: u64,
        sections: Vec<Range<u64>>,
        mut functions: Vec<Function>,
    ) -> Self {
        functions.sort_by_key(|f| f.start);
        Self {
            path: path.into(),
            base,
            size,
            sections,
            functions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
}

impl StaticImage for ObjectImage {
    fn contains_bytes(&self, addr: u64) -> bool {
        self.sections.iter().any(|r| r.contains(&addr))
    }

    fn function_containing(&self, addr: u64) -> Option<&Function> {
        let idx = self.functions.partition_point(|f| f.start <= addr);
        self.functions[..idx].last().filter(|f| f.contains(addr))
    }

    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        self.size
    }
}
