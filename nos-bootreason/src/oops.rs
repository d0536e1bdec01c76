//! Faulting PC/LR capture
//!
//! The fault path arms the recorder once it has decided to die; the
//! register dump then writes the two return addresses into the persistent
//! log exactly once.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// A resolved code address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'a> {
    pub name: &'a str,
    pub offset: u64,
    pub size: u64,
    pub module: Option<&'a str>,
}

impl fmt::Display for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x}/{:#x}", self.name, self.offset, self.size)?;
        if let Some(module) = self.module {
            write!(f, " [{}]", module)?;
        }
        Ok(())
    }
}

/// Address to symbol lookup, provided by the kernel's symbol table
pub trait SymbolResolver {
    fn resolve(&self, addr: u64) -> Option<Symbol<'_>>;
}

/// Resolver that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _addr: u64) -> Option<Symbol<'_>> {
        None
    }
}

/// Static table entry: `(start, size, name)`
pub type SymbolEntry = (u64, u64, &'static str);

/// Resolver over a sorted slice of symbol ranges
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable<'a> {
    entries: &'a [SymbolEntry],
    module: Option<&'a str>,
}

impl<'a> SymbolTable<'a> {
    /// `entries` must be sorted by start address
    pub const fn new(entries: &'a [SymbolEntry]) -> Self {
        Self { entries, module: None }
    }

    pub const fn with_module(mut self, module: &'a str) -> Self {
        self.module = Some(module);
        self
    }
}

impl SymbolResolver for SymbolTable<'_> {
    fn resolve(&self, addr: u64) -> Option<Symbol<'_>> {
        let idx = self.entries.partition_point(|(start, _, _)| *start <= addr);
        let (start, size, name) = *self.entries.get(idx.checked_sub(1)?)?;
        let offset = addr - start;
        if offset >= size {
            return None;
        }
        Some(Symbol {
            name,
            offset,
            size,
            module: self.module,
        })
    }
}

/// Symbol or raw address, whichever the resolver can give
pub struct Location<'a, R: SymbolResolver + ?Sized> {
    pub addr: u64,
    pub resolver: &'a R,
}

impl<R: SymbolResolver + ?Sized> fmt::Display for Location<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolver.resolve(self.addr) {
            Some(symbol) => write!(f, "{}", symbol),
            None => write!(f, "{:#x}", self.addr),
        }
    }
}

/// Which register a fault line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultRegister {
    Pc,
    Lr,
}

impl FaultRegister {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pc => "PC",
            Self::Lr => "LR",
        }
    }
}

/// Write `"<REG> is at <location>, [<addr>]\n"` into `out`
pub fn fault_line<R: SymbolResolver + ?Sized>(
    out: &mut dyn fmt::Write,
    register: FaultRegister,
    addr: u64,
    resolver: &R,
) -> fmt::Result {
    writeln!(
        out,
        "{} is at {}, [<{:016x}>]",
        register.label(),
        Location { addr, resolver },
        addr
    )
}

/// One-shot arming flag
#[derive(Debug, Default)]
pub struct OopsRecorder {
    armed: AtomicBool,
}

impl OopsRecorder {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Consume the flag; true for exactly one caller after `arm(true)`
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}
