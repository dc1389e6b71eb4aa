use crate::{DebugInfo, DebugInfoProvider, VAddr};
use alloc::vec::Vec;
use log::debug;

/// A function symbol covering `start..end`.
///
/// `name` may carry a type suffix after a `:` (`"monitor:F(0,1)"`), which is
/// not part of the reported name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'a> {
    pub start: VAddr,
    pub end: VAddr,
    pub name: &'a str,
    pub file: &'a str,
    /// Line of the function's declaration.
    pub line: u32,
}

/// First address generated for a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub addr: VAddr,
    pub line: u32,
}

/// A static symbol table, searched by address.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable<'a> {
    symbols: Vec<Symbol<'a>>,
    lines: Vec<LineEntry>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(mut symbols: Vec<Symbol<'a>>, mut lines: Vec<LineEntry>) -> Self {
        symbols.sort_unstable_by_key(|s| s.start);
        lines.sort_unstable_by_key(|l| l.addr);
        Self { symbols, lines }
    }

    pub fn symbols(&self) -> &[Symbol<'a>] {
        &self.symbols
    }

    /// The function containing `addr`.
    pub fn function(&self, addr: VAddr) -> Option<&Symbol<'a>> {
        let idx = self.symbols.partition_point(|s| s.start <= addr);
        let symbol = self.symbols.get(idx.checked_sub(1)?)?;
        (addr < symbol.end).then_some(symbol)
    }

    fn line(&self, symbol: &Symbol<'a>, addr: VAddr) -> u32 {
        let idx = self.lines.partition_point(|l| l.addr <= addr);
        match idx.checked_sub(1).map(|i| self.lines[i]) {
            Some(entry) if entry.addr >= symbol.start => entry.line,
            _ => symbol.line,
        }
    }
}

impl DebugInfoProvider for SymbolTable<'_> {
    fn debuginfo(&self, addr: VAddr) -> DebugInfo<'_> {
        let Some(symbol) = self.function(addr) else {
            debug!("no symbol for {:#x}", addr);
            return DebugInfo::unknown(addr);
        };
        DebugInfo {
            file: symbol.file,
            line: self.line(symbol, addr),
            fn_name: symbol.name,
            fn_name_len: symbol.name.find(':').unwrap_or(symbol.name.len()),
            fn_addr: symbol.start,
        }
    }
}
