#![cfg_attr(not(test), no_std)]
//! Frame-pointer backtraces for kernels.
//!
//! [`FramePointTracer`] follows the chain of saved frame pointers, asks a
//! [`DebugInfoProvider`] about every return address and yields one
//! [`BacktraceLine`] per frame. The [`monitor`] module wires it up as the
//! `backtrace` command of a small kernel monitor.

mod arch;
#[cfg(feature = "dwarf")]
mod dwarf;
mod format;
mod fp;
mod memory;
pub mod monitor;
mod symbols;

extern crate alloc;

pub use arch::fp as current_frame_pointer;
#[cfg(feature = "dwarf")]
pub use dwarf::{DwarfResolver, DwarfSections};
pub use format::{Detail, Header};
pub use fp::{FrameLayout, FramePointTracer, StackFrame, Walk, MAX_DISPLAYED_ARGS};
pub use memory::{MemoryReader, RawMemory, ReadError, StackImage, WORD_SIZE};
pub use symbols::{LineEntry, Symbol, SymbolTable};

pub type VAddr = usize;
pub type Word = usize;

/// Debugging information about one code address.
///
/// `fn_name` is the backing string the name was found in and may run past the
/// name itself; only the first `fn_name_len` bytes belong to it. Use
/// [`DebugInfo::function_name`] rather than reading `fn_name` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugInfo<'a> {
    pub file: &'a str,
    pub line: u32,
    pub fn_name: &'a str,
    pub fn_name_len: usize,
    pub fn_addr: VAddr,
}

impl<'a> DebugInfo<'a> {
    pub const UNKNOWN: &'static str = "<unknown>";
    /// Name reported for a function that was found but carries no name.
    pub const ANONYMOUS: &'static str = "<anonymous>";

    /// The sentinel for an address outside every known function.
    pub fn unknown(addr: VAddr) -> Self {
        Self {
            file: Self::UNKNOWN,
            line: 0,
            fn_name: Self::UNKNOWN,
            fn_name_len: Self::UNKNOWN.len(),
            fn_addr: addr,
        }
    }

    /// Whether this is the [`DebugInfo::unknown`] sentinel.
    pub fn is_unknown(&self) -> bool {
        self.fn_name == Self::UNKNOWN && self.file == Self::UNKNOWN && self.line == 0
    }

    /// The first `fn_name_len` bytes of `fn_name`, never past its end.
    pub fn function_name(&self) -> &'a str {
        let mut end = self.fn_name_len.min(self.fn_name.len());
        while !self.fn_name.is_char_boundary(end) {
            end -= 1;
        }
        &self.fn_name[..end]
    }
}

/// Resolves return addresses into [`DebugInfo`].
///
/// Implementations must not fail: an address that cannot be resolved yields
/// [`DebugInfo::unknown`].
pub trait DebugInfoProvider {
    fn debuginfo(&self, addr: VAddr) -> DebugInfo<'_>;
}

impl<T: DebugInfoProvider + ?Sized> DebugInfoProvider for &T {
    fn debuginfo(&self, addr: VAddr) -> DebugInfo<'_> {
        (**self).debuginfo(addr)
    }
}

/// A provider with no symbols at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDebugInfo;

impl DebugInfoProvider for NoDebugInfo {
    fn debuginfo(&self, addr: VAddr) -> DebugInfo<'_> {
        DebugInfo::unknown(addr)
    }
}

/// One frame of a backtrace: the raw frame plus what is known about its
/// return address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceLine<'a> {
    pub frame: StackFrame,
    pub info: DebugInfo<'a>,
    /// `return_address - fn_addr`. Negative only if the provider reported a
    /// function starting after the return address.
    pub offset: isize,
}

impl<'a> BacktraceLine<'a> {
    pub fn new(frame: StackFrame, info: DebugInfo<'a>) -> Self {
        let offset = (frame.return_address as isize).wrapping_sub(info.fn_addr as isize);
        Self {
            frame,
            info,
            offset,
        }
    }
}
