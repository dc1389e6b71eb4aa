use crate::memory::{MemoryReader, ReadError, WORD_SIZE};
use crate::{arch, BacktraceLine, DebugInfoProvider, VAddr, Word};
use core::iter::FusedIterator;
use log::trace;

/// Number of argument words printed for every frame, whatever the real arity
/// of the function.
pub const MAX_DISPLAYED_ARGS: usize = 5;

/// Where a frame keeps its links, in words relative to the frame pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub saved_fp: isize,
    pub return_address: isize,
    /// First of the [`MAX_DISPLAYED_ARGS`] argument slots.
    pub args: isize,
}

impl FrameLayout {
    /// `[fp]` = caller's fp, `[fp + 1]` = return address, arguments above.
    /// aarch64 frame records look the same.
    pub const X86: Self = Self {
        saved_fp: 0,
        return_address: 1,
        args: 2,
    };

    /// `s0` points just past the saved `ra` and `s0`.
    pub const RISCV: Self = Self {
        saved_fp: -2,
        return_address: -1,
        args: 0,
    };

    pub const fn native() -> Self {
        if cfg!(any(target_arch = "riscv32", target_arch = "riscv64")) {
            Self::RISCV
        } else {
            Self::X86
        }
    }

    fn slot(&self, fp: VAddr, word: isize) -> VAddr {
        fp.wrapping_add_signed(word * WORD_SIZE as isize)
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::native()
    }
}

/// A read-only view of one stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub frame_pointer: VAddr,
    pub saved_fp: VAddr,
    pub return_address: VAddr,
    pub args: [Word; MAX_DISPLAYED_ARGS],
}

impl StackFrame {
    pub fn read<M: MemoryReader + ?Sized>(
        memory: &M,
        layout: FrameLayout,
        fp: VAddr,
    ) -> Result<Self, ReadError> {
        let saved_fp = memory.read_word(layout.slot(fp, layout.saved_fp))?;
        let return_address = memory.read_word(layout.slot(fp, layout.return_address))?;
        let mut args = [0; MAX_DISPLAYED_ARGS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = memory.read_word(layout.slot(fp, layout.args + i as isize))?;
        }
        Ok(Self {
            frame_pointer: fp,
            saved_fp,
            return_address,
            args,
        })
    }

    /// The outermost frame has no caller.
    pub fn is_root(&self) -> bool {
        self.saved_fp == 0
    }
}

pub struct FramePointTracer<M, P> {
    memory: M,
    provider: P,
    layout: FrameLayout,
}

impl<M: MemoryReader, P: DebugInfoProvider> FramePointTracer<M, P> {
    pub fn new(memory: M, provider: P) -> Self {
        Self {
            memory,
            provider,
            layout: FrameLayout::native(),
        }
    }

    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Walk the frame chain starting at `fp`, callee first. The frame whose
    /// saved frame pointer is zero is the last one yielded.
    pub fn walk(&self, fp: VAddr) -> Walk<'_, M, P> {
        Walk {
            fp: Some(fp),
            tracer: self,
        }
    }

    /// Walk the stack of the caller.
    #[inline(always)]
    pub fn backtrace(&self) -> Walk<'_, M, P> {
        self.walk(arch::fp())
    }
}

pub struct Walk<'a, M, P> {
    fp: Option<VAddr>,
    tracer: &'a FramePointTracer<M, P>,
}

impl<'a, M: MemoryReader, P: DebugInfoProvider> Iterator for Walk<'a, M, P> {
    type Item = Result<BacktraceLine<'a>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let fp = self.fp.take()?;
        let frame = match StackFrame::read(&self.tracer.memory, self.tracer.layout, fp) {
            Ok(frame) => frame,
            Err(err) => return Some(Err(err)),
        };
        if !frame.is_root() {
            self.fp = Some(frame.saved_fp);
        }
        let info = self.tracer.provider.debuginfo(frame.return_address);
        trace!(
            "fp: {:#x}, ra: {:#x}, func: {}+{:#x}",
            fp,
            frame.return_address,
            info.function_name(),
            frame.return_address.wrapping_sub(info.fn_addr)
        );
        Some(Ok(BacktraceLine::new(frame, info)))
    }
}

impl<M: MemoryReader, P: DebugInfoProvider> FusedIterator for Walk<'_, M, P> {}
