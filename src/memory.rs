use crate::{VAddr, Word};
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use core::mem::size_of;
use core::ops::Range;

pub const WORD_SIZE: usize = size_of::<Word>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The address is not backed by readable memory.
    OutOfBounds(VAddr),
    Misaligned(VAddr),
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::OutOfBounds(addr) => write!(f, "address {:08x} is not mapped", addr),
            ReadError::Misaligned(addr) => write!(f, "address {:08x} is not word aligned", addr),
        }
    }
}

/// Word-granular read access to the memory a stack lives in.
pub trait MemoryReader {
    fn read_word(&self, addr: VAddr) -> Result<Word, ReadError>;
}

impl<T: MemoryReader + ?Sized> MemoryReader for &T {
    fn read_word(&self, addr: VAddr) -> Result<Word, ReadError> {
        (**self).read_word(addr)
    }
}

/// The live address space of the running kernel.
#[derive(Debug, Clone)]
pub struct RawMemory {
    range: Option<Range<VAddr>>,
}

impl RawMemory {
    /// # Safety
    ///
    /// Every non-null aligned address handed to [`MemoryReader::read_word`]
    /// must be mapped and readable.
    pub unsafe fn new() -> Self {
        Self { range: None }
    }

    /// Restrict reads to `range`, e.g. the bounds of the kernel stack.
    ///
    /// # Safety
    ///
    /// The whole of `range` must be mapped and readable.
    pub unsafe fn with_range(range: Range<VAddr>) -> Self {
        Self { range: Some(range) }
    }
}

impl MemoryReader for RawMemory {
    fn read_word(&self, addr: VAddr) -> Result<Word, ReadError> {
        if addr == 0 {
            return Err(ReadError::OutOfBounds(addr));
        }
        if addr % WORD_SIZE != 0 {
            return Err(ReadError::Misaligned(addr));
        }
        if let Some(range) = &self.range {
            if addr < range.start || addr.saturating_add(WORD_SIZE) > range.end {
                return Err(ReadError::OutOfBounds(addr));
            }
        }
        // Safety: guaranteed by the constructor's contract.
        Ok(unsafe { (addr as *const Word).read_volatile() })
    }
}

/// A copy of stack memory that starts at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackImage {
    base: VAddr,
    words: Vec<Word>,
}

impl StackImage {
    pub fn new(base: VAddr, words: Vec<Word>) -> Self {
        Self { base, words }
    }

    pub fn base(&self) -> VAddr {
        self.base
    }

    /// Address of the `index`th word of the image.
    pub fn addr(&self, index: usize) -> VAddr {
        self.base + index * WORD_SIZE
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [Word] {
        &mut self.words
    }
}

impl MemoryReader for StackImage {
    fn read_word(&self, addr: VAddr) -> Result<Word, ReadError> {
        let offset = addr
            .checked_sub(self.base)
            .ok_or(ReadError::OutOfBounds(addr))?;
        if offset % WORD_SIZE != 0 {
            return Err(ReadError::Misaligned(addr));
        }
        self.words
            .get(offset / WORD_SIZE)
            .copied()
            .ok_or(ReadError::OutOfBounds(addr))
    }
}
