mod resolver;

pub use resolver::DwarfResolver;

#[cfg(feature = "linker-sections")]
extern "C" {
    /// The user should define these symbols in their linker script.
    static __kernel_debug_info: u8;
    static __kernel_debug_info_end: u8;
    static __kernel_debug_abbrev: u8;
    static __kernel_debug_abbrev_end: u8;
    static __kernel_debug_line: u8;
    static __kernel_debug_line_end: u8;
    static __kernel_debug_line_str: u8;
    static __kernel_debug_line_str_end: u8;
    static __kernel_debug_str: u8;
    static __kernel_debug_str_end: u8;
    static __kernel_debug_str_offsets: u8;
    static __kernel_debug_str_offsets_end: u8;
    static __kernel_debug_addr: u8;
    static __kernel_debug_addr_end: u8;
    static __kernel_debug_ranges: u8;
    static __kernel_debug_ranges_end: u8;
    static __kernel_debug_rnglists: u8;
    static __kernel_debug_rnglists_end: u8;
}

/// The DWARF sections a [`DwarfResolver`] reads. Missing sections are empty.
///
/// DWARF 5 units keep their strings in `.debug_line_str` and
/// `.debug_str_offsets`, their addresses in `.debug_addr` and their ranges in
/// `.debug_rnglists`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DwarfSections<'a> {
    pub debug_info: &'a [u8],
    pub debug_abbrev: &'a [u8],
    pub debug_line: &'a [u8],
    pub debug_line_str: &'a [u8],
    pub debug_str: &'a [u8],
    pub debug_str_offsets: &'a [u8],
    pub debug_addr: &'a [u8],
    pub debug_ranges: &'a [u8],
    pub debug_rnglists: &'a [u8],
}

impl<'a> DwarfSections<'a> {
    fn get(&self, id: gimli::SectionId) -> &'a [u8] {
        match id {
            gimli::SectionId::DebugInfo => self.debug_info,
            gimli::SectionId::DebugAbbrev => self.debug_abbrev,
            gimli::SectionId::DebugLine => self.debug_line,
            gimli::SectionId::DebugLineStr => self.debug_line_str,
            gimli::SectionId::DebugStr => self.debug_str,
            gimli::SectionId::DebugStrOffsets => self.debug_str_offsets,
            gimli::SectionId::DebugAddr => self.debug_addr,
            gimli::SectionId::DebugRanges => self.debug_ranges,
            gimli::SectionId::DebugRngLists => self.debug_rnglists,
            _ => &[],
        }
    }
}

#[cfg(feature = "linker-sections")]
impl DwarfSections<'static> {
    /// The kernel's own debug sections, as placed by the linker script.
    ///
    /// # Safety
    ///
    /// Each `__kernel_debug_*` / `__kernel_debug_*_end` pair must delimit a
    /// mapped, immutable section.
    pub unsafe fn from_linker_symbols() -> Self {
        use core::ptr::addr_of;
        use core::slice;

        unsafe fn section(start: *const u8, end: *const u8) -> &'static [u8] {
            slice::from_raw_parts(start, end as usize - start as usize)
        }

        Self {
            debug_info: section(
                addr_of!(__kernel_debug_info),
                addr_of!(__kernel_debug_info_end),
            ),
            debug_abbrev: section(
                addr_of!(__kernel_debug_abbrev),
                addr_of!(__kernel_debug_abbrev_end),
            ),
            debug_line: section(
                addr_of!(__kernel_debug_line),
                addr_of!(__kernel_debug_line_end),
            ),
            debug_line_str: section(
                addr_of!(__kernel_debug_line_str),
                addr_of!(__kernel_debug_line_str_end),
            ),
            debug_str: section(
                addr_of!(__kernel_debug_str),
                addr_of!(__kernel_debug_str_end),
            ),
            debug_str_offsets: section(
                addr_of!(__kernel_debug_str_offsets),
                addr_of!(__kernel_debug_str_offsets_end),
            ),
            debug_addr: section(
                addr_of!(__kernel_debug_addr),
                addr_of!(__kernel_debug_addr_end),
            ),
            debug_ranges: section(
                addr_of!(__kernel_debug_ranges),
                addr_of!(__kernel_debug_ranges_end),
            ),
            debug_rnglists: section(
                addr_of!(__kernel_debug_rnglists),
                addr_of!(__kernel_debug_rnglists_end),
            ),
        }
    }
}
