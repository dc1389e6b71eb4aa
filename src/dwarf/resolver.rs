use super::DwarfSections;
use crate::{DebugInfo, DebugInfoProvider, VAddr};
use gimli::{
    DebuggingInformationEntry, Dwarf, EndianSlice, LineProgramHeader, LineRow, LittleEndian, Unit,
};
use log::{debug, warn};

type Slice<'a> = EndianSlice<'a, LittleEndian>;

/// Resolves addresses with the DWARF debugging information of an image.
pub struct DwarfResolver<'a> {
    dwarf: Dwarf<Slice<'a>>,
}

struct Function<'a> {
    name: &'a str,
    start: u64,
    size: u64,
}

impl<'a> DwarfResolver<'a> {
    pub fn new(sections: &DwarfSections<'a>) -> Result<Self, gimli::Error> {
        let dwarf = Dwarf::load(|id| -> Result<_, gimli::Error> {
            Ok(EndianSlice::new(sections.get(id), LittleEndian))
        })?;
        Ok(Self { dwarf })
    }

    fn lookup(&self, addr: u64) -> gimli::Result<Option<DebugInfo<'a>>> {
        let mut headers = self.dwarf.units();
        while let Some(header) = headers.next()? {
            let unit = self.dwarf.unit(header)?;
            let Some(function) = self.function(&unit, addr)? else {
                continue;
            };
            let (file, line) = match self.line(&unit, addr) {
                Ok(Some(location)) => location,
                Ok(None) => (Self::unit_file(&unit), 0),
                Err(err) => {
                    warn!("line table lookup of {:#x} failed: {:?}", addr, err);
                    (Self::unit_file(&unit), 0)
                }
            };
            return Ok(Some(DebugInfo {
                file,
                line,
                fn_name: function.name,
                fn_name_len: function.name.len(),
                fn_addr: function.start as VAddr,
            }));
        }
        Ok(None)
    }

    fn unit_file(unit: &Unit<Slice<'a>>) -> &'a str {
        unit.name
            .and_then(|name| name.to_string().ok())
            .unwrap_or(DebugInfo::UNKNOWN)
    }

    /// The innermost subprogram of `unit` containing `addr`.
    fn function(
        &self,
        unit: &Unit<Slice<'a>>,
        addr: u64,
    ) -> gimli::Result<Option<Function<'a>>> {
        let mut best: Option<Function<'a>> = None;
        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            if entry.tag() != gimli::DW_TAG_subprogram {
                continue;
            }
            let mut start = None;
            let mut size = None;
            let mut ranges = self.dwarf.die_ranges(unit, entry)?;
            while let Some(range) = ranges.next()? {
                start = Some(start.map_or(range.begin, |s: u64| s.min(range.begin)));
                if range.begin <= addr && addr < range.end {
                    size = Some(range.end - range.begin);
                }
            }
            let (Some(start), Some(size)) = (start, size) else {
                continue;
            };
            if best.as_ref().map_or(false, |f| f.size <= size) {
                continue;
            }
            let name = match self.name(unit, entry) {
                Ok(name) => name.unwrap_or(DebugInfo::ANONYMOUS),
                Err(err) => {
                    warn!("name of subprogram at {:#x} unreadable: {:?}", start, err);
                    DebugInfo::ANONYMOUS
                }
            };
            best = Some(Function { name, start, size });
        }
        Ok(best)
    }

    fn name(
        &self,
        unit: &Unit<Slice<'a>>,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> gimli::Result<Option<&'a str>> {
        for attr in [gimli::DW_AT_name, gimli::DW_AT_linkage_name] {
            if let Some(value) = entry.attr_value(attr)? {
                return Ok(Some(self.dwarf.attr_string(unit, value)?.to_string()?));
            }
        }
        Ok(None)
    }

    /// File and line of the line-table row covering `addr`.
    fn line(
        &self,
        unit: &Unit<Slice<'a>>,
        addr: u64,
    ) -> gimli::Result<Option<(&'a str, u32)>> {
        let Some(program) = unit.line_program.clone() else {
            return Ok(None);
        };
        let mut rows = program.rows();
        let mut candidate: Option<LineRow> = None;
        while let Some((header, row)) = rows.next_row()? {
            if let Some(prev) = candidate {
                if prev.address() <= addr && addr < row.address() {
                    return self.location(unit, header, &prev).map(Some);
                }
            }
            candidate = if row.end_sequence() { None } else { Some(*row) };
        }
        Ok(None)
    }

    fn location(
        &self,
        unit: &Unit<Slice<'a>>,
        header: &LineProgramHeader<Slice<'a>>,
        row: &LineRow,
    ) -> gimli::Result<(&'a str, u32)> {
        let file = match row.file(header) {
            Some(entry) => self.dwarf.attr_string(unit, entry.path_name())?.to_string()?,
            None => DebugInfo::UNKNOWN,
        };
        let line = row.line().map_or(0, |line| line.get() as u32);
        Ok((file, line))
    }
}

impl DebugInfoProvider for DwarfResolver<'_> {
    fn debuginfo(&self, addr: VAddr) -> DebugInfo<'_> {
        match self.lookup(addr as u64) {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!("no subprogram covers {:#x}", addr);
                DebugInfo::unknown(addr)
            }
            Err(err) => {
                warn!("DWARF lookup of {:#x} failed: {:?}", addr, err);
                DebugInfo::unknown(addr)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    const DW_FORM_ADDR: u8 = 0x01;
    const DW_FORM_DATA4: u8 = 0x06;
    const DW_FORM_STRING: u8 = 0x08;
    const DW_FORM_STRP: u8 = 0x0e;
    const DW_FORM_UDATA: u8 = 0x0f;
    const DW_FORM_SEC_OFFSET: u8 = 0x17;
    const DW_FORM_LINE_STRP: u8 = 0x1f;
    const DW_FORM_STRX1: u8 = 0x25;

    #[rustfmt::skip]
    fn abbrev() -> Vec<u8> {
        vec![
            // 1: compile unit with children
            1, 0x11, 1,
            0x03, DW_FORM_STRING,
            0x11, DW_FORM_ADDR,
            0x12, DW_FORM_DATA4,
            0x10, DW_FORM_SEC_OFFSET,
            0, 0,
            // 2: subprogram
            2, 0x2e, 0,
            0x03, DW_FORM_STRING,
            0x11, DW_FORM_ADDR,
            0x12, DW_FORM_DATA4,
            0, 0,
            0,
        ]
    }

    fn die(out: &mut Vec<u8>, code: u8, name: &str, low_pc: u64, size: u32) {
        out.push(code);
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&low_pc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
    }

    fn info() -> Vec<u8> {
        let mut dies = Vec::new();
        die(&mut dies, 1, "main.c", 0x1000, 0x100);
        dies.extend_from_slice(&0u32.to_le_bytes()); // stmt_list
        die(&mut dies, 2, "kern_init", 0x1000, 0x40);
        die(&mut dies, 2, "monitor", 0x1040, 0x40);
        dies.push(0);

        let mut unit = Vec::new();
        unit.extend_from_slice(&4u16.to_le_bytes());
        unit.extend_from_slice(&0u32.to_le_bytes());
        unit.push(8);
        unit.extend_from_slice(&dies);

        let mut out = (unit.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&unit);
        out
    }

    /// One sequence: 0x1040 line 10, 0x1050 line 15, end at 0x1080.
    fn line() -> Vec<u8> {
        let mut header = vec![1, 1, 1, (-5i8) as u8, 14, 13];
        header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        header.push(0); // no include directories
        header.extend_from_slice(b"monitor.c\0");
        header.extend_from_slice(&[0, 0, 0]);
        header.push(0);

        let mut program = vec![0, 9, 0x02];
        program.extend_from_slice(&0x1040u64.to_le_bytes());
        program.extend_from_slice(&[0x03, 9, 0x01]);
        program.extend_from_slice(&[0x02, 0x10, 0x03, 5, 0x01]);
        program.extend_from_slice(&[0x02, 0x30, 0, 1, 0x01]);

        let mut unit = 4u16.to_le_bytes().to_vec();
        unit.extend_from_slice(&(header.len() as u32).to_le_bytes());
        unit.extend_from_slice(&header);
        unit.extend_from_slice(&program);

        let mut out = (unit.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&unit);
        out
    }

    #[test]
    fn resolves_function_file_and_line() {
        let (info, abbrev, line) = (info(), abbrev(), line());
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();

        let hit = resolver.debuginfo(0x1058);
        assert_eq!(hit.function_name(), "monitor");
        assert_eq!(hit.fn_addr, 0x1040);
        assert_eq!(hit.file, "monitor.c");
        assert_eq!(hit.line, 15);

        assert_eq!(resolver.debuginfo(0x1044).line, 10);
    }

    #[test]
    fn falls_back_to_the_unit_name_without_line_rows() {
        let (info, abbrev, line) = (info(), abbrev(), line());
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();

        let hit = resolver.debuginfo(0x1010);
        assert_eq!(hit.function_name(), "kern_init");
        assert_eq!(hit.fn_addr, 0x1000);
        assert_eq!(hit.file, "main.c");
        assert_eq!(hit.line, 0);
    }

    #[test]
    fn misses_yield_the_sentinel() {
        let (info, abbrev, line) = (info(), abbrev(), line());
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();
        assert!(resolver.debuginfo(0x2000).is_unknown());

        let empty = DwarfResolver::new(&DwarfSections::default()).unwrap();
        assert!(empty.debuginfo(0x1040).is_unknown());
    }

    fn with_length(body: Vec<u8>) -> Vec<u8> {
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[rustfmt::skip]
    fn abbrev_v5() -> Vec<u8> {
        vec![
            // 1: compile unit, name through .debug_str
            1, 0x11, 1,
            0x03, DW_FORM_STRP,
            0x11, DW_FORM_ADDR,
            0x12, DW_FORM_DATA4,
            0x10, DW_FORM_SEC_OFFSET,
            0x72, DW_FORM_SEC_OFFSET,
            0, 0,
            // 2: subprogram, name through .debug_str_offsets
            2, 0x2e, 0,
            0x03, DW_FORM_STRX1,
            0x11, DW_FORM_ADDR,
            0x12, DW_FORM_DATA4,
            0, 0,
            // 3: subprogram without a name
            3, 0x2e, 0,
            0x11, DW_FORM_ADDR,
            0x12, DW_FORM_DATA4,
            0, 0,
            0,
        ]
    }

    /// `leaf` at 0x401106..0x401120, a nameless function at
    /// 0x401120..0x401130.
    fn info_v5() -> Vec<u8> {
        let mut unit = 5u16.to_le_bytes().to_vec();
        unit.push(1); // DW_UT_compile
        unit.push(8);
        unit.extend_from_slice(&0u32.to_le_bytes());

        unit.push(1);
        unit.extend_from_slice(&0u32.to_le_bytes()); // "prog.c"
        unit.extend_from_slice(&0x401100u64.to_le_bytes());
        unit.extend_from_slice(&0x30u32.to_le_bytes());
        unit.extend_from_slice(&0u32.to_le_bytes()); // stmt_list
        unit.extend_from_slice(&8u32.to_le_bytes()); // str_offsets_base

        unit.extend_from_slice(&[2, 0]); // str_offsets[0] = "leaf"
        unit.extend_from_slice(&0x401106u64.to_le_bytes());
        unit.extend_from_slice(&0x1au32.to_le_bytes());

        unit.push(3);
        unit.extend_from_slice(&0x401120u64.to_le_bytes());
        unit.extend_from_slice(&0x10u32.to_le_bytes());

        unit.push(0);
        with_length(unit)
    }

    const STR_V5: &[u8] = b"prog.c\0leaf\0";
    const LINE_STR_V5: &[u8] = b"/src\0prog.c\0";

    fn str_offsets_v5() -> Vec<u8> {
        let mut body = 5u16.to_le_bytes().to_vec();
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&7u32.to_le_bytes());
        with_length(body)
    }

    /// File names in .debug_line_str; 0x401106 line 1, 0x401110 line 2, end
    /// at 0x401120.
    fn line_v5() -> Vec<u8> {
        let mut header = vec![1, 1, 1, (-5i8) as u8, 14, 13];
        header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        // directories: DW_LNCT_path as line_strp
        header.extend_from_slice(&[1, 1, DW_FORM_LINE_STRP, 1]);
        header.extend_from_slice(&0u32.to_le_bytes());
        // files: DW_LNCT_path as line_strp, DW_LNCT_directory_index as udata
        header.extend_from_slice(&[2, 1, DW_FORM_LINE_STRP, 2, DW_FORM_UDATA, 1]);
        header.extend_from_slice(&5u32.to_le_bytes());
        header.push(0);

        let mut program = vec![0, 9, 0x02];
        program.extend_from_slice(&0x401106u64.to_le_bytes());
        program.extend_from_slice(&[0x04, 0, 0x01]);
        program.extend_from_slice(&[0x02, 0x0a, 0x03, 1, 0x01]);
        program.extend_from_slice(&[0x02, 0x10, 0, 1, 0x01]);

        let mut unit = 5u16.to_le_bytes().to_vec();
        unit.extend_from_slice(&[8, 0]);
        unit.extend_from_slice(&(header.len() as u32).to_le_bytes());
        unit.extend_from_slice(&header);
        unit.extend_from_slice(&program);
        with_length(unit)
    }

    #[test]
    fn resolves_dwarf5_string_forms() {
        let (info, abbrev, line) = (info_v5(), abbrev_v5(), line_v5());
        let str_offsets = str_offsets_v5();
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            debug_line_str: LINE_STR_V5,
            debug_str: STR_V5,
            debug_str_offsets: &str_offsets,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();

        let hit = resolver.debuginfo(0x401110);
        assert_eq!(hit.function_name(), "leaf");
        assert_eq!(hit.fn_addr, 0x401106);
        assert_eq!(hit.file, "prog.c");
        assert_eq!(hit.line, 2);
        assert_eq!(resolver.debuginfo(0x401108).line, 1);
    }

    #[test]
    fn unreadable_file_name_keeps_the_function() {
        let (info, abbrev, line) = (info_v5(), abbrev_v5(), line_v5());
        let str_offsets = str_offsets_v5();
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            debug_str: STR_V5,
            debug_str_offsets: &str_offsets,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();

        let hit = resolver.debuginfo(0x401110);
        assert_eq!(hit.function_name(), "leaf");
        assert_eq!(hit.fn_addr, 0x401106);
        assert_eq!(hit.file, "prog.c");
        assert_eq!(hit.line, 0);
    }

    #[test]
    fn unnamed_functions_are_still_resolved() {
        let (info, abbrev, line) = (info_v5(), abbrev_v5(), line_v5());
        let sections = DwarfSections {
            debug_info: &info,
            debug_abbrev: &abbrev,
            debug_line: &line,
            debug_line_str: LINE_STR_V5,
            debug_str: STR_V5,
            ..Default::default()
        };
        let resolver = DwarfResolver::new(&sections).unwrap();

        // No .debug_str_offsets, so `leaf` cannot be named.
        let hit = resolver.debuginfo(0x401110);
        assert_eq!(hit.function_name(), DebugInfo::ANONYMOUS);
        assert_eq!(hit.fn_addr, 0x401106);
        assert_eq!(hit.line, 2);
        assert!(!hit.is_unknown());

        let hit = resolver.debuginfo(0x401124);
        assert_eq!(hit.function_name(), DebugInfo::ANONYMOUS);
        assert_eq!(hit.fn_addr, 0x401120);
        assert_eq!(hit.file, "prog.c");
        assert_eq!(hit.line, 0);
        assert!(!hit.is_unknown());
    }
}
