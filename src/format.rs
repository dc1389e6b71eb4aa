use crate::BacktraceLine;
use core::fmt::{self, Display, Formatter};

/// `  ebp f0110f58 eip f01000be args 00000000 00000000 00000000 f01009ec 00000001`
pub struct Header<'l, 'a>(&'l BacktraceLine<'a>);

/// `    kern/init.c:49: i386_init+82`
pub struct Detail<'l, 'a>(&'l BacktraceLine<'a>);

impl Display for Header<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let frame = &self.0.frame;
        write!(
            f,
            "  ebp {:08x} eip {:08x} args",
            frame.frame_pointer, frame.return_address
        )?;
        for arg in frame.args {
            write!(f, " {:08x}", arg)?;
        }
        Ok(())
    }
}

impl Display for Detail<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let info = &self.0.info;
        write!(
            f,
            "    {}:{}: {}+{}",
            info.file,
            info.line,
            info.function_name(),
            self.0.offset
        )
    }
}

impl<'a> BacktraceLine<'a> {
    pub fn header(&self) -> Header<'_, 'a> {
        Header(self)
    }

    pub fn detail(&self) -> Detail<'_, 'a> {
        Detail(self)
    }
}

impl Display for BacktraceLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.header(), self.detail())
    }
}
