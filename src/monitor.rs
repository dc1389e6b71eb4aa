//! A minimal kernel monitor: a table of named commands, a line dispatcher and
//! the `backtrace` command.
//!
//! Reading lines from a terminal is left to the embedding kernel; feed them to
//! [`Commands::run`] or [`Commands::serve`].

use crate::{arch, DebugInfoProvider, FramePointTracer, MemoryReader, VAddr};
use alloc::vec::Vec;
use core::fmt::Write;
use log::{debug, error, warn};

/// Maximum number of tokens on a command line, counting the terminator slot.
pub const MAXARGS: usize = 16;

const WHITESPACE: [char; 4] = ['\t', '\r', '\n', ' '];

/// What the monitor does after a command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

impl Flow {
    /// 0 keeps the monitor running, negative makes it exit.
    pub fn code(self) -> i32 {
        match self {
            Flow::Continue => 0,
            Flow::Exit => -1,
        }
    }
}

/// Everything a command may touch while it runs.
pub struct Session<'a, M, P> {
    pub tracer: &'a FramePointTracer<M, P>,
    pub console: &'a mut dyn Write,
    /// Frame to start backtraces from, e.g. the one saved in a trap frame.
    /// `None` walks the monitor's own stack.
    pub frame_pointer: Option<VAddr>,
}

pub type CommandFn<M, P> = fn(&Commands<M, P>, &[&str], &mut Session<'_, M, P>) -> Flow;

pub struct Command<M, P> {
    pub name: &'static str,
    pub desc: &'static str,
    pub func: CommandFn<M, P>,
}

/// The commands a monitor knows, in registration order.
pub struct Commands<M, P> {
    table: Vec<Command<M, P>>,
}

impl<M: MemoryReader, P: DebugInfoProvider> Commands<M, P> {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// `help` and `backtrace`.
    pub fn kernel() -> Self {
        let mut commands = Self::new();
        commands
            .register("help", "Display this list of commands", mon_help)
            .register(
                "backtrace",
                "Show the backtrace of the current kernel stack",
                mon_backtrace,
            );
        commands
    }

    pub fn register(
        &mut self,
        name: &'static str,
        desc: &'static str,
        func: CommandFn<M, P>,
    ) -> &mut Self {
        self.table.push(Command { name, desc, func });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command<M, P>> {
        self.table.iter()
    }

    pub fn find(&self, name: &str) -> Option<&Command<M, P>> {
        self.table.iter().find(|cmd| cmd.name == name)
    }

    /// Parse `line` into whitespace-separated arguments and run the command
    /// named by the first one.
    pub fn run(&self, line: &str, session: &mut Session<'_, M, P>) -> Flow {
        let mut argv: Vec<&str> = Vec::new();
        for arg in line
            .split(|c: char| WHITESPACE.contains(&c))
            .filter(|arg| !arg.is_empty())
        {
            if argv.len() == MAXARGS - 1 {
                writeln!(session.console, "Too many arguments (max {})", MAXARGS).ok();
                return Flow::Continue;
            }
            argv.push(arg);
        }

        let Some(&name) = argv.first() else {
            return Flow::Continue;
        };
        match self.find(name) {
            Some(cmd) => {
                debug!("monitor: running {}", name);
                (cmd.func)(self, &argv, session)
            }
            None => {
                warn!("monitor: unknown command {}", name);
                writeln!(session.console, "Unknown command '{}'", name).ok();
                Flow::Continue
            }
        }
    }

    /// Run `lines` until one of them asks the monitor to exit.
    pub fn serve<'l, I>(&self, lines: I, session: &mut Session<'_, M, P>) -> Flow
    where
        I: IntoIterator<Item = &'l str>,
    {
        for line in lines {
            if self.run(line, session) == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }
}

/// An empty table, same as [`Commands::new`].
impl<M: MemoryReader, P: DebugInfoProvider> Default for Commands<M, P> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn mon_help<M, P>(
    commands: &Commands<M, P>,
    _argv: &[&str],
    session: &mut Session<'_, M, P>,
) -> Flow {
    for cmd in &commands.table {
        writeln!(session.console, "{} - {}", cmd.name, cmd.desc).ok();
    }
    Flow::Continue
}

pub fn mon_backtrace<M: MemoryReader, P: DebugInfoProvider>(
    _commands: &Commands<M, P>,
    _argv: &[&str],
    session: &mut Session<'_, M, P>,
) -> Flow {
    writeln!(session.console, "Stack backtrace:").ok();
    let fp = match session.frame_pointer {
        Some(fp) => fp,
        None => arch::fp(),
    };
    for line in session.tracer.walk(fp) {
        match line {
            Ok(line) => {
                writeln!(session.console, "{}", line).ok();
            }
            Err(err) => {
                error!("backtrace aborted: {}", err);
                writeln!(session.console, "  bad frame: {}", err).ok();
                return Flow::Exit;
            }
        }
    }
    Flow::Continue
}
