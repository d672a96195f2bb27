use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Everything a builtin may touch while it runs.
pub struct Invocation<'a> {
    /// Session state: variables, working directory, exit request.
    pub env: &'a mut Environment,
    /// Regular output.
    pub stdout: &'a mut dyn Write,
    /// Diagnostics.
    pub stderr: &'a mut dyn Write,
    /// The table the builtin was dispatched from; `help` and the usage
    /// messages read it.
    pub table: &'a CommandTable,
}

/// Handler of a builtin. `argv[0]` is the name as the user typed it.
pub type BuiltinFn = fn(&mut Invocation<'_>, &[String]) -> Result<ExitCode>;

/// One row of the builtin table.
#[derive(Clone, Copy)]
pub struct CommandEntry {
    /// Canonical name of the command, e.g. "echo" or "cd".
    pub name: &'static str,
    pub handler: BuiltinFn,
    /// One-line description shown by `help`.
    pub description: &'static str,
    /// Argument synopsis shown after `Usage: <name>`.
    pub usage: &'static str,
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

/// Result of looking a command name up in a [`CommandTable`].
#[derive(Debug)]
pub enum Lookup<'t> {
    Found(&'t CommandEntry),
    /// The name abbreviates several entries, listed in table order.
    Ambiguous(Vec<&'static str>),
    Missing,
}

/// Immutable, ordered registry of builtins.
///
/// Lookup is ranked: an exact name wins, then a name that abbreviates
/// exactly one entry. An abbreviation of several entries is ambiguous.
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    entries: &'static [CommandEntry],
}

impl CommandTable {
    pub const fn new(entries: &'static [CommandEntry]) -> Self {
        Self { entries }
    }

    /// Entries in definition order.
    pub fn entries(&self) -> &'static [CommandEntry] {
        self.entries
    }

    pub fn lookup(&self, name: &str) -> Lookup<'static> {
        if let Some(entry) = self.entries.iter().find(|e| e.name == name) {
            return Lookup::Found(entry);
        }
        if name.is_empty() {
            return Lookup::Missing;
        }

        let mut candidates = self.entries.iter().filter(|e| e.name.starts_with(name));
        match (candidates.next(), candidates.next()) {
            (None, _) => Lookup::Missing,
            (Some(entry), None) => Lookup::Found(entry),
            (Some(first), Some(second)) => {
                let mut names = vec![first.name, second.name];
                names.extend(candidates.map(|e| e.name));
                Lookup::Ambiguous(names)
            }
        }
    }

    /// Print the usage line of `name`, optionally preceded by its description.
    ///
    /// Unknown and ambiguous names are reported on `err` instead.
    pub fn write_usage(
        &self,
        name: &str,
        with_description: bool,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> std::io::Result<()> {
        match self.lookup(name) {
            Lookup::Found(entry) => {
                if with_description {
                    writeln!(out, "{}", entry.description)?;
                }
                writeln!(out, "Usage: {} {}", entry.name, entry.usage)
            }
            Lookup::Ambiguous(names) => {
                writeln!(err, "{}: ambiguous command ({})", name, names.join(", "))
            }
            Lookup::Missing => writeln!(err, "{}: unknown command", name),
        }
    }

    /// Print the banner followed by every entry and its description.
    pub fn write_summary(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "\n{} v{}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )?;
        for entry in self.entries {
            writeln!(out, " {:<9}{}", entry.name, entry.description)?;
        }
        writeln!(out)
    }
}
