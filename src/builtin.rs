use crate::command::{CommandEntry, CommandTable, ExitCode, Invocation};
use crate::text::atoi;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::os::unix::ffi::OsStrExt;
use tracing::debug;

/// Status returned when a builtin is called with the wrong arguments.
pub const USAGE_STATUS: ExitCode = 2;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. Every word after the command
/// name is positional, so `echo -n` prints `-n`.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Executes the command against the invocation's streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode>;
}

/// Parse `argv` into `T` and run it.
///
/// Argument count mismatches print the table's usage line for `argv[0]`
/// instead of failing.
pub(crate) fn run_builtin<T: BuiltinCommand>(
    inv: &mut Invocation<'_>,
    argv: &[String],
) -> Result<ExitCode> {
    let name = argv.first().map(String::as_str).unwrap_or_default();
    let args: Vec<&str> = std::iter::once("--")
        .chain(argv.iter().skip(1).map(String::as_str))
        .collect();

    match T::from_args(&[name], &args) {
        Ok(cmd) => cmd.execute(inv),
        Err(EarlyExit { output, .. }) => {
            debug!(command = name, reason = %output.trim_end(), "bad builtin arguments");
            inv.table
                .write_usage(name, false, &mut *inv.stdout, &mut *inv.stderr)?;
            Ok(USAGE_STATUS)
        }
    }
}

static ENTRIES: [CommandEntry; 9] = [
    CommandEntry {
        name: "exit",
        handler: run_builtin::<Exit>,
        description: "Exit from the shell",
        usage: "[exit code]",
    },
    CommandEntry {
        name: "echo",
        handler: run_builtin::<Echo>,
        description: "Show a message",
        usage: "[message]",
    },
    CommandEntry {
        name: "putenv",
        handler: run_builtin::<Putenv>,
        description: "Set the given environment variable(s)",
        usage: "<variable>=<value> [...]",
    },
    CommandEntry {
        name: "setenv",
        handler: run_builtin::<Setenv>,
        description: "Set an environment variable",
        usage: "<variable> <value>",
    },
    CommandEntry {
        name: "unsetenv",
        handler: run_builtin::<Unsetenv>,
        description: "Unset the given environment variable(s)",
        usage: "<variable> [...]",
    },
    CommandEntry {
        name: "getenv",
        handler: run_builtin::<Getenv>,
        description: "Print the value of the given environment variable(s)",
        usage: "<variable> [...]",
    },
    CommandEntry {
        name: "cd",
        handler: run_builtin::<Cd>,
        description: "Change the current working directory",
        usage: "[pathname | -]",
    },
    CommandEntry {
        name: "environ",
        handler: run_builtin::<Environ>,
        description: "Show a list of the environment variables",
        usage: "[#limit]",
    },
    CommandEntry {
        name: "help",
        handler: run_builtin::<Help>,
        description: "Show this help",
        usage: "[command]",
    },
];

/// The builtins, in the order `help` lists them.
pub static BUILTINS: CommandTable = CommandTable::new(&ENTRIES);

#[derive(FromArgs)]
/// Exit from the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status; parsed like C `atoi` and truncated to 0-255. Defaults to 0.
    pub code: Option<String>,
}

impl BuiltinCommand for Exit {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        let code = self.code.as_deref().map(atoi).unwrap_or(0);
        let code = (code & 0xff) as ExitCode;
        inv.env.request_exit(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Write the arguments to standard output, separated by spaces and followed
/// by a newline.
pub struct Echo {
    #[argh(positional)]
    /// values to print as-is.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        writeln!(inv.stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Add `name=value` pairs to the environment.
pub struct Putenv {
    #[argh(positional)]
    /// first assignment.
    pub first: String,

    #[argh(positional)]
    /// further assignments.
    pub rest: Vec<String>,
}

impl BuiltinCommand for Putenv {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        for assignment in std::iter::once(&self.first).chain(&self.rest) {
            // Like putenv(3): a rejected token does not stop the others.
            if let Err(e) = inv.env.put(assignment) {
                debug!(%assignment, error = %e, "putenv ignored token");
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set an environment variable, overwriting any previous value.
pub struct Setenv {
    #[argh(positional)]
    /// variable name.
    pub name: String,

    #[argh(positional)]
    /// new value.
    pub value: String,
}

impl BuiltinCommand for Setenv {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        inv.env.set_var(self.name, self.value).context("setenv")?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove variables from the environment.
pub struct Unsetenv {
    #[argh(positional)]
    /// first variable name.
    pub first: String,

    #[argh(positional)]
    /// further variable names.
    pub rest: Vec<String>,
}

impl BuiltinCommand for Unsetenv {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        let mut status = 0;
        for name in std::iter::once(&self.first).chain(&self.rest) {
            if let Err(e) = inv.env.unset_var(name) {
                writeln!(inv.stderr, "unsetenv: {}", e)?;
                status = 1;
            }
        }
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Print `name=value` for each variable. Unset variables print an empty value.
pub struct Getenv {
    #[argh(positional)]
    /// first variable name.
    pub first: String,

    #[argh(positional)]
    /// further variable names.
    pub rest: Vec<String>,
}

impl BuiltinCommand for Getenv {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        for name in std::iter::once(&self.first).chain(&self.rest) {
            let value = inv.env.get_var(name).unwrap_or_default();
            writeln!(inv.stdout, "{}={}", name, value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to, or `-` for $OLDPWD. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        let path = match self.target {
            Some(target) if target == "-" => {
                let Some(old) = inv.env.get_var("OLDPWD").map(str::to_owned) else {
                    return Ok(1);
                };
                writeln!(inv.stdout, "{}", old)?;
                old
            }
            Some(target) => target,
            None => inv
                .env
                .home_dir()
                .ok_or_else(|| anyhow!("cd: cannot get the user home directory"))?,
        };

        let previous = inv.env.current_dir.clone();
        let target = previous.join(&path);
        env::set_current_dir(&target).with_context(|| format!("cd: {}", path))?;

        inv.env.current_dir = env::current_dir().unwrap_or(target);
        inv.env
            .set_var("OLDPWD", previous.to_string_lossy())
            .context("cd")?;
        debug!(
            from = %previous.display(),
            to = %inv.env.current_dir.display(),
            "changed directory"
        );
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show the environment variables in environment order.
pub struct Environ {
    #[argh(positional)]
    /// maximum number of entries to print; negative means no limit.
    pub limit: Option<String>,
}

impl BuiltinCommand for Environ {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        let limit = self.limit.as_deref().map(atoi).unwrap_or(-1);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        for (name, value) in inv.env.vars().take(limit) {
            // Inherited entries are printed byte for byte, like environ(7).
            inv.stdout.write_all(name.as_bytes())?;
            inv.stdout.write_all(b"=")?;
            inv.stdout.write_all(value.as_bytes())?;
            inv.stdout.write_all(b"\n")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the builtins, or describe one of them.
pub struct Help {
    #[argh(positional)]
    /// command to describe; with more than one word only its usage line is
    /// printed.
    pub words: Vec<String>,
}

impl BuiltinCommand for Help {
    fn execute(self, inv: &mut Invocation<'_>) -> Result<ExitCode> {
        match self.words.first() {
            None => inv.table.write_summary(&mut *inv.stdout)?,
            Some(command) => inv.table.write_usage(
                command,
                self.words.len() == 1,
                &mut *inv.stdout,
                &mut *inv.stderr,
            )?,
        }
        Ok(0)
    }
}
