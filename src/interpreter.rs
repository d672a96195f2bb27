use crate::builtin::BUILTINS;
use crate::command::{CommandTable, ExitCode, Invocation, Lookup};
use crate::env::Environment;
use crate::expand::{ShellExpander, WordExpander};
use crate::external::{self, ProcessOutcome, RunError};
use crate::line::{LineEvent, LineSource};
use crate::signal;
use crate::text::{remove_comment, strip_spaces};
use anyhow::Result;
use std::fmt;
use std::io::{self, Write};
use tracing::{debug, info};

const SHELL_NAME: &str = env!("CARGO_PKG_NAME");

/// What became of one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executed {
    /// The line expanded to no words.
    Skipped,
    /// Nothing was dispatched: the line did not expand, or the name was
    /// ambiguous.
    Rejected,
    /// A builtin ran in the shell process.
    Builtin { name: &'static str, status: ExitCode },
    /// A child was started and reaped, or could not be started.
    External(ProcessOutcome),
    /// The process runner itself failed.
    Failed,
}

/// A minimal interactive shell.
///
/// The interpreter owns the session [`Environment`], the builtin table it
/// dispatches from, the word expander and its two output streams. Input comes
/// from a [`LineSource`] handed to [`repl`](Self::repl).
///
/// Example
/// ```
/// use minish::Interpreter;
/// use minish::interpreter::Executed;
/// let mut sh = Interpreter::default();
/// let done = sh.execute_command("setenv GREETING hello");
/// assert!(matches!(done, Executed::Builtin { status: 0, .. }));
/// assert_eq!(sh.env().get_var("GREETING"), Some("hello"));
/// ```
pub struct Interpreter {
    env: Environment,
    table: &'static CommandTable,
    expander: Box<dyn WordExpander>,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Interpreter {
    pub fn new(
        env: Environment,
        table: &'static CommandTable,
        expander: Box<dyn WordExpander>,
        out: Box<dyn Write>,
        err: Box<dyn Write>,
    ) -> Self {
        Self {
            env,
            table,
            expander,
            out,
            err,
        }
    }

    /// An interpreter over the standard builtins and expander, printing to
    /// the given streams.
    pub fn with_output(env: Environment, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self::new(env, &BUILTINS, Box::new(ShellExpander), out, err)
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Read and execute lines until end of input or `exit`.
    ///
    /// Returns the code the shell should terminate with.
    pub fn repl(&mut self, source: &mut dyn LineSource) -> Result<ExitCode> {
        info!(cwd = %self.env.current_dir.display(), "session started");
        loop {
            if let Some(code) = self.env.exit_request() {
                self.out.flush()?;
                return Ok(code);
            }
            if signal::take_pending() {
                self.recover_interrupt(source, "")?;
            }

            let prompt = self.env.get_var("PS1").unwrap_or_default().to_string();
            self.out.flush()?;
            match source.read_line(&prompt)? {
                LineEvent::Line(line) => {
                    let line = strip_spaces(remove_comment(&line));
                    if line.is_empty() {
                        continue;
                    }
                    source.add_history(line)?;
                    self.execute_command(line);
                }
                LineEvent::Interrupted(pending) => self.recover_interrupt(source, &pending)?,
                LineEvent::Unreadable(reason) => self.diagnose(format_args!("{}", reason)),
                LineEvent::Eof => {
                    writeln!(self.out)?;
                    self.out.flush()?;
                    return Ok(0);
                }
            }
        }
    }

    /// Keep the abandoned line in history and start over on a clean one.
    fn recover_interrupt(&mut self, source: &mut dyn LineSource, pending: &str) -> Result<()> {
        let pending = strip_spaces(pending);
        debug!(pending, "interrupt");
        if pending.is_empty() {
            return Ok(());
        }
        source.add_history(pending)?;
        writeln!(self.out, "(interrupt)")?;
        source.reset();
        Ok(())
    }

    /// Expand `line` into words and dispatch them.
    pub fn execute_command(&mut self, line: &str) -> Executed {
        let argv = match self.expander.expand(line, &self.env) {
            Ok(argv) => argv,
            Err(e) => {
                self.diagnose(format_args!("{}", e));
                return Executed::Rejected;
            }
        };
        if argv.is_empty() {
            return Executed::Skipped;
        }
        self.run_key(&argv)
    }

    /// Run `argv` as a builtin when the table knows its name, as an external
    /// program otherwise.
    pub fn run_key(&mut self, argv: &[String]) -> Executed {
        let Some(name) = argv.first() else {
            return Executed::Skipped;
        };

        match self.table.lookup(name) {
            Lookup::Found(entry) => {
                debug!(typed = %name, builtin = entry.name, "dispatch");
                let mut inv = Invocation {
                    env: &mut self.env,
                    stdout: &mut *self.out,
                    stderr: &mut *self.err,
                    table: self.table,
                };
                let status = match (entry.handler)(&mut inv, argv) {
                    Ok(status) => status,
                    Err(e) => {
                        self.diagnose(format_args!("{:#}", e));
                        1
                    }
                };
                Executed::Builtin {
                    name: entry.name,
                    status,
                }
            }
            Lookup::Ambiguous(names) => {
                self.diagnose(format_args!(
                    "{}: ambiguous command ({})",
                    name,
                    names.join(", ")
                ));
                Executed::Rejected
            }
            Lookup::Missing => {
                debug!(command = %name, "dispatch to external");
                // Anything buffered must appear before the child's output.
                let _ = self.out.flush();
                match external::run_cmd(argv, &self.env, &mut *self.err) {
                    Ok(outcome) => {
                        debug!(command = %name, status = outcome.status(), "external finished");
                        Executed::External(outcome)
                    }
                    Err(e @ RunError::Spawn(_)) => {
                        self.diagnose(format_args!("run_cmd: {}", e));
                        Executed::Failed
                    }
                    Err(e) => {
                        self.diagnose(format_args!("{}", e));
                        Executed::Failed
                    }
                }
            }
        }
    }

    fn diagnose(&mut self, message: fmt::Arguments<'_>) {
        let _ = writeln!(self.err, "{}: {}", SHELL_NAME, message);
    }
}

impl Default for Interpreter {
    /// Interpreter over the process environment (with the startup defaults
    /// filled in), writing to stdout and stderr.
    fn default() -> Self {
        let mut env = Environment::from_process();
        env.apply_defaults();
        Self::with_output(env, Box::new(io::stdout()), Box::new(io::stderr()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::MemWriter;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type Buffer = Rc<RefCell<Vec<u8>>>;

    /// Replays a fixed list of events and records what the loop did with them.
    #[derive(Default)]
    struct ScriptedSource {
        events: VecDeque<LineEvent>,
        prompts: Vec<String>,
        history: Vec<String>,
        resets: usize,
    }

    impl ScriptedSource {
        fn new(events: impl IntoIterator<Item = LineEvent>) -> Self {
            Self {
                events: events.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl LineSource for ScriptedSource {
        fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
            self.prompts.push(prompt.to_string());
            Ok(self.events.pop_front().unwrap_or(LineEvent::Eof))
        }

        fn add_history(&mut self, line: &str) -> Result<()> {
            self.history.push(line.to_string());
            Ok(())
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn line(text: &str) -> LineEvent {
        LineEvent::Line(text.to_string())
    }

    fn test_env() -> Environment {
        let mut env = Environment::empty("/");
        env.set_var("PATH", "/bin:/usr/bin").unwrap();
        env.set_var("HOME", "/home/tester").unwrap();
        env.apply_defaults();
        env
    }

    fn interpreter(env: Environment) -> (Interpreter, Buffer, Buffer) {
        let (out, out_handle) = MemWriter::with_handle();
        let (err, err_handle) = MemWriter::with_handle();
        let sh = Interpreter::with_output(env, Box::new(out), Box::new(err));
        (sh, out_handle, err_handle)
    }

    fn text(buffer: &Buffer) -> String {
        MemWriter::contents(buffer)
    }

    #[test]
    fn test_blank_and_comment_lines_do_nothing() {
        let _lock = signal::lock_signals();
        let (mut sh, out, err) = interpreter(test_env());
        let mut source = ScriptedSource::new([line("  # comment only"), line("   "), line("")]);

        assert_eq!(sh.repl(&mut source).unwrap(), 0);
        // Only the newline printed at end of input.
        assert_eq!(text(&out), "\n");
        assert_eq!(text(&err), "");
        assert!(source.history.is_empty());
        assert_eq!(source.prompts.len(), 4);
    }

    #[test]
    fn test_comment_is_stripped_before_dispatch() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([line("  echo visible # hidden  ")]);

        sh.repl(&mut source).unwrap();
        assert_eq!(text(&out), "visible\n\n");
        assert_eq!(source.history, ["echo visible"]);
    }

    #[test]
    fn test_nonexistent_command_then_more_input() {
        let _lock = signal::lock_signals();
        let (mut sh, out, err) = interpreter(test_env());
        assert_eq!(
            sh.execute_command("nonexisting_minish_cmd"),
            Executed::External(ProcessOutcome::NotFound)
        );

        let mut source =
            ScriptedSource::new([line("nonexisting_minish_cmd"), line("echo still here")]);
        assert_eq!(sh.repl(&mut source).unwrap(), 0);
        assert_eq!(text(&out), "still here\n\n");
        assert_eq!(
            text(&err),
            "minish: nonexisting_minish_cmd: command not found\n".repeat(2)
        );
    }

    #[test]
    fn test_interrupt_keeps_line_in_history() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([
            LineEvent::Interrupted("foo bar".to_string()),
            line("echo next"),
        ]);

        assert_eq!(sh.repl(&mut source).unwrap(), 0);
        assert_eq!(source.history, ["foo bar", "echo next"]);
        assert_eq!(source.resets, 1);
        assert_eq!(text(&out), "(interrupt)\nnext\n\n");
    }

    #[test]
    fn test_interrupt_on_empty_line_is_silent() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([LineEvent::Interrupted("   ".to_string())]);

        sh.repl(&mut source).unwrap();
        assert!(source.history.is_empty());
        assert_eq!(source.resets, 0);
        assert_eq!(text(&out), "\n");
    }

    #[test]
    fn test_undecodable_line_then_more_input() {
        let _lock = signal::lock_signals();
        let (mut sh, out, err) = interpreter(test_env());
        let mut source = ScriptedSource::new([
            LineEvent::Unreadable("stream did not contain valid UTF-8".to_string()),
            line("echo after"),
        ]);

        assert_eq!(sh.repl(&mut source).unwrap(), 0);
        assert_eq!(text(&out), "after\n\n");
        assert_eq!(text(&err), "minish: stream did not contain valid UTF-8\n");
        assert_eq!(source.history, ["echo after"]);
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([line("exit 3"), line("echo unreachable")]);

        assert_eq!(sh.repl(&mut source).unwrap(), 3);
        assert_eq!(text(&out), "");
        assert_eq!(source.events.len(), 1);
    }

    #[test]
    fn test_prompt_is_read_each_iteration() {
        let _lock = signal::lock_signals();
        let (mut sh, _, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([line("setenv PS1 'new> '")]);

        sh.repl(&mut source).unwrap();
        assert_eq!(source.prompts, ["minish$ ", "new> "]);
    }

    #[test]
    fn test_setenv_getenv_unsetenv() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());
        let mut source = ScriptedSource::new([
            line("setenv FOO bar"),
            line("getenv FOO"),
            line("unsetenv FOO"),
            line("getenv FOO"),
        ]);

        sh.repl(&mut source).unwrap();
        assert_eq!(text(&out), "FOO=bar\nFOO=\n\n");
    }

    #[test]
    fn test_builtin_or_child_never_both() {
        let _lock = signal::lock_signals();
        let (mut sh, out, _) = interpreter(test_env());

        assert_eq!(
            sh.execute_command("echo hi"),
            Executed::Builtin {
                name: "echo",
                status: 0
            }
        );
        assert_eq!(
            sh.execute_command("sh -c 'exit 4'"),
            Executed::External(ProcessOutcome::Exited(4))
        );
        // A longer word is not an abbreviation of `cd`.
        assert_eq!(
            sh.execute_command("cdrecord_minish_missing"),
            Executed::External(ProcessOutcome::NotFound)
        );
        assert_eq!(text(&out), "hi\n");
    }

    #[test]
    fn test_abbreviations() {
        let (mut sh, out, err) = interpreter(test_env());

        assert_eq!(
            sh.execute_command("ec abbreviated"),
            Executed::Builtin {
                name: "echo",
                status: 0
            }
        );
        assert_eq!(text(&out), "abbreviated\n");

        assert_eq!(sh.execute_command("e"), Executed::Rejected);
        assert_eq!(
            text(&err),
            "minish: e: ambiguous command (exit, echo, environ)\n"
        );
    }

    #[test]
    fn test_help_abbreviated() {
        let (mut sh, out, _) = interpreter(test_env());
        sh.execute_command("help");
        let full = text(&out);
        out.borrow_mut().clear();

        sh.execute_command("he");
        assert_eq!(text(&out), full);
        assert!(full.contains(" unsetenv Unset the given environment variable(s)\n"));
    }

    #[test]
    fn test_expansion_failures_are_reported() {
        let (mut sh, out, err) = interpreter(test_env());

        assert_eq!(sh.execute_command("echo a | wc"), Executed::Rejected);
        assert_eq!(sh.execute_command("echo 'open"), Executed::Rejected);
        assert_eq!(
            text(&err),
            "minish: illegal character\nminish: syntax error\n"
        );
        assert_eq!(text(&out), "");
    }

    #[test]
    fn test_unset_variable_alone_is_skipped() {
        let (mut sh, out, _) = interpreter(test_env());
        assert_eq!(sh.execute_command("$MINISH_UNSET_VARIABLE"), Executed::Skipped);

        sh.execute_command("echo ~ $HOME");
        assert_eq!(text(&out), "/home/tester /home/tester\n");
    }

    #[test]
    fn test_builtin_error_is_reported() {
        let (mut sh, _, err) = interpreter(test_env());

        let done = sh.execute_command("cd /nonexistent_minish_dir");
        assert_eq!(
            done,
            Executed::Builtin {
                name: "cd",
                status: 1
            }
        );
        assert!(text(&err).starts_with("minish: cd: /nonexistent_minish_dir: "));
    }

    #[test]
    fn test_child_sees_session_variables() {
        let _lock = signal::lock_signals();
        let (mut sh, _, _) = interpreter(test_env());
        sh.execute_command("setenv MINISH_CHILD_PROBE 5");

        assert_eq!(
            sh.execute_command("sh -c 'exit $MINISH_CHILD_PROBE'"),
            Executed::External(ProcessOutcome::Exited(5))
        );
    }
}
