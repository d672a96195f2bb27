//! Running programs that are not builtins.

use crate::command::ExitCode;
use crate::env::Environment;
use crate::signal;
use nix::unistd::{AccessFlags, access};
use std::ffi::OsStr;
use std::io::{self, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::debug;

/// How an external command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The child ran and exited with this code.
    Exited(ExitCode),
    /// The child ran and was killed by this signal.
    Signaled(i32),
    /// No such program.
    NotFound,
    /// The program exists but may not be executed.
    NotExecutable,
    /// The program could not be started for another reason.
    OtherError,
}

impl ProcessOutcome {
    /// The conventional exit status for this outcome.
    pub fn status(self) -> ExitCode {
        match self {
            ProcessOutcome::Exited(code) => code,
            ProcessOutcome::Signaled(signal) => 128 + signal,
            ProcessOutcome::NotFound => 127,
            ProcessOutcome::NotExecutable => 126,
            ProcessOutcome::OtherError => 1,
        }
    }
}

/// Failures of the runner itself, as opposed to failures of the program.
#[derive(Debug, Error)]
pub enum RunError {
    /// The process could not be created at all.
    #[error("cannot create process: {0}")]
    Spawn(#[source] io::Error),
    #[error("cannot wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Where a command name led.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    /// Something by that name exists but is not an executable file.
    Denied(PathBuf),
    Missing,
}

/// Resolve a command name the way `execvp` does.
///
/// Behavior:
/// - Name containing a `/`: used as a path, relative names being resolved
///   against `cwd`.
/// - Otherwise: every directory of `search_paths` (PATH) is tried in order;
///   an empty entry stands for `cwd`. A match that is not executable is
///   remembered and the search goes on.
/// - Empty name: `Missing`.
pub fn resolve_command(search_paths: &OsStr, name: &str, cwd: &Path) -> Resolution {
    if name.is_empty() {
        return Resolution::Missing;
    }
    if name.contains('/') {
        return check_candidate(cwd.join(name)).unwrap_or(Resolution::Missing);
    }

    let mut denied = None;
    for dir in std::env::split_paths(search_paths) {
        let dir = if dir.as_os_str().is_empty() {
            cwd.to_path_buf()
        } else {
            cwd.join(dir)
        };
        match check_candidate(dir.join(name)) {
            Some(Resolution::Found(path)) => return Resolution::Found(path),
            Some(Resolution::Denied(path)) => {
                denied.get_or_insert(path);
            }
            _ => {}
        }
    }
    denied.map_or(Resolution::Missing, Resolution::Denied)
}

fn check_candidate(path: PathBuf) -> Option<Resolution> {
    let meta = std::fs::metadata(&path).ok()?;
    if meta.is_file() && access(&path, AccessFlags::X_OK).is_ok() {
        Some(Resolution::Found(path))
    } else {
        Some(Resolution::Denied(path))
    }
}

/// Run `argv` as an external program and reap it.
///
/// The child sees exactly the variables of `env` and starts in
/// `env.current_dir`. Launch failures are reported on `err` and classified
/// with the exit status a shell child would have produced; only a failure
/// to create the process at all is an `Err`.
pub fn run_cmd(
    argv: &[String],
    env: &Environment,
    err: &mut dyn Write,
) -> Result<ProcessOutcome, RunError> {
    let Some(name) = argv.first() else {
        return Ok(ProcessOutcome::NotFound);
    };

    let search_paths = env.get_var("PATH").unwrap_or_default();
    let program = match resolve_command(OsStr::new(search_paths), name, &env.current_dir) {
        Resolution::Found(path) => path,
        Resolution::Denied(path) => {
            debug!(command = %name, path = %path.display(), "not executable");
            report(err, name, "Permission denied");
            return Ok(ProcessOutcome::NotExecutable);
        }
        Resolution::Missing => {
            report(err, name, "command not found");
            return Ok(ProcessOutcome::NotFound);
        }
    };

    let mut cmd = Command::new(&program);
    cmd.arg0(name)
        .args(&argv[1..])
        .env_clear()
        .envs(env.vars())
        .current_dir(&env.current_dir);
    // SAFETY: the hook only resets signal dispositions, which is
    // async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            signal::restore_defaults();
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return match e.kind() {
                io::ErrorKind::NotFound => {
                    report(err, name, "command not found");
                    Ok(ProcessOutcome::NotFound)
                }
                io::ErrorKind::PermissionDenied => {
                    report(err, name, "Permission denied");
                    Ok(ProcessOutcome::NotExecutable)
                }
                io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory => Err(RunError::Spawn(e)),
                _ => {
                    report(err, name, &e.to_string());
                    Ok(ProcessOutcome::OtherError)
                }
            };
        }
    };

    let pid = child.id();
    debug!(pid, program = %program.display(), "spawned child");
    // `wait` retries on EINTR until the child is reaped.
    let status = child
        .wait()
        .map_err(|source| RunError::Wait { pid, source })?;

    // Ctrl-C during the wait was meant for the child.
    signal::take_pending();

    let outcome = classify(status);
    debug!(pid, ?outcome, "reaped child");
    Ok(outcome)
}

fn classify(status: ExitStatus) -> ProcessOutcome {
    match (status.code(), status.signal()) {
        (Some(code), _) => ProcessOutcome::Exited(code),
        (None, Some(signal)) => ProcessOutcome::Signaled(signal),
        (None, None) => ProcessOutcome::OtherError,
    }
}

fn report(err: &mut dyn Write, name: &str, message: &str) {
    // Diagnostics are best effort; a closed stderr must not stop the shell.
    let _ = writeln!(err, "{}: {}: {}", env!("CARGO_PKG_NAME"), name, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "minish_external_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_script(path: &Path, body: &str, mode: u32) {
        fs::write(path, body).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn shell_env(cwd: &Path) -> Environment {
        let mut env = Environment::empty(cwd);
        env.set_var("PATH", "/bin:/usr/bin").unwrap();
        env
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProcessOutcome::Exited(3).status(), 3);
        assert_eq!(ProcessOutcome::Signaled(9).status(), 137);
        assert_eq!(ProcessOutcome::NotFound.status(), 127);
        assert_eq!(ProcessOutcome::NotExecutable.status(), 126);
        assert_eq!(ProcessOutcome::OtherError.status(), 1);
    }

    #[test]
    fn test_resolve_in_path() {
        let found = resolve_command(OsStr::new("/nonexistent:/bin"), "sh", Path::new("/"));
        assert_eq!(found, Resolution::Found(PathBuf::from("/bin/sh")));

        let missing = resolve_command(OsStr::new("/bin"), "nonexisting_minish_cmd", Path::new("/"));
        assert_eq!(missing, Resolution::Missing);

        assert_eq!(resolve_command(OsStr::new("/bin"), "", Path::new("/")), Resolution::Missing);
    }

    #[test]
    fn test_resolve_paths_with_slash() {
        let dir = temp_dir("slash");
        write_script(&dir.join("run.sh"), "#!/bin/sh\nexit 0\n", 0o755);
        write_script(&dir.join("plain.txt"), "data\n", 0o644);

        let found = resolve_command(OsStr::new(""), "./run.sh", &dir);
        assert_eq!(found, Resolution::Found(dir.join("./run.sh")));

        let denied = resolve_command(OsStr::new(""), "./plain.txt", &dir);
        assert_eq!(denied, Resolution::Denied(dir.join("./plain.txt")));

        assert_eq!(
            resolve_command(OsStr::new("/bin"), "/bin/sh", Path::new("/")),
            Resolution::Found(PathBuf::from("/bin/sh"))
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_resolve_keeps_searching_after_denied() {
        let first = temp_dir("denied_first");
        let second = temp_dir("denied_second");
        write_script(&first.join("tool"), "#!/bin/sh\n", 0o644);
        write_script(&second.join("tool"), "#!/bin/sh\n", 0o755);

        let paths = std::env::join_paths([&first, &second]).unwrap();
        assert_eq!(
            resolve_command(&paths, "tool", Path::new("/")),
            Resolution::Found(second.join("tool"))
        );

        let only_denied = std::env::join_paths([&first]).unwrap();
        assert_eq!(
            resolve_command(&only_denied, "tool", Path::new("/")),
            Resolution::Denied(first.join("tool"))
        );

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }

    #[test]
    fn test_run_reports_exit_code() {
        let _lock = signal::lock_signals();
        let env = shell_env(Path::new("/"));
        let mut err = Vec::new();

        let outcome = run_cmd(&argv(&["sh", "-c", "exit 7"]), &env, &mut err).unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(7));
        assert!(err.is_empty());
    }

    #[test]
    fn test_run_nonexistent_command() {
        let env = shell_env(Path::new("/"));
        let mut err = Vec::new();

        let outcome = run_cmd(&argv(&["nonexisting_minish_cmd"]), &env, &mut err).unwrap();
        assert_eq!(outcome, ProcessOutcome::NotFound);
        assert_eq!(outcome.status(), 127);
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "minish: nonexisting_minish_cmd: command not found\n"
        );
    }

    #[test]
    fn test_run_not_executable() {
        let dir = temp_dir("noexec");
        File::create(dir.join("data")).unwrap();
        let env = shell_env(&dir);
        let mut err = Vec::new();

        let outcome = run_cmd(&argv(&["./data"]), &env, &mut err).unwrap();
        assert_eq!(outcome, ProcessOutcome::NotExecutable);
        assert_eq!(outcome.status(), 126);
        assert!(String::from_utf8(err).unwrap().ends_with("Permission denied\n"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_run_uses_session_environment_and_directory() {
        let _lock = signal::lock_signals();
        let dir = temp_dir("envdir");
        let out_file = dir.join("out");
        let mut env = shell_env(&dir);
        env.set_var("MINISH_PROBE", "probe-value").unwrap();

        let script = "printf '%s %s %s' \"$MINISH_PROBE\" \"$(pwd)\" \"$0\" > out";
        let argv = argv(&["sh", "-c", script, "custom-zero"]);
        let outcome = run_cmd(&argv, &env, &mut Vec::new()).unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(0));

        let written = fs::read_to_string(&out_file).unwrap();
        let canonical = fs::canonicalize(&dir).unwrap();
        assert_eq!(
            written,
            format!("probe-value {} custom-zero", canonical.display())
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_run_passes_values_that_are_not_utf8() {
        let _lock = signal::lock_signals();
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let env = Environment::from_vars(
            [
                (OsString::from("PATH"), OsString::from("/bin:/usr/bin")),
                (OsString::from("MINISH_LATIN1"), OsString::from_vec(b"caf\xe9".to_vec())),
            ],
            "/",
        );
        let script = r#"test "$MINISH_LATIN1" = "$(printf 'caf\351')""#;
        let outcome = run_cmd(&argv(&["sh", "-c", script]), &env, &mut Vec::new()).unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(0));
    }

    #[test]
    fn test_run_signaled_child() {
        let _lock = signal::lock_signals();
        let env = shell_env(Path::new("/"));
        let outcome = run_cmd(&argv(&["sh", "-c", "kill -9 $$"]), &env, &mut Vec::new()).unwrap();
        assert_eq!(outcome, ProcessOutcome::Signaled(9));
        assert_eq!(outcome.status(), 137);
    }
}
