use nix::unistd::{Uid, User};
use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use thiserror::Error;

use crate::command::ExitCode;

/// Search list used when the inherited environment has no `PATH`.
pub const DEFAULT_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";
/// Prompt used when the inherited environment has no `PS1`.
pub const DEFAULT_PS1: &str = "minish$ ";
/// Field separators installed when the inherited environment has no `IFS`.
pub const DEFAULT_IFS: &str = " \t\n";

/// Rejected variable names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("invalid variable name '{0}'")]
    InvalidName(String),
}

/// Session state shared by the builtins and the process runner.
///
/// The environment contains:
/// - `vars`: variables in insertion order; this is the order `environ` lists
///   them in and the environment every child process receives. Inherited
///   names and values need not be UTF-8 and are passed on byte for byte.
/// - `current_dir`: the working directory for command execution.
/// - `exit_request`: set by `exit`; the main loop stops when it is present.
///
/// Builtins get it passed explicitly, so each one can be tested against a
/// private instance.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    exit_request: Option<ExitCode>,
}

impl Environment {
    /// An empty environment rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: Vec::new(),
            current_dir: current_dir.into(),
            exit_request: None,
        }
    }

    /// Capture the current process state into a new `Environment` instance.
    pub fn from_process() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_vars(stdenv::vars_os(), current_dir)
    }

    /// An environment holding `vars`, in the given order, rooted at
    /// `current_dir`.
    pub fn from_vars(
        vars: impl IntoIterator<Item = (OsString, OsString)>,
        current_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vars: vars.into_iter().collect(),
            current_dir: current_dir.into(),
            exit_request: None,
        }
    }

    /// Install the startup defaults for `PATH`, `PS1` and `IFS` where they
    /// are not already present.
    pub fn apply_defaults(&mut self) {
        for (key, value) in [
            ("PATH", DEFAULT_PATH),
            ("PS1", DEFAULT_PS1),
            ("IFS", DEFAULT_IFS),
        ] {
            if self.get_var(key).is_none() {
                self.vars.push((key.into(), value.into()));
            }
        }
    }

    /// Get the value of an environment variable.
    ///
    /// A value that is not valid UTF-8 reads as unset.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.to_str())
    }

    /// Set or override an environment variable.
    ///
    /// An existing variable keeps its position; a new one is appended.
    pub fn set_var(
        &mut self,
        key: impl Into<String>,
        val: impl Into<String>,
    ) -> Result<(), EnvError> {
        let key = key.into();
        validate_name(&key)?;
        let val: String = val.into();
        let val = OsString::from(val);
        match self.vars.iter_mut().find(|(k, _)| *k == *key) {
            Some((_, slot)) => *slot = val,
            None => self.vars.push((key.into(), val)),
        }
        Ok(())
    }

    /// Remove a variable. Removing an unset variable is not an error.
    pub fn unset_var(&mut self, key: &str) -> Result<(), EnvError> {
        validate_name(key)?;
        self.vars.retain(|(k, _)| k != key);
        Ok(())
    }

    /// Apply a `name=value` assignment.
    ///
    /// A string without `=` removes the variable of that name.
    pub fn put(&mut self, assignment: &str) -> Result<(), EnvError> {
        match assignment.split_once('=') {
            Some((name, value)) => self.set_var(name, value),
            None => self.unset_var(assignment),
        }
    }

    /// Iterate over `(name, value)` pairs in environment order.
    pub fn vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// `$HOME`, falling back to the home directory in the user database.
    pub fn home_dir(&self) -> Option<String> {
        if let Some(home) = self.get_var("HOME") {
            return Some(home.to_string());
        }
        let user = User::from_uid(Uid::current()).ok().flatten()?;
        Some(user.dir.to_string_lossy().into_owned())
    }

    /// Ask the main loop to terminate with `code`.
    pub fn request_exit(&mut self, code: ExitCode) {
        self.exit_request = Some(code);
    }

    /// The code passed to [`request_exit`](Self::request_exit), if any.
    pub fn exit_request(&self) -> Option<ExitCode> {
        self.exit_request
    }
}

fn validate_name(name: &str) -> Result<(), EnvError> {
    if name.is_empty() || name.contains('=') {
        Err(EnvError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
