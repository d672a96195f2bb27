//! Word expansion: turns one raw command line into argument words.
//!
//! The expander is a small finite state machine over the characters of the
//! line. It performs quote removal, parameter expansion (`$NAME`,
//! `${NAME}`), tilde expansion and pathname expansion. Characters that would
//! start a pipeline, a redirection or a compound command are rejected.

use crate::env::Environment;
use crate::glob;
use nix::unistd::User;
use thiserror::Error;

/// Reasons a line could not be expanded.
///
/// The display text is the one-line diagnostic shown to the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// An unquoted `|`, `&`, `;`, `<`, `>`, `(`, `)`, `{`, `}` or newline.
    #[error("illegal character")]
    IllegalCharacter(char),
    #[error("out of memory")]
    OutOfMemory,
    /// Unbalanced quotes, a dangling backslash or a malformed `${...}`.
    #[error("syntax error")]
    Syntax(&'static str),
    #[error("expansion failed: {0}")]
    Other(String),
}

/// Anything that can split and expand a command line.
pub trait WordExpander {
    /// Expand `line` using the variables and working directory of `env`.
    ///
    /// An empty vector means the line expanded to nothing.
    fn expand(&self, line: &str, env: &Environment) -> Result<Vec<String>, ExpandError>;
}

/// The expander used by the interactive shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExpander;

impl WordExpander for ShellExpander {
    fn expand(&self, line: &str, env: &Environment) -> Result<Vec<String>, ExpandError> {
        ExpandingFSM::new(line, env).make_words()
    }
}

fn is_illegal(ch: char) -> bool {
    matches!(
        ch,
        '|' | '&' | ';' | '<' | '>' | '(' | ')' | '{' | '}' | '\n'
    )
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// One word under construction.
///
/// `text` is the word after quote removal. `pattern` is the same word with
/// quoted glob characters backslash-escaped, ready for pathname expansion.
#[derive(Debug, Default)]
struct WordBuilder {
    text: String,
    pattern: String,
    globbing: bool,
    quoted: bool,
}

impl WordBuilder {
    fn push_unquoted(&mut self, ch: char) {
        self.text.push(ch);
        match ch {
            '*' | '?' | '[' => {
                self.globbing = true;
                self.pattern.push(ch);
            }
            '\\' => self.pattern.push_str("\\\\"),
            c => self.pattern.push(c),
        }
    }

    fn push_quoted(&mut self, ch: char) {
        self.text.push(ch);
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            self.pattern.push('\\');
        }
        self.pattern.push(ch);
    }

    fn push_str(&mut self, s: &str, quoted: bool) {
        for ch in s.chars() {
            if quoted {
                self.push_quoted(ch);
            } else {
                self.push_unquoted(ch);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpandingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct ExpandingFSM<'e> {
    input: Vec<char>,
    pos: usize,
    state: ExpandingState,
    word: WordBuilder,
    fields: Vec<String>,
    env: &'e Environment,
}

impl<'e> ExpandingFSM<'e> {
    fn new(line: &str, env: &'e Environment) -> Self {
        ExpandingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: ExpandingState::Start,
            word: WordBuilder::default(),
            fields: Vec::new(),
            env,
        }
    }

    fn make_words(mut self) -> Result<Vec<String>, ExpandError> {
        while let Some(ch) = self.read_char() {
            match self.state {
                ExpandingState::Start => self.handle_start(ch)?,
                ExpandingState::ReadingWord => self.handle_word(ch)?,
                ExpandingState::ReadingSingleQuote => self.handle_single_quote(ch),
                ExpandingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            ExpandingState::ReadingSingleQuote | ExpandingState::ReadingDoubleQuote => {
                return Err(ExpandError::Syntax("unterminated quote"));
            }
            _ => {}
        }

        self.finish_word();
        Ok(self.fields)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char) -> Result<(), ExpandError> {
        match ch {
            ' ' | '\t' => Ok(()),
            '~' => {
                self.state = ExpandingState::ReadingWord;
                self.expand_tilde();
                Ok(())
            }
            c => {
                self.state = ExpandingState::ReadingWord;
                self.handle_word(c)
            }
        }
    }

    fn handle_word(&mut self, ch: char) -> Result<(), ExpandError> {
        match ch {
            ' ' | '\t' => {
                self.finish_word();
                self.state = ExpandingState::Start;
            }
            '\'' => {
                self.word.quoted = true;
                self.state = ExpandingState::ReadingSingleQuote;
            }
            '"' => {
                self.word.quoted = true;
                self.state = ExpandingState::ReadingDoubleQuote;
            }
            '\\' => match self.read_char() {
                Some('\n') | None => return Err(ExpandError::Syntax("dangling backslash")),
                Some(c) => self.word.push_quoted(c),
            },
            '$' => self.expand_parameter(false)?,
            '`' => return Err(command_substitution()),
            c if is_illegal(c) => return Err(ExpandError::IllegalCharacter(c)),
            c => self.word.push_unquoted(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = ExpandingState::ReadingWord,
            c => self.word.push_quoted(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), ExpandError> {
        match ch {
            '"' => self.state = ExpandingState::ReadingWord,
            '\\' => match self.peek_char() {
                Some(c @ ('$' | '`' | '"' | '\\' | '\n')) => {
                    self.read_char();
                    self.word.push_quoted(c);
                }
                _ => self.word.push_quoted('\\'),
            },
            '$' => self.expand_parameter(true)?,
            '`' => return Err(command_substitution()),
            c => self.word.push_quoted(c),
        }
        Ok(())
    }

    /// Expand the parameter whose `$` was just read.
    fn expand_parameter(&mut self, quoted: bool) -> Result<(), ExpandError> {
        let name = match self.peek_char() {
            Some('{') => {
                self.read_char();
                let mut name = String::new();
                loop {
                    match self.read_char() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(ExpandError::Syntax("unterminated ${")),
                    }
                }
                if !name.starts_with(is_name_start) || !name.chars().all(is_name_char) {
                    return Err(ExpandError::Syntax("bad substitution"));
                }
                name
            }
            Some('(') => return Err(command_substitution()),
            Some(c) if is_name_start(c) => {
                let mut name = String::new();
                while let Some(c) = self.peek_char().filter(|&c| is_name_char(c)) {
                    self.read_char();
                    name.push(c);
                }
                name
            }
            _ => {
                self.word.push_str("$", quoted);
                return Ok(());
            }
        };

        let value = self.env.get_var(&name).unwrap_or_default();
        self.word.push_str(value, quoted);
        Ok(())
    }

    /// Expand `~` or `~user` at the start of a word.
    ///
    /// The login name runs up to the first `/` or blank. Anything fancier
    /// (quotes, `$`) or an unknown user leaves the text unexpanded.
    fn expand_tilde(&mut self) {
        let start = self.pos;
        let mut end = start;
        while let Some(&c) = self.input.get(end) {
            if c == '/' || c == ' ' || c == '\t' {
                break;
            }
            if !(is_name_char(c) || c == '.' || c == '-') {
                self.word.push_unquoted('~');
                return;
            }
            end += 1;
        }

        let login: String = self.input[start..end].iter().collect();
        let home = if login.is_empty() {
            self.env.home_dir()
        } else {
            User::from_name(&login)
                .ok()
                .flatten()
                .map(|user| user.dir.to_string_lossy().into_owned())
        };

        match home {
            Some(home) => {
                self.pos = end;
                self.word.push_str(&home, true);
            }
            None => self.word.push_unquoted('~'),
        }
    }

    /// Close the current word and append its fields.
    fn finish_word(&mut self) {
        let word = std::mem::take(&mut self.word);
        if word.globbing {
            let matches = glob::expand(&word.pattern, &self.env.current_dir);
            if !matches.is_empty() {
                self.fields.extend(matches);
                return;
            }
        }
        // A word that expanded to nothing vanishes unless it was quoted.
        if !word.text.is_empty() || word.quoted {
            self.fields.push(word.text);
        }
    }
}

fn command_substitution() -> ExpandError {
    ExpandError::Other("command substitution is not supported".to_string())
}
