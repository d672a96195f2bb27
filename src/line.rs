//! Where input lines come from.

use crate::signal;
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyEvent,
    RepeatCount,
};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One read from a [`LineSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A submitted line, without the trailing newline.
    Line(String),
    /// The user interrupted editing; carries the unsubmitted text.
    Interrupted(String),
    /// A line that could not be read, such as bytes that are not UTF-8.
    /// Carries the diagnostic; the following lines are still readable.
    Unreadable(String),
    /// No more input.
    Eof,
}

/// A line editor as seen by the main loop.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent>;

    fn add_history(&mut self, line: &str) -> Result<()>;

    /// Forget any partially edited line so the next read starts clean.
    fn reset(&mut self);
}

type Captured = Arc<Mutex<Option<String>>>;

/// Ctrl-C binding that remembers what was on the line before aborting it.
struct CaptureOnInterrupt {
    captured: Captured,
}

impl ConditionalEventHandler for CaptureOnInterrupt {
    fn handle(&self, _: &Event, _: RepeatCount, _: bool, ctx: &EventContext) -> Option<Cmd> {
        if let Ok(mut slot) = self.captured.lock() {
            *slot = Some(ctx.line().to_owned());
        }
        Some(Cmd::Interrupt)
    }
}

/// [`LineSource`] backed by a rustyline editor with in-memory history.
pub struct EditorSource {
    editor: DefaultEditor,
    captured: Captured,
}

impl EditorSource {
    pub fn new() -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let captured = Captured::default();
        editor.bind_sequence(
            KeyEvent::ctrl('C'),
            EventHandler::Conditional(Box::new(CaptureOnInterrupt {
                captured: Arc::clone(&captured),
            })),
        );
        Ok(Self { editor, captured })
    }

    fn take_captured(&self) -> String {
        self.captured
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or_default()
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
        let result = self.editor.readline(prompt);
        let captured = self.take_captured();
        to_event(result, captured, signal::take_pending)
    }

    fn add_history(&mut self, line: &str) -> Result<()> {
        self.editor.add_history_entry(line)?;
        Ok(())
    }

    /// rustyline starts every `readline` with an empty edit buffer, and
    /// `read_line` has already consumed the captured text, so the only state
    /// left to drop is a capture recorded after that.
    fn reset(&mut self) {
        self.take_captured();
    }
}

/// Translate a rustyline result into a [`LineEvent`].
///
/// `pending` is consulted only for read failures: one that coincides with a
/// delivered SIGINT counts as an interrupt with nothing on the line. Input
/// that does not decode is `Unreadable`; any other failure is fatal.
fn to_event(
    result: Result<String, ReadlineError>,
    captured: String,
    pending: impl FnOnce() -> bool,
) -> Result<LineEvent> {
    match result {
        Ok(line) => Ok(LineEvent::Line(line)),
        Err(ReadlineError::Interrupted) => {
            debug!(pending = %captured, "line interrupted");
            Ok(LineEvent::Interrupted(captured))
        }
        Err(ReadlineError::Eof) => Ok(LineEvent::Eof),
        Err(e) if pending() => {
            debug!(error = %e, "read failed during interrupt");
            Ok(LineEvent::Interrupted(String::new()))
        }
        Err(ReadlineError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            debug!(error = %e, "undecodable input line");
            Ok(LineEvent::Unreadable(e.to_string()))
        }
        Err(ReadlineError::Io(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}
