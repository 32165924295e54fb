//! Blocking terminal input on a dedicated thread
//!
//! The line editor is not async. It lives on its own OS thread and reads
//! exactly one line per request, so the prompt only comes back once the
//! previous line has been handled.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Prompt shown before each line
pub const PROMPT: &str = "Enter command: ";

/// Result of one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Line(String),
    /// Operator pressed Ctrl-C
    Interrupted,
    /// Input closed
    Eof,
}

/// Blocking source of operator lines
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> InputLine;

    /// Called once when the worker stops
    fn finish(&mut self) {}
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn read_line(&mut self, prompt: &str) -> InputLine {
        (**self).read_line(prompt)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

/// Line editor with persistent history
pub struct ReadlineSource {
    editor: DefaultEditor,
    history: Option<PathBuf>,
}

impl ReadlineSource {
    pub fn new(history: Option<PathBuf>) -> rustyline::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = history.as_ref().filter(|p| p.exists()) {
            if let Err(e) = editor.load_history(path) {
                warn!("Failed to load history from {}: {}", path.display(), e);
            }
        }
        Ok(Self { editor, history })
    }
}

impl LineSource for ReadlineSource {
    fn read_line(&mut self, prompt: &str) -> InputLine {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                InputLine::Line(line)
            }
            Err(ReadlineError::Interrupted) => InputLine::Interrupted,
            Err(ReadlineError::Eof) => InputLine::Eof,
            Err(e) => {
                error!("Failed to read input: {}", e);
                InputLine::Eof
            }
        }
    }

    fn finish(&mut self) {
        if let Some(path) = &self.history {
            match self.editor.save_history(path) {
                Ok(()) => debug!("History saved to {}", path.display()),
                Err(e) => warn!("Failed to save history to {}: {}", path.display(), e),
            }
        }
    }
}

/// Plain line-buffered stdin, for piped input or when no editor is available
#[derive(Default)]
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self, prompt: &str) -> InputLine {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", prompt);
        let _ = stdout.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => InputLine::Eof,
            Ok(_) => InputLine::Line(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                error!("Failed to read input: {}", e);
                InputLine::Eof
            }
        }
    }
}

/// Open the operator terminal, falling back to plain stdin
pub fn open_terminal(history: Option<PathBuf>) -> Box<dyn LineSource> {
    match ReadlineSource::new(history) {
        Ok(source) => Box::new(source),
        Err(e) => {
            warn!("Line editing not available: {}. Falling back to plain input.", e);
            Box::new(StdinLines)
        }
    }
}

/// Async handle on the input thread
pub struct InputWorker {
    requests: Option<std_mpsc::Sender<()>>,
    lines: mpsc::Receiver<InputLine>,
    thread: Option<JoinHandle<()>>,
}

impl InputWorker {
    /// Start the input thread; `make_source` runs on that thread
    pub fn spawn<S, F>(make_source: F) -> std::io::Result<Self>
    where
        S: LineSource,
        F: FnOnce() -> S + Send + 'static,
    {
        let (request_tx, request_rx) = std_mpsc::channel::<()>();
        let (line_tx, line_rx) = mpsc::channel(1);

        let thread = std::thread::Builder::new()
            .name("terminal-input".into())
            .spawn(move || {
                let mut source = make_source();
                while request_rx.recv().is_ok() {
                    let line = source.read_line(PROMPT);
                    let last = !matches!(line, InputLine::Line(_));
                    if line_tx.blocking_send(line).is_err() || last {
                        break;
                    }
                }
                source.finish();
            })?;

        Ok(Self {
            requests: Some(request_tx),
            lines: line_rx,
            thread: Some(thread),
        })
    }

    /// Read the next line; `Eof` once the thread has stopped
    pub async fn next_line(&mut self) -> InputLine {
        let requested = self
            .requests
            .as_ref()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false);
        if !requested {
            return InputLine::Eof;
        }
        self.lines.recv().await.unwrap_or(InputLine::Eof)
    }

    /// Stop the thread and wait for it to finish its source
    pub async fn close(mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Terminal input thread did not stop cleanly");
            }
        }
    }
}
