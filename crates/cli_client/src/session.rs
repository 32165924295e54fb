//! Interactive operator session

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dunebugger_core::{ConnectionManager, Topic, CORE_RECIPIENT, GET_COMMANDS_LIST};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::console::Console;
use crate::input::{InputLine, InputWorker};

const EXIT_KEYWORDS: [&str; 3] = ["q", "quit", "exit"];
const HELP_KEYWORDS: [&str; 2] = ["h", "?"];

/// What a single command on the input line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand<'a> {
    Exit,
    Help,
    Remote(&'a str),
}

impl<'a> LineCommand<'a> {
    pub fn classify(command: &'a str) -> Self {
        let lower = command.to_lowercase();
        if EXIT_KEYWORDS.contains(&lower.as_str()) {
            LineCommand::Exit
        } else if HELP_KEYWORDS.contains(&lower.as_str()) {
            LineCommand::Help
        } else {
            LineCommand::Remote(command)
        }
    }
}

/// Split an input line on `;`, dropping blank commands
pub fn split_commands(line: &str) -> Vec<&str> {
    line.split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Reads operator lines and turns them into local actions or bus commands
pub struct InteractiveSession {
    manager: Arc<ConnectionManager>,
    console: Arc<Console>,
    running: AtomicBool,
}

impl InteractiveSession {
    pub fn new(manager: Arc<ConnectionManager>, console: Arc<Console>) -> Self {
        Self {
            manager,
            console,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Read and handle lines until the operator exits, input ends or
    /// `interrupt` fires
    pub async fn terminal_listen(&self, input: &mut InputWorker, interrupt: &CancellationToken) {
        self.running.store(true, Ordering::Release);

        while self.is_running() {
            let next = tokio::select! {
                biased;
                _ = interrupt.cancelled() => {
                    debug!("Interrupted, stopping terminal input loop...");
                    break;
                }
                next = input.next_line() => next,
            };
            match next {
                InputLine::Line(line) => {
                    let handled = AssertUnwindSafe(self.handle_line(&line)).catch_unwind().await;
                    if handled.is_err() {
                        error!("Unexpected failure handling {:?}. Exiting.", line);
                        self.stop();
                    }
                }
                InputLine::Interrupted => {
                    debug!("Stopping terminal input loop...");
                    self.stop();
                }
                InputLine::Eof => {
                    info!("EOF encountered - terminal input not available");
                    self.stop();
                }
            }
        }

        self.stop();
    }

    /// Handle one input line, which may hold several `;`-separated commands
    pub async fn handle_line(&self, line: &str) {
        for command in split_commands(line) {
            match LineCommand::classify(command) {
                LineCommand::Exit => {
                    self.stop();
                    self.console.print("Exiting terminal input loop...");
                    break;
                }
                LineCommand::Help => self.console.print_help(),
                LineCommand::Remote(command) => {
                    if !self
                        .manager
                        .dispatch(command, &Topic::TerminalCommand, CORE_RECIPIENT, None)
                        .await
                    {
                        debug!(command, "Command not delivered");
                    }
                }
            }
        }
    }

    /// Ask the core for its command table
    pub async fn request_commands_list(&self) -> bool {
        self.manager
            .dispatch(GET_COMMANDS_LIST, &Topic::TerminalCommand, CORE_RECIPIENT, None)
            .await
    }
}
