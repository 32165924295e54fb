//! Operator console: help text and rendering of replies from the core
//!
//! All output goes through one writer so interleaved replies stay whole
//! lines. Colours come from crossterm and honour `NO_COLOR`.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use crossterm::style::Stylize;
use dunebugger_core::types::{CommandReply, GpioPin, LogRecord};
use dunebugger_core::{CommandTable, CoreError, ReplyHandler, ReplyOutcome, Result, Topic};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn, Level};

type Output = Box<dyn Write + Send>;

/// Generate the help text for `commands`
pub fn help_text(commands: &CommandTable) -> String {
    let mut help = String::from("You can ask me to:\n");
    for (keyword, entry) in commands.iter() {
        help.push_str(&format!("    {}: {}\n", keyword, entry.description));
    }
    help.push_str("    <#gpionum or label> on: set gpio status High\n");
    help.push_str("    <#gpionum or label> off: set gpio status Low\n");
    help.push_str("    h, ?: show this help\n");
    help.push_str("    s: show GPIO status\n");
    help.push_str("    t: show dunebugger configuration\n");
    help.push_str("    q, quit, exit: exit the program\n");
    help
}

/// Render a GPIO status table
pub fn format_gpio_status(pins: &[GpioPin]) -> String {
    let mut out = format!("{}\n", "Current GPIO Status:".red());
    for pin in pins {
        let line = format!(
            "Pin {} label: {} mode: {}, state: {}, switch: ",
            pin.pin, pin.label, pin.mode, pin.state
        );
        let line = if pin.state == "ERROR" {
            line.red().to_string()
        } else if pin.mode == "INPUT" {
            line.blue().to_string()
        } else {
            line
        };
        let switch = match pin.state.as_str() {
            "ERROR" => pin.switch.clone().red().to_string(),
            "HIGH" => pin.switch.clone().magenta().to_string(),
            "LOW" => pin.switch.clone().green().to_string(),
            _ => pin.switch.clone(),
        };
        out.push_str(&line);
        out.push_str(&switch);
        out.push('\n');
    }
    out
}

/// Render configuration groups, keeping their order
pub fn format_configuration(groups: &[Map<String, Value>]) -> String {
    let mut out = format!("{}\n", "Current Configuration:".red());
    for group in groups {
        for (key, value) in group {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("{} {}\n", format!("{}:", key).blue(), value));
        }
    }
    out
}

/// Render the outcome of a remote command
pub fn format_command_reply(reply: &CommandReply) -> String {
    let message = reply.message.clone();
    if reply.success {
        return message.green().to_string();
    }
    match reply.level.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("error") => message.red().to_string(),
        Some("warning") | Some("warn") => message.yellow().to_string(),
        _ => message,
    }
}

/// Re-emit a log record from the core through the local subscriber
fn log_remote(record: &LogRecord) -> Level {
    let prefixed = format!("core: {}", record.message).magenta();
    match record.level.to_ascii_uppercase().as_str() {
        "DEBUG" => {
            debug!("{}", prefixed);
            Level::DEBUG
        }
        "INFO" => {
            info!("{}", prefixed);
            Level::INFO
        }
        "WARNING" | "WARN" => {
            warn!("{}", prefixed);
            Level::WARN
        }
        "ERROR" | "CRITICAL" => {
            error!("{}", prefixed);
            Level::ERROR
        }
        _ => {
            info!("{}", format!("{}: core: {}", record.level, record.message).cyan());
            Level::INFO
        }
    }
}

fn is_falsy(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

fn parse<T: serde::de::DeserializeOwned>(topic: &Topic, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| CoreError::Handler(format!("invalid {} payload: {}", topic, e)))
}

/// Operator console shared by the session and the reply router
pub struct Console {
    commands: ArcSwap<CommandTable>,
    help: ArcSwap<String>,
    out: Mutex<Output>,
}

impl Console {
    /// Console printing to stdout
    pub fn new(commands: CommandTable) -> Self {
        Self::with_writer(commands, Box::new(std::io::stdout()))
    }

    pub fn with_writer(commands: CommandTable, out: Output) -> Self {
        let help = help_text(&commands);
        Self {
            commands: ArcSwap::from_pointee(commands),
            help: ArcSwap::from_pointee(help),
            out: Mutex::new(out),
        }
    }

    /// Current command table
    pub fn commands(&self) -> Arc<CommandTable> {
        self.commands.load_full()
    }

    /// Cached help text
    pub fn help(&self) -> Arc<String> {
        self.help.load_full()
    }

    pub fn print_help(&self) {
        let help = self.help();
        self.print(&help);
    }

    /// Install a new command table and regenerate the help text
    pub fn replace_commands(&self, commands: CommandTable) -> usize {
        let count = commands.len();
        self.help.store(Arc::new(help_text(&commands)));
        self.commands.store(Arc::new(commands));
        count
    }

    /// Write `text` followed by a newline
    pub fn print(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            debug!("Console write failed: {}", e);
        }
    }

    /// Render one reply from the core
    pub fn terminal_handle_reply(&self, topic: &Topic, payload: Value) -> Result<ReplyOutcome> {
        if is_falsy(&payload) {
            warn!(topic = %topic, "No reply message received.");
            return Ok(ReplyOutcome::Empty);
        }

        match topic {
            Topic::ShowGpioStatus => {
                let pins: Vec<GpioPin> = parse(topic, payload)?;
                self.print(format_gpio_status(&pins).trim_end());
                Ok(ReplyOutcome::Rendered)
            }
            Topic::ShowConfiguration => {
                let groups: Vec<Map<String, Value>> = parse(topic, payload)?;
                self.print(format_configuration(&groups).trim_end());
                Ok(ReplyOutcome::Rendered)
            }
            Topic::LogMessage => {
                let record: LogRecord = parse(topic, payload)?;
                Ok(ReplyOutcome::Logged(log_remote(&record)))
            }
            Topic::CommandsList => {
                let commands = CommandTable::from_value(payload)?;
                let count = self.replace_commands(commands);
                info!("Command list updated with {} commands", count);
                Ok(ReplyOutcome::CommandsUpdated(count))
            }
            Topic::TerminalCommandReply => {
                let text = match payload {
                    Value::String(text) => text,
                    other => format_command_reply(&parse(topic, other)?),
                };
                self.print(&text);
                Ok(ReplyOutcome::Rendered)
            }
            other => {
                warn!(topic = %other, "Unrecognized reply topic");
                Ok(ReplyOutcome::Unrecognized)
            }
        }
    }
}

#[async_trait]
impl ReplyHandler for Console {
    async fn handle_reply(&self, topic: &Topic, payload: Value) -> Result<ReplyOutcome> {
        self.terminal_handle_reply(topic, payload)
    }
}
