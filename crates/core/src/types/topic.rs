//! Logical message topics
//!
//! The topic is the last segment of a transport subject
//! (`<root>.<client>.<topic>`) and is what inbound routing matches on.

use std::fmt;

/// Topics exchanged with the core device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Version query, answered by the router itself
    GetVersion,
    /// Version query response
    VersionInfo,
    /// Operator command sent to the core
    TerminalCommand,
    /// Result of a terminal command
    TerminalCommandReply,
    /// Fresh command table pushed by the core
    CommandsList,
    ShowGpioStatus,
    ShowConfiguration,
    /// Log line emitted on the core
    LogMessage,
    /// Anything this client does not know about
    Unknown(String),
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::GetVersion => "get_version",
            Topic::VersionInfo => "version_info",
            Topic::TerminalCommand => "terminal_command",
            Topic::TerminalCommandReply => "terminal_command_reply",
            Topic::CommandsList => "commands_list",
            Topic::ShowGpioStatus => "show_gpio_status",
            Topic::ShowConfiguration => "show_configuration",
            Topic::LogMessage => "log_message",
            Topic::Unknown(other) => other,
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        match s {
            "get_version" => Topic::GetVersion,
            "version_info" => Topic::VersionInfo,
            "terminal_command" => Topic::TerminalCommand,
            "terminal_command_reply" => Topic::TerminalCommandReply,
            "commands_list" => Topic::CommandsList,
            "show_gpio_status" => Topic::ShowGpioStatus,
            "show_configuration" => Topic::ShowConfiguration,
            "log_message" => Topic::LogMessage,
            other => Topic::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_topics_parse() {
        assert_eq!(Topic::from("get_version"), Topic::GetVersion);
        assert_eq!(Topic::from("log_message"), Topic::LogMessage);
        assert_eq!(Topic::from("commands_list"), Topic::CommandsList);
    }

    #[test]
    fn test_unknown_topic_keeps_name() {
        let topic = Topic::from("reboot_now");
        assert_eq!(topic, Topic::Unknown("reboot_now".to_string()));
        assert_eq!(topic.as_str(), "reboot_now");
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(Topic::TerminalCommandReply.to_string(), "terminal_command_reply");
        assert_eq!(Topic::from(Topic::ShowGpioStatus.as_str()), Topic::ShowGpioStatus);
    }
}
