use std::io;

use thiserror::Error;

/// Failure of a single command line.
///
/// Every variant aborts the line it was raised for; the daemon itself keeps
/// running. `exit` is not an error, see [`crate::Outcome::Exit`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("command \"{0}\" is already registered")]
    Duplicate(String),

    #[error("extending command not supported")]
    NotExtendable,

    #[error("scripts nested deeper than {0} levels")]
    RecursionLimit(usize),

    #[error("subprocess `{command}` failed: {status}")]
    Exec { command: String, status: String },

    #[error("{0} is unavailable")]
    Collaborator(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CommandError {
    pub(crate) fn invalid(command: &str, reason: impl Into<String>) -> Self {
        CommandError::InvalidArguments {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Numeric result code of a failed line.
    pub fn code(&self) -> i32 {
        -1
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device client \"{0}\" is not running")]
    Stopped(String),

    #[error("command queue of device \"{0}\" is full")]
    QueueFull(String),

    #[error("cannot resolve \"{0}\"")]
    Resolve(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("message of {0} bytes exceeds the 255 byte limit")]
    TooLong(usize),

    #[error("channel is full")]
    Full,

    #[error("channel is disconnected")]
    Disconnected,
}
