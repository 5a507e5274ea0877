//! CLI utilities for sluice.
//!
//! The utilities present in this module back the interactive `sluice_cli` client: a prompt that
//! reads one line at a time and turns it into a [`Command`].
//!
//! # Overview
//! - `.exit`: close the client and terminate.
//! - `.commit` / `.rollback`: finish or reset the current transaction.
//! - `.batch <n|all>`: change the batch size used by the following queries.
//! - anything else: sent to the server as a query.
//!
//! # Example
//! ```rust
//! use sluice::{BatchSize, Command};
//!
//! let cmd: Command = ".batch 10".try_into().unwrap();
//! assert_eq!(cmd, Command::Batch(BatchSize::Number(10)));
//! ```
use std::io::{BufRead, Write};

use thiserror::Error;

use crate::BatchSize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("input closed")]
    Closed,

    #[error("prompt io error: {0}")]
    Io(String),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`
    Exit,
    /// Commit the open transaction `.commit`
    Commit,
    /// Roll back the open transaction `.rollback`
    Rollback,
    /// Change the batch size of later queries `.batch 10` / `.batch all`
    Batch(BatchSize),
    /// Query text sent as-is to the server
    Query(String),
}

impl TryInto<Command> for &str {
    type Error = CommandError;

    fn try_into(self) -> Result<Command, Self::Error> {
        match self.trim() {
            "" => Err(CommandError::Empty),
            ".exit" => Ok(Command::Exit),
            ".commit" => Ok(Command::Commit),
            ".rollback" => Ok(Command::Rollback),
            s if s.starts_with(".batch") => match s.split_whitespace().nth(1) {
                None => Err(CommandError::InvalidCommandArguments {
                    command: ".batch".to_string(),
                    reason: "requires a batch size or 'all'. Example: .batch 10".to_string(),
                }),
                Some(arg) => parse_batch_size(arg).map(Command::Batch),
            },
            s if s.starts_with('.') => Err(CommandError::UnrecognizedCommand(s.to_string())),
            s => Ok(Command::Query(s.to_string())),
        }
    }
}

/// Parses a batch size argument: a positive integer or `all`.
pub fn parse_batch_size(arg: &str) -> Result<BatchSize, CommandError> {
    match arg {
        "all" => Ok(BatchSize::All),
        n => match n.parse::<u32>() {
            Ok(n) if n > 0 => Ok(BatchSize::Number(n)),
            _ => Err(CommandError::InvalidCommandArguments {
                command: ".batch".to_string(),
                reason: "batch size should be a positive integer or 'all'.".to_string(),
            }),
        },
    }
}

/// Prompt user for a valid command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| CommandError::Io(e.to_string()))?;
    writer.flush().map_err(|e| CommandError::Io(e.to_string()))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Io(e.to_string()))?;
    if read == 0 {
        return Err(CommandError::Closed);
    }

    s.as_str().try_into()
}
