//! Error types.
//!
//! Configuration faults are fatal and raised at registration time. Argument
//! failures are ordinary user-input outcomes reported back to the invoker.

use std::path::PathBuf;

use thiserror::Error;

/// A command or parser definition that can never work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Duplicate alias/label: {0}")]
    DuplicateLabel(String),

    #[error("Command \"{label}\" has duplicate aliases/labels with \"{existing}\"")]
    DuplicateAlias { label: String, existing: String },

    #[error("Command \"{parent}\" declares subcommand \"{label}\" more than once")]
    DuplicateSubcommand { parent: String, label: String },

    #[error("Parser for argument type {0} does not exist")]
    UnknownParser(String),

    #[error("Command \"{label}\" uses unregistered handler \"{handler}\"")]
    UnknownHandler { label: String, handler: String },

    #[error("Command \"{label}\" uses unregistered requirement \"{requirement}\"")]
    UnknownRequirement { label: String, requirement: String },

    #[error("Command \"{0}\" declares neither a handler nor a reply")]
    MissingHandler(String),

    #[error("Argument \"{name}\" of \"{label}\" accepts multiple values but has limit 0")]
    ZeroLimit { label: String, name: String },

    #[error("Invalid command manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },
}

/// Why argument resolution stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("Not enough arguments, {required} required")]
    Insufficient { required: usize },

    #[error("Argument {index}: Provided value {piece} is invalid")]
    InvalidPiece { index: usize, piece: String },

    #[error("Argument {index}: Required type {expected}")]
    InvalidValue { index: usize, expected: String },

    /// Configuration fault; normally caught when the command is registered.
    #[error("Parser for argument type {0} does not exist")]
    UnknownParser(String),
}

impl ArgumentError {
    /// `true` for failures caused by what the user typed.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ArgumentError::UnknownParser(_))
    }
}
