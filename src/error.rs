//! error.rs
//! Error taxonomy for the harness.
//!
//! Every failure that reaches the console (or a test runner) is a [`HarnessError`]:
//! one human-readable message plus an [`ErrorKind`] discriminator.
//! - **Validation:** malformed or out-of-domain user input; nothing is committed.
//! - **Precondition:** lifecycle transition attempted from an illegal state; no state change.
//! - **Bind:** a script failed to bind; the previous function stays in its slot.
//! - **SchedulerFault:** a tick failed; the loop is stopped and the fault reported.

use std::fmt;
use thiserror::Error;

use crate::control::lifecycle::ControllerState;

/// Discriminator shown next to the message when an error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Precondition,
    Bind,
    SchedulerFault,
    Config,
    Export,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Precondition => "PreconditionError",
            ErrorKind::Bind => "BindError",
            ErrorKind::SchedulerFault => "SchedulerFault",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Export => "ExportError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User input rejected by a validation rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// A lifecycle transition was requested from a state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {operation} while {state}: {reason}.")]
pub struct PreconditionError {
    pub operation: &'static str,
    pub state: ControllerState,
    pub reason: String,
}

impl PreconditionError {
    pub fn new(operation: &'static str, state: ControllerState, reason: impl Into<String>) -> Self {
        Self { operation, state, reason: reason.into() }
    }
}

/// A script could not be bound into a function slot. The message comes from the binder
/// and is surfaced verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BindError {
    pub slot: &'static str,
    pub message: String,
}

impl BindError {
    pub fn new(slot: &'static str, message: impl Into<String>) -> Self {
        Self { slot, message: message.into() }
    }
}

/// A tick failed while the scheduler was running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Signal calculation stopped at tick {tick}: {message}")]
pub struct SchedulerFault {
    pub tick: u64,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Top-level error for every harness operation.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    SchedulerFault(#[from] SchedulerFault),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Validation(_) => ErrorKind::Validation,
            HarnessError::Precondition(_) => ErrorKind::Precondition,
            HarnessError::Bind(_) => ErrorKind::Bind,
            HarnessError::SchedulerFault(_) => ErrorKind::SchedulerFault,
            HarnessError::Config(_) => ErrorKind::Config,
            HarnessError::Export(_) => ErrorKind::Export,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
