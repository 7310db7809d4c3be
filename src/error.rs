//! Error types shared across the engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Locator;

/// Failures of the automation driver capability.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no element matches {0}")]
    NotFound(Locator),

    #[error("no option with value '{value}' in {locator}")]
    NoSuchOption { locator: Locator, value: String },

    #[error("page script failed on {locator}: {message}")]
    Script { locator: Locator, message: String },

    /// The browser crashed, disconnected or was closed underneath us.
    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Only a lost session is fatal; everything else is a transient element problem.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionLost(_))
    }
}

/// The reason an action primitive returned `false`.
#[derive(Debug, Error)]
pub enum ActionFailure {
    #[error("{locator} not {condition} after {waited:?}")]
    LocatorTimeout {
        locator: Locator,
        condition: &'static str,
        waited: Duration,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ActionFailure {
    pub fn is_session_loss(&self) -> bool {
        matches!(self, ActionFailure::Driver(e) if e.is_fatal())
    }
}

/// Why a reservation ended without success. Rendered into `ExecutionResult::message`.
#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("step {index} '{name}' failed after dialog recovery and retry: {reason}")]
    LocatorTimeout {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("blocking dialog could not be dismissed after {attempts} attempts")]
    UnexpectedDialog { attempts: u32 },

    #[error("confirmation {locator} not observed within {deadline:?}")]
    ConfirmationTimeout { locator: Locator, deadline: Duration },

    #[error("automation session failed: {0}")]
    SessionFailure(String),

    #[error("reservation exceeded its {0:?} budget")]
    BudgetExhausted(Duration),
}

/// Bad input or configuration, detected before any browser work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid date of birth '{value}', expected DD-MM-YYYY")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("no workflow configured for provider '{0}'")]
    MissingWorkflow(String),

    #[error("invalid entry url for provider '{provider}': {source}")]
    EntryUrl {
        provider: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot read provider catalog {path}: {source}")]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid provider catalog {path}: {source}")]
    CatalogFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems reading a reservation batch file.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot open batch file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("batch file {path}, record {record}: {source}")]
    Record {
        path: PathBuf,
        record: usize,
        #[source]
        source: csv::Error,
    },

    #[error("batch file {path}, record {record}: {source}")]
    Invalid {
        path: PathBuf,
        record: usize,
        #[source]
        source: ConfigError,
    },
}
