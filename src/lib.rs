//! Airline web check-in automation.
//!
//! Each reservation is driven through its airline's check-in flow in a fresh
//! browser session: bounded action primitives, dialog recovery with a single
//! retry per step, and a final confirmation check. Batches run one
//! reservation at a time with a cool-down after every success.

pub mod actions;
pub mod batch;
pub mod config;
pub mod dialog;
pub mod dom;
pub mod driver;
pub mod error;
pub mod executor;
pub mod hands;
pub mod orchestrator;
pub mod providers;
pub mod runner;
pub mod types;
pub mod verify;

#[cfg(test)]
mod mock;

pub use config::{Settings, SettingsArgs};
pub use error::{BatchError, CheckinError, ConfigError, DriverError};
pub use executor::{ExecutorSettings, WorkflowExecutor};
pub use orchestrator::{Orchestrator, ReservationRunner};
pub use providers::{Catalog, Workflow};
pub use runner::{InProcessRunner, ProcessRunner};
pub use types::{DateOfBirth, ExecutionResult, ExecutionStatus, Provider, ReservationRequest};
