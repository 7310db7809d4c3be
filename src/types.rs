use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONFIRMATION_DEADLINE: Duration = Duration::from_secs(50);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_RESERVATION_BUDGET: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Date format used by reservation batches and the command line.
pub const DATE_OF_BIRTH_FORMAT: &str = "%d-%m-%Y";

/// Airline whose web check-in flow is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aeromexico,
    Volaris,
    VivaAerobus,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Aeromexico, Provider::Volaris, Provider::VivaAerobus];

    pub fn slug(&self) -> &'static str {
        match self {
            Provider::Aeromexico => "aeromexico",
            Provider::Volaris => "volaris",
            Provider::VivaAerobus => "vivaaerobus",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    /// Accepts names as operators type them: "Viva Aerobus", "VOLARIS", "aeromexico".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Provider::ALL
            .into_iter()
            .find(|p| p.slug() == normalized)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Passenger date of birth, written as `DD-MM-YYYY` everywhere outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOfBirth(NaiveDate);

impl DateOfBirth {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        NaiveDate::parse_from_str(raw.trim(), DATE_OF_BIRTH_FORMAT)
            .map(DateOfBirth)
            .map_err(|source| ConfigError::InvalidDate {
                value: raw.to_string(),
                source,
            })
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl fmt::Display for DateOfBirth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_OF_BIRTH_FORMAT))
    }
}

impl FromStr for DateOfBirth {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateOfBirth::parse(s)
    }
}

impl Serialize for DateOfBirth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateOfBirth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateOfBirth::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One check-in attempt. Never mutated after it is read from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub last_name: String,
    pub reservation_code: String,
    pub email: String,
    pub date_of_birth: DateOfBirth,
    #[serde(alias = "airline")]
    pub provider: Provider,
}

impl ReservationRequest {
    pub fn new(
        last_name: impl Into<String>,
        reservation_code: impl Into<String>,
        email: impl Into<String>,
        date_of_birth: DateOfBirth,
        provider: Provider,
    ) -> Self {
        Self {
            last_name: last_name.into(),
            reservation_code: reservation_code.into(),
            email: email.into(),
            date_of_birth,
            provider,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    Css,
    XPath,
    Name,
    Id,
}

/// A strategy plus selector identifying one element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub selector: String,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::XPath, selector)
    }

    pub fn name(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Name, selector)
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Id, selector)
    }

    fn new(strategy: LocatorStrategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.strategy {
            LocatorStrategy::Css => "css",
            LocatorStrategy::XPath => "xpath",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Id => "id",
        };
        write!(f, "{}={}", prefix, self.selector)
    }
}

/// What to do with the element once it is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Action {
    Click,
    Input(String),
    SelectByValue(String),
    /// Click a checkbox only if it is not checked yet.
    EnsureChecked,
    WaitForPresence,
    WaitForAbsence,
}

/// A single step of a rendered workflow. Order in the workflow is the execution contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    pub name: String,
    pub locator: Locator,
    pub action: Action,
    pub timeout: Duration,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    TimedOut,
}

/// Points back at the step that ended a failed workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub index: usize,
    pub name: String,
}

/// Terminal outcome of one reservation. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub reservation_code: String,
    pub provider: Provider,
    pub status: ExecutionStatus,
    pub failed_step: Option<FailedStep>,
    pub diagnostic_artifact: Option<PathBuf>,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        reservation_code: &str,
        provider: Provider,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::finish(ExecutionStatus::Succeeded, reservation_code, provider, message, started_at)
    }

    pub fn failed(
        reservation_code: &str,
        provider: Provider,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::finish(ExecutionStatus::Failed, reservation_code, provider, message, started_at)
    }

    pub fn timed_out(
        reservation_code: &str,
        provider: Provider,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::finish(ExecutionStatus::TimedOut, reservation_code, provider, message, started_at)
    }

    fn finish(
        status: ExecutionStatus,
        reservation_code: &str,
        provider: Provider,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation_code: reservation_code.to_string(),
            provider,
            status,
            failed_step: None,
            diagnostic_artifact: None,
            message: message.into(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_failed_step(mut self, index: usize, step: &WorkflowStep) -> Self {
        self.failed_step = Some(FailedStep {
            index,
            name: step.name.clone(),
        });
        self
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.diagnostic_artifact = artifact;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Process exit code for a single-reservation run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// (De)serializes a `Duration` as whole milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
