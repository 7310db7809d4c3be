//! Workflow execution for a single reservation.
//!
//! `WorkflowExecutor` walks the ordered steps of a bound [`Workflow`] as a
//! small state machine:
//!
//! ```text
//! Pending → Running(i) → Running(i+1) … → Verifying → Succeeded
//!              │  ▲
//!              ▼  │ (retry once)
//!           Recovering ──→ Failed
//! ```
//!
//! A non-optional step that fails gets one dialog recovery and one retry.
//! Every path ends in exactly one [`ExecutionResult`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, warn};

use crate::actions::Actions;
use crate::dialog::{self, Recovery, RecoveryPolicy};
use crate::driver::Driver;
use crate::error::{ActionFailure, CheckinError};
use crate::providers::Workflow;
use crate::types::{DEFAULT_POLL_INTERVAL, DEFAULT_RESERVATION_BUDGET, ExecutionResult};
use crate::verify::{self, Verification};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub poll_interval: Duration,
    /// Wall-clock budget for the whole reservation.
    pub budget: Duration,
    pub artifact_dir: PathBuf,
    pub recovery: RecoveryPolicy,
    /// How long to look for an "already checked in" marker after landing.
    pub marker_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            budget: DEFAULT_RESERVATION_BUDGET,
            artifact_dir: PathBuf::from("."),
            recovery: RecoveryPolicy::default(),
            marker_timeout: Duration::from_secs(5),
        }
    }
}

enum State {
    Pending,
    Running { index: usize, retried: bool },
    Recovering { index: usize },
    Verifying,
    Finished(ExecutionResult),
}

pub struct WorkflowExecutor<'a, D: Driver + ?Sized> {
    driver: &'a D,
    settings: &'a ExecutorSettings,
}

impl<'a, D: Driver + ?Sized> WorkflowExecutor<'a, D> {
    pub fn new(driver: &'a D, settings: &'a ExecutorSettings) -> Self {
        Self { driver, settings }
    }

    pub fn execute(&self, workflow: &Workflow, reservation_code: &str) -> ExecutionResult {
        let span = info_span!("checkin", reservation = %reservation_code, provider = %workflow.provider);
        let _enter = span.enter();

        let run = Run {
            workflow,
            code: reservation_code,
            started_at: Utc::now(),
        };
        let mut actions = Actions::new(self.driver, self.settings.poll_interval)
            .with_budget_deadline(Instant::now() + self.settings.budget);

        let mut state = State::Pending;
        loop {
            state = match state {
                State::Pending => self.start(&run, &mut actions),
                State::Running { index, retried } => {
                    self.run_step(&run, &mut actions, index, retried)
                }
                State::Recovering { index } => self.recover(&run, &mut actions, index),
                State::Verifying => self.confirm(&run, &mut actions),
                State::Finished(result) => {
                    if result.is_success() {
                        info!(message = %result.message, "check-in succeeded");
                    } else {
                        error!(status = ?result.status, message = %result.message, "check-in did not succeed");
                    }
                    return result;
                }
            };
        }
    }

    fn start(&self, run: &Run<'_>, actions: &mut Actions<'_, D>) -> State {
        if let Err(e) = self.driver.navigate(&run.workflow.entry_url) {
            let message = CheckinError::SessionFailure(e.to_string()).to_string();
            return State::Finished(
                run.failed(message)
                    .with_artifact(self.capture(format!("error_{}.png", run.code))),
            );
        }

        if let Some(marker) = &run.workflow.already_completed {
            if verify::verify(actions, marker, self.settings.marker_timeout) == Verification::Success
            {
                info!("check-in already completed");
                return State::Finished(run.succeeded("check-in already completed"));
            }
        }

        if run.workflow.steps.is_empty() {
            State::Verifying
        } else {
            State::Running {
                index: 0,
                retried: false,
            }
        }
    }

    fn run_step(
        &self,
        run: &Run<'_>,
        actions: &mut Actions<'_, D>,
        index: usize,
        retried: bool,
    ) -> State {
        if actions.budget_exhausted() {
            return self.budget_exhausted(run);
        }

        let step = &run.workflow.steps[index];
        info!(step = index, name = %step.name, retried, "running step");

        if actions.perform(step) {
            return self.advance(run, index);
        }

        let failure = actions.take_failure();
        if let Some(f) = failure.as_ref().filter(|f| f.is_session_loss()) {
            return self.session_failure(run, f);
        }
        if actions.budget_exhausted() {
            return self.budget_exhausted(run);
        }
        let reason = failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if step.optional {
            warn!(step = index, name = %step.name, %reason, "optional step failed, continuing");
            return self.advance(run, index);
        }
        if !retried {
            warn!(step = index, name = %step.name, %reason, "step failed, attempting recovery");
            return State::Recovering { index };
        }

        let message = CheckinError::LocatorTimeout {
            index,
            name: step.name.clone(),
            reason,
        }
        .to_string();
        State::Finished(
            run.failed(message)
                .with_failed_step(index, step)
                .with_artifact(self.capture(format!("error_{}.png", run.code))),
        )
    }

    fn advance(&self, run: &Run<'_>, index: usize) -> State {
        if index + 1 < run.workflow.steps.len() {
            State::Running {
                index: index + 1,
                retried: false,
            }
        } else {
            State::Verifying
        }
    }

    fn recover(&self, run: &Run<'_>, actions: &mut Actions<'_, D>, index: usize) -> State {
        if let Some(spec) = &run.workflow.dialog {
            if dialog::recover(actions, spec, &self.settings.recovery) == Recovery::Unresolved {
                let unresolved = CheckinError::UnexpectedDialog {
                    attempts: self.settings.recovery.max_attempts,
                };
                warn!(step = index, "{unresolved}; retrying anyway");
            }
        }
        State::Running {
            index,
            retried: true,
        }
    }

    fn confirm(&self, run: &Run<'_>, actions: &mut Actions<'_, D>) -> State {
        let confirmation = &run.workflow.confirmation;
        match verify::verify(actions, &confirmation.locator, confirmation.deadline) {
            Verification::Success => State::Finished(run.succeeded("boarding pass sent")),
            Verification::TimedOut => {
                if let Some(f) = actions.take_failure().filter(|f| f.is_session_loss()) {
                    return self.session_failure(run, &f);
                }
                if actions.budget_exhausted() {
                    return self.budget_exhausted(run);
                }
                let message = CheckinError::ConfirmationTimeout {
                    locator: confirmation.locator.clone(),
                    deadline: confirmation.deadline,
                }
                .to_string();
                State::Finished(
                    run.timed_out(message)
                        .with_artifact(self.capture(format!("error_no_confirmation_{}.png", run.code))),
                )
            }
        }
    }

    fn session_failure(&self, run: &Run<'_>, failure: &ActionFailure) -> State {
        let message = CheckinError::SessionFailure(failure.to_string()).to_string();
        State::Finished(
            run.failed(message)
                .with_artifact(self.capture(format!("error_{}.png", run.code))),
        )
    }

    fn budget_exhausted(&self, run: &Run<'_>) -> State {
        let message = CheckinError::BudgetExhausted(self.settings.budget).to_string();
        State::Finished(
            run.timed_out(message)
                .with_artifact(self.capture(format!("error_{}.png", run.code))),
        )
    }

    /// Screenshot the page for diagnosis. A failed capture is logged, never fatal.
    fn capture(&self, file_name: String) -> Option<PathBuf> {
        let path = self.settings.artifact_dir.join(file_name);
        match self.driver.screenshot(&path) {
            Ok(()) => {
                info!(artifact = %path.display(), "captured diagnostic screenshot");
                Some(path)
            }
            Err(e) => {
                warn!(artifact = %path.display(), error = %e, "could not capture screenshot");
                None
            }
        }
    }
}

struct Run<'w> {
    workflow: &'w Workflow,
    code: &'w str,
    started_at: DateTime<Utc>,
}

impl Run<'_> {
    fn succeeded(&self, message: &str) -> ExecutionResult {
        ExecutionResult::succeeded(self.code, self.workflow.provider, message, self.started_at)
    }

    fn failed(&self, message: String) -> ExecutionResult {
        ExecutionResult::failed(self.code, self.workflow.provider, message, self.started_at)
    }

    fn timed_out(&self, message: String) -> ExecutionResult {
        ExecutionResult::timed_out(self.code, self.workflow.provider, message, self.started_at)
    }
}
