//! Bounded-wait action primitives over a single element.
//!
//! Every primitive polls until its condition holds or its timeout elapses and
//! then reports `true`/`false`. Nothing is raised past this boundary: the reason
//! for a `false` is kept in [`Actions::last_failure`] for the caller to inspect.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::driver::Driver;
use crate::error::ActionFailure;
use crate::types::{Action, Locator, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Absent,
    Interactable,
}

impl Condition {
    fn label(&self) -> &'static str {
        match self {
            Condition::Present => "present",
            Condition::Absent => "absent",
            Condition::Interactable => "interactable",
        }
    }
}

pub struct Actions<'a, D: Driver + ?Sized> {
    driver: &'a D,
    poll_interval: Duration,
    budget_deadline: Option<Instant>,
    last_failure: Option<ActionFailure>,
}

impl<'a, D: Driver + ?Sized> Actions<'a, D> {
    pub fn new(driver: &'a D, poll_interval: Duration) -> Self {
        Self {
            driver,
            poll_interval,
            budget_deadline: None,
            last_failure: None,
        }
    }

    /// Cap every wait at `deadline`, the end of the reservation's wall-clock budget.
    pub fn with_budget_deadline(mut self, deadline: Instant) -> Self {
        self.budget_deadline = Some(deadline);
        self
    }

    pub fn budget_exhausted(&self) -> bool {
        self.budget_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn last_failure(&self) -> Option<&ActionFailure> {
        self.last_failure.as_ref()
    }

    pub fn take_failure(&mut self) -> Option<ActionFailure> {
        self.last_failure.take()
    }

    /// Wait until the element is interactable, then click it via script.
    pub fn wait_and_click(&mut self, locator: &Locator, timeout: Duration) -> bool {
        let outcome = self
            .poll(locator, Condition::Interactable, timeout)
            .and_then(|()| Ok(self.driver.click(locator)?));
        self.settle("click", locator, outcome)
    }

    /// Wait for presence, clear the field, then type `value`.
    pub fn wait_and_input(&mut self, locator: &Locator, value: &str, timeout: Duration) -> bool {
        let outcome = self.poll(locator, Condition::Present, timeout).and_then(|()| {
            self.driver.clear(locator)?;
            self.driver.send_keys(locator, value)?;
            Ok(())
        });
        self.settle("input", locator, outcome)
    }

    /// Wait for a select control and choose the option whose value (not label) is `value`.
    pub fn wait_and_select(&mut self, locator: &Locator, value: &str, timeout: Duration) -> bool {
        let outcome = self
            .poll(locator, Condition::Present, timeout)
            .and_then(|()| Ok(self.driver.select_by_value(locator, value)?));
        self.settle("select", locator, outcome)
    }

    /// Wait for a checkbox and click it only if it is not checked already.
    pub fn wait_and_check(&mut self, locator: &Locator, timeout: Duration) -> bool {
        let outcome = self.poll(locator, Condition::Present, timeout).and_then(|()| {
            if !self.driver.is_checked(locator)? {
                self.driver.click(locator)?;
            }
            Ok(())
        });
        self.settle("check", locator, outcome)
    }

    pub fn wait_for_condition(
        &mut self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> bool {
        let outcome = self.poll(locator, condition, timeout);
        self.settle(condition.label(), locator, outcome)
    }

    /// Run the primitive matching the step's action.
    pub fn perform(&mut self, step: &WorkflowStep) -> bool {
        let (locator, timeout) = (&step.locator, step.timeout);
        match &step.action {
            Action::Click => self.wait_and_click(locator, timeout),
            Action::Input(value) => self.wait_and_input(locator, value, timeout),
            Action::SelectByValue(value) => self.wait_and_select(locator, value, timeout),
            Action::EnsureChecked => self.wait_and_check(locator, timeout),
            Action::WaitForPresence => {
                self.wait_for_condition(locator, Condition::Present, timeout)
            }
            Action::WaitForAbsence => self.wait_for_condition(locator, Condition::Absent, timeout),
        }
    }

    fn poll(
        &self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> Result<(), ActionFailure> {
        let started = Instant::now();
        let mut deadline = started + timeout;
        if let Some(budget) = self.budget_deadline {
            deadline = deadline.min(budget);
        }

        loop {
            let probe = match condition {
                Condition::Present => self.driver.is_present(locator),
                Condition::Absent => self.driver.is_present(locator).map(|present| !present),
                Condition::Interactable => self.driver.is_interactable(locator),
            };
            match probe {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => debug!(%locator, error = %e, "transient probe error"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ActionFailure::LocatorTimeout {
                    locator: locator.clone(),
                    condition: condition.label(),
                    waited: now - started,
                });
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn settle(
        &mut self,
        what: &'static str,
        locator: &Locator,
        outcome: Result<(), ActionFailure>,
    ) -> bool {
        match outcome {
            Ok(()) => {
                debug!(action = what, %locator, "ok");
                self.last_failure = None;
                true
            }
            Err(failure) => {
                debug!(action = what, %locator, reason = %failure, "failed");
                self.last_failure = Some(failure);
                false
            }
        }
    }
}
