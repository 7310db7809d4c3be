//! Detection and dismissal of interstitial dialogs that block the next step.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{Actions, Condition};
use crate::driver::Driver;
use crate::types::Locator;

/// Where a provider's blocking dialog lives and how to get rid of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSpec {
    pub container: Locator,
    /// Dismissal controls in order of preference: the close control first, then fallbacks.
    pub dismiss: Vec<Locator>,
}

/// What one recovery attempt found on the page. Never kept between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogState {
    pub present: bool,
    pub dismiss_candidates: Vec<Locator>,
}

impl DialogState {
    pub fn detect<D: Driver + ?Sized>(
        actions: &mut Actions<'_, D>,
        spec: &DialogSpec,
        timeout: Duration,
    ) -> Self {
        let present = actions.wait_for_condition(&spec.container, Condition::Present, timeout);
        Self {
            present,
            dismiss_candidates: if present { spec.dismiss.clone() } else { Vec::new() },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    /// How long to look for the dialog before declaring it absent.
    pub detect_timeout: Duration,
    /// Pause after detection so the dialog finishes rendering.
    pub settle: Duration,
    pub candidate_timeout: Duration,
    /// A dismissal only counts once the dialog is gone within this window.
    pub vanish_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            detect_timeout: Duration::from_secs(5),
            settle: Duration::from_secs(2),
            candidate_timeout: Duration::from_secs(5),
            vanish_timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Resolved,
    Unresolved,
}

/// Try to clear a blocking dialog. Returns `Resolved` straight away when none is showing.
pub fn recover<D: Driver + ?Sized>(
    actions: &mut Actions<'_, D>,
    spec: &DialogSpec,
    policy: &RecoveryPolicy,
) -> Recovery {
    for attempt in 1..=policy.max_attempts {
        let state = DialogState::detect(actions, spec, policy.detect_timeout);
        if !state.present {
            if actions.last_failure().is_some_and(|f| f.is_session_loss()) {
                return Recovery::Unresolved;
            }
            debug!(attempt, "no blocking dialog");
            return Recovery::Resolved;
        }

        std::thread::sleep(policy.settle);

        let clicked = state
            .dismiss_candidates
            .iter()
            .find(|candidate| actions.wait_and_click(candidate, policy.candidate_timeout));

        match clicked {
            Some(control) => {
                if actions.wait_for_condition(
                    &spec.container,
                    Condition::Absent,
                    policy.vanish_timeout,
                ) {
                    info!(attempt, %control, "dismissed blocking dialog");
                    return Recovery::Resolved;
                }
                warn!(attempt, %control, "dialog still showing after dismissal click");
            }
            None => warn!(attempt, "no dismissal control resolved"),
        }

        let session_lost = actions.last_failure().is_some_and(|f| f.is_session_loss());
        if session_lost || actions.budget_exhausted() {
            break;
        }
        if attempt < policy.max_attempts {
            std::thread::sleep(policy.backoff);
        }
    }
    Recovery::Unresolved
}
