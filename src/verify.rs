//! Confirmation that a workflow reached its terminal success state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actions::{Actions, Condition};
use crate::driver::Driver;
use crate::types::{DEFAULT_CONFIRMATION_DEADLINE, Locator, millis};

/// The success signal a provider shows once the boarding pass is on its way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub locator: Locator,
    #[serde(with = "millis", default = "default_deadline")]
    pub deadline: Duration,
}

fn default_deadline() -> Duration {
    DEFAULT_CONFIRMATION_DEADLINE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Success,
    TimedOut,
}

/// Poll for `success` until `deadline` elapses.
///
/// On `TimedOut` the caller is expected to capture the page before reporting.
pub fn verify<D: Driver + ?Sized>(
    actions: &mut Actions<'_, D>,
    success: &Locator,
    deadline: Duration,
) -> Verification {
    if actions.wait_for_condition(success, Condition::Present, deadline) {
        info!(%success, "confirmation observed");
        Verification::Success
    } else {
        warn!(%success, ?deadline, "confirmation not observed");
        Verification::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockElement};

    #[test]
    fn present_signal_verifies() {
        let sent = Locator::xpath("//div[contains(text(), 'enviado')]");
        let driver = MockDriver::new().with_element(sent.clone(), MockElement::present());
        let mut actions = Actions::new(&driver, Duration::from_millis(1));
        assert_eq!(verify(&mut actions, &sent, Duration::from_millis(10)), Verification::Success);
    }

    #[test]
    fn missing_signal_times_out() {
        let sent = Locator::xpath("//div[contains(text(), 'enviado')]");
        let driver = MockDriver::new();
        let mut actions = Actions::new(&driver, Duration::from_millis(1));
        assert_eq!(verify(&mut actions, &sent, Duration::from_millis(10)), Verification::TimedOut);
    }

    #[test]
    fn deadline_defaults_when_omitted() {
        let parsed: Confirmation = serde_json::from_str(
            r#"{"locator":{"strategy":"css","selector":".sent"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.deadline, DEFAULT_CONFIRMATION_DEADLINE);
    }
}
