//! The automation driver capability the engine depends on.
//!
//! Everything the engine does to a page goes through [`Driver`]. The production
//! implementation is [`crate::hands::BrowserSession`]; tests use a scripted mock.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::DriverError;
use crate::types::Locator;

pub trait Driver {
    fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// The element exists in the DOM.
    fn is_present(&self, locator: &Locator) -> Result<bool, DriverError>;

    /// The element exists, is rendered, and is not disabled.
    fn is_interactable(&self, locator: &Locator) -> Result<bool, DriverError>;

    /// Script-driven click, immune to overlays intercepting the pointer.
    fn click(&self, locator: &Locator) -> Result<(), DriverError>;

    fn clear(&self, locator: &Locator) -> Result<(), DriverError>;

    fn send_keys(&self, locator: &Locator, text: &str) -> Result<(), DriverError>;

    /// Choose the option whose `value` attribute equals `value`.
    fn select_by_value(&self, locator: &Locator, value: &str) -> Result<(), DriverError>;

    fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError>;

    fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Owns a driver for the lifetime of one reservation and closes it on every exit path.
pub struct Session<D: Driver> {
    driver: D,
    closed: bool,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            closed: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Close now and report the outcome instead of leaving it to `Drop`.
    pub fn close(mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.driver.close()
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.driver.close() {
            Ok(()) => debug!("browser session closed"),
            Err(e) => warn!(error = %e, "failed to close browser session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;

    #[test]
    fn session_closes_driver_on_drop() {
        let driver = MockDriver::new();
        let log = driver.log();
        {
            let _session = Session::new(driver);
        }
        assert_eq!(log.count("close"), 1);
    }

    #[test]
    fn explicit_close_is_not_repeated_on_drop() {
        let driver = MockDriver::new();
        let log = driver.log();
        Session::new(driver).close().unwrap();
        assert_eq!(log.count("close"), 1);
    }
}
