//! `MockDriver`: a scripted, in-memory stand-in for a browser page.
//!
//! Elements are declared up front with their behaviour; every driver call is
//! recorded so tests can assert on exactly what the engine did.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::driver::Driver;
use crate::error::DriverError;
use crate::types::Locator;

/// Shared view of the calls a `MockDriver` received, in order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of calls whose entry starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|c| c == entry)
    }
}

/// Behaviour of one element on the fake page.
#[derive(Clone, Default)]
pub struct MockElement {
    present: bool,
    disabled: bool,
    checked: bool,
    options: Vec<String>,
    hidden_while: Option<Locator>,
    removes_on_click: Vec<Locator>,
    inserts_on_click: Vec<Locator>,
    loses_session_on_click: bool,
}

impl MockElement {
    pub fn present() -> Self {
        Self {
            present: true,
            ..Default::default()
        }
    }

    /// Declared but not in the DOM until another element's click inserts it.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn with_options(mut self, values: &[&str]) -> Self {
        self.options = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Not reachable while `blocker` is present, like a target under a modal.
    pub fn hidden_while(mut self, blocker: Locator) -> Self {
        self.hidden_while = Some(blocker);
        self
    }

    pub fn removes_on_click(mut self, target: Locator) -> Self {
        self.removes_on_click.push(target);
        self
    }

    pub fn inserts_on_click(mut self, target: Locator) -> Self {
        self.inserts_on_click.push(target);
        self
    }

    pub fn loses_session_on_click(mut self) -> Self {
        self.loses_session_on_click = true;
        self
    }
}

#[derive(Default)]
struct Page {
    elements: HashMap<Locator, MockElement>,
    session_lost: bool,
}

impl Page {
    fn visible(&self, locator: &Locator) -> bool {
        let Some(el) = self.elements.get(locator) else {
            return false;
        };
        if !el.present {
            return false;
        }
        match &el.hidden_while {
            Some(blocker) => !self.visible(blocker),
            None => true,
        }
    }
}

pub struct MockDriver {
    page: Mutex<Page>,
    log: CallLog,
    fail_screenshots: bool,
    log_probes: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            page: Mutex::new(Page::default()),
            log: CallLog::default(),
            fail_screenshots: false,
            log_probes: false,
        }
    }

    pub fn with_element(self, locator: Locator, element: MockElement) -> Self {
        self.page.lock().unwrap().elements.insert(locator, element);
        self
    }

    pub fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Also record presence and interactability checks as `probe <locator>`.
    pub fn with_probe_log(mut self) -> Self {
        self.log_probes = true;
        self
    }

    fn probed(&self, locator: &Locator) {
        if self.log_probes {
            self.log.push(format!("probe {locator}"));
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Page>, DriverError> {
        let page = self.page.lock().unwrap();
        if page.session_lost {
            return Err(DriverError::SessionLost("mock session gone".into()));
        }
        Ok(page)
    }
}

impl Driver for MockDriver {
    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.guard()?;
        self.log.push(format!("navigate {url}"));
        Ok(())
    }

    fn is_present(&self, locator: &Locator) -> Result<bool, DriverError> {
        let page = self.guard()?;
        self.probed(locator);
        Ok(page.visible(locator))
    }

    fn is_interactable(&self, locator: &Locator) -> Result<bool, DriverError> {
        let page = self.guard()?;
        self.probed(locator);
        Ok(page.visible(locator) && !page.elements[locator].disabled)
    }

    fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        let mut page = self.guard()?;
        if !page.visible(locator) {
            return Err(DriverError::NotFound(locator.clone()));
        }
        self.log.push(format!("click {locator}"));
        let el = page.elements[locator].clone();
        if el.loses_session_on_click {
            page.session_lost = true;
            return Err(DriverError::SessionLost("renderer crashed".into()));
        }
        for target in &el.removes_on_click {
            if let Some(t) = page.elements.get_mut(target) {
                t.present = false;
            }
        }
        for target in &el.inserts_on_click {
            if let Some(t) = page.elements.get_mut(target) {
                t.present = true;
            }
        }
        if let Some(me) = page.elements.get_mut(locator) {
            me.checked = !me.checked;
        }
        Ok(())
    }

    fn clear(&self, locator: &Locator) -> Result<(), DriverError> {
        let page = self.guard()?;
        if !page.visible(locator) {
            return Err(DriverError::NotFound(locator.clone()));
        }
        self.log.push(format!("clear {locator}"));
        Ok(())
    }

    fn send_keys(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let page = self.guard()?;
        if !page.visible(locator) {
            return Err(DriverError::NotFound(locator.clone()));
        }
        self.log.push(format!("send_keys {locator} {text}"));
        Ok(())
    }

    fn select_by_value(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        let page = self.guard()?;
        if !page.visible(locator) {
            return Err(DriverError::NotFound(locator.clone()));
        }
        if !page.elements[locator].options.iter().any(|o| o == value) {
            return Err(DriverError::NoSuchOption {
                locator: locator.clone(),
                value: value.to_string(),
            });
        }
        self.log.push(format!("select {locator} {value}"));
        Ok(())
    }

    fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError> {
        let page = self.guard()?;
        Ok(page.elements.get(locator).is_some_and(|e| e.checked))
    }

    fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.guard()?;
        if self.fail_screenshots {
            return Err(DriverError::Io(std::io::Error::other("disk full")));
        }
        self.log.push(format!("screenshot {}", path.display()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.log.push("close".to_string());
        Ok(())
    }
}
