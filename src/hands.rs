use anyhow::Result;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dom::{self, ScriptReply};
use crate::driver::Driver;
use crate::error::DriverError;
use crate::types::Locator;

/// How to start Chrome for one reservation.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub idle_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            window_size: (1366, 900),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// One Chrome process with a throwaway profile, driven through a single tab.
///
/// Dropping the `Browser` kills the Chrome process, so `close` is the only
/// teardown needed.
pub struct BrowserSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &LaunchConfig) -> Result<Self> {
        let path = config.chrome_path.clone().or_else(find_chrome);
        match &path {
            Some(p) => debug!(chrome = %p.display(), "using Chrome executable"),
            None => debug!("no Chrome path configured, letting headless_chrome locate one"),
        }

        let options = LaunchOptions {
            headless: config.headless,
            path,
            window_size: Some(config.window_size),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: config.idle_timeout,
            ..Default::default()
        };

        info!(headless = config.headless, "starting Chrome");
        let browser = Browser::new(options)
            .map_err(|e| anyhow::anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        debug!("Chrome ready");

        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    fn run(&self, script: &str) -> Result<ScriptReply, DriverError> {
        if self.browser.is_none() {
            return Err(DriverError::SessionLost("session already closed".into()));
        }
        let result = self.tab.evaluate(script, false).map_err(lost)?;
        Ok(dom::interpret(result.value))
    }

    fn flag(&self, locator: &Locator, script: String) -> Result<bool, DriverError> {
        match self.run(&script)? {
            ScriptReply::Flag(b) => Ok(b),
            other => Err(unexpected(locator, other)),
        }
    }

    fn command(&self, locator: &Locator, script: String) -> Result<(), DriverError> {
        match self.run(&script)? {
            ScriptReply::Ok => Ok(()),
            ScriptReply::Missing => Err(DriverError::NotFound(locator.clone())),
            other => Err(unexpected(locator, other)),
        }
    }

    fn full_page_clip(&self) -> Option<Viewport> {
        let reply = self.tab.evaluate(dom::PAGE_SIZE_JS, false).ok()?;
        let raw = reply.value?.as_str()?.to_string();
        let [width, height]: [f64; 2] = serde_json::from_str(&raw).ok()?;
        Some(Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        })
    }
}

impl Driver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        info!(%url, "navigating");
        self.tab.navigate_to(url).map_err(lost)?;
        self.tab.wait_until_navigated().map_err(lost)?;
        Ok(())
    }

    fn is_present(&self, locator: &Locator) -> Result<bool, DriverError> {
        self.flag(locator, dom::presence(locator))
    }

    fn is_interactable(&self, locator: &Locator) -> Result<bool, DriverError> {
        self.flag(locator, dom::interactable(locator))
    }

    fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        self.command(locator, dom::click(locator))
    }

    fn clear(&self, locator: &Locator) -> Result<(), DriverError> {
        self.command(locator, dom::clear(locator))
    }

    /// Focus through script, then type real key events so framework bindings notice.
    fn send_keys(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        self.command(locator, dom::focus(locator))?;
        self.tab.type_str(text).map_err(lost)?;
        Ok(())
    }

    fn select_by_value(&self, locator: &Locator, value: &str) -> Result<(), DriverError> {
        match self.run(&dom::select(locator, value))? {
            ScriptReply::Ok => Ok(()),
            ScriptReply::Missing => Err(DriverError::NotFound(locator.clone())),
            ScriptReply::NoOption => Err(DriverError::NoSuchOption {
                locator: locator.clone(),
                value: value.to_string(),
            }),
            other => Err(unexpected(locator, other)),
        }
    }

    fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError> {
        self.flag(locator, dom::checked(locator))
    }

    fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let clip = self.full_page_clip();
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
            .map_err(lost)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, png)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        if let Err(e) = self.tab.close(false) {
            warn!(error = %e, "tab did not close cleanly");
        }
        drop(browser);
        debug!("Chrome stopped");
        Ok(())
    }
}

fn lost(e: anyhow::Error) -> DriverError {
    DriverError::SessionLost(format!("{:#}", e))
}

fn unexpected(locator: &Locator, reply: ScriptReply) -> DriverError {
    let message = match reply {
        ScriptReply::Error(m) => m,
        other => format!("unexpected reply {:?}", other),
    };
    DriverError::Script {
        locator: locator.clone(),
        message,
    }
}

/// Look in the usual install locations when no path is configured.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }
    candidates.into_iter().find(|p| p.exists())
}
