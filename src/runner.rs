//! Isolated execution contexts: one fresh browser per reservation.
//!
//! [`ProcessRunner`] starts a child `check-in` process of this binary and reads
//! its result from stdout. [`InProcessRunner`] launches the browser on a
//! blocking worker thread. Either way a hung or crashed session only costs the
//! reservation it belongs to.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::driver::{Driver, Session};
use crate::error::CheckinError;
use crate::executor::WorkflowExecutor;
use crate::hands::{BrowserSession, LaunchConfig};
use crate::orchestrator::ReservationRunner;
use crate::providers::Catalog;
use crate::types::{ExecutionResult, ReservationRequest};

/// Extra time a context gets beyond its own budget before it is torn down from outside.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// File timestamps come from a coarse clock that can trail `SystemTime::now()`.
const MTIME_SLACK: Duration = Duration::from_millis(50);

/// Run one reservation in a fresh browser session. Blocks until it finishes.
pub fn check_in(catalog: &Catalog, settings: &Settings, request: &ReservationRequest) -> ExecutionResult {
    let launch = settings.launch();
    check_in_with(catalog, settings, request, || BrowserSession::launch(&launch))
}

/// Same as [`check_in`], with the driver supplied by `launch`.
pub fn check_in_with<D, F>(
    catalog: &Catalog,
    settings: &Settings,
    request: &ReservationRequest,
    launch: F,
) -> ExecutionResult
where
    D: Driver,
    F: FnOnce() -> anyhow::Result<D>,
{
    let started_at = Utc::now();
    let code = request.reservation_code.as_str();

    let workflow = match catalog.workflow_for(request) {
        Ok(wf) => wf,
        Err(e) => return ExecutionResult::failed(code, request.provider, e.to_string(), started_at),
    };

    let session = match launch() {
        Ok(driver) => Session::new(driver),
        Err(e) => {
            let message = CheckinError::SessionFailure(format!("{:#}", e)).to_string();
            return ExecutionResult::failed(code, request.provider, message, started_at);
        }
    };

    let executor_settings = settings.executor();
    let result = WorkflowExecutor::new(session.driver(), &executor_settings).execute(&workflow, code);

    if let Err(e) = session.close() {
        warn!(reservation = %code, error = %e, "browser session did not close cleanly");
    }
    result
}

/// Runs each reservation as `<program> check-in …` in its own OS process.
///
/// The child gets its own process group so that a teardown also takes down
/// the Chrome it launched.
pub struct ProcessRunner {
    program: PathBuf,
    settings: Settings,
    time_limit: Duration,
}

impl ProcessRunner {
    pub fn new(program: PathBuf, settings: Settings) -> Self {
        let time_limit = settings.budget + TEARDOWN_GRACE;
        Self {
            program,
            settings,
            time_limit,
        }
    }

    /// Re-invoke the running executable.
    pub fn current_exe(settings: Settings) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, settings))
    }

    /// Hard limit after which the child is killed. Defaults to the budget plus a grace period.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Values are attached to their flags so one starting with `-` is not read as a flag.
    fn args(&self, request: &ReservationRequest) -> Vec<String> {
        let mut args = vec!["check-in".to_string()];
        args.extend(self.settings.child_args());
        args.extend([
            format!("--provider={}", request.provider),
            format!("--last-name={}", request.last_name),
            format!("--reservation-code={}", request.reservation_code),
            format!("--email={}", request.email),
            format!("--date-of-birth={}", request.date_of_birth),
        ]);
        args
    }

    /// The screenshot the child left behind for this reservation, if it wrote one after `since`.
    ///
    /// An older file with the same name belongs to an earlier attempt and is ignored.
    fn leftover_artifact(&self, request: &ReservationRequest, since: SystemTime) -> Option<PathBuf> {
        let path = self
            .settings
            .artifact_dir
            .join(format!("error_{}.png", request.reservation_code));
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let cutoff = since.checked_sub(MTIME_SLACK).unwrap_or(since);
        if modified >= cutoff {
            Some(path)
        } else {
            debug!(artifact = %path.display(), "ignoring screenshot from an earlier attempt");
            None
        }
    }
}

#[async_trait]
impl ReservationRunner for ProcessRunner {
    async fn run(&self, request: &ReservationRequest) -> ExecutionResult {
        let started_at = Utc::now();
        let spawned_at = SystemTime::now();
        let code = request.reservation_code.as_str();

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                let message =
                    CheckinError::SessionFailure(format!("could not start check-in process: {e}"))
                        .to_string();
                return ExecutionResult::failed(code, request.provider, message, started_at);
            }
        };
        let pid = child.id();
        debug!(reservation = %code, ?pid, "check-in process started");

        let limit = self.time_limit;
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            // Dropping the wait future drops the child, and kill_on_drop reaps it.
            Err(_) => {
                kill_process_group(pid);
                warn!(reservation = %code, ?limit, "check-in process killed after exceeding its budget");
                ExecutionResult::timed_out(
                    code,
                    request.provider,
                    CheckinError::BudgetExhausted(limit).to_string(),
                    started_at,
                )
                .with_artifact(self.leftover_artifact(request, spawned_at))
            }
            Ok(Err(e)) => {
                kill_process_group(pid);
                let message = CheckinError::SessionFailure(e.to_string()).to_string();
                ExecutionResult::failed(code, request.provider, message, started_at)
            }
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match parse_child_result(&stdout) {
                    Some(result) if result.reservation_code == code => result,
                    _ => {
                        // A child that died early may have left its browser behind.
                        kill_process_group(pid);
                        let message = CheckinError::SessionFailure(format!(
                            "check-in process exited with {} without reporting a result",
                            output.status
                        ))
                        .to_string();
                        ExecutionResult::failed(code, request.provider, message, started_at)
                            .with_artifact(self.leftover_artifact(request, spawned_at))
                    }
                }
            }
        }
    }
}

/// SIGKILL everything left in the child's process group, Chrome included.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. ESRCH just means the group is already gone.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!(pgid, "killed check-in process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// The child prints its result as the last JSON line on stdout.
pub fn parse_child_result(stdout: &str) -> Option<ExecutionResult> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

type Launcher<D> = Arc<dyn Fn(&LaunchConfig) -> anyhow::Result<D> + Send + Sync>;

/// Runs each reservation with a fresh browser on a blocking worker thread.
pub struct InProcessRunner<D = BrowserSession> {
    catalog: Arc<Catalog>,
    settings: Settings,
    launch: Launcher<D>,
    time_limit: Duration,
}

impl InProcessRunner<BrowserSession> {
    pub fn new(catalog: Catalog, settings: Settings) -> Self {
        Self::with_launcher(catalog, settings, BrowserSession::launch)
    }
}

impl<D: Driver + 'static> InProcessRunner<D> {
    /// Same runner, with each session's driver coming from `launch`.
    pub fn with_launcher<F>(catalog: Catalog, settings: Settings, launch: F) -> Self
    where
        F: Fn(&LaunchConfig) -> anyhow::Result<D> + Send + Sync + 'static,
    {
        let time_limit = settings.budget + TEARDOWN_GRACE;
        Self {
            catalog: Arc::new(catalog),
            settings,
            launch: Arc::new(launch),
            time_limit,
        }
    }

    /// Hard limit after which the worker is abandoned. Defaults to the budget plus a grace period.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }
}

#[async_trait]
impl<D: Driver + 'static> ReservationRunner for InProcessRunner<D> {
    async fn run(&self, request: &ReservationRequest) -> ExecutionResult {
        let started_at = Utc::now();
        let catalog = Arc::clone(&self.catalog);
        let launch = Arc::clone(&self.launch);
        let settings = self.settings.clone();
        let owned = request.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let config = settings.launch();
            check_in_with(&catalog, &settings, &owned, || (*launch)(&config))
        });

        let limit = self.time_limit;
        match tokio::time::timeout(limit, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let message =
                    CheckinError::SessionFailure(format!("check-in worker panicked: {e}")).to_string();
                ExecutionResult::failed(&request.reservation_code, request.provider, message, started_at)
            }
            // The worker stops at its own budget deadline and closes its session then.
            Err(_) => {
                warn!(reservation = %request.reservation_code, ?limit, "abandoning check-in worker");
                ExecutionResult::timed_out(
                    &request.reservation_code,
                    request.provider,
                    CheckinError::BudgetExhausted(limit).to_string(),
                    started_at,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockElement};
    use crate::providers::{ActionTemplate, StepTemplate, WorkflowTemplate};
    use crate::types::{DateOfBirth, ExecutionStatus, Locator, Provider};
    use crate::verify::Confirmation;

    fn request() -> ReservationRequest {
        ReservationRequest::new(
            "Garcia",
            "QWE456",
            "pax@example.com",
            DateOfBirth::parse("01-12-1985").unwrap(),
            Provider::Volaris,
        )
    }

    fn tiny_catalog() -> Catalog {
        Catalog::default().with_workflow(
            Provider::Volaris,
            WorkflowTemplate {
                entry_url: "https://volaris.test/".into(),
                entry_params: Vec::new(),
                steps: vec![StepTemplate {
                    name: "go".into(),
                    locator: Locator::css("#go"),
                    action: ActionTemplate::Click,
                    timeout: Duration::from_millis(20),
                    optional: false,
                }],
                dialog: None,
                confirmation: Confirmation {
                    locator: Locator::css(".sent"),
                    deadline: Duration::from_millis(20),
                },
                already_completed: None,
            },
        )
    }

    fn fast_settings() -> Settings {
        Settings {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn session_is_closed_after_success() {
        let driver = MockDriver::new()
            .with_element(Locator::css("#go"), MockElement::present())
            .with_element(Locator::css(".sent"), MockElement::present());
        let log = driver.log();

        let result = check_in_with(&tiny_catalog(), &fast_settings(), &request(), || Ok(driver));

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(log.count("close"), 1);
    }

    #[test]
    fn session_is_closed_after_failure() {
        let driver = MockDriver::new();
        let log = driver.log();

        let result = check_in_with(&tiny_catalog(), &fast_settings(), &request(), || Ok(driver));

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(log.count("close"), 1);
    }

    #[test]
    fn launch_failure_is_a_session_failure() {
        let result = check_in_with::<MockDriver, _>(&tiny_catalog(), &fast_settings(), &request(), || {
            anyhow::bail!("Chrome executable not found")
        });

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.message.contains("Chrome executable not found"));
    }

    #[test]
    fn missing_workflow_fails_before_launch() {
        let mut launched = false;
        let result = check_in_with(&Catalog::default(), &fast_settings(), &request(), || {
            launched = true;
            Ok(MockDriver::new())
        });

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(!launched);
    }

    #[test]
    fn child_result_is_read_from_last_stdout_line() {
        let result = ExecutionResult::succeeded("QWE456", Provider::Volaris, "boarding pass sent", Utc::now());
        let stdout = format!("noise\n{}\n\n", serde_json::to_string(&result).unwrap());
        assert_eq!(parse_child_result(&stdout), Some(result));
        assert_eq!(parse_child_result("panic: something\n"), None);
    }

    #[derive(clap::Parser)]
    struct ChildCli {
        #[command(flatten)]
        settings: crate::config::SettingsArgs,
        #[command(subcommand)]
        command: ChildCommand,
    }

    #[derive(clap::Subcommand)]
    enum ChildCommand {
        CheckIn {
            #[arg(long)]
            provider: Provider,
            #[arg(long)]
            last_name: String,
            #[arg(long)]
            reservation_code: String,
            #[arg(long)]
            email: String,
            #[arg(long)]
            date_of_birth: DateOfBirth,
        },
    }

    #[test]
    fn child_arguments_carry_the_request() {
        let runner = ProcessRunner::new(PathBuf::from("autocheckin"), Settings::default());
        let args = runner.args(&request());
        assert_eq!(args[0], "check-in");
        assert!(args.contains(&"--provider=volaris".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--date-of-birth=01-12-1985"));
    }

    #[test]
    fn dash_prefixed_values_reach_the_child_intact() {
        let mut odd = request();
        odd.last_name = "-Garcia".into();
        odd.reservation_code = "--QWE456".into();
        let runner = ProcessRunner::new(PathBuf::from("autocheckin"), Settings::default());

        let argv = std::iter::once("autocheckin".to_string()).chain(runner.args(&odd));
        let parsed = <ChildCli as clap::Parser>::try_parse_from(argv).unwrap();

        let ChildCommand::CheckIn {
            provider,
            last_name,
            reservation_code,
            email,
            date_of_birth,
        } = parsed.command;
        assert_eq!(
            ReservationRequest::new(last_name, reservation_code, email, date_of_birth, provider),
            odd
        );
    }

    #[tokio::test]
    async fn missing_program_yields_a_failed_result() {
        let runner = ProcessRunner::new(
            PathBuf::from("/nonexistent/autocheckin-binary"),
            Settings::default(),
        );
        let result = runner.run(&request()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.reservation_code, "QWE456");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn screenshot_from_an_earlier_attempt_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("error_QWE456.png");
        std::fs::write(&stale, b"old png").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        let settings = Settings {
            artifact_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let result = ProcessRunner::new(PathBuf::from("/bin/true"), settings)
            .run(&request())
            .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.message.contains("without reporting a result"));
        assert_eq!(result.diagnostic_artifact, None);
        assert!(stale.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_child_is_killed_and_times_out_with_its_screenshot() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("error_QWE456.png");
        let script = dir.path().join("hang.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\n: > '{}'\nsleep 30\n", artifact.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let settings = Settings {
            artifact_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = ProcessRunner::new(script, settings).with_time_limit(Duration::from_millis(500));

        let began = std::time::Instant::now();
        let result = runner.run(&request()).await;

        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert!(result.message.contains("budget"));
        assert_eq!(result.diagnostic_artifact, Some(artifact));
        assert!(began.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn in_process_runner_uses_a_fresh_driver() {
        let runner = InProcessRunner::with_launcher(tiny_catalog(), fast_settings(), |_: &LaunchConfig| {
            Ok(MockDriver::new()
                .with_element(Locator::css("#go"), MockElement::present())
                .with_element(Locator::css(".sent"), MockElement::present()))
        });

        let result = runner.run(&request()).await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn hung_in_process_worker_is_abandoned_as_timed_out() {
        let runner = InProcessRunner::with_launcher(tiny_catalog(), fast_settings(), |_: &LaunchConfig| {
            // Chrome that never finishes starting.
            std::thread::sleep(Duration::from_millis(300));
            Ok(MockDriver::new())
        })
        .with_time_limit(Duration::from_millis(20));

        let result = runner.run(&request()).await;

        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert_eq!(result.reservation_code, "QWE456");
        assert!(result.message.contains("budget"));
    }
}
