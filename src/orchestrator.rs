//! Batch driver: reservations in queue order, one at a time.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, info_span, warn, Instrument};

use crate::types::{DEFAULT_COOLDOWN, ExecutionResult, ExecutionStatus, ReservationRequest};

/// Runs one reservation in its own isolated context.
///
/// Implementations never panic across this boundary and never return an
/// error: every outcome, crashes included, is an [`ExecutionResult`].
#[async_trait]
pub trait ReservationRunner: Send + Sync {
    async fn run(&self, request: &ReservationRequest) -> ExecutionResult;
}

pub struct Orchestrator<R> {
    runner: R,
    cooldown: Duration,
}

impl<R: ReservationRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Process `requests` in order and return one result per request, in the same order.
    ///
    /// A successful reservation is followed by the cool-down before the next
    /// one starts; failures move on immediately. Nothing is retried here.
    pub async fn run(&self, requests: &[ReservationRequest]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(requests.len());
        info!(reservations = requests.len(), "starting batch");

        for (position, request) in requests.iter().enumerate() {
            let span = info_span!(
                "reservation",
                position = position + 1,
                of = requests.len(),
                code = %request.reservation_code,
                provider = %request.provider,
            );
            let result = self.runner.run(request).instrument(span).await;

            match result.status {
                ExecutionStatus::Succeeded => {
                    info!(code = %result.reservation_code, message = %result.message, "reservation done")
                }
                status => warn!(
                    code = %result.reservation_code,
                    ?status,
                    message = %result.message,
                    artifact = ?result.diagnostic_artifact,
                    "reservation did not complete"
                ),
            }

            let more_queued = position + 1 < requests.len();
            if result.is_success() && more_queued && !self.cooldown.is_zero() {
                info!(cooldown = ?self.cooldown, "cooling down before the next reservation");
                tokio::time::sleep(self.cooldown).await;
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "batch finished"
        );
        results
    }
}
