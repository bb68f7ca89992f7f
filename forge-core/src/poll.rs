//! Bounded readiness polling for remote sandboxes.
//!
//! The retry policy is independent of HTTP: anything implementing
//! [`StatusProbe`] can be polled, which is how the tests drive it with a
//! scripted probe and tokio's paused clock.
//!
//! Transient probe errors are indistinguishable from "not ready yet" until the
//! attempt budget is spent; only the error of the final attempt surfaces.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::field;
use tracing_futures::Instrument;

use crate::cancel::CancelToken;
use crate::error::{CoreResult, ForgeError};
use crate::model::{ContainerStatus, ContainerStatusResponse};
use crate::telemetry::{KEY_ATTEMPT, KEY_OUTCOME, KEY_POD_STATUS};

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay between every attempt.
    Fixed,
    /// `interval * multiplier^(n-1)` after attempt `n`, capped at `max_interval`.
    Exponential {
        multiplier: f64,
        max_interval: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(2_000),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the 1-based attempt `attempt` before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                multiplier,
                max_interval,
            } => {
                let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = self.interval.as_secs_f64() * multiplier.powi(exp);
                Duration::try_from_secs_f64(secs).map_or(*max_interval, |d| d.min(*max_interval))
            }
        }
    }
}

/// Where a wait currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Ready,
    Failed,
    TimedOut,
    Cancelled,
}

/// One status query within a single wait.
#[derive(Debug, Clone, Copy)]
pub struct PollAttempt {
    pub attempt_number: u32,
    pub started_at: Instant,
}

/// Source of container status, usually [`crate::containers::ContainerClient`].
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, app_id: &str) -> CoreResult<ContainerStatusResponse>;
}

type AttemptObserver = Box<dyn FnMut(&PollAttempt, Option<ContainerStatus>) + Send>;

/// Drives one readiness wait according to a [`RetryPolicy`].
pub struct Poller {
    policy: RetryPolicy,
    cancel: CancelToken,
    observer: Option<AttemptObserver>,
    state: PollState,
}

impl Poller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancelToken::new(),
            observer: None,
            state: PollState::Polling,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Called after every attempt with the reported status (`None` when the probe failed).
    pub fn on_attempt(
        mut self,
        f: impl FnMut(&PollAttempt, Option<ContainerStatus>) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until the container is `Running` (Ok), `Failed`, gone, cancelled,
    /// or the attempt budget runs out.
    pub async fn wait<P: StatusProbe + ?Sized>(
        &mut self,
        probe: &P,
        app_id: &str,
    ) -> CoreResult<ContainerStatusResponse> {
        if self.policy.max_attempts == 0 {
            return Err(ForgeError::Validation(
                "max_attempts must be at least 1".into(),
            ));
        }
        self.state = PollState::Polling;
        let span = tracing::info_span!(
            "container.wait",
            "app.id" = %app_id,
            "poll.max_attempts" = self.policy.max_attempts,
            "poll.attempt" = field::Empty,
            "container.status" = field::Empty,
            "outcome" = field::Empty,
        );
        let result = self.run(probe, app_id).instrument(span.clone()).await;
        let outcome = match self.state {
            PollState::Ready => "ready",
            PollState::Failed => "failed",
            PollState::TimedOut => "timed_out",
            PollState::Cancelled => "cancelled",
            PollState::Polling => "polling",
        };
        span.record(KEY_OUTCOME, outcome);
        result
    }

    async fn run<P: StatusProbe + ?Sized>(
        &mut self,
        probe: &P,
        app_id: &str,
    ) -> CoreResult<ContainerStatusResponse> {
        let max = self.policy.max_attempts;
        let cancel = self.cancel.clone();
        let span = tracing::Span::current();
        let mut seen_existing = false;

        for n in 1..=max {
            let attempt = PollAttempt {
                attempt_number: n,
                started_at: Instant::now(),
            };
            span.record(KEY_ATTEMPT, n);
            let last = n == max;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                r = probe.probe(app_id) => r,
            };

            let reported = result.as_ref().ok().map(|s| s.pod_status);
            if let Some(observe) = self.observer.as_mut() {
                observe(&attempt, reported);
            }

            match result {
                Ok(status) if status.success && status.pod_status == ContainerStatus::Running => {
                    span.record(KEY_POD_STATUS, "Running");
                    self.state = PollState::Ready;
                    return Ok(status);
                }
                Ok(status) if status.success && status.pod_status == ContainerStatus::Failed => {
                    span.record(KEY_POD_STATUS, "Failed");
                    self.state = PollState::Failed;
                    return Err(ForgeError::ContainerFailed {
                        app_id: app_id.to_string(),
                    });
                }
                Ok(status) => {
                    if status.success {
                        seen_existing = true;
                    } else if seen_existing && status.is_not_found() {
                        self.state = PollState::Failed;
                        return Err(ForgeError::ContainerGone {
                            app_id: app_id.to_string(),
                        });
                    }
                    tracing::debug!(attempt = n, status = ?status.pod_status, "container not ready");
                }
                Err(e) if last => {
                    tracing::warn!(attempt = n, error = %e, "final status probe failed");
                    self.state = PollState::TimedOut;
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(attempt = n, error = %e, "status probe failed; retrying");
                }
            }

            if !last {
                let delay = self.policy.delay_after(n);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.cancelled(),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.state = PollState::TimedOut;
        Err(ForgeError::ContainerTimeout {
            app_id: app_id.to_string(),
            attempts: max,
        })
    }

    fn cancelled(&mut self) -> CoreResult<ContainerStatusResponse> {
        self.state = PollState::Cancelled;
        Err(ForgeError::Cancelled)
    }
}

/// One-shot helper around [`Poller`].
pub async fn wait_until_ready<P: StatusProbe + ?Sized>(
    probe: &P,
    app_id: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> CoreResult<ContainerStatusResponse> {
    Poller::new(policy.clone())
        .with_cancel(cancel.clone())
        .wait(probe, app_id)
        .await
}
