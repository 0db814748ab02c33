use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::extract::OutputExtractor;
use crate::predictions::{PredictionStatus, StatusReport};

/// Timing rules for one prediction's poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    /// Polls that use `fast_interval` before switching to `slow_interval`.
    pub fast_poll_limit: u32,
    /// Wall-clock ceiling measured from the start of polling.
    pub timeout: Duration,
    /// Transport failures tolerated in a row before giving up.
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            fast_interval: Duration::from_secs(2),
            slow_interval: Duration::from_secs(5),
            fast_poll_limit: 30,
            timeout: Duration::from_secs(600),
            max_consecutive_errors: 3,
        }
    }
}

impl PollPolicy {
    pub fn delay_after(&self, polls: u32) -> Duration {
        if polls <= self.fast_poll_limit {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("Generation was canceled{}", reason_suffix(.0))]
    Canceled(Option<String>),
    #[error("Generation timed out after {minutes} minutes. The model may be overloaded or the request may be too complex.")]
    TimedOut { minutes: u64 },
    #[error("Generation succeeded but did not return an image URL. Please try again.")]
    NoOutput,
    #[error("Status check failed: {0}")]
    Transport(String),
    #[error("Polling stopped before the prediction finished")]
    Abandoned,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub report: StatusReport,
    pub image_urls: Vec<String>,
    pub polls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Pending,
    Polling,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

/// What the driver should do next.
#[derive(Debug)]
pub enum PollAction {
    Wait(Duration),
    Fetch,
    Finish(Result<PollOutcome, PollError>),
}

/// Pure transition logic; knows nothing about clocks or HTTP.
#[derive(Debug, Clone)]
pub struct PollMachine {
    policy: PollPolicy,
    extractor: OutputExtractor,
    phase: PollPhase,
    polls: u32,
    consecutive_errors: u32,
}

impl PollMachine {
    pub fn new(policy: PollPolicy, extractor: OutputExtractor) -> Self {
        Self {
            policy,
            extractor,
            phase: PollPhase::Pending,
            polls: 0,
            consecutive_errors: 0,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn start(&mut self) -> PollAction {
        self.phase = PollPhase::Pending;
        PollAction::Wait(self.policy.initial_delay)
    }

    /// Called once a wait has elapsed. The ceiling is checked here, before any
    /// request goes out.
    pub fn ready(&mut self, elapsed: Duration) -> PollAction {
        if elapsed > self.policy.timeout {
            self.phase = PollPhase::TimedOut;
            return PollAction::Finish(Err(PollError::TimedOut {
                minutes: self.policy.timeout.as_secs() / 60,
            }));
        }
        self.phase = PollPhase::Polling;
        self.polls += 1;
        PollAction::Fetch
    }

    pub fn observe(&mut self, fetched: Result<StatusReport, String>) -> PollAction {
        let report = match fetched {
            Ok(report) => {
                self.consecutive_errors = 0;
                report
            }
            Err(message) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors > self.policy.max_consecutive_errors {
                    self.phase = PollPhase::Failed;
                    return PollAction::Finish(Err(PollError::Transport(message)));
                }
                tracing::warn!(
                    attempt = self.consecutive_errors,
                    error = %message,
                    "status check failed; retrying"
                );
                return PollAction::Wait(self.policy.delay_after(self.polls));
            }
        };

        match report.status {
            PredictionStatus::Starting | PredictionStatus::Processing => {
                PollAction::Wait(self.policy.delay_after(self.polls))
            }
            PredictionStatus::Succeeded => {
                let image_urls = self.image_urls(&report);
                if image_urls.is_empty() {
                    self.phase = PollPhase::Failed;
                    return PollAction::Finish(Err(PollError::NoOutput));
                }
                self.phase = PollPhase::Succeeded;
                PollAction::Finish(Ok(PollOutcome {
                    report,
                    image_urls,
                    polls: self.polls,
                }))
            }
            PredictionStatus::Failed | PredictionStatus::Error => {
                self.phase = PollPhase::Failed;
                let message = report
                    .error
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                PollAction::Finish(Err(PollError::Failed(message)))
            }
            PredictionStatus::Canceled => {
                self.phase = PollPhase::Canceled;
                let reason = report.error.filter(|message| !message.trim().is_empty());
                PollAction::Finish(Err(PollError::Canceled(reason)))
            }
        }
    }

    /// Server-side enrichment first, then our own pass over `output`.
    fn image_urls(&self, report: &StatusReport) -> Vec<String> {
        if let Some(urls) = report.image_urls.as_ref().filter(|urls| !urls.is_empty()) {
            return urls.clone();
        }
        if let Some(url) = report.image_url.as_ref() {
            return vec![url.clone()];
        }
        self.extractor.extract_all(&report.output)
    }
}

/// Stops further polls. Does not touch the upstream job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`; returns true if canceled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = signal
            .wait_timeout_while(guard, timeout, |canceled| !*canceled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

pub trait Scheduler {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    /// Returns false when `cancel` fired before the delay elapsed.
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemScheduler {
    origin: Instant,
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Scheduler for SystemScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> bool {
        !cancel.wait_timeout(delay)
    }
}

pub trait StatusSource {
    fn fetch_status(&self, id: &str) -> anyhow::Result<StatusReport>;
}

/// Runs the machine to completion with real waits between polls.
pub fn poll_until_done<S, F>(
    id: &str,
    policy: PollPolicy,
    extractor: OutputExtractor,
    scheduler: &S,
    source: &F,
    cancel: &CancelToken,
) -> Result<PollOutcome, PollError>
where
    S: Scheduler + ?Sized,
    F: StatusSource + ?Sized,
{
    let started = scheduler.now();
    let mut machine = PollMachine::new(policy, extractor);
    let mut action = machine.start();
    loop {
        action = match action {
            PollAction::Wait(delay) => {
                if cancel.is_canceled() || !scheduler.sleep(delay, cancel) {
                    tracing::debug!(prediction_id = id, "polling abandoned");
                    return Err(PollError::Abandoned);
                }
                machine.ready(scheduler.now().saturating_sub(started))
            }
            PollAction::Fetch => {
                let fetched = source
                    .fetch_status(id)
                    .map_err(|err| format!("{err:#}"));
                if let Ok(report) = &fetched {
                    tracing::debug!(
                        prediction_id = id,
                        poll = machine.polls(),
                        status = report.status.as_str(),
                        "polled prediction"
                    );
                }
                machine.observe(fetched)
            }
            PollAction::Finish(result) => return result,
        };
    }
}
