//! Recurring fetch of a single subject's state.
//!
//! A [`JobPoller`] fetches immediately on start and then on a fixed interval,
//! without waiting for earlier fetches to resolve. Responses are applied in
//! completion order guarded by a sequence counter, so a slow early response
//! never overwrites a newer one. Stopping (or dropping) the poller cancels the
//! timer and makes every in-flight result inapplicable.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Error,
}

/// Lifecycle of a poller.
///
/// Server-side status values never move a poller out of its cycle; only
/// [`JobPoller::stop`] reaches `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Settled(FetchOutcome),
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    pub phase: PollPhase,
    /// Last successfully fetched value, kept across failed fetches.
    pub latest: Option<T>,
    pub last_error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Sequence number of the most recently issued fetch.
    pub issued: u64,
    /// Sequence number of the fetch that produced `latest`.
    pub applied: u64,
    /// Sequence number of the fetch that produced `last_error`.
    pub failed: u64,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            phase: PollPhase::Idle,
            latest: None,
            last_error: None,
            fetched_at: None,
            issued: 0,
            applied: 0,
            failed: 0,
        }
    }
}

struct PollerShared<T> {
    subject: String,
    state: watch::Sender<PollState<T>>,
    cancel: CancellationToken,
}

/// Handle to a running poll cycle. Dropping it stops the cycle.
pub struct JobPoller<T> {
    shared: Arc<PollerShared<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T> JobPoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Starts polling `subject`. Must be called within a Tokio runtime.
    pub fn start<F, Fut, E>(subject: impl Into<String>, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (state, _) = watch::channel(PollState::default());
        let shared = Arc::new(PollerShared {
            subject: subject.into(),
            state,
            cancel: CancellationToken::new(),
        });

        tracing::debug!("Starting poller for {}", shared.subject);
        let handle = tokio::spawn(run(Arc::clone(&shared), interval.max(MIN_INTERVAL), fetch));
        Self {
            shared,
            handle: Some(handle),
        }
    }

    pub fn subject(&self) -> &str {
        &self.shared.subject
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> PollState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Cancels the timer; in-flight fetches resolve into nothing.
    pub fn stop(&mut self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.shared
            .state
            .send_modify(|state| state.phase = PollPhase::Stopped);
        tracing::debug!("Stopped poller for {}", self.shared.subject);
    }
}

impl<T> Drop for JobPoller<T> {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run<T, F, Fut, E>(shared: Arc<PollerShared<T>>, interval: Duration, fetch: F)
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0_u64;

    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        seq += 1;
        tracing::debug!("Polling {} (seq {})", shared.subject, seq);
        shared.state.send_modify(|state| {
            state.issued = seq;
            if state.phase == PollPhase::Idle {
                state.phase = PollPhase::Polling;
            }
        });

        let future = fetch();
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = shared.cancel.cancelled() => return,
                result = future => result,
            };
            apply(&shared, seq, result);
        });
    }
}

fn apply<T, E: Display>(shared: &PollerShared<T>, seq: u64, result: Result<T, E>) {
    shared.state.send_if_modified(|state| {
        if shared.cancel.is_cancelled() {
            return false;
        }
        match result {
            Ok(value) => {
                if seq <= state.applied {
                    tracing::debug!(
                        "Discarding stale response for {} (seq {} <= {})",
                        shared.subject,
                        seq,
                        state.applied
                    );
                    return false;
                }
                state.latest = Some(value);
                state.applied = seq;
                state.fetched_at = Some(Utc::now());
                // An older success must not hide a newer failure.
                if seq > state.failed {
                    state.last_error = None;
                    state.phase = PollPhase::Settled(FetchOutcome::Success);
                }
            }
            Err(error) => {
                if seq <= state.applied || seq <= state.failed {
                    tracing::debug!(
                        "Discarding stale failure for {} (seq {})",
                        shared.subject,
                        seq
                    );
                    return false;
                }
                tracing::warn!("Polling {} failed: {}", shared.subject, error);
                state.last_error = Some(error.to_string());
                state.failed = seq;
                state.phase = PollPhase::Settled(FetchOutcome::Error);
            }
        }
        true
    });
}
