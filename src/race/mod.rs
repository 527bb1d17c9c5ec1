//! Endpoint racing
//!
//! Every endpoint is attempted in its own task. The first successful
//! outcome to arrive wins; arrival order, not input order, decides. When
//! every attempt has failed the race resolves to no winner and the
//! diagnostics hold one outcome per endpoint.
//!
//! ```text
//!   Pending --launch--> Racing --first success--> Won
//!                          |
//!                          +----all completed----> AllFailed
//! ```

mod batch;

pub use batch::test_all;

use crate::common::normalize_https;
use crate::probe::{Endpoint, ProbeErrorKind, ProbeOutcome, Prober};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Anything a race can be run over
pub trait RaceOutcome: Send + 'static {
    fn succeeded(&self) -> bool;

    /// Probe-level view kept in the diagnostics
    fn summary(&self) -> ProbeOutcome;
}

impl RaceOutcome for ProbeOutcome {
    fn succeeded(&self) -> bool {
        self.succeeded
    }

    fn summary(&self) -> ProbeOutcome {
        self.clone()
    }
}

/// Lifecycle of a race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    Pending,
    Racing,
    Won,
    AllFailed,
}

impl std::fmt::Display for RaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceState::Pending => write!(f, "Pending"),
            RaceState::Racing => write!(f, "Racing"),
            RaceState::Won => write!(f, "Won"),
            RaceState::AllFailed => write!(f, "AllFailed"),
        }
    }
}

/// Winning endpoint of a probe race
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceResult {
    pub winner: Endpoint,
    pub elapsed: Duration,
}

impl RaceResult {
    /// Winner address in `https://` form
    pub fn normalized_https(&self) -> String {
        normalize_https(&self.winner.target)
    }
}

/// Outcomes of a race, including attempts still running
pub struct RaceDiagnostics {
    total: usize,
    outcomes: Arc<Mutex<Vec<ProbeOutcome>>>,
    handles: Vec<(Endpoint, JoinHandle<()>)>,
    shared_token: Option<CancellationToken>,
}

impl RaceDiagnostics {
    fn empty() -> Self {
        RaceDiagnostics {
            total: 0,
            outcomes: Arc::new(Mutex::new(Vec::new())),
            handles: Vec::new(),
            shared_token: None,
        }
    }

    /// Number of attempts launched
    pub fn total(&self) -> usize {
        self.total
    }

    /// Outcomes recorded so far, in arrival order
    pub fn snapshot(&self) -> Vec<ProbeOutcome> {
        self.outcomes.lock().clone()
    }

    /// Failed outcomes recorded so far
    pub fn failures(&self) -> Vec<ProbeOutcome> {
        self.outcomes
            .lock()
            .iter()
            .filter(|o| !o.succeeded)
            .cloned()
            .collect()
    }

    /// Whether the shared token told the losers to stop
    pub fn losers_cancelled(&self) -> bool {
        self.shared_token
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Wait for every attempt to finish and return all outcomes
    pub async fn settled(self) -> Vec<ProbeOutcome> {
        for (endpoint, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!("Race task for {} failed: {}", endpoint, e);
                self.outcomes.lock().push(ProbeOutcome::failure(
                    endpoint,
                    Duration::ZERO,
                    ProbeErrorKind::NetworkError(format!("race task failed: {}", e)),
                ));
            }
        }
        let outcomes = self.outcomes.lock().clone();
        outcomes
    }
}

/// Winner (if any) plus diagnostics
pub struct RaceReport<O> {
    pub winner: Option<O>,
    pub diagnostics: RaceDiagnostics,
}

impl<O> RaceReport<O> {
    pub fn state(&self) -> RaceState {
        match (&self.winner, self.diagnostics.total) {
            (Some(_), _) => RaceState::Won,
            (None, 0) => RaceState::Pending,
            (None, _) => RaceState::AllFailed,
        }
    }
}

impl RaceReport<ProbeOutcome> {
    pub fn result(&self) -> Option<RaceResult> {
        self.winner.as_ref().map(|o| RaceResult {
            winner: o.endpoint.clone(),
            elapsed: o.elapsed,
        })
    }
}

/// Race `attempt` over every endpoint
///
/// With `cancel_losers` all attempts share one token, cancelled as soon as
/// a winner is recorded; otherwise each attempt gets its own token and
/// losers run to completion. Returns once a winner is known or every
/// attempt has failed; an empty endpoint list returns immediately.
pub async fn race_with<O, F, Fut>(
    endpoints: Vec<Endpoint>,
    cancel_losers: bool,
    attempt: F,
) -> RaceReport<O>
where
    O: RaceOutcome,
    F: Fn(Endpoint, CancellationToken) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let total = endpoints.len();
    if total == 0 {
        debug!("Race has no endpoints, nothing to launch");
        return RaceReport {
            winner: None,
            diagnostics: RaceDiagnostics::empty(),
        };
    }

    debug!("Race {} -> {} with {} endpoints", RaceState::Pending, RaceState::Racing, total);

    let (tx, rx) = oneshot::channel::<Option<O>>();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let completed = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let shared_token = cancel_losers.then(CancellationToken::new);

    let mut handles = Vec::with_capacity(total);
    for endpoint in endpoints {
        let token = shared_token.clone().unwrap_or_else(CancellationToken::new);
        let attempt_task = tokio::spawn(attempt(endpoint.clone(), token.clone()));
        let label = endpoint.clone();

        let slot = slot.clone();
        let completed = completed.clone();
        let outcomes = outcomes.clone();

        let handle = tokio::spawn(async move {
            let (winner, summary) = match attempt_task.await {
                Ok(outcome) => {
                    let summary = outcome.summary();
                    (outcome.succeeded().then_some(outcome), summary)
                }
                Err(e) => {
                    warn!("Race attempt for {} aborted: {}", endpoint, e);
                    let summary = ProbeOutcome::failure(
                        endpoint,
                        Duration::ZERO,
                        ProbeErrorKind::NetworkError(format!("attempt task failed: {}", e)),
                    );
                    (None, summary)
                }
            };
            debug!("Race attempt finished: {}", summary);
            outcomes.lock().push(summary);

            if let Some(outcome) = winner {
                let winner_slot = slot.lock().take();
                if let Some(tx) = winner_slot {
                    if cancel_losers {
                        token.cancel();
                    }
                    let _ = tx.send(Some(outcome));
                }
            }

            // every attempt counts exactly once, panicked ones included
            if completed.fetch_add(1, Ordering::SeqCst) + 1 == total {
                let remaining = slot.lock().take();
                if let Some(tx) = remaining {
                    let _ = tx.send(None);
                }
            }
        });
        handles.push((label, handle));
    }
    drop(slot);

    // Only reachable as `Err` if the runtime dropped the tasks
    let winner = rx.await.unwrap_or(None);

    let diagnostics = RaceDiagnostics {
        total,
        outcomes,
        handles,
        shared_token,
    };

    if winner.is_some() {
        debug!("Race {} -> {}", RaceState::Racing, RaceState::Won);
    } else {
        debug!("Race {} -> {}", RaceState::Racing, RaceState::AllFailed);
    }

    RaceReport {
        winner,
        diagnostics,
    }
}

/// Race a prober over every endpoint
pub async fn race(
    prober: Arc<dyn Prober>,
    endpoints: Vec<Endpoint>,
    test_path: &str,
    cancel_losers: bool,
) -> RaceReport<ProbeOutcome> {
    let test_path: Arc<str> = Arc::from(test_path);

    let report = race_with(endpoints, cancel_losers, move |endpoint, token| {
        let prober = prober.clone();
        let test_path = test_path.clone();
        async move { prober.probe(&endpoint, &test_path, &token).await }
    })
    .await;

    if let Some(result) = report.result() {
        info!(
            "Selected {} in {}ms",
            result.winner,
            result.elapsed.as_millis()
        );
    }

    report
}
