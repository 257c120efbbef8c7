use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Waiting,
    Succeeded,
    Exhausted,
    Cancelled,
}

/// Bookkeeping for one polling sequence. Lives only as long as the loop.
#[derive(Debug, Clone)]
pub struct PollState {
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    phase: PollPhase,
}

impl PollState {
    pub fn new(config: &PollConfig) -> Self {
        let phase = if config.max_attempts == 0 {
            PollPhase::Exhausted
        } else {
            PollPhase::Waiting
        };
        Self {
            attempts_used: 0,
            max_attempts: config.max_attempts,
            interval: config.interval,
            phase,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Records one `fetch` call and returns the phase it leads to.
    pub fn record_attempt(&mut self, found: bool) -> PollPhase {
        if self.phase != PollPhase::Waiting {
            return self.phase;
        }
        self.attempts_used += 1;
        self.phase = if found {
            PollPhase::Succeeded
        } else if self.attempts_used >= self.max_attempts {
            PollPhase::Exhausted
        } else {
            PollPhase::Waiting
        };
        self.phase
    }

    /// Records a `fetch` call that failed. Attempts are counted but the phase is
    /// left to the caller, which ends the sequence.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts_used += 1;
        self.attempts_used
    }

    pub fn cancel(&mut self) {
        if self.phase == PollPhase::Waiting {
            self.phase = PollPhase::Cancelled;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { attempts, .. }
            | PollOutcome::Exhausted { attempts }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// A `fetch` error that ended polling, with the number of calls made including
/// the failed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Calls `fetch` every `config.interval` until it yields a value, `max_attempts`
/// calls have come back empty, or `cancel` fires. The first call happens one
/// interval after start, and calls never overlap.
///
/// An error from `fetch` ends the sequence and is returned with the attempt count.
pub async fn poll_for_result<T, E, F, Fut>(
    mut fetch: F,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome<T>, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut state = PollState::new(config);

    while state.phase() == PollPhase::Waiting {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.cancel();
                break;
            }
            _ = tokio::time::sleep(state.interval) => {}
        }

        let fetched = match fetch().await {
            Ok(fetched) => fetched,
            Err(error) => {
                let attempts = state.record_failure();
                return Err(PollError { error, attempts });
            }
        };
        match fetched {
            Some(value) => {
                state.record_attempt(true);
                debug!("Poll succeeded after {} attempt(s)", state.attempts_used);
                return Ok(PollOutcome::Succeeded {
                    value,
                    attempts: state.attempts_used,
                });
            }
            None => {
                state.record_attempt(false);
                debug!(
                    "Poll attempt {}/{} returned nothing yet",
                    state.attempts_used, state.max_attempts
                );
            }
        }
    }

    let attempts = state.attempts_used;
    Ok(match state.phase() {
        PollPhase::Cancelled => PollOutcome::Cancelled { attempts },
        _ => PollOutcome::Exhausted { attempts },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> PollConfig {
        PollConfig {
            max_attempts,
            interval: Duration::from_millis(3000),
        }
    }

    /// Fetch that returns `value` on call `succeed_on` (1-based), `None` otherwise.
    fn counting_fetch(
        calls: Arc<AtomicU32>,
        succeed_on: Option<u32>,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<&'static str>, Infallible>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok((Some(n) == succeed_on).then_some("done")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_empty_stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poll_for_result(
            counting_fetch(calls.clone(), None),
            &config(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 10 });
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(outcome.into_value().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_on_nth_call_stops_after_n_calls() {
        for n in [1, 3, 10] {
            let calls = Arc::new(AtomicU32::new(0));
            let started = Instant::now();
            let outcome = poll_for_result(
                counting_fetch(calls.clone(), Some(n)),
                &config(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), n);
            assert_eq!(outcome.attempts(), n);
            assert_eq!(outcome.into_value(), Some("done"));
            assert_eq!(started.elapsed(), Duration::from_millis(3000) * n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_never_calls_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poll_for_result(
            counting_fetch(calls.clone(), Some(1)),
            &config(0),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_between_ticks() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(7000)).await;
            trigger.cancel();
        });

        let outcome = poll_for_result(counting_fetch(calls.clone(), None), &config(10), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_ends_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<PollOutcome<()>, PollError<&str>> = poll_for_result(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err("backend down"))
            },
            &config(10),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(
            result,
            Err(PollError {
                error: "backend down",
                attempts: 1
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_reports_attempts_so_far() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<PollOutcome<()>, PollError<&str>> = poll_for_result(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                std::future::ready(if n < 3 { Ok(None) } else { Err("backend down") })
            },
            &config(10),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap_err().attempts, 3);
    }

    #[test]
    fn test_state_transitions() {
        let mut state = PollState::new(&config(2));
        assert_eq!(state.record_attempt(false), PollPhase::Waiting);
        assert_eq!(state.record_attempt(false), PollPhase::Exhausted);
        assert_eq!(state.record_attempt(true), PollPhase::Exhausted);
        assert_eq!(state.attempts_used, 2);
    }
}
