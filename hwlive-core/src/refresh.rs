//! Refresh - Poll a remote object until it reaches a target state
//!
//! Remote APIs are eventually consistent: a freshly created channel may not be
//! listable yet, and switching a channel off takes a while. `StateChangeConf`
//! polls a refresh function until the reported status is one of `target`.

use std::future::Future;
use std::time::Duration;

use log::debug;

/// First backoff step when no fixed poll interval is set
const INITIAL_WAIT: Duration = Duration::from_millis(100);
/// Upper bound of the backoff
const MAX_WAIT: Duration = Duration::from_secs(10);

/// Error ending a wait
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timeout while waiting for state to become '{}' (last state: '{last_state}')", expected.join(", "))]
    Timeout {
        last_state: String,
        expected: Vec<String>,
    },

    #[error("unexpected state '{state}', wanted target '{}'", expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: usize },

    #[error("error refreshing state: {0}")]
    Refresh(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Polling configuration
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// States that keep the wait going
    pub pending: Vec<String>,
    /// States that end the wait successfully. Empty means "gone".
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Fixed interval between refreshes, overriding the backoff
    pub poll_interval: Option<Duration>,
    /// Smallest interval the backoff may use
    pub min_timeout: Duration,
    pub timeout: Duration,
    /// Tolerated consecutive "not found" results
    pub not_found_checks: usize,
    /// Consecutive target hits required to succeed
    pub continuous_target_occurence: usize,
}

impl Default for StateChangeConf {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            target: Vec::new(),
            delay: Duration::ZERO,
            poll_interval: None,
            min_timeout: Duration::ZERO,
            timeout: Duration::from_secs(20 * 60),
            not_found_checks: 20,
            continuous_target_occurence: 1,
        }
    }
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_min_timeout(mut self, min: Duration) -> Self {
        self.min_timeout = min;
        self
    }

    pub fn with_not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurence(mut self, hits: usize) -> Self {
        self.continuous_target_occurence = hits;
        self
    }

    /// Poll `refresh` until a target state is observed
    ///
    /// `refresh` returns the object together with its current status, or
    /// `None` when the object does not exist. With an empty `target`, a
    /// missing object is success and `Ok(None)` is returned.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut last_state = String::new();
        let outcome =
            tokio::time::timeout(self.timeout, self.poll(&mut refresh, &mut last_state)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                last_state,
                expected: self.target.clone(),
            }),
        }
    }

    async fn poll<T, E, F, Fut>(
        &self,
        refresh: &mut F,
        last_state: &mut String,
    ) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let required_hits = self.continuous_target_occurence.max(1);
        let mut wait = INITIAL_WAIT;
        let mut not_found = 0;
        let mut target_hits = 0;

        tokio::time::sleep(self.delay).await;

        loop {
            let refreshed = refresh()
                .await
                .map_err(|e| WaitError::Refresh(e.into()))?;

            match refreshed {
                None => {
                    debug!("refresh: object not found");
                    if self.target.is_empty() {
                        target_hits += 1;
                        if target_hits >= required_hits {
                            return Ok(None);
                        }
                    } else {
                        target_hits = 0;
                        not_found += 1;
                        if not_found > self.not_found_checks {
                            return Err(WaitError::NotFound {
                                checks: self.not_found_checks,
                            });
                        }
                    }
                }
                Some((value, state)) => {
                    debug!("refresh: state is '{}'", state);
                    not_found = 0;
                    *last_state = state.clone();

                    if self.target.contains(&state) {
                        target_hits += 1;
                        if target_hits >= required_hits {
                            return Ok(Some(value));
                        }
                    } else if self.pending.contains(&state) {
                        target_hits = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state,
                            expected: self.target.clone(),
                        });
                    }
                }
            }

            let interval = match self.poll_interval {
                Some(interval) => interval,
                None => {
                    let current = wait.max(self.min_timeout);
                    wait = (wait * 2).min(MAX_WAIT);
                    current
                }
            };
            tokio::time::sleep(interval).await;
        }
    }
}
