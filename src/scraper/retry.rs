//! Retry controller: load a page, classify it, and back off on failures.
//!
//! Two independent exponential tracks:
//!   soft errors (rate limiting, transient render faults)  3s, 6s, 12s … ×10
//!   connectivity errors (timeouts, dead sessions)        30s, 60s … ×5
//! Each track only spends its own budget. `NotFound` ends the loop at once.

use super::browser::PageSession;
use super::classifier::{Classifier, FetchOutcome};
use crate::config::RetryConfig;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub soft_initial: Duration,
    pub soft_max_retries: usize,
    pub connectivity_initial: Duration,
    pub connectivity_max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            soft_initial: Duration::from_secs(cfg.soft_initial_secs),
            soft_max_retries: cfg.soft_max_retries,
            connectivity_initial: Duration::from_secs(cfg.connectivity_initial_secs),
            connectivity_max_retries: cfg.connectivity_max_retries,
        }
    }

    pub fn soft_delays(&self) -> impl Iterator<Item = Duration> + Send {
        doubling(self.soft_initial, self.soft_max_retries)
    }

    pub fn connectivity_delays(&self) -> impl Iterator<Item = Duration> + Send {
        doubling(self.connectivity_initial, self.connectivity_max_retries)
    }
}

/// `initial, 2·initial, 4·initial, …` for `retries` steps.
fn doubling(initial: Duration, retries: usize) -> impl Iterator<Item = Duration> + Send {
    // ExponentialBackoff yields factor·base^n for n = 1, 2, …
    let half_ms = (initial.as_millis() as u64 / 2).max(1);
    ExponentialBackoff::from_millis(2).factor(half_ms).take(retries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Soft,
    Connectivity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    Ready(String),
    /// The page exists and says so: a valid negative result.
    NotFound,
    /// Retries exhausted on one track.
    GaveUp { track: Track, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub state: PageState,
    /// Sleeps taken before the final classification, in order.
    pub backoffs: Vec<(Track, Duration)>,
}

#[cfg(test)]
impl LoadReport {
    pub fn delays(&self, track: Track) -> Vec<Duration> {
        self.backoffs
            .iter()
            .filter(|(t, _)| *t == track)
            .map(|(_, d)| *d)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryController {
    pub policy: RetryPolicy,
    pub classifier: Classifier,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, classifier: Classifier) -> Self {
        Self { policy, classifier }
    }

    /// Drive `session` to `url` until the page is ready, confirmed missing,
    /// or one backoff track runs dry. The session stays open either way.
    pub async fn load(&self, session: &mut dyn PageSession, url: &str, label: &str) -> LoadReport {
        let mut soft = self.policy.soft_delays();
        let mut connectivity = self.policy.connectivity_delays();
        let mut backoffs = Vec::new();

        let first = match session.goto(url).await {
            Ok(()) => session.content().await,
            Err(e) => Err(e),
        };
        let mut outcome = self.classifier.classify(first);

        loop {
            let (track, delay, reason) = match outcome {
                FetchOutcome::Ok(html) => {
                    debug!("{} ready", label);
                    return LoadReport { state: PageState::Ready(html), backoffs };
                }
                FetchOutcome::NotFound => {
                    info!("{} not found", label);
                    return LoadReport { state: PageState::NotFound, backoffs };
                }
                FetchOutcome::SoftError(reason) => (Track::Soft, soft.next(), reason),
                FetchOutcome::ConnectivityError(reason) => {
                    (Track::Connectivity, connectivity.next(), reason)
                }
            };

            let Some(delay) = delay else {
                warn!("{} still failing ({:?}: {}). Skipping, please check later!", label, track, reason);
                return LoadReport { state: PageState::GaveUp { track, reason }, backoffs };
            };

            info!("### {:?} error on {} ({}). Pause {:?} ###", track, label, reason, delay);
            sleep(delay).await;
            backoffs.push((track, delay));

            debug!("Refreshing {}...", label);
            let next = match session.refresh().await {
                Ok(()) => session.content().await,
                Err(e) => Err(e),
            };
            outcome = self.classifier.classify(next);
        }
    }
}
