//! Bounded polling waits
//!
//! Provider state convergence is observed by polling. Every wait is bounded by a
//! [`WaitConfig`] and ends in one of: the target state, a [`CloudError::UnexpectedState`]
//! (fail fast, never retried) or a [`CloudError::Timeout`].

use crate::error::{CloudError, Result};
use crate::model::{InstanceState, NetworkState};
use crate::provider::{InstanceRecord, VpcRecord};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Timing for a polling wait
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    /// Give up after this much time has elapsed
    pub timeout: Duration,

    /// Delay before the second attempt
    pub initial_interval: Duration,

    /// Upper bound for the delay between attempts
    pub max_interval: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl WaitConfig {
    /// Fixed-interval wait
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            timeout,
            initial_interval: interval,
            max_interval: interval,
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.backoff_multiplier.max(1.0))
            .min(self.max_interval)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(15),
            backoff_multiplier: 1.5,
        }
    }
}

/// Wait timings used by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSettings {
    /// Provider state transitions (VPC available, instance running/terminated)
    pub state: WaitConfig,

    /// SSH reachability after an instance reports running
    pub reachability: WaitConfig,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            state: WaitConfig::default(),
            reachability: WaitConfig {
                timeout: Duration::from_secs(900),
                initial_interval: Duration::from_secs(5),
                max_interval: Duration::from_secs(20),
                backoff_multiplier: 1.5,
            },
        }
    }
}

impl WaitSettings {
    /// Override both timeouts, keeping the intervals
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            state: self.state.with_timeout(timeout),
            reachability: self.reachability.with_timeout(timeout),
        }
    }
}

/// Result of one attempt
#[derive(Debug)]
pub enum Attempt<T> {
    Ready(T),
    /// Not there yet; carries what was observed for the timeout message
    Pending(String),
}

/// Poll `check` until it reports ready, fails, or the timeout elapses
pub async fn wait_until<T, F, Fut>(config: &WaitConfig, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let start = Instant::now();
    let mut interval = config.initial_interval;

    loop {
        let observed = match check().await? {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Pending(observed) => observed,
        };

        let waited = start.elapsed();
        if waited >= config.timeout {
            return Err(CloudError::Timeout {
                what: what.to_string(),
                waited,
                last_observed: observed,
            });
        }

        tracing::debug!("Waiting for {} (observed: {})", what, observed);
        tokio::time::sleep(interval.min(config.timeout - waited)).await;
        interval = config.next_interval(interval);
    }
}

/// A provider record that carries a lifecycle state
pub trait Stateful {
    type State: Copy + PartialEq + Display;

    fn state(&self) -> Self::State;
}

impl Stateful for VpcRecord {
    type State = NetworkState;

    fn state(&self) -> NetworkState {
        self.state
    }
}

impl Stateful for InstanceRecord {
    type State = InstanceState;

    fn state(&self) -> InstanceState {
        self.state
    }
}

/// Poll a resource until it reaches `target`
///
/// `transitional` is the only state tolerated on the way; any other state is an immediate
/// `UnexpectedState`. A resource that vanishes mid-wait is `ResourceNotFound`.
pub async fn wait_for_state<R, F, Fut>(
    config: &WaitConfig,
    resource: &'static str,
    id: &str,
    transitional: R::State,
    target: R::State,
    mut fetch: F,
) -> Result<R>
where
    R: Stateful,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<R>>>,
{
    let what = format!("{} '{}' to become {}", resource, id, target);
    wait_until(config, &what, || {
        let fetched = fetch();
        async move {
            let record = fetched.await?.ok_or_else(|| {
                CloudError::ResourceNotFound(format!("{} '{}' disappeared while waiting", resource, id))
            })?;
            let state = record.state();
            if state == target {
                Ok(Attempt::Ready(record))
            } else if state == transitional {
                Ok(Attempt::Pending(state.to_string()))
            } else {
                Err(CloudError::UnexpectedState {
                    resource,
                    id: id.to_string(),
                    state: state.to_string(),
                    expected: format!("{}, {}", transitional, target),
                })
            }
        }
    })
    .await
}
