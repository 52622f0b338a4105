//! Bounded fan-out / fan-in for per-chain queries.
//!
//! Each task runs under its own timeout and at most `max_concurrency`
//! tasks are in flight. Results come back in input order only after every
//! task has completed or timed out, so a caller that is cancelled mid-way
//! never sees (or merges) a partial result set.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use crate::types::ChainId;

/// Outcome of one per-chain task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Done(T),
    Failed(anyhow::Error),
    TimedOut(Duration),
}

impl<T> TaskOutcome<T> {
    /// Collapse into a `Result`, turning a timeout into an error.
    pub fn into_result(self) -> Result<T> {
        match self {
            TaskOutcome::Done(v) => Ok(v),
            TaskOutcome::Failed(e) => Err(e),
            TaskOutcome::TimedOut(d) => Err(anyhow::anyhow!("timed out after {}ms", d.as_millis())),
        }
    }
}

/// Fan-out configuration owned by the tick driver.
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    pub max_concurrency: usize,
    pub timeout: Duration,
}

impl Default for FanOut {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            timeout: Duration::from_secs(5),
        }
    }
}

impl FanOut {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    /// Run `task` once per chain and collect every outcome, in input order.
    pub async fn run<I, T, F, Fut>(&self, chains: I, task: F) -> Vec<(ChainId, TaskOutcome<T>)>
    where
        I: IntoIterator<Item = ChainId>,
        F: Fn(ChainId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.timeout;
        stream::iter(chains)
            .map(|chain_id| {
                let fut = task(chain_id);
                async move {
                    let outcome = match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(v)) => TaskOutcome::Done(v),
                        Ok(Err(e)) => TaskOutcome::Failed(e),
                        Err(_) => TaskOutcome::TimedOut(timeout),
                    };
                    (chain_id, outcome)
                }
            })
            .buffered(self.max_concurrency.max(1))
            .collect()
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
