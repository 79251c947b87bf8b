use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::agent_client::AgentApi;
use crate::progress::{map_into, READINESS_RANGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessResult {
    pub ready: bool,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Polls `/api/status` until it answers or the budget runs out.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    budget: Duration,
    attempt_timeout: Duration,
    retry_delay: Duration,
}

impl ReadinessProbe {
    pub fn new(budget: Duration, attempt_timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            budget,
            attempt_timeout,
            retry_delay,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns within `budget + attempt_timeout + retry_delay` whatever the agent does.
    ///
    /// `on_progress` receives a percentage inside the readiness sub-range before
    /// every attempt.
    pub async fn probe<F>(&self, api: &dyn AgentApi, mut on_progress: F) -> ReadinessResult
    where
        F: FnMut(u8),
    {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            let fraction = if self.budget.is_zero() {
                1.0
            } else {
                (start.elapsed().as_secs_f64() / self.budget.as_secs_f64()).min(1.0)
            };
            on_progress(map_into(READINESS_RANGE, fraction));

            attempts += 1;
            match timeout(self.attempt_timeout, api.status(self.attempt_timeout)).await {
                Ok(Ok(_)) => {
                    let elapsed = start.elapsed();
                    info!(?elapsed, attempts, "agent ready");
                    return ReadinessResult {
                        ready: true,
                        elapsed,
                        attempts,
                    };
                }
                Ok(Err(e)) => debug!(attempts, "agent not ready: {}", e),
                Err(_) => debug!(attempts, "agent status attempt timed out"),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.budget {
                warn!(?elapsed, attempts, "agent did not become ready within budget");
                return ReadinessResult {
                    ready: false,
                    elapsed,
                    attempts,
                };
            }

            sleep(self.retry_delay).await;
        }
    }
}
