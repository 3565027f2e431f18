//! Helper utilities for Proxygate
//!
//! Retry policy, timing constants and the driver shared by every
//! background maintenance task.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Retry configuration for operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: u32) -> Self {
        RetryConfig {
            max_retries,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        std::cmp::min(delay, self.max_delay)
    }
}

/// A unit of background maintenance run on a timer
///
/// The delay is asked for before every round so tasks can pick up
/// reconfigured intervals.
#[async_trait]
pub trait PeriodicTask: Send {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// How long to wait before the next round
    async fn next_delay(&self) -> Duration;

    /// Perform one round of work
    async fn run_once(&mut self);
}

/// Drive `task` until `shutdown` fires
///
/// The first round runs after the first delay, not immediately.
pub async fn run_periodic<T>(mut task: T, mut shutdown: broadcast::Receiver<bool>)
where
    T: PeriodicTask,
{
    loop {
        let delay = task.next_delay().await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                debug!("Running periodic task {}", task.name());
                task.run_once().await;
            }
            _ = shutdown.recv() => {
                info!("Stopping periodic task {}", task.name());
                break;
            }
        }
    }
}

/// Spawn [`run_periodic`] onto the runtime
pub fn spawn_periodic<T>(task: T, shutdown: broadcast::Receiver<bool>) -> JoinHandle<()>
where
    T: PeriodicTask + 'static,
{
    tokio::spawn(run_periodic(task, shutdown))
}
