//! Cooperative time access for the thermal core.
//!
//! The host process runs a shared scheduler that also drives motion and other
//! time-critical work, so nothing in this crate may block the OS thread while
//! waiting. `TimeInterface` is the injected seam: monotonic time in seconds
//! plus a cooperative `pause` that yields back to the runtime.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait TimeInterface: Send + Sync {
    /// Monotonic time in seconds since an arbitrary origin.
    fn monotonic(&self) -> f64;
    /// Yield to the runtime for roughly `seconds`.
    async fn pause(&self, seconds: f64);
}

/// Tokio-backed time source. Under a paused test runtime the clock follows
/// tokio's virtual time, so 1 s cadences run instantly in tests.
#[derive(Debug, Clone)]
pub struct TokioTime {
    origin: tokio::time::Instant,
}

impl TokioTime {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeInterface for TokioTime {
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    async fn pause(&self, seconds: f64) {
        tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
    }
}
