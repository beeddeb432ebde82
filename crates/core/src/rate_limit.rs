//! Fixed-interval gate for an upstream that throttles bursty callers.
//!
//! Callers run their request inside [`IntervalGate::run`]. Requests are
//! serialized, and each one starts at least `spacing` after the previous
//! one started. The "last start" instant is shared by every clone of the
//! gate, so concurrent network tasks cannot slip requests in side by side.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

#[derive(Clone)]
pub struct IntervalGate {
    spacing: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl IntervalGate {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Run `request` once the gate is free and the spacing has elapsed.
    ///
    /// The gate stays held until `request` completes: at most one request
    /// is in flight per gate.
    pub async fn run<F, T>(&self, request: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.spacing;
            if ready_at > Instant::now() {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "price gate waiting");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        request.await
    }
}
