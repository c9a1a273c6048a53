//! Fixed-window admission gate.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use super::window::TimeWindow;
use crate::error::{ClientError, Result};

/// Mutable window state, only touched while the gate lock is held.
#[derive(Debug)]
struct WindowState {
    /// Admissions granted in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl WindowState {
    fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
    }
}

/// Point-in-time view of a gate's window accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Admissions granted in the current window
    pub count: u64,
    /// Maximum admissions per window
    pub limit: u64,
    /// Admissions still available before the window is exhausted
    pub remaining: u64,
    /// Time until the current window ends
    pub until_reset: Duration,
}

/// Admits at most `limit` callers per fixed window, delaying the rest.
///
/// The whole admission decision, including the wait for the next window,
/// runs under one FIFO-fair async mutex. A caller that has to wait holds
/// the lock while sleeping, so everyone queued behind it re-evaluates the
/// window only after the new one has been opened.
///
/// The gate is meant to be created once per client and shared through an
/// `Arc`.
#[derive(Debug)]
pub struct RateGate {
    limit: u64,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateGate {
    /// Create a gate admitting `limit` callers per `window`.
    ///
    /// Fails with [`ClientError::InvalidConfiguration`] if `limit` is zero
    /// or the window is empty.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(ClientError::InvalidConfiguration(
                "Request limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ClientError::InvalidConfiguration(
                "Rate limit window must be longer than zero".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                window_start: Instant::now(),
            }),
        })
    }

    /// Create a gate for one of the named time windows.
    pub fn per(limit: u64, window: TimeWindow) -> Result<Self> {
        Self::new(limit, window.duration())
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of one window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until one more request fits in the current window and record it.
    ///
    /// Dropping the returned future before it completes grants nothing and
    /// leaves the window state as it was.
    pub async fn admit(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.window_start);
        if elapsed >= self.window {
            trace!(elapsed_ms = elapsed.as_millis() as u64, "Window expired, starting a new one");
            state.reset(now);
        }

        if state.count < self.limit {
            state.count += 1;
            trace!(count = state.count, limit = self.limit, "Admitted");
            return;
        }

        let remaining = self.window - now.duration_since(state.window_start);
        debug!(
            limit = self.limit,
            wait_ms = remaining.as_millis() as u64,
            "Rate limit reached, waiting for the next window"
        );
        sleep(remaining).await;

        // The new window opens when we actually woke up.
        state.reset(Instant::now());
        state.count = 1;
    }

    /// Like [`admit`](Self::admit), but gives up once `cancel` resolves.
    ///
    /// Returns [`ClientError::Cancelled`] without granting an admission if the
    /// signal fires first, including when it is already resolved on entry.
    pub async fn admit_until<F>(&self, cancel: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Admission wait cancelled");
                Err(ClientError::Cancelled)
            }
            _ = self.admit() => Ok(()),
        }
    }

    /// Admit immediately if the current window still has room, never waiting.
    ///
    /// Returns `false` when the window is exhausted or another caller is
    /// currently deciding (or waiting) inside the gate.
    pub fn try_admit(&self) -> bool {
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };

        let now = Instant::now();
        if now.duration_since(state.window_start) >= self.window {
            state.reset(now);
        }

        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Observe the current window accounting without changing it.
    ///
    /// Waits behind any caller currently holding the gate.
    pub async fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock().await;
        let elapsed = state.window_start.elapsed();

        let (count, until_reset) = if elapsed >= self.window {
            (0, Duration::ZERO)
        } else {
            (state.count, self.window - elapsed)
        };

        GateSnapshot {
            count,
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            until_reset,
        }
    }
}
