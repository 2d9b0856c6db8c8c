// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for live view acquisition loops
//!
//! Every backend runs its acquisition cycle on one background thread owned
//! by a [`CaptureLoopController`]. Cancellation is cooperative: the stop
//! signal is checked between cycles and during pacing sleeps, never in the
//! middle of a cycle, so stopping can lag by up to one in-flight cycle.

use crate::constants::timing::STOP_POLL_INTERVAL;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// ```ignore
/// let mut controller = CaptureLoopController::start("synthetic", Some(period), move || {
///     slot.publish(render_next());
///     LoopAction::Continue
/// });
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    /// Cleared by the thread itself when the loop exits for any reason
    active: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Start a new capture loop in a separate thread
    ///
    /// `loop_fn` runs once per cycle until it returns [`LoopAction::Stop`] or
    /// [`stop`](Self::stop) is called. With `period` set, each cycle starts at
    /// most once per period; without it, cycles run back to back.
    pub fn start<F>(name: &str, period: Option<Duration>, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(true));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_active = Arc::clone(&active);
        let thread_name = name.to_string();

        info!(name = %name, ?period, "Starting capture loop");

        let spawn_result = thread::Builder::new()
            .name(format!("live-{}", name))
            .spawn(move || {
                debug!(name = %thread_name, "Capture loop thread started");

                loop {
                    if thread_stop.load(Ordering::SeqCst) {
                        debug!(name = %thread_name, "Stop signal received");
                        break;
                    }

                    let cycle_start = Instant::now();
                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }

                    if let Some(period) = period {
                        let deadline = cycle_start + period;
                        if !sleep_until(deadline, &thread_stop) {
                            break;
                        }
                    }
                }

                thread_active.store(false, Ordering::SeqCst);
                info!(name = %thread_name, "Capture loop thread exiting");
            });

        let thread_handle = match spawn_result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture loop thread");
                active.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            active,
            name: name.to_string(),
        }
    }

    /// Whether the loop is still cycling and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.stop_signal.load(Ordering::SeqCst)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Returns once the thread has exited, so resources the loop touches may
    /// be released afterwards.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if handle.join().is_err() {
                warn!(name = %self.name, "Capture loop thread panicked");
            }
            self.active.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Sleep until `deadline`, waking early if `stop` is raised
///
/// Returns `false` when interrupted by the stop signal.
fn sleep_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}

/// Consecutive-failure counter for a capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    /// `limit` consecutive failures exhaust the budget; 1 means no retries
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count a failure; returns `true` once the budget is exhausted
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start("test-loop", None, move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start("test-loop", None, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            LoopAction::Continue
        });

        thread::sleep(Duration::from_millis(50));
        assert!(controller.is_running());

        controller.stop();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_period_paces_cycles() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start(
            "test-paced",
            Some(Duration::from_millis(100)),
            move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            },
        );

        thread::sleep(Duration::from_millis(250));
        controller.stop();

        let cycles = counter.load(Ordering::SeqCst);
        assert!((1..=4).contains(&cycles), "ran {} cycles", cycles);
    }

    #[test]
    fn test_stop_interrupts_pacing_sleep() {
        let mut controller =
            CaptureLoopController::start("test-long-period", Some(Duration::from_secs(30)), || {
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_failure_budget() {
        let mut budget = FailureBudget::new(3);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        budget.record_success();
        assert_eq!(budget.consecutive_failures(), 0);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
    }

    #[test]
    fn test_zero_budget_means_single_failure() {
        let mut budget = FailureBudget::new(0);
        assert_eq!(budget.limit(), 1);
        assert!(budget.record_failure());
    }
}
