// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Post-download verification.
//!
//! A download going idle is not proof the title is done: an install phase
//! often follows, and launchers queue the next download a moment later. The
//! engine therefore wants `required` consecutive idle polls inside a
//! bounded window before it lets the shutdown proceed. Any activity sends
//! the session back to monitoring and starts the count over.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::monitor::{pause, DownloadMonitor};
use crate::notify::{StatusNotifier, VerificationProgress};

/// Consecutive-idle counter for one verification window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCounter {
    elapsed: Duration,
    total: Duration,
    idle_count: u32,
    required: u32,
}

impl VerificationCounter {
    pub fn new(total: Duration, required: u32) -> Self {
        Self {
            elapsed: Duration::ZERO,
            total,
            idle_count: 0,
            required,
        }
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn advance(&mut self, by: Duration) {
        self.elapsed = self.elapsed.saturating_add(by);
    }

    pub fn record_idle(&mut self) {
        self.idle_count = self.idle_count.saturating_add(1);
    }

    /// Activity seen: start over.
    pub fn reset(&mut self) {
        self.idle_count = 0;
        self.elapsed = Duration::ZERO;
    }

    pub fn is_satisfied(&self) -> bool {
        self.idle_count >= self.required
    }

    pub fn window_elapsed(&self) -> bool {
        self.elapsed >= self.total
    }

    pub fn progress(&self) -> VerificationProgress {
        VerificationProgress {
            elapsed_secs: self.elapsed.as_secs(),
            total_secs: self.total.as_secs(),
            idle_checks: self.idle_count,
            required_checks: self.required,
        }
    }
}

/// How verification ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Enough idle checks, or the window ran out without new activity
    Verified,
    Cancelled,
}

pub struct VerificationEngine {
    total_delay: Duration,
    polling_interval: Duration,
    required_checks: u32,
    notifier: Arc<dyn StatusNotifier>,
}

impl VerificationEngine {
    pub fn new(
        total_delay: Duration,
        polling_interval: Duration,
        required_checks: u32,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            total_delay,
            polling_interval,
            required_checks,
            notifier,
        }
    }

    pub async fn verify(&self, monitor: &mut DownloadMonitor, token: &CancellationToken) -> VerificationOutcome {
        let mut counter = VerificationCounter::new(self.total_delay, self.required_checks);
        tracing::info!(
            delay_secs = self.total_delay.as_secs(),
            checks = self.required_checks,
            "Verifying downloads stay idle"
        );
        self.notifier.verification_progress(&counter.progress());

        while !counter.window_elapsed() {
            if !pause(token, self.polling_interval).await {
                return VerificationOutcome::Cancelled;
            }
            counter.advance(self.polling_interval);

            if monitor.is_any_active() {
                tracing::info!(
                    idle_checks = counter.idle_count(),
                    "Activity resumed during verification, returning to monitoring"
                );
                self.notifier.status("Activity resumed, waiting for it to finish");
                counter.reset();
                if !monitor.wait_for_all_downloads_to_complete(token).await {
                    return VerificationOutcome::Cancelled;
                }
                self.notifier.verification_progress(&counter.progress());
                continue;
            }

            counter.record_idle();
            tracing::debug!(
                idle_checks = counter.idle_count(),
                required = self.required_checks,
                "Idle check passed"
            );
            self.notifier.verification_progress(&counter.progress());

            if counter.is_satisfied() {
                tracing::info!(success = true, "Verification complete");
                return VerificationOutcome::Verified;
            }
        }

        tracing::info!(
            idle_checks = counter.idle_count(),
            "Verification window elapsed without new activity"
        );
        VerificationOutcome::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::test_support::*;
    use crate::notify::NullNotifier;

    fn setup(script: Vec<Vec<crate::types::TitleStatus>>) -> (DownloadMonitor, Arc<std::sync::Mutex<usize>>) {
        let detector = ScriptedDetector::new("Steam", script);
        let polls = detector.polls.clone();
        let mut monitor = DownloadMonitor::new(vec![Box::new(detector)], Arc::new(NullNotifier), Duration::from_secs(10));
        monitor.initialize_detectors().unwrap();
        (monitor, polls)
    }

    fn engine(total: u64, checks: u32) -> VerificationEngine {
        VerificationEngine::new(Duration::from_secs(total), Duration::from_secs(10), checks, Arc::new(NullNotifier))
    }

    #[test]
    fn test_counter_reset() {
        let mut counter = VerificationCounter::new(Duration::from_secs(60), 3);
        counter.advance(Duration::from_secs(20));
        counter.record_idle();
        counter.record_idle();
        assert!(!counter.is_satisfied());
        counter.reset();
        assert_eq!(counter.idle_count(), 0);
        assert_eq!(counter.elapsed(), Duration::ZERO);
        for _ in 0..3 {
            counter.record_idle();
        }
        assert!(counter.is_satisfied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_required_idle_poll() {
        let (mut monitor, polls) = setup(vec![vec![idle("A", "Steam")]]);
        let start = tokio::time::Instant::now();

        let outcome = engine(300, 2).verify(&mut monitor, &CancellationToken::new()).await;
        assert_eq!(outcome, VerificationOutcome::Verified);
        assert_eq!(*polls.lock().unwrap(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_count() {
        // idle, active (resume), then monitoring sees idle, then two clean polls
        let (mut monitor, polls) = setup(vec![
            vec![idle("A", "Steam")],
            vec![downloading("A", "Steam")],
            vec![idle("A", "Steam")],
            vec![idle("A", "Steam")],
            vec![idle("A", "Steam")],
        ]);

        let outcome = engine(300, 2).verify(&mut monitor, &CancellationToken::new()).await;
        assert_eq!(outcome, VerificationOutcome::Verified);
        // 1 idle + 1 active + 1 wait-for-complete + 2 idle
        assert_eq!(*polls.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapsing_counts_as_verified() {
        let (mut monitor, polls) = setup(vec![vec![idle("A", "Steam")]]);
        let outcome = engine(20, 5).verify(&mut monitor, &CancellationToken::new()).await;
        assert_eq!(outcome, VerificationOutcome::Verified);
        assert_eq!(*polls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_verification() {
        let (mut monitor, _) = setup(vec![vec![idle("A", "Steam")]]);
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            child.cancel();
        });
        let outcome = engine(300, 10).verify(&mut monitor, &token).await;
        assert_eq!(outcome, VerificationOutcome::Cancelled);
    }
}
