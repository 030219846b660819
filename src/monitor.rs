// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Aggregation over every launcher detector.
//!
//! Detectors are polled one after another on the caller's task. Every wait
//! goes through [`pause`], so a cancelled token interrupts it immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::detect::DownloadDetector;
use crate::error::{Result, WatchError};
use crate::notify::StatusNotifier;
use crate::types::{DownloadState, InstallState, TitleStatus};

/// Poll interval while waiting for the first download to appear.
pub const START_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Sleep for `duration` unless `token` is cancelled first.
///
/// Returns `false` when cancelled.
pub async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub struct DownloadMonitor {
    detectors: Vec<Box<dyn DownloadDetector>>,
    /// Which detectors initialised successfully
    enabled: Vec<bool>,
    notifier: Arc<dyn StatusNotifier>,
    polling_interval: Duration,
    start_poll_interval: Duration,
    /// (launcher, id) -> last status sent to the notifier
    last_seen: HashMap<(String, String), TitleStatus>,
}

impl DownloadMonitor {
    pub fn new(
        detectors: Vec<Box<dyn DownloadDetector>>,
        notifier: Arc<dyn StatusNotifier>,
        polling_interval: Duration,
    ) -> Self {
        let enabled = vec![false; detectors.len()];
        Self {
            detectors,
            enabled,
            notifier,
            polling_interval,
            start_poll_interval: START_POLL_INTERVAL,
            last_seen: HashMap::new(),
        }
    }

    pub fn with_start_poll_interval(mut self, interval: Duration) -> Self {
        self.start_poll_interval = interval;
        self
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Names of detectors that initialised.
    pub fn active_launchers(&self) -> Vec<String> {
        self.detectors
            .iter()
            .zip(&self.enabled)
            .filter(|(_, ok)| **ok)
            .map(|(d, _)| d.launcher_name().to_string())
            .collect()
    }

    /// Initialise every detector. One failure never blocks the others.
    ///
    /// Returns the number that succeeded, or [`WatchError::NoLaunchers`] when
    /// none did.
    pub fn initialize_detectors(&mut self) -> Result<usize> {
        for (detector, enabled) in self.detectors.iter_mut().zip(self.enabled.iter_mut()) {
            match detector.initialize() {
                Ok(ok) => {
                    *enabled = ok;
                    if ok {
                        tracing::info!(launcher = detector.launcher_name(), "Launcher detected");
                    }
                }
                Err(e) => {
                    *enabled = false;
                    let message = format!("{} disabled: {}", detector.launcher_name(), e);
                    tracing::warn!(launcher = detector.launcher_name(), "{}", message);
                    self.notifier.warning(&message);
                }
            }
        }

        let count = self.enabled.iter().filter(|ok| **ok).count();
        if count == 0 {
            return Err(WatchError::NoLaunchers);
        }
        self.notifier
            .status(&format!("Watching {}", self.active_launchers().join(", ")));
        Ok(count)
    }

    /// Poll every enabled detector once and emit per-title diffs.
    pub fn fetch_active(&mut self) -> Vec<TitleStatus> {
        let mut all = Vec::new();
        for (detector, enabled) in self.detectors.iter_mut().zip(&self.enabled) {
            if !*enabled {
                continue;
            }
            all.extend(detector.get_active_downloads());
            for warning in detector.take_warnings() {
                self.notifier.warning(&warning);
            }
        }

        self.emit_diff(&all);
        all
    }

    fn emit_diff(&mut self, current: &[TitleStatus]) {
        let mut next = HashMap::with_capacity(current.len());

        for status in current {
            let key = (status.launcher_name.clone(), status.id.clone());
            if self.last_seen.get(&key) != Some(status) {
                self.notifier.title_updated(status);
            }
            next.insert(key, status.clone());
        }

        for (key, previous) in self.last_seen.drain() {
            if next.contains_key(&key) || previous.is_settled() {
                continue;
            }
            // Re-keyed under a new id but still listed under the same title
            let relisted = current
                .iter()
                .any(|s| s.launcher_name == previous.launcher_name && s.title == previous.title);
            if relisted {
                continue;
            }
            tracing::debug!(launcher = %previous.launcher_name, title = %previous.title, "Title left the active set");
            let gone = TitleStatus::new(
                previous.title.clone(),
                previous.launcher_name.clone(),
                DownloadState::Idle,
                InstallState::Idle,
                100.0,
            )
            .with_id(previous.id);
            self.notifier.title_updated(&gone);
        }

        self.last_seen = next;
    }

    pub fn is_any_active(&mut self) -> bool {
        self.fetch_active().iter().any(TitleStatus::is_active)
    }

    /// Poll until something downloads. `false` if cancelled first.
    pub async fn wait_for_downloads_to_start(&mut self, token: &CancellationToken) -> bool {
        self.notifier.status("Waiting for a download to start");
        loop {
            if token.is_cancelled() {
                return false;
            }
            if self.is_any_active() {
                tracing::info!("Download activity detected");
                return true;
            }
            if !pause(token, self.start_poll_interval).await {
                return false;
            }
        }
    }

    /// Poll until no title downloads or installs. `false` if cancelled first.
    pub async fn wait_for_all_downloads_to_complete(&mut self, token: &CancellationToken) -> bool {
        loop {
            if token.is_cancelled() {
                return false;
            }
            let active: Vec<TitleStatus> = self
                .fetch_active()
                .into_iter()
                .filter(TitleStatus::is_active)
                .collect();
            if active.is_empty() {
                tracing::info!(success = true, "All downloads and installs finished");
                return true;
            }

            tracing::info!(active = active.len(), "Downloads still in progress");
            self.notifier
                .status(&format!("{} title(s) still downloading or installing", active.len()));

            if !pause(token, self.polling_interval).await {
                return false;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::detect::DownloadDetector;
    use crate::error::{Result, WatchError};
    use crate::types::{DownloadState, InstallState, TitleStatus};

    /// Detector that replays a script of poll results, repeating the last one.
    pub struct ScriptedDetector {
        pub name: String,
        pub script: VecDeque<Vec<TitleStatus>>,
        pub fail_init: bool,
        pub polls: Arc<Mutex<usize>>,
    }

    impl ScriptedDetector {
        pub fn new(name: &str, script: Vec<Vec<TitleStatus>>) -> Self {
            Self {
                name: name.to_string(),
                script: script.into(),
                fail_init: false,
                polls: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl DownloadDetector for ScriptedDetector {
        fn launcher_name(&self) -> &str {
            &self.name
        }

        fn initialize(&mut self) -> Result<bool> {
            if self.fail_init {
                return Err(WatchError::DirectoryNotFound("/missing".into()));
            }
            Ok(true)
        }

        fn get_active_downloads(&mut self) -> Vec<TitleStatus> {
            *self.polls.lock().unwrap() += 1;
            if self.script.len() > 1 {
                self.script.pop_front().unwrap_or_default()
            } else {
                self.script.front().cloned().unwrap_or_default()
            }
        }
    }

    pub fn downloading(title: &str, launcher: &str) -> TitleStatus {
        TitleStatus::new(title, launcher, DownloadState::Downloading, InstallState::Unknown, 50.0)
    }

    pub fn idle(title: &str, launcher: &str) -> TitleStatus {
        TitleStatus::new(title, launcher, DownloadState::Idle, InstallState::Idle, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::notify::{ChannelNotifier, NullNotifier, StatusEvent};
    use tokio::sync::mpsc;

    fn monitor(detectors: Vec<Box<dyn DownloadDetector>>) -> DownloadMonitor {
        DownloadMonitor::new(detectors, Arc::new(NullNotifier), Duration::from_secs(30))
    }

    #[test]
    fn test_partial_initialization() {
        let mut broken = ScriptedDetector::new("Broken", vec![]);
        broken.fail_init = true;
        let ok = ScriptedDetector::new("Steam", vec![vec![downloading("A", "Steam")]]);

        let mut m = monitor(vec![Box::new(broken), Box::new(ok)]);
        assert_eq!(m.initialize_detectors().unwrap(), 1);
        assert_eq!(m.active_launchers(), vec!["Steam".to_string()]);
        assert!(m.is_any_active());
    }

    #[test]
    fn test_all_detectors_failing() {
        let mut broken = ScriptedDetector::new("Broken", vec![]);
        broken.fail_init = true;
        let mut m = monitor(vec![Box::new(broken)]);
        assert!(matches!(m.initialize_detectors(), Err(WatchError::NoLaunchers)));
    }

    #[test]
    fn test_diff_events_include_disappearance() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let detector = ScriptedDetector::new(
            "Steam",
            vec![
                vec![downloading("A", "Steam")],
                vec![downloading("A", "Steam")],
                vec![],
            ],
        );
        let mut m = DownloadMonitor::new(
            vec![Box::new(detector)],
            Arc::new(ChannelNotifier::new(tx)),
            Duration::from_secs(1),
        );
        m.initialize_detectors().unwrap();
        while rx.try_recv().is_ok() {}

        m.fetch_active();
        m.fetch_active();
        m.fetch_active();

        let updates: Vec<TitleStatus> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                StatusEvent::TitleUpdated { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2, "unchanged poll must not re-emit: {:?}", updates);
        assert!(updates[0].is_active());
        assert_eq!(updates[1].title, "A");
        assert!(updates[1].is_settled());
    }

    #[test]
    fn test_renamed_title_is_not_reported_finished() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let detector = ScriptedDetector::new(
            "Steam",
            vec![
                vec![downloading("AppID 300", "Steam").with_id("300")],
                vec![downloading("Three Hundred", "Steam").with_id("300")],
            ],
        );
        let mut m = DownloadMonitor::new(
            vec![Box::new(detector)],
            Arc::new(ChannelNotifier::new(tx)),
            Duration::from_secs(1),
        );
        m.initialize_detectors().unwrap();
        while rx.try_recv().is_ok() {}

        m.fetch_active();
        m.fetch_active();

        let updates: Vec<TitleStatus> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                StatusEvent::TitleUpdated { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2, "rename must not look like a finish: {:?}", updates);
        assert_eq!(updates[1].title, "Three Hundred");
        assert!(updates.iter().all(TitleStatus::is_active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_start_polls_until_active() {
        let detector = ScriptedDetector::new("Steam", vec![vec![], vec![], vec![downloading("A", "Steam")]]);
        let polls = detector.polls.clone();
        let mut m = monitor(vec![Box::new(detector)]);
        m.initialize_detectors().unwrap();

        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        assert!(m.wait_for_downloads_to_start(&token).await);
        assert_eq!(*polls.lock().unwrap(), 3);
        assert_eq!(start.elapsed(), START_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_start_cancelled() {
        let detector = ScriptedDetector::new("Steam", vec![vec![]]);
        let mut m = monitor(vec![Box::new(detector)]);
        m.initialize_detectors().unwrap();

        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            child.cancel();
        });
        let start = tokio::time::Instant::now();
        assert!(!m.wait_for_downloads_to_start(&token).await);
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_returns_promptly_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let start = tokio::time::Instant::now();
        assert!(!pause(&token, Duration::from_secs(3600)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
