// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session state machine.
//!
//! ```text
//! Initializing -> DetectingLaunchers -> [WaitingForDownloads] -> Monitoring
//!     -> Verifying -> ShutdownPending -> Completed | Cancelled | Error
//! ```
//!
//! `WaitingForDownloads` is skipped when something is already downloading.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::detect::{profile, DownloadDetector, LauncherDetector, LauncherProfile};
use crate::error::{Result, WatchError};
use crate::monitor::DownloadMonitor;
use crate::notify::StatusNotifier;
use crate::shutdown::{InterruptHandle, ShutdownCapability, ShutdownScheduler, SystemShutdown};
use crate::types::ApplicationPhase;
use crate::verify::{VerificationEngine, VerificationOutcome};

/// Build a detector for every enabled launcher whose root can be found.
pub fn detectors_from_config(config: &Config) -> Vec<Box<dyn DownloadDetector>> {
    let mut detectors: Vec<Box<dyn DownloadDetector>> = Vec::new();

    if config.steam_enabled {
        match profile::resolve_steam_root(config.steam_path.as_deref()) {
            Some(root) => detectors.push(Box::new(LauncherDetector::new(LauncherProfile::steam(root)))),
            None => tracing::info!("Steam installation not found"),
        }
    }

    if config.epic_enabled {
        match profile::resolve_epic_root(config.epic_path.as_deref()) {
            Some(root) => detectors.push(Box::new(LauncherDetector::new(LauncherProfile::epic(
                root,
                profile::default_epic_log(),
            )))),
            None => tracing::info!("Epic Games Launcher installation not found"),
        }
    }

    detectors
}

pub struct Orchestrator {
    config: Config,
    monitor: DownloadMonitor,
    verifier: VerificationEngine,
    scheduler: Arc<ShutdownScheduler>,
    notifier: Arc<dyn StatusNotifier>,
    phase: ApplicationPhase,
}

/// How a session ended without error.
enum Flow {
    Completed,
    Cancelled,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        detectors: Vec<Box<dyn DownloadDetector>>,
        notifier: Arc<dyn StatusNotifier>,
        capability: Arc<dyn ShutdownCapability>,
    ) -> Self {
        let monitor = DownloadMonitor::new(detectors, notifier.clone(), config.polling_interval());
        let verifier = VerificationEngine::new(
            config.verification_delay(),
            config.polling_interval(),
            config.required_idle_checks,
            notifier.clone(),
        );
        let scheduler = Arc::new(ShutdownScheduler::new(
            capability,
            notifier.clone(),
            config.shutdown_delay_secs,
            config.dry_run,
        ));

        Self {
            config,
            monitor,
            verifier,
            scheduler,
            notifier,
            phase: ApplicationPhase::Initializing,
        }
    }

    /// Real launchers and the platform shutdown command.
    pub fn from_config(config: Config, notifier: Arc<dyn StatusNotifier>) -> Self {
        let detectors = detectors_from_config(&config);
        Self::new(config, detectors, notifier, Arc::new(SystemShutdown::new()))
    }

    pub fn phase(&self) -> ApplicationPhase {
        self.phase
    }

    /// Handle for an out-of-band abort (Ctrl+C) of a session run with `token`.
    pub fn interrupt_handle(&self, token: CancellationToken) -> InterruptHandle {
        InterruptHandle::new(self.scheduler.clone(), token)
    }

    /// Override the 5 s start poll (tests, very short sessions).
    pub fn with_start_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.monitor = self.monitor.with_start_poll_interval(interval);
        self
    }

    fn set_phase(&mut self, phase: ApplicationPhase) {
        if self.phase != phase {
            tracing::info!(from = %self.phase, to = %phase, "Phase changed");
        }
        self.phase = phase;
        self.notifier.phase_changed(phase);
    }

    /// Run one full session.
    ///
    /// Returns `Ok` on completion and on cancellation. Errors are reported
    /// through the notifier as an `Error` phase before being returned.
    pub async fn monitor_and_shutdown(&mut self, token: CancellationToken) -> Result<()> {
        match self.run(&token).await {
            Ok(Flow::Completed) => {
                self.set_phase(ApplicationPhase::Completed);
                Ok(())
            }
            Ok(Flow::Cancelled) => {
                if self.phase >= ApplicationPhase::Verifying {
                    self.scheduler.cancel_shutdown_if_needed();
                }
                tracing::info!(phase = %self.phase, "Session cancelled");
                self.set_phase(ApplicationPhase::Cancelled);
                Ok(())
            }
            Err(e) => {
                tracing::error!(phase = %self.phase, "Session failed: {}", e);
                self.notifier.error(&e.to_string());
                self.set_phase(ApplicationPhase::Error);
                Err(e)
            }
        }
    }

    async fn run(&mut self, token: &CancellationToken) -> Result<Flow> {
        self.set_phase(ApplicationPhase::Initializing);
        self.config.validate()?;
        for warning in self.config.warnings() {
            tracing::warn!("{}", warning);
            self.notifier.warning(&warning);
        }

        self.set_phase(ApplicationPhase::DetectingLaunchers);
        self.monitor.initialize_detectors()?;
        if token.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        if !self.monitor.is_any_active() {
            self.set_phase(ApplicationPhase::WaitingForDownloads);
            if !self.monitor.wait_for_downloads_to_start(token).await {
                return Ok(Flow::Cancelled);
            }
        }

        self.set_phase(ApplicationPhase::Monitoring);
        if !self.monitor.wait_for_all_downloads_to_complete(token).await {
            return Ok(Flow::Cancelled);
        }

        self.set_phase(ApplicationPhase::Verifying);
        self.scheduler.enter_verification();
        if self.verifier.verify(&mut self.monitor, token).await == VerificationOutcome::Cancelled {
            return Ok(Flow::Cancelled);
        }

        self.set_phase(ApplicationPhase::ShutdownPending);
        if !self.scheduler.schedule_shutdown(token).await? {
            return Ok(Flow::Cancelled);
        }

        Ok(Flow::Completed)
    }
}

/// True when `error` should map to a configuration exit code.
pub fn is_config_error(error: &WatchError) -> bool {
    matches!(error, WatchError::Config(_) | WatchError::InvalidArgument(_))
}
