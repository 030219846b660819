// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shutdown scheduling and cancellation.
//!
//! The OS side sits behind [`ShutdownCapability`] so sessions can run against
//! a recording fake. [`ShutdownScheduler`] keeps its flags in atomics: the
//! Ctrl+C thread reads them through an [`InterruptHandle`] while the session
//! task is still running.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, WatchError};
use crate::monitor::pause;
use crate::notify::StatusNotifier;

pub const SHUTDOWN_MESSAGE: &str = "downwatch: downloads finished, shutting down";

/// External power-off capability.
pub trait ShutdownCapability: Send + Sync {
    /// Ask the OS to power off after `delay_secs`. Zero is rejected.
    fn schedule(&self, delay_secs: u64, message: &str) -> Result<()>;

    /// Abort a pending power-off.
    fn cancel(&self) -> Result<()>;

    fn is_scheduled(&self) -> bool;
}

/// Platform `shutdown` command.
#[derive(Debug, Default)]
pub struct SystemShutdown {
    scheduled: AtomicBool,
}

impl SystemShutdown {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Program and arguments that schedule a power-off on this platform.
pub fn schedule_command(delay_secs: u64, message: &str) -> (&'static str, Vec<String>) {
    #[cfg(target_os = "windows")]
    {
        (
            "shutdown",
            vec![
                "/s".to_string(),
                "/t".to_string(),
                delay_secs.to_string(),
                "/c".to_string(),
                message.to_string(),
            ],
        )
    }

    #[cfg(not(target_os = "windows"))]
    {
        // Unix shutdown takes whole minutes
        let minutes = delay_secs.div_ceil(60).max(1);
        ("shutdown", vec!["-h".to_string(), format!("+{}", minutes), message.to_string()])
    }
}

/// Program and arguments that abort a pending power-off.
pub fn cancel_command() -> (&'static str, Vec<String>) {
    #[cfg(target_os = "windows")]
    {
        ("shutdown", vec!["/a".to_string()])
    }

    #[cfg(target_os = "macos")]
    {
        ("killall", vec!["shutdown".to_string()])
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        ("shutdown", vec!["-c".to_string()])
    }
}

fn run(program: &str, args: &[String]) -> Result<()> {
    tracing::debug!(program, ?args, "Running shutdown command");
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| WatchError::Shutdown(format!("could not run {}: {}", program, e)))?;
    if !status.success() {
        return Err(WatchError::Shutdown(format!("{} exited with {}", program, status)));
    }
    Ok(())
}

impl ShutdownCapability for SystemShutdown {
    fn schedule(&self, delay_secs: u64, message: &str) -> Result<()> {
        if delay_secs == 0 {
            return Err(WatchError::InvalidArgument("shutdown delay must be greater than 0".to_string()));
        }
        let (program, args) = schedule_command(delay_secs, message);
        run(program, &args)?;
        self.scheduled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) -> Result<()> {
        let (program, args) = cancel_command();
        run(program, &args)?;
        self.scheduled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }
}

pub struct ShutdownScheduler {
    capability: Arc<dyn ShutdownCapability>,
    notifier: Arc<dyn StatusNotifier>,
    delay_secs: u64,
    dry_run: bool,
    in_verification: AtomicBool,
    scheduled: AtomicBool,
}

impl ShutdownScheduler {
    pub fn new(
        capability: Arc<dyn ShutdownCapability>,
        notifier: Arc<dyn StatusNotifier>,
        delay_secs: u64,
        dry_run: bool,
    ) -> Self {
        Self {
            capability,
            notifier,
            delay_secs,
            dry_run,
            in_verification: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
        }
    }

    /// Mark the session as in (or past) verification.
    pub fn enter_verification(&self) {
        self.in_verification.store(true, Ordering::SeqCst);
    }

    pub fn in_verification(&self) -> bool {
        self.in_verification.load(Ordering::SeqCst)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Wait out the delay, then hand the power-off to the OS.
    ///
    /// Returns `Ok(false)` if cancelled during the wait. In dry-run mode
    /// nothing is waited for or scheduled.
    pub async fn schedule_shutdown(&self, token: &CancellationToken) -> Result<bool> {
        if self.dry_run {
            tracing::info!(delay_secs = self.delay_secs, "Dry run: would schedule shutdown");
            self.notifier.shutdown_scheduled(self.delay_secs, true);
            return Ok(true);
        }

        tracing::info!(delay_secs = self.delay_secs, "Shutdown pending");
        self.notifier
            .status(&format!("Shutting down in {}s unless cancelled", self.delay_secs));
        if !pause(token, Duration::from_secs(self.delay_secs)).await {
            tracing::info!("Shutdown aborted before it was scheduled");
            return Ok(false);
        }

        self.capability.schedule(self.delay_secs, SHUTDOWN_MESSAGE)?;
        self.scheduled.store(true, Ordering::SeqCst);
        tracing::warn!(delay_secs = self.delay_secs, "System shutdown scheduled");
        self.notifier.shutdown_scheduled(self.delay_secs, false);
        Ok(true)
    }

    /// Abort an OS shutdown if one may be pending. Failures are only logged.
    pub fn cancel_shutdown_if_needed(&self) {
        if self.dry_run || !self.in_verification() {
            return;
        }
        match self.capability.cancel() {
            Ok(()) => {
                self.scheduled.store(false, Ordering::SeqCst);
                tracing::info!("Pending shutdown cancelled");
                self.notifier.status("Shutdown cancelled");
            }
            Err(e) => {
                tracing::warn!("Failed to cancel shutdown: {}", e);
            }
        }
    }
}

/// Out-of-band abort used by the Ctrl+C handler.
#[derive(Clone)]
pub struct InterruptHandle {
    scheduler: Arc<ShutdownScheduler>,
    token: CancellationToken,
}

impl InterruptHandle {
    pub fn new(scheduler: Arc<ShutdownScheduler>, token: CancellationToken) -> Self {
        Self { scheduler, token }
    }

    /// Cancel a pending shutdown first, then the session.
    pub fn interrupt(&self) {
        tracing::info!("Interrupt received");
        self.scheduler.cancel_shutdown_if_needed();
        self.token.cancel();
    }
}
