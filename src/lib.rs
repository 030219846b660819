// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! downwatch - shut the machine down once game downloads finish
//!
//! Watches launcher logs and manifests, waits until every download and
//! install has gone quiet, double-checks it stays quiet, then schedules an
//! OS shutdown.
//!
//! # Core Modules
//!
//! - [`detect`] - Per-launcher download detection (logs, manifests, state codes)
//! - [`monitor`] - Aggregation over all detectors, cancellable polling
//! - [`verify`] - Consecutive-idle verification window
//! - [`shutdown`] - OS shutdown scheduling and Ctrl+C abort
//! - [`orchestrator`] - The session state machine
//! - [`notify`] - Status events for observers
//! - [`config`] - On-disk configuration
//! - [`error`] - Error taxonomy and user-facing formatting

pub mod colors;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod shutdown;
pub mod types;
pub mod verify;

pub use config::{Config, ConfigOverrides};
pub use detect::{DownloadDetector, LauncherDetector, LauncherProfile, StateTable};
pub use error::{Result, WatchError};
pub use monitor::DownloadMonitor;
pub use notify::{ChannelNotifier, ConsoleNotifier, NullNotifier, StatusEvent, StatusNotifier};
pub use orchestrator::Orchestrator;
pub use shutdown::{InterruptHandle, ShutdownCapability, ShutdownScheduler, SystemShutdown};
pub use types::{ApplicationPhase, DownloadState, InstallState, TitleStatus};
pub use verify::{VerificationEngine, VerificationOutcome};
