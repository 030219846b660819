// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types used across downwatch.
//!
//! This module provides unified type definitions to avoid duplication.

use serde::{Deserialize, Serialize};

/// Download side of a title's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    /// Bytes are being fetched (or queued to be fetched)
    Downloading,
    /// Nothing to download
    Idle,
    /// Launcher state could not be mapped
    Unknown,
    /// Launcher reported a failure
    Error,
}

/// Install side of a title's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallState {
    /// Files are being staged, committed or validated
    Installing,
    /// Nothing to install
    Idle,
    /// Launcher state could not be mapped
    Unknown,
    /// Launcher reported a failure
    Error,
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadState::Downloading => write!(f, "Downloading"),
            DownloadState::Idle => write!(f, "Idle"),
            DownloadState::Unknown => write!(f, "Unknown"),
            DownloadState::Error => write!(f, "Error"),
        }
    }
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallState::Installing => write!(f, "Installing"),
            InstallState::Idle => write!(f, "Idle"),
            InstallState::Unknown => write!(f, "Unknown"),
            InstallState::Error => write!(f, "Error"),
        }
    }
}

/// Placeholder display name for a title only known by its numeric id.
pub fn placeholder_title(id: &str) -> String {
    format!("AppID {}", id)
}

/// Status of one game/app as seen by one launcher detector.
///
/// Records are always handed out by value; observers never hold a reference
/// into a detector's map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleStatus {
    /// Stable identity within one launcher; survives display-name changes
    #[serde(default)]
    pub id: String,
    /// Resolved display name, or `AppID <id>` until the name is known
    pub title: String,
    pub download_state: DownloadState,
    pub install_state: InstallState,
    /// Best-effort percentage in [0, 100]
    pub progress_percent: f64,
    /// Launcher that produced this record
    pub launcher_name: String,
}

impl TitleStatus {
    pub fn new(
        title: impl Into<String>,
        launcher_name: impl Into<String>,
        download_state: DownloadState,
        install_state: InstallState,
        progress_percent: f64,
    ) -> Self {
        let title = title.into();
        Self {
            id: title.clone(),
            title,
            download_state,
            install_state,
            progress_percent: clamp_percent(progress_percent),
            launcher_name: launcher_name.into(),
        }
    }

    /// Replace the identity, which defaults to the title.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// True while the title still downloads or installs.
    pub fn is_active(&self) -> bool {
        self.download_state == DownloadState::Downloading
            || self.install_state == InstallState::Installing
    }

    /// Both sides idle; eligible for removal from the active set.
    pub fn is_settled(&self) -> bool {
        self.download_state == DownloadState::Idle && self.install_state == InstallState::Idle
    }

    /// Short human-readable phase label.
    pub fn phase_label(&self) -> &'static str {
        match (self.download_state, self.install_state) {
            (DownloadState::Downloading, _) => "downloading",
            (_, InstallState::Installing) => "installing",
            (DownloadState::Error, _) | (_, InstallState::Error) => "error",
            (DownloadState::Idle, InstallState::Idle) => "done",
            _ => "waiting",
        }
    }
}

/// Clamp a percentage into [0, 100], mapping NaN to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Session phase, owned by the orchestrator.
///
/// Ordered by progression so "in or past verification" is a simple comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApplicationPhase {
    Initializing,
    DetectingLaunchers,
    WaitingForDownloads,
    Monitoring,
    Verifying,
    ShutdownPending,
    Completed,
    Cancelled,
    Error,
}

impl ApplicationPhase {
    /// Convert phase to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::DetectingLaunchers => "detecting launchers",
            Self::WaitingForDownloads => "waiting for downloads",
            Self::Monitoring => "monitoring",
            Self::Verifying => "verifying",
            Self::ShutdownPending => "shutdown pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ApplicationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_requires_both_idle() {
        let mut status = TitleStatus::new("Game", "Steam", DownloadState::Idle, InstallState::Unknown, 0.0);
        assert!(!status.is_settled());
        assert!(!status.is_active());

        status.install_state = InstallState::Idle;
        assert!(status.is_settled());
    }

    #[test]
    fn test_installing_counts_as_active() {
        let status = TitleStatus::new("Game", "Steam", DownloadState::Idle, InstallState::Installing, 90.0);
        assert!(status.is_active());
        assert_eq!(status.phase_label(), "installing");
    }

    #[test]
    fn test_progress_is_clamped() {
        let status = TitleStatus::new("Game", "Steam", DownloadState::Downloading, InstallState::Unknown, 140.0);
        assert_eq!(status.progress_percent, 100.0);
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
    }

    #[test]
    fn test_phase_ordering() {
        assert!(ApplicationPhase::ShutdownPending > ApplicationPhase::Verifying);
        assert!(ApplicationPhase::Monitoring < ApplicationPhase::Verifying);
    }

    #[test]
    fn test_id_defaults_to_title() {
        let status = TitleStatus::new("Game", "Steam", DownloadState::Idle, InstallState::Idle, 100.0);
        assert_eq!(status.id, "Game");
        assert_eq!(status.with_id("42").id, "42");
    }

    #[test]
    fn test_placeholder_title() {
        assert_eq!(placeholder_title("42"), "AppID 42");
    }
}
