// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Launcher state codes to (download, install, progress) triples.
//!
//! Each launcher persists a numeric state per title. A [`StateTable`] maps the
//! codes we understand to a fixed triple; anything else is
//! `(Unknown, Unknown, 0)`. When byte counters are present they win over the
//! table, since they give an exact percentage instead of a fixed estimate.

use serde::{Deserialize, Serialize};

use crate::types::{clamp_percent, DownloadState, InstallState};

/// Result of interpreting one state code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpretation {
    pub download: DownloadState,
    pub install: InstallState,
    pub progress: f64,
}

impl Interpretation {
    pub const UNKNOWN: Interpretation = Interpretation {
        download: DownloadState::Unknown,
        install: InstallState::Unknown,
        progress: 0.0,
    };

    const fn new(download: DownloadState, install: InstallState, progress: f64) -> Self {
        Self { download, install, progress }
    }

    pub fn is_unknown(&self) -> bool {
        self.download == DownloadState::Unknown && self.install == InstallState::Unknown
    }

    pub fn is_settled(&self) -> bool {
        self.download == DownloadState::Idle && self.install == InstallState::Idle
    }
}

/// Byte-level progress counters found in some manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteCounters {
    pub to_download: u64,
    pub downloaded: u64,
    pub to_stage: u64,
    pub staged: u64,
}

impl ByteCounters {
    pub fn remaining_download(&self) -> u64 {
        self.to_download.saturating_sub(self.downloaded)
    }

    pub fn remaining_stage(&self) -> u64 {
        self.to_stage.saturating_sub(self.staged)
    }

    /// `(downloaded + staged) / (to_download + to_stage) * 100`, clamped.
    pub fn progress_percent(&self) -> f64 {
        let total = self.to_download.saturating_add(self.to_stage);
        if total == 0 {
            return 0.0;
        }
        let done = self.downloaded.saturating_add(self.staged);
        clamp_percent(done as f64 / total as f64 * 100.0)
    }
}

use DownloadState as D;
use InstallState as I;

/// Steam `StateFlags` values seen in `appmanifest_*.acf`.
const STEAM_CODES: &[(u64, Interpretation)] = &[
    // Fully installed, nothing pending
    (4, Interpretation::new(D::Idle, I::Idle, 100.0)),
    // Update required but not running; Steam can leave a deferred update here indefinitely
    (2, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    (6, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    // Update running
    (1026, Interpretation::new(D::Downloading, I::Unknown, 50.0)),
    (1030, Interpretation::new(D::Downloading, I::Unknown, 50.0)),
    (1042, Interpretation::new(D::Downloading, I::Unknown, 50.0)),
    // Update paused
    (514, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    (516, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    (518, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    (1538, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    (1542, Interpretation::new(D::Idle, I::Unknown, 0.0)),
    // Reconfiguring / validating an installed title
    (65540, Interpretation::new(D::Idle, I::Installing, 90.0)),
    (131076, Interpretation::new(D::Idle, I::Installing, 95.0)),
];

/// Codes synthesised from Epic `.item` manifests (`bIsIncompleteInstall`).
const EPIC_CODES: &[(u64, Interpretation)] = &[
    (0, Interpretation::new(D::Idle, I::Idle, 100.0)),
    (1, Interpretation::new(D::Downloading, I::Unknown, 50.0)),
];

/// Per-launcher state code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateTable {
    Steam,
    Epic,
}

impl StateTable {
    /// Epic code for a complete install.
    pub const EPIC_INSTALLED: u64 = 0;
    /// Epic code for an incomplete install.
    pub const EPIC_INCOMPLETE: u64 = 1;

    fn codes(&self) -> &'static [(u64, Interpretation)] {
        match self {
            StateTable::Steam => STEAM_CODES,
            StateTable::Epic => EPIC_CODES,
        }
    }

    /// The "fully installed, no update pending" code.
    pub fn terminal_code(&self) -> u64 {
        match self {
            StateTable::Steam => 4,
            StateTable::Epic => Self::EPIC_INSTALLED,
        }
    }

    pub fn is_terminal(&self, code: u64) -> bool {
        code == self.terminal_code()
    }

    /// Total over all codes; unknown codes map to `(Unknown, Unknown, 0)`.
    pub fn interpret(&self, code: u64) -> Interpretation {
        self.codes()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, interp)| *interp)
            .unwrap_or(Interpretation::UNKNOWN)
    }

    /// Interpret with byte counters when available.
    ///
    /// Remaining download bytes mean Downloading, remaining stage bytes mean
    /// Installing; otherwise the code table decides.
    pub fn interpret_with_counters(&self, code: u64, counters: Option<&ByteCounters>) -> Interpretation {
        counters
            .and_then(Self::from_counters)
            .unwrap_or_else(|| self.interpret(code))
    }

    /// Counter-only interpretation; `None` once nothing remains.
    pub fn from_counters(counters: &ByteCounters) -> Option<Interpretation> {
        let progress = counters.progress_percent();
        if counters.remaining_download() > 0 {
            Some(Interpretation::new(D::Downloading, I::Unknown, progress))
        } else if counters.remaining_stage() > 0 {
            Some(Interpretation::new(D::Idle, I::Installing, progress))
        } else {
            None
        }
    }
}
