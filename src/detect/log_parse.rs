// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Launcher log-line grammar.
//!
//! Turns one log line into at most one [`LogEvent`]. Two families are
//! recognised:
//!
//! - Structured Steam lines: `AppID 42 update started : download 0/100`,
//!   `AppID 42 state changed : Fully Installed,`, `AppID 42 finished update`.
//! - Generic phrases any launcher may print: `Downloading 12 chunks for X`,
//!   `Download complete`, `Installation complete`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{DownloadState, InstallState};

static APP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bAppID\s+(\d+)\s+(update started|update changed|state changed|update canceled|update cancelled|finished update)\b\s*:?\s*(.*)$",
    )
    .expect("valid AppID regex")
});

static DOWNLOADING_UNITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdownloading\s+(\d+)\s+(?:files?|chunks?|items?|units?|bytes|mb|gb)\b(?:\s+for\s+(.+?))?\s*$")
        .expect("valid downloading regex")
});

static DOWNLOAD_COMPLETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdownload\s+(?:complete|completed|finished)\b(?:\s*(?:for|:)\s*(.+?))?\s*$")
        .expect("valid download complete regex")
});

static INSTALL_COMPLETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\binstall(?:ation)?\s+(?:complete|completed|finished)\b(?:\s*(?:for|:)\s*(.+?))?\s*$")
        .expect("valid install complete regex")
});

/// Who a log event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// Numeric launcher id
    Id(String),
    /// Human name printed in the line
    Name(String),
    /// Nothing in the line says which title
    Unattributed,
}

/// What a log line tells us.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub subject: Subject,
    pub download: DownloadState,
    pub install: InstallState,
}

impl LogEvent {
    fn new(subject: Subject, download: DownloadState, install: InstallState) -> Self {
        Self { subject, download, install }
    }
}

const DOWNLOAD_MARKERS: &[&str] = &[
    "downloading",
    "update running",
    "update started",
    "update queued",
];

const INSTALL_MARKERS: &[&str] = &[
    "staging",
    "committing",
    "preallocating",
    "validating",
    "reconfiguring",
];

/// Work is owed but nothing is running
const PENDING_MARKERS: &[&str] = &["update paused", "suspended", "update required"];

/// Map a comma-separated Steam state list to a download/install pair.
///
/// Returns `None` when the list says nothing we act on.
pub fn classify_state_list(states: &str) -> Option<(DownloadState, InstallState)> {
    let lower = states.to_ascii_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(DOWNLOAD_MARKERS) {
        return Some((DownloadState::Downloading, InstallState::Unknown));
    }
    if has(INSTALL_MARKERS) {
        return Some((DownloadState::Idle, InstallState::Installing));
    }
    if has(PENDING_MARKERS) {
        return Some((DownloadState::Idle, InstallState::Unknown));
    }
    if lower.contains("fully installed") {
        return Some((DownloadState::Idle, InstallState::Idle));
    }
    None
}

/// Strip a leading `[timestamp]` and surrounding whitespace.
fn strip_prefix(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.starts_with('[') {
        if let Some(end) = trimmed.find(']') {
            return trimmed[end + 1..].trim();
        }
    }
    trimmed
}

fn subject_from(name: Option<regex::Match<'_>>) -> Subject {
    match name.map(|m| m.as_str().trim().trim_matches('"')) {
        Some(name) if !name.is_empty() => Subject::Name(name.to_string()),
        _ => Subject::Unattributed,
    }
}

/// Parse one log line.
pub fn parse_line(line: &str) -> Option<LogEvent> {
    let body = strip_prefix(line);
    if body.is_empty() {
        return None;
    }

    if let Some(caps) = APP_LINE.captures(body) {
        let id = Subject::Id(caps[1].to_string());
        let verb = caps[2].to_ascii_lowercase();
        let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        return match verb.as_str() {
            "update started" => Some(LogEvent::new(id, DownloadState::Downloading, InstallState::Unknown)),
            "finished update" => Some(LogEvent::new(id, DownloadState::Idle, InstallState::Idle)),
            "update canceled" | "update cancelled" => {
                Some(LogEvent::new(id, DownloadState::Idle, InstallState::Unknown))
            }
            _ => classify_state_list(rest).map(|(d, i)| LogEvent::new(id, d, i)),
        };
    }

    if let Some(caps) = DOWNLOADING_UNITS.captures(body) {
        return Some(LogEvent::new(
            subject_from(caps.get(2)),
            DownloadState::Downloading,
            InstallState::Unknown,
        ));
    }

    if let Some(caps) = INSTALL_COMPLETE.captures(body) {
        return Some(LogEvent::new(subject_from(caps.get(1)), DownloadState::Idle, InstallState::Idle));
    }

    if let Some(caps) = DOWNLOAD_COMPLETE.captures(body) {
        return Some(LogEvent::new(subject_from(caps.get(1)), DownloadState::Idle, InstallState::Unknown));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: &str) -> Subject {
        Subject::Id(v.to_string())
    }

    #[test]
    fn test_update_started() {
        let event = parse_line("[2024-05-01 10:00:00] AppID 42 update started : download 0/1000, store 0/0").unwrap();
        assert_eq!(event.subject, id("42"));
        assert_eq!(event.download, DownloadState::Downloading);
    }

    #[test]
    fn test_update_started_without_space_before_colon() {
        let event = parse_line("AppID 42 update started: download").unwrap();
        assert_eq!(event, LogEvent::new(id("42"), DownloadState::Downloading, InstallState::Unknown));
    }

    #[test]
    fn test_fully_installed_settles() {
        let event = parse_line("[2024-05-01 10:30:00] AppID 42 state changed : Fully Installed,").unwrap();
        assert_eq!(event.download, DownloadState::Idle);
        assert_eq!(event.install, InstallState::Idle);
    }

    #[test]
    fn test_update_required_is_not_a_download() {
        let event = parse_line("AppID 42 state changed : Fully Installed,Update Required,").unwrap();
        assert_eq!(event.download, DownloadState::Idle);
        assert_eq!(event.install, InstallState::Unknown);
    }

    #[test]
    fn test_fully_installed_with_running_update_stays_active() {
        let event = parse_line("AppID 42 state changed : Fully Installed,Update Running,").unwrap();
        assert_eq!(event.download, DownloadState::Downloading);

        let event = parse_line("AppID 7 update changed : Fully Installed,Update Queued,").unwrap();
        assert_eq!(event.download, DownloadState::Downloading);
    }

    #[test]
    fn test_staging_is_installing() {
        let event = parse_line("AppID 42 update changed : Running Update,Staging,").unwrap();
        // "Running Update" is not a download marker; staging wins
        assert_eq!(event.install, InstallState::Installing);
        assert_eq!(event.download, DownloadState::Idle);
    }

    #[test]
    fn test_finished_and_canceled() {
        let event = parse_line("AppID 9 finished update (BuildID 1 => 2)").unwrap();
        assert_eq!((event.download, event.install), (DownloadState::Idle, InstallState::Idle));

        let event = parse_line("AppID 9 update canceled : Shutdown").unwrap();
        assert_eq!((event.download, event.install), (DownloadState::Idle, InstallState::Unknown));
    }

    #[test]
    fn test_generic_phrases() {
        let event = parse_line("LogInstall: Downloading 12 chunks for Fortnite").unwrap();
        assert_eq!(event.subject, Subject::Name("Fortnite".to_string()));
        assert_eq!(event.download, DownloadState::Downloading);

        let event = parse_line("Downloading 3 files").unwrap();
        assert_eq!(event.subject, Subject::Unattributed);

        let event = parse_line("Download complete").unwrap();
        assert_eq!((event.download, event.install), (DownloadState::Idle, InstallState::Unknown));

        let event = parse_line("Installation complete for Fortnite").unwrap();
        assert_eq!(event.subject, Subject::Name("Fortnite".to_string()));
        assert_eq!(event.install, InstallState::Idle);
    }

    #[test]
    fn test_noise_is_ignored() {
        assert!(parse_line("").is_none());
        assert!(parse_line("[2024-05-01 10:00:00] Steam client started").is_none());
        assert!(parse_line("AppID 42 scheduler update : nothing").is_none());
        assert!(parse_line("AppID 42 state changed : Uninstalled,").is_none());
    }
}
