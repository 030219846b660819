// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download Detection Module for downwatch
//!
//! Infers per-title download/install status for one launcher from what it
//! leaves on disk:
//!
//! - the content log, tailed incrementally ([`log_tail`], [`log_parse`])
//! - per-title manifests across every library root ([`manifest`], [`vdf`])
//! - state codes and byte counters inside those manifests ([`flags`])
//! - in-flight download folders, as a last resort
//!
//! # Merge rules
//!
//! Entries are keyed by launcher id when known, otherwise by name. Log lines
//! are optimistic: a start moves a title to Downloading, an explicit
//! completion settles it. Manifests are authoritative and overwrite log
//! guesses. A manifest in the launcher's terminal "fully installed" state
//! removes the title from the active map altogether.
//!
//! # Example
//! ```rust,no_run
//! use downwatch::detect::{DownloadDetector, LauncherDetector, LauncherProfile};
//!
//! let mut detector = LauncherDetector::new(LauncherProfile::steam("/home/me/.steam/steam"));
//! detector.initialize().expect("Steam not installed");
//! for status in detector.get_active_downloads() {
//!     println!("{} {:.0}%", status.title, status.progress_percent);
//! }
//! ```

pub mod flags;
pub mod log_parse;
pub mod log_tail;
pub mod manifest;
pub mod profile;
pub mod vdf;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

pub use flags::{ByteCounters, Interpretation, StateTable};
pub use log_parse::{parse_line, LogEvent, Subject};
pub use log_tail::{LineBuffer, LogTailReader};
pub use manifest::{
    discover_library_roots, AcfFormat, ItemFormat, ManifestFormat, ManifestScanner, RawManifestRecord,
    ScanReport,
};
pub use profile::{resolve_epic_root, resolve_steam_root, LauncherProfile, ManifestKind};

use crate::error::{Result, WatchError};
use crate::types::{placeholder_title, DownloadState, InstallState, TitleStatus};

/// Progress assumed when a log line says a download (re)started.
const LOG_START_PROGRESS: f64 = 0.0;

/// Refreshes without a fresh log line before the unattributed entry is dropped.
pub const PLACEHOLDER_STALE_REFRESHES: u64 = 10;

/// One launcher's view of what is downloading or installing.
pub trait DownloadDetector: Send {
    /// Launcher display name.
    fn launcher_name(&self) -> &str;

    /// Check the launcher is present. Fails with
    /// [`WatchError::DirectoryNotFound`] when its root is missing.
    fn initialize(&mut self) -> Result<bool>;

    /// Refresh from disk and return a copy of the active map.
    fn get_active_downloads(&mut self) -> Vec<TitleStatus>;

    /// True if any title is downloading or installing.
    fn is_any_active(&mut self) -> bool {
        self.get_active_downloads().iter().any(TitleStatus::is_active)
    }

    /// Warnings gathered since the last call, for surfacing to observers.
    fn take_warnings(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// The single profile-driven detector used for every launcher.
#[derive(Debug)]
pub struct LauncherDetector {
    profile: LauncherProfile,
    log: Option<LogTailReader>,
    lines: LineBuffer,
    scanner: ManifestScanner,
    roots: Vec<PathBuf>,
    /// id -> display name, learned from manifests (ordered for stable lookups)
    names: BTreeMap<String, String>,
    /// key (id, else name) -> status
    active: HashMap<String, TitleStatus>,
    /// Keys only ever seen in the log backlog read at startup
    backlog_keys: HashSet<String>,
    /// Keys synthesised from download folders on the previous refresh
    fallback_keys: HashSet<String>,
    /// Refresh that last saw an unattributed log line
    placeholder_touched: u64,
    initialized: bool,
    refreshes: u64,
    warnings: Vec<String>,
}

impl LauncherDetector {
    pub fn new(profile: LauncherProfile) -> Self {
        let format: Box<dyn ManifestFormat> = match profile.manifest_kind {
            ManifestKind::Acf => Box::new(AcfFormat),
            ManifestKind::Item => Box::new(ItemFormat),
        };
        let scanner = ManifestScanner::new(profile.manifest_dir.clone(), &profile.manifest_glob, format);

        Self {
            roots: vec![profile.root.clone()],
            profile,
            log: None,
            lines: LineBuffer::new(),
            scanner,
            names: BTreeMap::new(),
            active: HashMap::new(),
            backlog_keys: HashSet::new(),
            fallback_keys: HashSet::new(),
            placeholder_touched: 0,
            initialized: false,
            refreshes: 0,
            warnings: Vec::new(),
        }
    }

    /// Library roots found by the most recent scan.
    pub fn library_roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Display name for an id: learned name or `AppID <id>`.
    fn display_name(&self, id: &str) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| placeholder_title(id))
    }

    /// Remember an id's name and correct entries created before it was known.
    fn learn_name(&mut self, id: &str, name: &str) {
        if self.names.get(id).map(String::as_str) == Some(name) {
            return;
        }
        self.names.insert(id.to_string(), name.to_string());

        if let Some(entry) = self.active.get_mut(id) {
            if entry.title != name {
                tracing::debug!(launcher = %self.profile.name, id, name, "Back-filled title name");
                entry.title = name.to_string();
            }
        }

        // A log line that only carried the name can now be keyed by id
        if let Some(by_name) = self.active.remove(name) {
            self.active.entry(id.to_string()).or_insert(by_name);
        }
    }

    fn key_for(&self, subject: &Subject) -> (String, String) {
        match subject {
            Subject::Id(id) => (id.clone(), self.display_name(id)),
            Subject::Name(name) => {
                let id = self
                    .names
                    .iter()
                    .find(|(_, n)| *n == name)
                    .or_else(|| self.names.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)))
                    .map(|(id, _)| id.clone());
                match id {
                    Some(id) => {
                        let title = self.display_name(&id);
                        (id, title)
                    }
                    None => (name.clone(), name.clone()),
                }
            }
            Subject::Unattributed => {
                let label = self.placeholder_key();
                (label.clone(), label)
            }
        }
    }

    /// Key of the entry that unattributed log lines apply to.
    fn placeholder_key(&self) -> String {
        format!("{} download", self.profile.name)
    }

    /// A named completion also ends whatever the unattributed entry tracked.
    fn settle_placeholder(&mut self, download: DownloadState, install: InstallState) {
        let key = self.placeholder_key();
        if let Some(entry) = self.active.get_mut(&key) {
            if entry.is_active() {
                entry.download_state = download;
                entry.install_state = install;
                if entry.is_settled() {
                    entry.progress_percent = 100.0;
                }
            }
        }
    }

    /// Forget the unattributed entry once its log lines stop.
    fn expire_placeholder(&mut self) {
        let key = self.placeholder_key();
        if !self.active.contains_key(&key) {
            return;
        }
        if self.refreshes.saturating_sub(self.placeholder_touched) >= PLACEHOLDER_STALE_REFRESHES {
            self.active.remove(&key);
            tracing::debug!(launcher = %self.profile.name, "Dropped unattributed download with no recent log lines");
        }
    }

    /// Apply one log event to the active map.
    fn apply_log_event(&mut self, event: &LogEvent, backlog: bool) -> Option<String> {
        let (key, title) = self.key_for(&event.subject);
        let launcher = self.profile.name.clone();

        match (event.download, event.install) {
            (DownloadState::Downloading, install) => {
                let entry = self.active.entry(key.clone()).or_insert_with(|| {
                    TitleStatus::new(&title, &launcher, DownloadState::Downloading, install, LOG_START_PROGRESS)
                });
                entry.download_state = DownloadState::Downloading;
                entry.install_state = install;
                entry.progress_percent = LOG_START_PROGRESS;
            }
            (download, InstallState::Installing) => {
                let entry = self.active.entry(key.clone()).or_insert_with(|| {
                    TitleStatus::new(&title, &launcher, download, InstallState::Installing, LOG_START_PROGRESS)
                });
                entry.download_state = download;
                entry.install_state = InstallState::Installing;
            }
            (download, install) => {
                if event.subject != Subject::Unattributed {
                    self.settle_placeholder(download, install);
                }
                // Completion / pause lines only update titles we already track
                let entry = self.active.get_mut(&key)?;
                entry.download_state = download;
                entry.install_state = install;
                if entry.is_settled() {
                    entry.progress_percent = 100.0;
                }
            }
        }

        if event.subject == Subject::Unattributed {
            self.placeholder_touched = self.refreshes;
        }
        if backlog {
            self.backlog_keys.insert(key.clone());
        } else {
            self.backlog_keys.remove(&key);
        }
        Some(key)
    }

    /// Read new log lines and fold them into the map. Returns touched keys.
    fn ingest_log(&mut self) -> HashSet<String> {
        let mut touched = HashSet::new();
        let Some(reader) = self.log.as_mut() else {
            return touched;
        };

        let backlog = self.refreshes == 0;
        let chunk = reader.read_new_content();
        if let Some(warning) = reader.last_error() {
            self.warnings.push(warning.to_string());
        }

        let lines = self.lines.push(&chunk);
        if !lines.is_empty() {
            tracing::debug!(launcher = %self.profile.name, lines = lines.len(), "Read new log lines");
        }
        for line in lines {
            if let Some(event) = parse_line(&line) {
                if let Some(key) = self.apply_log_event(&event, backlog) {
                    touched.insert(key);
                }
            }
        }
        touched
    }

    /// Interpret one manifest: counters first, then the state table.
    ///
    /// Terminal means the code says fully installed and no counter disagrees.
    fn interpret_record(&self, record: &RawManifestRecord) -> (Interpretation, bool) {
        let table = self.profile.state_table;
        match record.state_code {
            Some(code) => {
                let interp = table.interpret_with_counters(code, record.counters.as_ref());
                (interp, table.is_terminal(code) && interp.is_settled())
            }
            None => {
                let interp = record
                    .counters
                    .as_ref()
                    .and_then(StateTable::from_counters)
                    .unwrap_or(Interpretation::UNKNOWN);
                (interp, false)
            }
        }
    }

    /// Scan manifests and merge them over log-derived guesses. Returns ids seen.
    fn ingest_manifests(&mut self) -> HashSet<String> {
        let roots = discover_library_roots(&self.profile.root, self.profile.library_index.as_deref());
        if roots != self.roots {
            tracing::info!(launcher = %self.profile.name, roots = roots.len(), "Library folders changed");
            self.roots = roots;
        }

        let report = self.scanner.scan(&self.roots);
        self.warnings.extend(report.warnings);

        let mut seen = HashSet::new();
        for record in report.records {
            seen.insert(record.id.clone());
            if let Some(name) = &record.name {
                self.learn_name(&record.id, name);
            }

            let (interp, terminal) = self.interpret_record(&record);
            if terminal {
                if self.active.remove(&record.id).is_some() {
                    tracing::info!(
                        launcher = %self.profile.name,
                        title = %self.display_name(&record.id),
                        "Title fully installed"
                    );
                }
                continue;
            }
            if interp.is_unknown() {
                continue;
            }

            let status = TitleStatus::new(
                self.display_name(&record.id),
                &self.profile.name,
                interp.download,
                interp.install,
                interp.progress,
            );
            if status.is_active() {
                self.active.insert(record.id.clone(), status);
            } else if let Some(existing) = self.active.get_mut(&record.id) {
                *existing = status;
            }
            self.backlog_keys.remove(&record.id);
        }
        seen
    }

    /// Non-empty download folders nobody else explained.
    fn ingest_download_dirs(&mut self, touched: &HashSet<String>, seen: &HashSet<String>) {
        for key in std::mem::take(&mut self.fallback_keys) {
            if !touched.contains(&key) && !seen.contains(&key) {
                self.active.remove(&key);
            }
        }

        let Some(rel) = self.profile.downloading_dir.clone() else {
            return;
        };

        for root in self.roots.clone() {
            let dir = root.join(&rel);
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !path.is_dir() || is_empty_dir(&path) {
                    continue;
                }
                let Some(folder) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                if self.active.contains_key(&folder) || seen.contains(&folder) {
                    continue;
                }

                tracing::debug!(launcher = %self.profile.name, folder = %folder, "Inferred download from folder");
                let status = TitleStatus::new(
                    self.display_name(&folder),
                    &self.profile.name,
                    DownloadState::Downloading,
                    InstallState::Unknown,
                    0.0,
                );
                self.active.insert(folder.clone(), status);
                self.fallback_keys.insert(folder);
            }
        }
    }

    /// Drop startup-backlog entries that nothing on disk corroborates.
    fn prune_backlog(&mut self, seen: &HashSet<String>) {
        let backlog = std::mem::take(&mut self.backlog_keys);
        if self.scanner_expected_nothing() {
            return;
        }
        for key in backlog {
            if seen.contains(&key) || self.fallback_keys.contains(&key) {
                continue;
            }
            if self.active.remove(&key).is_some() {
                tracing::debug!(launcher = %self.profile.name, key = %key, "Dropped stale log history entry");
            }
        }
    }

    /// True when no manifest directory exists under any root.
    fn scanner_expected_nothing(&self) -> bool {
        !self.roots.iter().any(|r| self.scanner.manifest_dir_for(r).is_dir())
    }

    fn refresh(&mut self) {
        let touched = self.ingest_log();
        self.expire_placeholder();
        let seen = self.ingest_manifests();
        self.ingest_download_dirs(&touched, &seen);
        if self.refreshes == 0 {
            self.prune_backlog(&seen);
        }
        self.refreshes += 1;
    }
}

fn is_empty_dir(path: &std::path::Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

impl DownloadDetector for LauncherDetector {
    fn launcher_name(&self) -> &str {
        &self.profile.name
    }

    fn initialize(&mut self) -> Result<bool> {
        if !self.profile.root.is_dir() {
            return Err(WatchError::DirectoryNotFound(self.profile.root.clone()));
        }

        if let Some(log_path) = &self.profile.log_path {
            if !log_path.exists() {
                tracing::info!(
                    launcher = %self.profile.name,
                    path = %log_path.display(),
                    "Log file not found yet; will read it once created"
                );
            }
            self.log = Some(LogTailReader::new(log_path.clone()));
        }

        self.roots = discover_library_roots(&self.profile.root, self.profile.library_index.as_deref());
        self.initialized = true;
        tracing::info!(
            launcher = %self.profile.name,
            root = %self.profile.root.display(),
            libraries = self.roots.len(),
            "Detector initialized"
        );
        Ok(true)
    }

    fn get_active_downloads(&mut self) -> Vec<TitleStatus> {
        if !self.initialized {
            return Vec::new();
        }
        self.refresh();

        let mut list: Vec<TitleStatus> = self
            .active
            .iter()
            .map(|(key, status)| status.clone().with_id(key.as_str()))
            .collect();
        list.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        list
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
