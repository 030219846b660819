// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Launcher profiles and install-path resolution.
//!
//! A [`LauncherProfile`] describes where one launcher keeps its log, its
//! manifests and its library index. The single detector implementation is
//! parameterised by a profile instead of being subclassed per launcher.

use std::path::{Path, PathBuf};

use super::flags::StateTable;

/// Which manifest format a launcher writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Valve key/value text
    Acf,
    /// Epic JSON `.item`
    Item,
}

/// Static description of one launcher's on-disk layout.
#[derive(Debug, Clone)]
pub struct LauncherProfile {
    /// Display name (e.g. "Steam")
    pub name: String,
    /// Install / data root; must exist for the detector to initialise
    pub root: PathBuf,
    /// Content log, absolute
    pub log_path: Option<PathBuf>,
    /// Manifest directory relative to each library root
    pub manifest_dir: PathBuf,
    /// Manifest file name pattern with one `*`
    pub manifest_glob: String,
    pub manifest_kind: ManifestKind,
    /// Index listing extra library roots, absolute
    pub library_index: Option<PathBuf>,
    /// In-flight download folders relative to each library root
    pub downloading_dir: Option<PathBuf>,
    pub state_table: StateTable,
}

impl LauncherProfile {
    /// Steam layout rooted at `root`.
    pub fn steam(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            name: "Steam".to_string(),
            log_path: Some(root.join("logs").join("content_log.txt")),
            manifest_dir: PathBuf::from("steamapps"),
            manifest_glob: "appmanifest_*.acf".to_string(),
            manifest_kind: ManifestKind::Acf,
            library_index: Some(root.join("steamapps").join("libraryfolders.vdf")),
            downloading_dir: Some(PathBuf::from("steamapps").join("downloading")),
            state_table: StateTable::Steam,
            root,
        }
    }

    /// Epic Games Launcher layout. `root` is the `EpicGamesLauncher` data folder.
    pub fn epic(root: impl Into<PathBuf>, log_path: Option<PathBuf>) -> Self {
        Self {
            name: "Epic Games".to_string(),
            root: root.into(),
            log_path,
            manifest_dir: PathBuf::from("Data").join("Manifests"),
            manifest_glob: "*.item".to_string(),
            manifest_kind: ManifestKind::Item,
            library_index: None,
            downloading_dir: None,
            state_table: StateTable::Epic,
        }
    }
}

/// Validate a user override, falling back to the first existing default.
///
/// An override that does not exist is reported and ignored.
fn resolve(label: &str, override_path: Option<&Path>, defaults: Vec<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_dir() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(launcher = label, path = %path.display(), "Configured path does not exist, trying defaults");
    }

    defaults.into_iter().find(|p| p.is_dir())
}

/// Default Steam install locations for this platform.
pub fn default_steam_roots() -> Vec<PathBuf> {
    #[allow(unused_mut)]
    let mut roots = Vec::new();

    #[cfg(target_os = "windows")]
    {
        for var in ["ProgramFiles(x86)", "ProgramFiles"] {
            if let Ok(base) = std::env::var(var) {
                roots.push(PathBuf::from(base).join("Steam"));
            }
        }
        roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Library").join("Application Support").join("Steam"));
        }
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join(".steam").join("steam"));
            roots.push(home.join(".local").join("share").join("Steam"));
            roots.push(home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"));
        }
    }

    roots
}

/// Default Epic data folders for this platform (empty where Epic does not run).
pub fn default_epic_roots() -> Vec<PathBuf> {
    #[allow(unused_mut)]
    let mut roots = Vec::new();

    #[cfg(target_os = "windows")]
    {
        let program_data = std::env::var("ProgramData").unwrap_or_else(|_| r"C:\ProgramData".to_string());
        roots.push(PathBuf::from(program_data).join("Epic").join("EpicGamesLauncher"));
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Library/Application Support/Epic/EpicGamesLauncher"));
        }
    }

    roots
}

/// Default Epic launcher log for this platform.
pub fn default_epic_log() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir().map(|d| d.join("EpicGamesLauncher").join("Saved").join("Logs").join("EpicGamesLauncher.log"))
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join("Library/Logs/Unreal Engine/EpicGamesLauncher/EpicGamesLauncher.log"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        None
    }
}

/// Steam root from an override or the platform defaults.
pub fn resolve_steam_root(override_path: Option<&Path>) -> Option<PathBuf> {
    resolve("Steam", override_path, default_steam_roots())
}

/// Epic data root from an override or the platform defaults.
pub fn resolve_epic_root(override_path: Option<&Path>) -> Option<PathBuf> {
    resolve("Epic Games", override_path, default_epic_roots())
}
