// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-title manifest scanning and library-root discovery.
//!
//! Each launcher persists one manifest per title. The two on-disk formats
//! (Valve key/value text and Epic JSON) sit behind [`ManifestFormat`] and both
//! produce a [`RawManifestRecord`]. Field extraction is tolerant: a missing or
//! malformed field becomes `None`. Only a file that cannot be read, or that
//! yields no identifier at all, is skipped, with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::flags::{ByteCounters, StateTable};
use super::vdf::{self, VdfBlock, VdfValue};
use crate::error::{Result, WatchError};

/// Fields pulled out of one manifest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawManifestRecord {
    pub id: String,
    pub name: Option<String>,
    pub state_code: Option<u64>,
    pub counters: Option<ByteCounters>,
    pub path: PathBuf,
}

/// One manifest format (strategy).
pub trait ManifestFormat: Send + Sync + std::fmt::Debug {
    /// Parse file contents. Fails only when no identifier can be found.
    fn parse(&self, path: &Path, contents: &str) -> Result<RawManifestRecord>;
}

/// Steam `appmanifest_<id>.acf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcfFormat;

impl AcfFormat {
    fn counters(app: &VdfBlock) -> Option<ByteCounters> {
        let to_download = app.get_u64("BytesToDownload");
        let downloaded = app.get_u64("BytesDownloaded");
        let to_stage = app.get_u64("BytesToStage");
        let staged = app.get_u64("BytesStaged");

        if to_download.is_none() && to_stage.is_none() {
            return None;
        }
        Some(ByteCounters {
            to_download: to_download.unwrap_or(0),
            downloaded: downloaded.unwrap_or(0),
            to_stage: to_stage.unwrap_or(0),
            staged: staged.unwrap_or(0),
        })
    }

    /// `appmanifest_42.acf` -> `42`
    fn id_from_file_name(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let id = stem.strip_prefix("appmanifest_")?;
        (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
    }
}

impl ManifestFormat for AcfFormat {
    fn parse(&self, path: &Path, contents: &str) -> Result<RawManifestRecord> {
        let root = vdf::parse(contents);
        let empty = VdfBlock::default();
        let app = root.get_block("AppState").unwrap_or(&empty);

        let id = app
            .get_str("appid")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| Self::id_from_file_name(path))
            .ok_or_else(|| WatchError::Manifest {
                path: path.to_path_buf(),
                reason: "no appid".to_string(),
            })?;

        Ok(RawManifestRecord {
            id,
            name: app
                .get_str("name")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            state_code: app.get_u64("StateFlags"),
            counters: Self::counters(app),
            path: path.to_path_buf(),
        })
    }
}

/// Epic `Data/Manifests/*.item` (JSON).
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemFormat;

impl ManifestFormat for ItemFormat {
    fn parse(&self, path: &Path, contents: &str) -> Result<RawManifestRecord> {
        let json: Value = serde_json::from_str(contents)?;
        let field = |key: &str| {
            json.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let id = field("AppName")
            .or_else(|| field("CatalogItemId"))
            .or_else(|| field("InstallationGuid"))
            .ok_or_else(|| WatchError::Manifest {
                path: path.to_path_buf(),
                reason: "no AppName".to_string(),
            })?;

        let state_code = json.get("bIsIncompleteInstall").and_then(|v| v.as_bool()).map(|incomplete| {
            if incomplete {
                StateTable::EPIC_INCOMPLETE
            } else {
                StateTable::EPIC_INSTALLED
            }
        });

        Ok(RawManifestRecord {
            id,
            name: field("DisplayName"),
            state_code,
            counters: None,
            path: path.to_path_buf(),
        })
    }
}

/// File name pattern with at most one `*`, e.g. `appmanifest_*.acf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    prefix: String,
    suffix: String,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Self {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_ascii_lowercase(),
                suffix: suffix.to_ascii_lowercase(),
            },
            None => Self {
                prefix: pattern.to_ascii_lowercase(),
                suffix: String::new(),
            },
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        lower.len() >= self.prefix.len() + self.suffix.len()
            && lower.starts_with(&self.prefix)
            && lower.ends_with(&self.suffix)
    }
}

/// Outcome of one full scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub records: Vec<RawManifestRecord>,
    pub warnings: Vec<String>,
}

/// Enumerates and parses manifests under a set of library roots.
#[derive(Debug)]
pub struct ManifestScanner {
    manifest_dir: PathBuf,
    pattern: NamePattern,
    format: Box<dyn ManifestFormat>,
}

impl ManifestScanner {
    /// `manifest_dir` is relative to each library root (may be empty).
    pub fn new(manifest_dir: impl Into<PathBuf>, pattern: &str, format: Box<dyn ManifestFormat>) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
            pattern: NamePattern::new(pattern),
            format,
        }
    }

    pub fn manifest_dir_for(&self, root: &Path) -> PathBuf {
        root.join(&self.manifest_dir)
    }

    /// Scan every root. One bad file never stops the others.
    pub fn scan(&self, roots: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport::default();

        for root in roots {
            let dir = self.manifest_dir_for(root);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %dir.display(), "Manifest directory does not exist yet");
                    continue;
                }
                Err(e) => {
                    let message = format!("Cannot list manifests in {}: {}", dir.display(), e);
                    tracing::warn!("{}", message);
                    report.warnings.push(message);
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| self.pattern.matches(n))
                            .unwrap_or(false)
                })
                .collect();
            paths.sort();

            for path in paths {
                match self.parse_file(&path) {
                    Ok(record) => report.records.push(record),
                    Err(e) => {
                        let message = format!("Skipping manifest {}: {}", path.display(), e);
                        tracing::warn!("{}", message);
                        report.warnings.push(message);
                    }
                }
            }
        }

        report
    }

    fn parse_file(&self, path: &Path) -> Result<RawManifestRecord> {
        let bytes = fs::read(path)?;
        let contents = String::from_utf8_lossy(&bytes);
        self.format.parse(path, contents.trim_start_matches('\u{feff}'))
    }
}

/// Library roots: the primary root plus every folder listed in its index.
///
/// Understands the modern nested layout
/// (`"libraryfolders" { "0" { "path" "D:\\Lib" } }`) and the legacy flat one
/// (`"LibraryFolders" { "1" "D:\\Lib" }`). Re-read on every call so drives
/// added or removed between scans are picked up.
pub fn discover_library_roots(primary: &Path, index: Option<&Path>) -> Vec<PathBuf> {
    let mut roots = vec![primary.to_path_buf()];

    let Some(index) = index else {
        return roots;
    };
    let contents = match fs::read_to_string(index) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(index = %index.display(), "Cannot read library index: {}", e);
            }
            return roots;
        }
    };

    let doc = vdf::parse(&contents);
    let folders = doc
        .get_block("libraryfolders")
        .cloned()
        .unwrap_or(doc);

    for (key, value) in folders.iter() {
        if !key.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let path = match value {
            VdfValue::Str(path) => Some(path.as_str()),
            VdfValue::Block(block) => block.get_str("path"),
        };
        if let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            if !roots.iter().any(|r| same_path(r, &path)) {
                roots.push(path);
            }
        }
    }

    roots
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            let norm = |p: &Path| p.to_string_lossy().replace('\\', "/").trim_end_matches('/').to_ascii_lowercase();
            norm(a) == norm(b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn acf(id: &str, name: &str, flags: u64) -> String {
        format!(
            "\"AppState\"\n{{\n\t\"appid\"\t\t\"{}\"\n\t\"name\"\t\t\"{}\"\n\t\"StateFlags\"\t\t\"{}\"\n}}\n",
            id, name, flags
        )
    }

    #[test]
    fn test_acf_fields() {
        let text = "\"AppState\" { \"appid\" \"42\" \"name\" \"Game\" \"StateFlags\" \"1026\" \
                    \"BytesToDownload\" \"100\" \"BytesDownloaded\" \"40\" }";
        let record = AcfFormat.parse(Path::new("appmanifest_42.acf"), text).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.name.as_deref(), Some("Game"));
        assert_eq!(record.state_code, Some(1026));
        let counters = record.counters.unwrap();
        assert_eq!(counters.to_download, 100);
        assert_eq!(counters.downloaded, 40);
        assert_eq!(counters.to_stage, 0);
    }

    #[test]
    fn test_acf_tolerates_missing_fields() {
        let record = AcfFormat
            .parse(Path::new("/lib/appmanifest_99.acf"), "\"AppState\" { \"StateFlags\" \"abc\" }")
            .unwrap();
        assert_eq!(record.id, "99");
        assert_eq!(record.name, None);
        assert_eq!(record.state_code, None);
        assert_eq!(record.counters, None);
    }

    #[test]
    fn test_acf_without_any_id_fails() {
        assert!(AcfFormat.parse(Path::new("weird.acf"), "garbage").is_err());
    }

    #[test]
    fn test_item_format() {
        let text = r#"{"DisplayName": "Fortnite", "AppName": "Fortnite", "bIsIncompleteInstall": true}"#;
        let record = ItemFormat.parse(Path::new("x.item"), text).unwrap();
        assert_eq!(record.id, "Fortnite");
        assert_eq!(record.state_code, Some(StateTable::EPIC_INCOMPLETE));

        let text = r#"{"CatalogItemId": "abc", "bIsIncompleteInstall": "maybe"}"#;
        let record = ItemFormat.parse(Path::new("y.item"), text).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.name, None);
        assert_eq!(record.state_code, None);

        assert!(ItemFormat.parse(Path::new("z.item"), "{ not json").is_err());
    }

    #[test]
    fn test_name_pattern() {
        let pattern = NamePattern::new("appmanifest_*.acf");
        assert!(pattern.matches("appmanifest_42.acf"));
        assert!(pattern.matches("AppManifest_42.ACF"));
        assert!(!pattern.matches("appmanifest_42.acf.tmp"));
        assert!(!pattern.matches("libraryfolders.vdf"));
    }

    #[test]
    fn test_scan_skips_corrupt_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let steamapps = temp_dir.path().join("steamapps");
        fs::create_dir_all(&steamapps).unwrap();
        fs::write(steamapps.join("appmanifest_1.acf"), acf("1", "One", 4)).unwrap();
        fs::write(steamapps.join("appmanifest_bad.acf"), "no braces, no id").unwrap();
        fs::write(steamapps.join("appmanifest_3.acf"), acf("3", "Three", 1026)).unwrap();
        fs::write(steamapps.join("notes.txt"), "ignored").unwrap();

        let scanner = ManifestScanner::new("steamapps", "appmanifest_*.acf", Box::new(AcfFormat));
        let report = scanner.scan(&[temp_dir.path().to_path_buf()]);

        let ids: Vec<_> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_scan_missing_root_is_quiet() {
        let scanner = ManifestScanner::new("steamapps", "appmanifest_*.acf", Box::new(AcfFormat));
        let report = scanner.scan(&[PathBuf::from("/definitely/not/here")]);
        assert!(report.records.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_discover_modern_and_legacy_index() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let primary = temp_dir.path().join("Steam");
        let index = temp_dir.path().join("libraryfolders.vdf");

        fs::write(
            &index,
            "\"libraryfolders\"\n{\n\t\"0\"\n\t{\n\t\t\"path\"\t\t\"X\"\n\t}\n\t\"1\"\n\t{\n\t\t\"path\"\t\t\"/mnt/games\"\n\t}\n\t\"contentstatsid\"\t\t\"1\"\n}\n"
                .replace('X', &primary.to_string_lossy().replace('\\', "\\\\")),
        )
        .unwrap();
        let roots = discover_library_roots(&primary, Some(&index));
        assert_eq!(roots, vec![primary.clone(), PathBuf::from("/mnt/games")]);

        fs::write(&index, "\"LibraryFolders\" { \"TimeNextStatsReport\" \"1\" \"1\" \"/old/lib\" }").unwrap();
        let roots = discover_library_roots(&primary, Some(&index));
        assert_eq!(roots, vec![primary.clone(), PathBuf::from("/old/lib")]);
    }

    #[test]
    fn test_discover_without_index_keeps_primary() {
        let primary = PathBuf::from("/steam");
        assert_eq!(discover_library_roots(&primary, None), vec![primary.clone()]);
        assert_eq!(
            discover_library_roots(&primary, Some(Path::new("/missing/libraryfolders.vdf"))),
            vec![primary]
        );
    }
}
