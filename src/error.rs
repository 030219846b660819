// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types and consistent error formatting for downwatch.
//!
//! [`WatchError`] is the library's error taxonomy. Parsing and scanning
//! failures never surface as a `WatchError`; they are logged and absorbed at
//! the file or read that produced them. Only structural problems (bad
//! configuration, no usable launcher, shutdown command failure) propagate.
//!
//! [`ErrorBuilder`] renders fatal errors for the terminal with possible causes
//! and suggested fixes.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    /// Invalid configuration, rejected before monitoring starts
    #[error("Configuration error: {0}")]
    Config(String),
    /// Launcher install directory is missing
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    /// Every detector failed to initialise
    #[error("No launcher could be initialised")]
    NoLaunchers,
    /// Caller passed an out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The OS shutdown command failed
    #[error("Shutdown command failed: {0}")]
    Shutdown(String),
    /// A single manifest could not be understood
    #[error("Unreadable manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use downwatch::error::format_error;
///
/// let error = format_error(
///     "No launcher found",
///     &["Steam is not installed", "Steam lives in a non-default folder"],
///     &["Pass the folder: downwatch --steam-path <dir>"],
/// );
/// println!("{}", error);
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = String::new();

    output.push_str(&format!("[✗] {}\n\n", title));

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.truncate(output.trim_end().len());
    output
}

/// Builder for constructing formatted error messages.
///
/// # Example
///
/// ```
/// use downwatch::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Invalid configuration")
///     .cause("polling interval is zero")
///     .fix("Set a positive interval: downwatch --interval 30")
///     .build();
/// println!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    /// Create a new error builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Build the formatted error message.
    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().build())
    }
}

/// Terminal rendering for errors that end a session.
pub fn describe(error: &WatchError) -> String {
    match error {
        WatchError::Config(reason) => ErrorBuilder::new("Invalid configuration")
            .cause(reason.clone())
            .fix("Check values: downwatch config show")
            .fix("Delays, intervals and idle checks must all be greater than zero")
            .build(),
        WatchError::NoLaunchers => ErrorBuilder::new("No supported launcher was found")
            .cause("Steam / Epic Games Launcher is not installed")
            .cause("The launcher lives in a non-default folder")
            .fix("Point at Steam: downwatch --steam-path <dir>")
            .fix("Point at Epic: downwatch --epic-path <dir>")
            .build(),
        WatchError::Shutdown(reason) => ErrorBuilder::new("Could not schedule the shutdown")
            .cause(reason.clone())
            .cause("The shutdown command needs elevated privileges")
            .fix("Re-run from an elevated / sudo-capable terminal")
            .fix("Try a rehearsal first: downwatch --dry-run")
            .build(),
        other => ErrorBuilder::new(other.to_string()).build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        let error = format_error("Test Error", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.contains("[✗] Test Error"));
        assert!(error.contains("Possible causes:"));
        assert!(error.contains("  - Cause 2"));
        assert!(error.contains("Try these fixes:"));
        assert!(error.ends_with("  2. Fix 2"));
    }

    #[test]
    fn test_empty_causes_and_fixes() {
        let error = format_error("Empty test", &[], &[]);
        assert!(!error.contains("Possible causes:"));
        assert!(!error.contains("Try these fixes:"));
        assert_eq!(error, "[✗] Empty test");
    }

    #[test]
    fn test_describe_config_error() {
        let text = describe(&WatchError::Config("polling interval must be > 0".into()));
        assert!(text.contains("Invalid configuration"));
        assert!(text.contains("polling interval must be > 0"));
    }

    #[test]
    fn test_directory_not_found_display() {
        let err = WatchError::DirectoryNotFound(PathBuf::from("/nope/Steam"));
        assert!(err.to_string().contains("/nope/Steam"));
    }
}
