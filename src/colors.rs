// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Unified ANSI color code definitions
//!
//! Raw escape codes for the progress bar; everything else is styled through
//! `colored`.
//!
//! Color usage conventions:
//! - CYAN = Downloads in progress
//! - YELLOW = Installs in progress, warnings
//! - GREEN = Completed titles
//! - DIM = Separators and secondary details

/// Reset all formatting
pub const RESET: &str = "\x1b[0m";

/// Dimmed/faint text
pub const DIM: &str = "\x1b[2m";

pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

/// Symbols for status and feedback (no emoji)
pub mod symbols {
    pub const SUCCESS: &str = "[OK]";
    pub const ERROR: &str = "[X]";
    pub const WARNING: &str = "[!]";
    pub const INFO: &str = "[i]";
    pub const ARROW: &str = "->";
    pub const BULLET: &str = "*";
}

const HORIZONTAL: char = '─';

/// Render a separator line
pub fn separator(width: usize) -> String {
    format!("{}{}{}", DIM, HORIZONTAL.to_string().repeat(width), RESET)
}

/// Render a download progress bar.
///
/// Colour follows the phase: cyan while downloading, yellow while installing,
/// green once complete.
pub fn progress_bar(percent: f64, width: usize, installing: bool) -> String {
    let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
    let filled = ((percent / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    let empty = width - filled;

    let color = if percent >= 100.0 {
        GREEN
    } else if installing {
        YELLOW
    } else {
        CYAN
    };

    format!(
        "{}{}{}{} {:>5.1}%",
        color,
        "█".repeat(filled),
        "░".repeat(empty),
        RESET,
        percent
    )
}

/// `mm:ss` countdown text, or `h:mm:ss` past an hour.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
