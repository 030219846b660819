// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Status notifications for observers of a monitoring session.
//!
//! The core calls a [`StatusNotifier`] fire-and-forget: no method returns a
//! value and none is awaited. Fan-out to several subscribers is left to the
//! observer; [`ChannelNotifier`] is the usual bridge into a UI task.

use std::io::Write;
use std::sync::Mutex;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::colors::{self, symbols};
use crate::types::{ApplicationPhase, TitleStatus};

/// Snapshot of the verification counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationProgress {
    pub elapsed_secs: u64,
    pub total_secs: u64,
    pub idle_checks: u32,
    pub required_checks: u32,
}

impl VerificationProgress {
    pub fn remaining_secs(&self) -> u64 {
        self.total_secs.saturating_sub(self.elapsed_secs)
    }
}

/// One notification, as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Status { message: String },
    Warning { message: String },
    TitleUpdated { status: TitleStatus },
    PhaseChanged { phase: ApplicationPhase },
    VerificationProgress { progress: VerificationProgress },
    ShutdownScheduled { delay_secs: u64, dry_run: bool },
    Error { message: String },
}

/// Observer capability. Every method defaults to doing nothing.
pub trait StatusNotifier: Send + Sync {
    fn status(&self, _message: &str) {}

    fn warning(&self, _message: &str) {}

    fn title_updated(&self, _status: &TitleStatus) {}

    fn phase_changed(&self, _phase: ApplicationPhase) {}

    fn verification_progress(&self, _progress: &VerificationProgress) {}

    fn shutdown_scheduled(&self, _delay_secs: u64, _dry_run: bool) {}

    fn error(&self, _message: &str) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl StatusNotifier for NullNotifier {}

/// Forwards events into an unbounded channel.
///
/// A closed receiver is ignored; notifications are purely observational.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: UnboundedSender<StatusEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: UnboundedSender<StatusEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

impl StatusNotifier for ChannelNotifier {
    fn status(&self, message: &str) {
        self.send(StatusEvent::Status { message: message.to_string() });
    }

    fn warning(&self, message: &str) {
        self.send(StatusEvent::Warning { message: message.to_string() });
    }

    fn title_updated(&self, status: &TitleStatus) {
        self.send(StatusEvent::TitleUpdated { status: status.clone() });
    }

    fn phase_changed(&self, phase: ApplicationPhase) {
        self.send(StatusEvent::PhaseChanged { phase });
    }

    fn verification_progress(&self, progress: &VerificationProgress) {
        self.send(StatusEvent::VerificationProgress { progress: *progress });
    }

    fn shutdown_scheduled(&self, delay_secs: u64, dry_run: bool) {
        self.send(StatusEvent::ShutdownScheduled { delay_secs, dry_run });
    }

    fn error(&self, message: &str) {
        self.send(StatusEvent::Error { message: message.to_string() });
    }
}

/// Coloured line output for the CLI.
pub struct ConsoleNotifier {
    quiet: bool,
    /// Serialises writes from the session task and the Ctrl+C thread
    out: Mutex<()>,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet, out: Mutex::new(()) }
    }

    fn line(&self, text: String) {
        let stamp = format!("[{}]", chrono::Local::now().format("%H:%M:%S"));
        let _guard = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{} {}", stamp.dimmed(), text);
        let _ = stdout.flush();
    }
}

/// One status row: launcher, title, phase and a progress bar.
pub fn format_title_line(status: &TitleStatus) -> String {
    let installing = status.install_state == crate::types::InstallState::Installing;
    format!(
        "  {} {:<32} {:<12} {}  {}",
        symbols::BULLET,
        status.title,
        status.phase_label(),
        colors::progress_bar(status.progress_percent, 20, installing),
        format!("[{}]", status.launcher_name).dimmed()
    )
}

impl StatusNotifier for ConsoleNotifier {
    fn status(&self, message: &str) {
        if !self.quiet {
            self.line(format!("{} {}", symbols::INFO.cyan(), message));
        }
    }

    fn warning(&self, message: &str) {
        self.line(format!("{} {}", symbols::WARNING.yellow(), message));
    }

    fn title_updated(&self, status: &TitleStatus) {
        if !self.quiet {
            self.line(format_title_line(status));
        }
    }

    fn phase_changed(&self, phase: ApplicationPhase) {
        let label = phase.as_str().to_uppercase();
        let text = match phase {
            ApplicationPhase::Completed => format!("{} {}", symbols::SUCCESS.green(), label.green().bold()),
            ApplicationPhase::Error => format!("{} {}", symbols::ERROR.red(), label.red().bold()),
            ApplicationPhase::Cancelled => format!("{} {}", symbols::WARNING.yellow(), label.yellow().bold()),
            _ if self.quiet => return,
            _ => format!("{} {}", symbols::ARROW.bright_cyan(), label.bright_cyan().bold()),
        };
        self.line(text);
    }

    fn verification_progress(&self, progress: &VerificationProgress) {
        if self.quiet {
            return;
        }
        self.line(format!(
            "  {} idle check {}/{}, {} left",
            symbols::INFO.cyan(),
            progress.idle_checks,
            progress.required_checks,
            colors::format_duration(progress.remaining_secs())
        ));
    }

    fn shutdown_scheduled(&self, delay_secs: u64, dry_run: bool) {
        if dry_run {
            self.line(format!(
                "{} {} would shut down in {}",
                symbols::WARNING.yellow(),
                "[dry run]".yellow().bold(),
                colors::format_duration(delay_secs)
            ));
        } else {
            self.line(format!(
                "{} {} in {} (Ctrl+C to abort)",
                symbols::WARNING.red(),
                "Shutdown scheduled".red().bold(),
                colors::format_duration(delay_secs)
            ));
        }
    }

    fn error(&self, message: &str) {
        self.line(format!("{} {}", symbols::ERROR.red(), message.red()));
    }
}
