// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Incremental reader for a log file that another process keeps appending to.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Reads only what was appended since the previous call.
///
/// The file is opened read-only for each call and never locked, so the
/// launcher can keep writing. A missing file or a failed read yields empty
/// content; the failure text is kept in [`LogTailReader::last_error`].
#[derive(Debug)]
pub struct LogTailReader {
    path: PathBuf,
    offset: u64,
    is_initial: bool,
    last_error: Option<String>,
}

impl LogTailReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            is_initial: true,
            last_error: None,
        }
    }

    /// Byte offset the next read starts from.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// True until the first successful read.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Warning produced by the most recent call, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Return content appended since the last call (whole file on first call).
    pub fn read_new_content(&mut self) -> String {
        self.last_error = None;

        if !self.path.exists() {
            return String::new();
        }

        match self.read_from_offset() {
            Ok(content) => content,
            Err(e) => {
                let message = format!("Failed to read {}: {}", self.path.display(), e);
                tracing::warn!(path = %self.path.display(), "{}", message);
                self.last_error = Some(message);
                String::new()
            }
        }
    }

    fn read_from_offset(&mut self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();

        let start = if self.is_initial {
            0
        } else if len < self.offset {
            // Launcher rotated or truncated the log
            tracing::debug!(path = %self.path.display(), "Log shrank, re-reading from start");
            0
        } else {
            self.offset
        };

        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity(len.saturating_sub(start) as usize);
        file.read_to_end(&mut buf)?;

        // A character the launcher is still writing stays on disk for next time
        let usable = decodable_len(&buf);
        buf.truncate(usable);

        self.offset = start + usable as u64;
        self.is_initial = false;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Length of `buf` minus any incomplete UTF-8 sequence at its very end.
///
/// Invalid bytes in the middle are kept (and later replaced); only a
/// truncated trailing sequence is held back.
fn decodable_len(buf: &[u8]) -> usize {
    let mut checked = 0;
    loop {
        match std::str::from_utf8(&buf[checked..]) {
            Ok(_) => return buf.len(),
            Err(e) => match e.error_len() {
                Some(bad) => checked += e.valid_up_to() + bad,
                None => return checked + e.valid_up_to(),
            },
        }
    }
}

/// Splits tailed chunks into complete lines, holding back an unterminated tail.
///
/// Accepts both `\n` and `\r\n` terminators.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.pending.push_str(chunk);

        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn append_bytes(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open log for append");
        file.write_all(bytes).expect("append");
    }

    fn append(path: &Path, text: &str) {
        append_bytes(path, text.as_bytes());
    }

    #[test]
    fn test_character_split_across_reads() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("content_log.txt");
        let e_acute = "é".as_bytes();

        append_bytes(&path, b"Caf");
        append_bytes(&path, &e_acute[..1]);
        let mut reader = LogTailReader::new(&path);
        let first = reader.read_new_content();
        assert_eq!(first, "Caf");
        assert_eq!(reader.offset(), 3);

        append_bytes(&path, &e_acute[1..]);
        append_bytes(&path, b"\n");
        let second = reader.read_new_content();
        assert_eq!(second, "é\n");

        let on_disk = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(format!("{}{}", first, second), on_disk);
    }

    #[test]
    fn test_decodable_len() {
        assert_eq!(decodable_len(b"plain"), 5);
        assert_eq!(decodable_len(&[b'a', 0xE2, 0x82]), 1);
        // Invalid byte mid-stream is consumed, the trailing partial is not
        assert_eq!(decodable_len(&[0xFF, b'a', 0xC3]), 2);
        assert_eq!(decodable_len(&[]), 0);
    }

    #[test]
    fn test_missing_file_is_empty_without_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut reader = LogTailReader::new(temp_dir.path().join("content_log.txt"));
        assert_eq!(reader.read_new_content(), "");
        assert!(reader.last_error().is_none());
        assert!(reader.is_initial());
    }

    #[test]
    fn test_reads_only_new_content() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("content_log.txt");
        append(&path, "first line\n");

        let mut reader = LogTailReader::new(&path);
        assert_eq!(reader.read_new_content(), "first line\n");
        assert!(!reader.is_initial());
        assert_eq!(reader.read_new_content(), "");

        append(&path, "second line\nthird");
        assert_eq!(reader.read_new_content(), "second line\nthird");
        append(&path, " continued\n");
        assert_eq!(reader.read_new_content(), " continued\n");
    }

    #[test]
    fn test_concatenation_matches_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("log.txt");
        let mut reader = LogTailReader::new(&path);
        let mut seen = String::new();

        for i in 0..20 {
            append(&path, &format!("line {}\r\n", i));
            if i % 3 == 0 {
                seen.push_str(&reader.read_new_content());
            }
        }
        seen.push_str(&reader.read_new_content());

        let on_disk = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(seen, on_disk);
    }

    #[test]
    fn test_truncated_log_restarts_from_zero() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("log.txt");
        append(&path, "a fairly long first generation of the log\n");

        let mut reader = LogTailReader::new(&path);
        reader.read_new_content();

        std::fs::write(&path, "new\n").expect("truncate");
        assert_eq!(reader.read_new_content(), "new\n");
        assert_eq!(reader.offset(), 4);
    }

    #[test]
    fn test_line_buffer_holds_partial_line() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push("AppID 42 upd").is_empty());

        let lines = buffer.push("ate started : download\r\nnext");
        assert_eq!(lines, vec!["AppID 42 update started : download".to_string()]);
        assert_eq!(buffer.push(" line\n"), vec!["next line".to_string()]);
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push("one\n\n\r\ntwo\n");
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert!(buffer.push("three").is_empty());
    }
}
