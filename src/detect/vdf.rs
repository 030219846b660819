// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tolerant reader for Valve's brace-delimited key/value text format.
//!
//! ```text
//! "AppState"
//! {
//!     "appid"       "42"
//!     "name"        "Some Game"
//!     "StateFlags"  "1026"
//! }
//! ```
//!
//! Malformed input never fails: stray closing braces are ignored, unclosed
//! blocks are closed at end of input and a key without a value is dropped.

/// A value in a key/value document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfValue {
    Str(String),
    Block(VdfBlock),
}

/// An ordered list of key/value pairs. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdfBlock {
    pub entries: Vec<(String, VdfValue)>,
}

impl VdfBlock {
    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            VdfValue::Str(s) => Some(s.as_str()),
            VdfValue::Block(_) => None,
        }
    }

    pub fn get_block(&self, key: &str) -> Option<&VdfBlock> {
        match self.get(key)? {
            VdfValue::Block(b) => Some(b),
            VdfValue::Str(_) => None,
        }
    }

    /// Parse the value under `key` as an unsigned integer.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get_str(key)?.trim().parse().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VdfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Open,
    Close,
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '{' => {
                chars.next();
                tokens.push(Token::Open);
            }
            '}' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                while let Some(ch) = chars.next() {
                    match ch {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        },
                        _ => text.push(ch),
                    }
                }
                tokens.push(Token::Text(text));
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    // Line comment
                    for ch in chars.by_ref() {
                        if ch == '\n' {
                            break;
                        }
                    }
                } else {
                    tokens.push(Token::Text(read_bare(&mut chars, "/")));
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => tokens.push(Token::Text(read_bare(&mut chars, ""))),
        }
    }

    tokens
}

fn read_bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, prefix: &str) -> String {
    let mut text = String::from(prefix);
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() || ch == '{' || ch == '}' || ch == '"' {
            break;
        }
        text.push(ch);
        chars.next();
    }
    text
}

/// Parse a document into its top-level block.
pub fn parse(src: &str) -> VdfBlock {
    let tokens = tokenize(src);
    let mut stack: Vec<VdfBlock> = vec![VdfBlock::default()];
    let mut keys: Vec<String> = Vec::new();
    let mut pending_key: Option<String> = None;

    for token in tokens {
        match token {
            Token::Text(text) => match pending_key.take() {
                Some(key) => {
                    if let Some(top) = stack.last_mut() {
                        top.entries.push((key, VdfValue::Str(text)));
                    }
                }
                None => pending_key = Some(text),
            },
            Token::Open => {
                keys.push(pending_key.take().unwrap_or_default());
                stack.push(VdfBlock::default());
            }
            Token::Close => {
                pending_key = None;
                if stack.len() > 1 {
                    close_block(&mut stack, &mut keys);
                }
            }
        }
    }

    while stack.len() > 1 {
        close_block(&mut stack, &mut keys);
    }
    stack.pop().unwrap_or_default()
}

fn close_block(stack: &mut Vec<VdfBlock>, keys: &mut Vec<String>) {
    if let (Some(block), Some(key)) = (stack.pop(), keys.pop()) {
        if let Some(parent) = stack.last_mut() {
            parent.entries.push((key, VdfValue::Block(block)));
        }
    }
}
