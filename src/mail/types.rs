use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    /// Emails are compared case-insensitively everywhere, so they are stored lowercased.
    pub fn new(name: Option<String>, email: &str) -> Self {
        Self {
            name: name.filter(|n| !n.trim().is_empty()),
            email: email.trim().to_lowercase(),
        }
    }
}

/// Standard maildir flags. Variant order is the ASCII order of the letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Draft,
    Flagged,
    Passed,
    Replied,
    Seen,
    Trashed,
}

pub type Flags = BTreeSet<Flag>;

impl Flag {
    pub const ALL: [Flag; 6] = [
        Flag::Draft,
        Flag::Flagged,
        Flag::Passed,
        Flag::Replied,
        Flag::Seen,
        Flag::Trashed,
    ];

    pub fn letter(self) -> char {
        match self {
            Flag::Draft => 'D',
            Flag::Flagged => 'F',
            Flag::Passed => 'P',
            Flag::Replied => 'R',
            Flag::Seen => 'S',
            Flag::Trashed => 'T',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.letter() == c)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::Draft => "draft",
            Flag::Flagged => "flagged",
            Flag::Passed => "passed",
            Flag::Replied => "replied",
            Flag::Seen => "seen",
            Flag::Trashed => "trashed",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flag {
    type Err = Error;

    /// Accepts a flag name (`seen`) or its maildir letter (`S`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(flag) = Flag::from_letter(c) {
                return Ok(flag);
            }
        }
        Flag::from_name(s)
            .ok_or_else(|| Error::Config(format!("Unknown maildir flag: {s}")))
    }
}

/// The header holding a message's tags, and how its value is split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHeader {
    name: String,
}

impl Default for TagHeader {
    fn default() -> Self {
        Self::new("X-Keywords")
    }
}

impl TagHeader {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `X-Label` and `Keywords` are space separated, everything else uses `, `.
    pub fn separator(&self) -> &'static str {
        if self.name.eq_ignore_ascii_case("x-label") || self.name.eq_ignore_ascii_case("keywords")
        {
            " "
        } else {
            ", "
        }
    }

    pub fn parse(&self, value: &str) -> BTreeSet<String> {
        let sep = self.separator().trim();
        let parts: Vec<&str> = if sep.is_empty() {
            value.split_whitespace().collect()
        } else {
            value.split(sep).collect()
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn format<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> String {
        let tags: BTreeSet<&str> = tags.into_iter().map(String::as_str).collect();
        tags.into_iter()
            .collect::<Vec<_>>()
            .join(self.separator())
    }
}

/// Thread-level aggregates, filled in by the thread aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadData {
    pub emails: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub root: String,
}

/// One mail message and its mutable tag/flag state.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub path: PathBuf,
    pub message_id: String,
    pub docid: Option<u64>,
    /// Unique part of the maildir filename (before the `:2,` info section).
    pub unique: String,
    pub subject: String,
    /// Wall clock time of the Date header; the UTC offset is discarded.
    pub date: Option<NaiveDateTime>,
    pub from: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub emails: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub flags: Flags,
    /// Path segments of the message in the index's thread tree.
    pub thread: Option<Vec<String>>,
    /// Folder relative to the maildir root, like `/All Mail`.
    pub maildir: String,
    pub size: u64,
    pub tags_header: TagHeader,

    pub(crate) thread_data: Option<ThreadData>,
    pub(crate) content: Option<String>,
}

impl Message {
    /// Recomputes `emails` from the participant lists.
    pub fn collect_emails(&mut self) {
        self.emails = self
            .from
            .iter()
            .chain(&self.to)
            .chain(&self.cc)
            .map(|a| a.email.clone())
            .filter(|e| !e.is_empty())
            .collect();
    }

    pub fn thread_emails(&self) -> &BTreeSet<String> {
        self.thread_data
            .as_ref()
            .map_or(&self.emails, |t| &t.emails)
    }

    pub fn thread_tags(&self) -> &BTreeSet<String> {
        self.thread_data.as_ref().map_or(&self.tags, |t| &t.tags)
    }

    pub fn thread_root(&self) -> &str {
        self.thread_data
            .as_ref()
            .map_or(self.message_id.as_str(), |t| t.root.as_str())
    }

    /// True once the thread aggregator has assigned thread data.
    pub fn has_thread_data(&self) -> bool {
        self.thread_data.is_some()
    }

    pub fn set_thread_data(&mut self, data: ThreadData) {
        self.thread_data = Some(data);
    }

    pub fn from_display(&self) -> String {
        match self.from.first() {
            Some(addr) => addr.name.clone().unwrap_or_else(|| addr.email.clone()),
            None => "(unknown)".to_string(),
        }
    }
}
