//! User-facing terminal output.

use std::io::IsTerminal;
use std::path::Path;

use crossterm::style::{Color, Stylize};

use crate::error::Error;
use crate::mail::Message;
use crate::tagging::{Change, ChangeKind};

/// Writes reports and summaries to stdout, optionally colored.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    color: bool,
}

impl Printer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colors only when asked to and stdout is a terminal.
    pub fn for_stdout(color: bool) -> Self {
        Self::new(color && std::io::stdout().is_terminal())
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// `subject [kept, -removed, +added]`
    pub fn format_change(&self, change: &Change) -> String {
        let names: Vec<String> = change
            .entries()
            .into_iter()
            .map(|(name, kind)| match kind {
                ChangeKind::Kept => self.paint(name, Color::Yellow),
                ChangeKind::Removed => self.paint(&format!("-{name}"), Color::Red),
                ChangeKind::Added => self.paint(&format!("+{name}"), Color::Green),
            })
            .collect();
        format!(
            "{} [{}]",
            self.paint(&change.subject, Color::Cyan),
            names.join(", ")
        )
    }

    pub fn change(&self, change: &Change) {
        println!("{}", self.format_change(change));
    }

    pub fn format_message(&self, msg: &Message) -> String {
        let date = msg
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "----------------".to_string());
        let tags = msg
            .tags
            .iter()
            .map(|t| self.paint(t, Color::Yellow))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}  {}  {} [{}]",
            self.paint(&date, Color::DarkGrey),
            msg.from_display(),
            self.paint(&msg.subject, Color::Cyan),
            tags
        )
    }

    pub fn message(&self, msg: &Message) {
        println!("{}", self.format_message(msg));
    }

    pub fn format_summary(&self, processed: usize, changed: usize, verb: &str) -> String {
        format!("Processed {processed} files, and {verb} {changed}.")
    }

    pub fn summary(&self, processed: usize, changed: usize, verb: &str) {
        println!("{}", self.format_summary(processed, changed, verb));
    }

    pub fn count(&self, count: usize) {
        println!("{count}");
    }

    /// Per-file problems go to stderr so they never mix with reports.
    pub fn failure(&self, path: &Path, error: &Error) {
        eprintln!("{}: {error}", self.paint(&path.display().to_string(), Color::Red));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_change_plain() {
        let change = Change {
            subject: "Lunch".to_string(),
            path: PathBuf::from("/m/INBOX/cur/1"),
            old: set(&["urgent", "work"]),
            new: set(&["done", "work"]),
        };
        assert_eq!(
            Printer::new(false).format_change(&change),
            "Lunch [+done, -urgent, work]"
        );
    }

    #[test]
    fn test_format_change_colored() {
        let change = Change {
            subject: "Lunch".to_string(),
            path: PathBuf::new(),
            old: set(&[]),
            new: set(&["new"]),
        };
        let out = Printer::new(true).format_change(&change);
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("+new"));
    }

    #[test]
    fn test_format_summary_and_message() {
        let printer = Printer::new(false);
        assert_eq!(
            printer.format_summary(10, 3, "retagged"),
            "Processed 10 files, and retagged 3."
        );

        let msg = Message {
            subject: "Hello".to_string(),
            tags: set(&["a", "b"]),
            ..Default::default()
        };
        assert_eq!(
            printer.format_message(&msg),
            "----------------  (unknown)  Hello [a, b]"
        );
    }
}
