//! Diff-based tag and flag mutations.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mail::{Flag, Flags, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Apply,
    DryRun,
}

impl Mode {
    pub fn from_dryrun(dryrun: bool) -> Self {
        if dryrun { Mode::DryRun } else { Mode::Apply }
    }

    pub fn is_dry_run(self) -> bool {
        self == Mode::DryRun
    }
}

/// A parsed action list: `+name` and bare `name` add, `-name` removes.
///
/// A name that is both added and removed is only removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actions<T: Ord> {
    pub add: BTreeSet<T>,
    pub remove: BTreeSet<T>,
}

impl<T: Ord> Default for Actions<T> {
    fn default() -> Self {
        Self {
            add: BTreeSet::new(),
            remove: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> Actions<T> {
    fn parse_with<S: AsRef<str>>(
        actions: &[S],
        mut convert: impl FnMut(&str) -> Result<T>,
    ) -> Result<Self> {
        let mut parsed = Self::default();
        for action in actions {
            let action = action.as_ref().trim();
            let (remove, name) = match action.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, action.strip_prefix('+').unwrap_or(action)),
            };
            if name.is_empty() {
                debug!(action, "Ignoring empty action");
                continue;
            }
            let value = convert(name)?;
            if remove {
                parsed.remove.insert(value);
            } else {
                parsed.add.insert(value);
            }
        }
        parsed.add.retain(|v| !parsed.remove.contains(v));
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// `(current ∪ add) − remove`
    pub fn apply(&self, current: &BTreeSet<T>) -> BTreeSet<T> {
        current
            .union(&self.add)
            .filter(|v| !self.remove.contains(*v))
            .cloned()
            .collect()
    }
}

impl Actions<String> {
    pub fn tags<S: AsRef<str>>(actions: &[S]) -> Self {
        Self::parse_with(actions, |name| Ok(name.to_string())).unwrap_or_default()
    }
}

impl Actions<Flag> {
    /// Flag names (`seen`) or letters (`S`); anything else is an error.
    pub fn flags<S: AsRef<str>>(actions: &[S]) -> Result<Self> {
        Self::parse_with(actions, |name| name.parse())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Kept,
    Added,
    Removed,
}

/// One message whose tags (or flags) differ from before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub subject: String,
    pub path: PathBuf,
    pub old: BTreeSet<String>,
    pub new: BTreeSet<String>,
}

impl Change {
    /// Every name in old or new, sorted, with how it changed.
    pub fn entries(&self) -> Vec<(&str, ChangeKind)> {
        self.old
            .union(&self.new)
            .map(|name| {
                let kind = match (self.old.contains(name), self.new.contains(name)) {
                    (true, true) => ChangeKind::Kept,
                    (false, _) => ChangeKind::Added,
                    (true, false) => ChangeKind::Removed,
                };
                (name.as_str(), kind)
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub changes: Vec<Change>,
    pub failures: Vec<Failure>,
}

impl Outcome {
    pub(crate) fn record(&mut self, path: PathBuf, result: Result<Option<Change>>) {
        match result {
            Ok(Some(change)) => self.changes.push(change),
            Ok(None) => {}
            Err(error) => {
                warn!(path = %path.display(), %error, "Mutation failed");
                self.failures.push(Failure { path, error });
            }
        }
    }
}

/// Sets `new` as the tags of `msg`, unless they are already its tags.
pub fn retag(msg: &mut Message, new: BTreeSet<String>, mode: Mode) -> Result<Option<Change>> {
    if new == msg.tags {
        return Ok(None);
    }

    let change = Change {
        subject: msg.subject.clone(),
        path: msg.path.clone(),
        old: msg.tags.clone(),
        new,
    };
    if !mode.is_dry_run() {
        msg.set_tags(&change.new)?;
    }
    Ok(Some(change))
}

/// Applies tag actions to every message, one file at a time.
///
/// A failing message is recorded and the rest are still processed.
pub fn compute_and_apply(messages: &mut [Message], actions: &Actions<String>, mode: Mode) -> Outcome {
    let mut outcome = Outcome::default();
    for msg in messages.iter_mut() {
        let new = actions.apply(&msg.tags);
        let path = msg.path.clone();
        outcome.record(path, retag(msg, new, mode));
    }
    outcome
}

fn flag_names(flags: &Flags) -> BTreeSet<String> {
    flags.iter().map(|f| f.name().to_string()).collect()
}

/// Applies flag actions to every message by renaming its file.
pub fn compute_and_apply_flags(messages: &mut [Message], actions: &Actions<Flag>, mode: Mode) -> Outcome {
    let mut outcome = Outcome::default();
    for msg in messages.iter_mut() {
        let new = actions.apply(&msg.flags);
        if new == msg.flags {
            continue;
        }

        let change = Change {
            subject: msg.subject.clone(),
            path: msg.path.clone(),
            old: flag_names(&msg.flags),
            new: flag_names(&new),
        };
        let path = msg.path.clone();
        let result = if mode.is_dry_run() {
            Ok(Some(change))
        } else {
            msg.set_flags(&new).map(|_| Some(change))
        };
        outcome.record(path, result);
    }
    outcome
}
