//! Rule definitions driving autotagging and expiry.

mod script;
mod table;

pub use script::ScriptRules;
pub use table::TableRules;

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeZone};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mail::Message;

/// A loaded set of tagging rules.
pub trait TagRules {
    /// The complete tag set `msg` should carry.
    fn get_tags(&self, msg: &Message) -> Result<BTreeSet<String>>;

    /// Whether `msg` should be moved to the trash, given the expiry cut-off.
    fn expire(&self, _msg: &Message, _cutoff: NaiveDateTime) -> Result<bool> {
        Ok(false)
    }

    /// Index query selecting expiry candidates; `None` when the rules
    /// do not expire anything.
    fn expire_query(&self, _cutoff: NaiveDateTime) -> Result<Option<String>> {
        Ok(None)
    }

    /// Tag that protects a whole thread from expiry.
    fn noexpire_tag(&self) -> Option<&str> {
        None
    }
}

/// Loads rules from `path`: `.toml` files are declarative rule tables,
/// anything else is run as a rule script.
pub fn load(path: &Path) -> Result<Box<dyn TagRules>> {
    if !path.is_file() {
        return Err(Error::rule_load(path, "file not found"));
    }

    debug!(path = %path.display(), "Loading tag rules");
    if path.extension().is_some_and(|ext| ext == "toml") {
        Ok(Box::new(TableRules::load(path)?))
    } else {
        Ok(Box::new(ScriptRules::load(path)?))
    }
}

/// Unix time of a naive local date.
pub(crate) fn unix_time(date: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&date)
        .earliest()
        .map(|d| d.timestamp())
        .unwrap_or_else(|| date.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("rules.toml")).err().unwrap();
        assert!(matches!(err, Error::RuleLoad { .. }));
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "[[rule]]\nsubject = \"x\"\ntags = [\"y\"]\n").unwrap();
        let rules = load(&path).unwrap();
        assert!(rules.noexpire_tag().is_none());

        let script = dir.path().join("rules.sh");
        std::fs::write(&script, "not a script").unwrap();
        assert!(matches!(load(&script).err().unwrap(), Error::RuleLoad { .. }));
    }
}
