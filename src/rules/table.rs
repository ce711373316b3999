use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;

use super::TagRules;
use crate::error::{Error, Result};
use crate::mail::{Flag, Message};

/// Declarative rules read from a TOML file.
///
/// ```toml
/// noexpire_tag = "keep"
///
/// [[rule]]
/// emails = ["boss@example.org"]
/// thread = true
/// tags = ["work"]
/// remove = ["inbox"]
///
/// [expire]
/// query = "maildir:/Archive"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableRules {
    pub noexpire_tag: Option<String>,
    #[serde(rename = "rule")]
    pub rules: Vec<Rule>,
    pub expire: Option<ExpireRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rule {
    /// Matches when any of these addresses took part.
    pub emails: Vec<String>,
    /// Match `emails` against the whole thread instead of the message.
    pub thread: bool,
    pub maildir: Option<String>,
    /// Case-insensitive substring of the subject.
    pub subject: Option<String>,
    pub tags: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpireRule {
    pub query: String,
    pub keep_flagged: bool,
}

impl Default for ExpireRule {
    fn default() -> Self {
        Self {
            query: String::new(),
            keep_flagged: true,
        }
    }
}

fn same_folder(a: &str, b: &str) -> bool {
    a.trim_matches('/') == b.trim_matches('/')
}

impl Rule {
    fn has_criteria(&self) -> bool {
        !self.emails.is_empty() || self.maildir.is_some() || self.subject.is_some()
    }

    fn matches(&self, msg: &Message) -> bool {
        if !self.emails.is_empty() {
            let emails = if self.thread {
                msg.thread_emails()
            } else {
                &msg.emails
            };
            if !self
                .emails
                .iter()
                .any(|e| emails.contains(&e.trim().to_lowercase()))
            {
                return false;
            }
        }
        if let Some(maildir) = &self.maildir {
            if !same_folder(maildir, &msg.maildir) {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !msg.subject.to_lowercase().contains(&subject.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

impl TableRules {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::rule_load(path, e.to_string()))?;
        let rules: Self = toml::from_str(&content).map_err(|e| Error::rule_load(path, e.to_string()))?;

        if let Some(i) = rules.rules.iter().position(|r| !r.has_criteria()) {
            return Err(Error::rule_load(
                path,
                format!("rule #{} has no match criteria", i + 1),
            ));
        }
        debug!(rules = rules.rules.len(), "Loaded rule table");
        Ok(rules)
    }
}

impl TagRules for TableRules {
    fn get_tags(&self, msg: &Message) -> Result<BTreeSet<String>> {
        let mut tags = msg.tags.clone();
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.matches(msg) {
                debug!(rule = i + 1, subject = %msg.subject, "Rule matched");
                tags.extend(rule.tags.iter().cloned());
                for tag in &rule.remove {
                    tags.remove(tag);
                }
            }
        }
        Ok(tags)
    }

    fn expire(&self, msg: &Message, cutoff: NaiveDateTime) -> Result<bool> {
        let Some(expire) = &self.expire else {
            return Ok(false);
        };
        if !msg.date.is_some_and(|d| d < cutoff) {
            return Ok(false);
        }
        if expire.keep_flagged && msg.flags.contains(&Flag::Flagged) {
            return Ok(false);
        }
        if let Some(tag) = self.noexpire_tag() {
            if msg.thread_tags().contains(tag) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn expire_query(&self, cutoff: NaiveDateTime) -> Result<Option<String>> {
        Ok(self.expire.as_ref().map(|expire| {
            let range = format!("date:..{}", cutoff.format("%Y%m%d"));
            if expire.query.trim().is_empty() {
                range
            } else {
                format!("{} {range}", expire.query.trim())
            }
        }))
    }

    fn noexpire_tag(&self) -> Option<&str> {
        self.noexpire_tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::ThreadData;
    use chrono::NaiveDate;

    const RULES: &str = r#"
noexpire_tag = "keep"

[[rule]]
emails = ["Boss@Example.org"]
thread = true
tags = ["work"]
remove = ["inbox"]

[[rule]]
subject = "invoice"
maildir = "/Billing"
tags = ["bills"]

[expire]
query = "maildir:/Archive"
"#;

    fn rules() -> TableRules {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, RULES).unwrap();
        TableRules::load(&path).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn message() -> Message {
        Message {
            subject: "Your Invoice for May".to_string(),
            maildir: "/Billing".to_string(),
            tags: ["inbox".to_string()].into_iter().collect(),
            emails: ["shop@example.org".to_string()].into_iter().collect(),
            date: Some(date(2023, 5, 1)),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_tags() {
        let rules = rules();
        let mut msg = message();
        assert_eq!(
            rules.get_tags(&msg).unwrap(),
            ["bills", "inbox"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );

        msg.set_thread_data(ThreadData {
            emails: ["boss@example.org".to_string()].into_iter().collect(),
            tags: BTreeSet::new(),
            root: "r".to_string(),
        });
        assert_eq!(
            rules.get_tags(&msg).unwrap(),
            ["bills", "work"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_expire() {
        let rules = rules();
        let cutoff = date(2024, 1, 1);
        let mut msg = message();
        assert!(rules.expire(&msg, cutoff).unwrap());

        msg.date = Some(date(2024, 2, 1));
        assert!(!rules.expire(&msg, cutoff).unwrap());
        msg.date = None;
        assert!(!rules.expire(&msg, cutoff).unwrap());

        let mut flagged = message();
        flagged.flags.insert(Flag::Flagged);
        assert!(!rules.expire(&flagged, cutoff).unwrap());

        let mut kept = message();
        kept.set_thread_data(ThreadData {
            tags: ["keep".to_string()].into_iter().collect(),
            ..Default::default()
        });
        assert!(!rules.expire(&kept, cutoff).unwrap());
    }

    #[test]
    fn test_expire_query() {
        let cutoff = date(2024, 1, 31);
        assert_eq!(
            rules().expire_query(cutoff).unwrap().as_deref(),
            Some("maildir:/Archive date:..20240131")
        );
        assert_eq!(TableRules::default().expire_query(cutoff).unwrap(), None);
    }

    #[test]
    fn test_rule_without_criteria() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "[[rule]]\ntags = [\"x\"]\n").unwrap();
        assert!(matches!(
            TableRules::load(&path),
            Err(Error::RuleLoad { .. })
        ));

        std::fs::write(&path, "[[rule]]\nsubjct = \"x\"\n").unwrap();
        assert!(TableRules::load(&path).is_err());
    }
}
