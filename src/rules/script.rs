use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{TagRules, unix_time};
use crate::error::{Error, Result};
use crate::mail::Message;

/// What a rule script says it can do, printed by `<script> capabilities`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Capabilities {
    get_tags: bool,
    expire: bool,
    noexpire_tag: Option<String>,
}

/// Rules implemented by an external executable.
///
/// Each call runs the script once with a subcommand (`get-tags`,
/// `expire <cutoff>`, `expire-query <cutoff>`) and the message as JSON on
/// stdin, so a crashing script can only fail the current pass.
#[derive(Debug)]
pub struct ScriptRules {
    path: PathBuf,
    can_expire: bool,
    noexpire_tag: Option<String>,
}

fn message_json(msg: &Message) -> serde_json::Value {
    json!({
        "path": msg.path,
        "message_id": msg.message_id,
        "docid": msg.docid,
        "subject": msg.subject,
        "date": msg.date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
        "from": msg.from,
        "to": msg.to,
        "cc": msg.cc,
        "emails": msg.emails,
        "tags": msg.tags,
        "flags": msg.flags,
        "maildir": msg.maildir,
        "size": msg.size,
        "thread_emails": msg.thread_emails(),
        "thread_tags": msg.thread_tags(),
        "thread_root": msg.thread_root(),
    })
}

impl ScriptRules {
    pub fn load(path: &Path) -> Result<Self> {
        let mut rules = Self {
            path: path.to_path_buf(),
            can_expire: false,
            noexpire_tag: None,
        };

        let output = rules
            .run(&["capabilities"], None)
            .map_err(|e| Error::rule_load(path, e.to_string()))?;
        let caps: Capabilities = serde_json::from_str(&output)
            .map_err(|e| Error::rule_load(path, format!("bad capabilities: {e}")))?;
        if !caps.get_tags {
            return Err(Error::rule_load(path, "script does not provide get_tags"));
        }

        debug!(path = %path.display(), expire = caps.expire, "Loaded rule script");
        rules.can_expire = caps.expire;
        rules.noexpire_tag = caps.noexpire_tag;
        Ok(rules)
    }

    fn run(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let tool = self.path.display().to_string();
        let spawn_error = |e: std::io::Error| Error::ExternalTool {
            tool: tool.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        };

        let mut child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) {
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(Error::io(&self.path, e));
                }
            }
        }

        let output = child.wait_with_output().map_err(|e| Error::io(&self.path, e))?;
        if !output.status.success() {
            return Err(Error::Rule(format!(
                "{tool} {} ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn call<T: serde::de::DeserializeOwned>(&self, args: &[&str], msg: &Message) -> Result<T> {
        let input = message_json(msg).to_string();
        let output = self.run(args, Some(&input))?;
        serde_json::from_str(&output).map_err(|e| {
            Error::Rule(format!(
                "{} {}: unparsable output: {e}",
                self.path.display(),
                args.join(" ")
            ))
        })
    }
}

impl TagRules for ScriptRules {
    fn get_tags(&self, msg: &Message) -> Result<BTreeSet<String>> {
        self.call(&["get-tags"], msg)
    }

    fn expire(&self, msg: &Message, cutoff: NaiveDateTime) -> Result<bool> {
        if !self.can_expire {
            return Ok(false);
        }
        let cutoff = unix_time(cutoff).to_string();
        self.call(&["expire", &cutoff], msg)
    }

    fn expire_query(&self, cutoff: NaiveDateTime) -> Result<Option<String>> {
        if !self.can_expire {
            return Ok(None);
        }
        let cutoff = unix_time(cutoff).to_string();
        let query = self.run(&["expire-query", &cutoff], None)?;
        Ok(Some(query.trim().to_string()))
    }

    fn noexpire_tag(&self) -> Option<&str> {
        self.noexpire_tag.as_deref()
    }
}
