//! Conversion of index records into [`Message`] values.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};

use super::sexp::{Value, parse_seq};
use crate::error::{Error, Result};
use crate::mail::maildir::unique_id;
use crate::mail::{Address, Flag, Message, TagHeader};

/// Parses the raw output of one index query into messages.
pub fn parse_records(raw: &str, tags_header: &TagHeader) -> Result<Vec<Message>> {
    parse_seq(raw)?
        .iter()
        .map(|record| {
            let mut msg = Message::from_index_record(record)?;
            msg.tags_header = tags_header.clone();
            Ok(msg)
        })
        .collect()
}

impl Message {
    /// Builds a message from one index record (a property list).
    ///
    /// `:path` and `:size` are required; every other field falls back to
    /// its empty default.
    pub fn from_index_record(record: &Value) -> Result<Self> {
        if !matches!(record, Value::Plist(_)) {
            return Err(Error::MalformedRecord(
                "record is not a property list".to_string(),
            ));
        }

        let path = record
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::MalformedRecord("missing or malformed :path".to_string()))?;
        let size = record
            .get("size")
            .and_then(Value::as_int)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                Error::MalformedRecord(format!("missing or malformed :size for {path}"))
            })?;

        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let mut msg = Message {
            path: path.into(),
            unique: unique_id(Path::new(path)),
            size,
            docid: record
                .get("docid")
                .and_then(Value::as_int)
                .and_then(|n| u64::try_from(n).ok()),
            message_id: text("message-id"),
            subject: text("subject"),
            maildir: text("maildir"),
            date: record.get("date").and_then(date),
            from: record.get("from").map(addresses).unwrap_or_default(),
            to: record.get("to").map(addresses).unwrap_or_default(),
            cc: record.get("cc").map(addresses).unwrap_or_default(),
            flags: strings(record.get("flags"))
                .iter()
                .filter_map(|f| Flag::from_name(f))
                .collect(),
            tags: strings(record.get("tags")).into_iter().collect(),
            thread: record.get("thread").and_then(thread_path),
            ..Default::default()
        };
        msg.collect_emails();
        Ok(msg)
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| match v {
            Value::Str(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Unix seconds, or an Emacs time list `(high low [usec])`.
fn date(value: &Value) -> Option<NaiveDateTime> {
    let secs = match value {
        Value::Int(n) => *n,
        Value::List(items) => {
            let high = items.first()?.as_int()?;
            let low = items.get(1)?.as_int()?;
            high.checked_mul(65536)?.checked_add(low)?
        }
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0).map(|utc| utc.with_timezone(&Local).naive_local())
}

/// `(("Name" . "email") ...)` or `((:name "Name" :email "email") ...)`.
fn addresses(value: &Value) -> Vec<Address> {
    let name_of = |v: &Value| v.as_str().map(str::to_string);
    match value {
        Value::Alist(pairs) => pairs
            .iter()
            .filter_map(|(name, email)| Some(Address::new(name_of(name), email.as_str()?)))
            .collect(),
        Value::Pair(name, email) => email
            .as_str()
            .map(|e| vec![Address::new(name_of(name), e)])
            .unwrap_or_default(),
        Value::List(items) => items
            .iter()
            .filter_map(|item| {
                let email = item.get("email")?.as_str()?;
                Some(Address::new(item.get("name").and_then(name_of), email))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `(:path "0:1:a" ...)`, `"0:1:a"` or `(0 1 a)`.
fn thread_path(value: &Value) -> Option<Vec<String>> {
    let split = |p: &str| -> Vec<String> {
        p.split(':')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    let segments = match value {
        Value::Plist(_) => split(value.get("path")?.as_str()?),
        Value::Str(p) => split(p),
        Value::List(_) => strings(Some(value)),
        _ => return None,
    };
    (!segments.is_empty()).then_some(segments)
}
