use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use mail_parser::{MessageParser, PartType};
use tracing::{debug, warn};

use super::headers::{get_header, header_end, read_header_block, set_header};
use super::maildir::{filename_with_flags, folder_of, parse_flags, tmp_dir_for, unique_id};
use super::mtime::file_mtime;
use super::types::{Address, Flags, Message, TagHeader};
use crate::error::{Error, Result};

impl Message {
    /// Builds a message from the file at `path`, reading only its header block.
    ///
    /// The file must exist and, once symlinks are resolved, live below
    /// `maildir_root`.
    pub fn from_file(path: &Path, maildir_root: &Path, tags_header: &TagHeader) -> Result<Self> {
        let path = absolute(path)?;
        if !path.is_file() {
            return Err(Error::PathNotFound(path));
        }

        let real = fs::canonicalize(&path).map_err(|e| Error::io(&path, e))?;
        let real_root = fs::canonicalize(maildir_root).map_err(|e| Error::io(maildir_root, e))?;
        if !real.starts_with(&real_root) {
            return Err(Error::PathOutsideMaildir(path));
        }

        let header = read_header_block(&path).map_err(|e| Error::io(&path, e))?;
        let size = fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();

        let mut msg = Message {
            unique: unique_id(&path),
            flags: parse_flags(&path),
            maildir: folder_of(&real_root, &real).unwrap_or_default(),
            size,
            tags_header: tags_header.clone(),
            ..Default::default()
        };

        if let Some(parsed) = MessageParser::default().parse(&header[..]) {
            msg.message_id = parsed.message_id().unwrap_or_default().to_string();
            msg.subject = parsed.subject().unwrap_or_default().to_string();
            msg.date = parsed.date().and_then(|d| {
                NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into())?.and_hms_opt(
                    d.hour.into(),
                    d.minute.into(),
                    d.second.into(),
                )
            });
            msg.from = addresses(parsed.from());
            msg.to = addresses(parsed.to());
            msg.cc = addresses(parsed.cc());
        } else {
            warn!(path = %path.display(), "Could not parse message headers");
        }

        msg.tags = get_header(&header, tags_header.name())
            .map(|v| tags_header.parse(&v))
            .unwrap_or_default();
        msg.collect_emails();
        msg.path = path;

        Ok(msg)
    }

    /// Tags as currently stored in the file's tag header.
    pub fn get_tags(&self) -> Result<BTreeSet<String>> {
        let header = read_header_block(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(get_header(&header, self.tags_header.name())
            .map(|v| self.tags_header.parse(&v))
            .unwrap_or_default())
    }

    /// All `text/*` parts of the body, joined. Loaded on first use and cached.
    pub fn get_content(&mut self) -> Result<&str> {
        if self.content.is_none() {
            let raw = fs::read(&self.path).map_err(|e| Error::io(&self.path, e))?;
            self.content = Some(text_content(&raw));
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    /// Rewrites the tag header of the file to hold exactly `new_tags`.
    ///
    /// The new content is written into the maildir's `tmp` directory and
    /// renamed over the message, so the file is either fully updated or
    /// left alone.
    pub fn set_tags(&mut self, new_tags: &BTreeSet<String>) -> Result<()> {
        let content = fs::read(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let value = self.tags_header.format(new_tags);
        let updated = set_header(&content, self.tags_header.name(), &value);

        if updated != content {
            write_atomic(&self.path, &updated)?;
            debug!(path = %self.path.display(), tags = %value, "Rewrote tags");
        }

        self.tags = new_tags.clone();
        Ok(())
    }

    /// Renames the file so its maildir suffix encodes `new_flags`.
    ///
    /// Returns whether the file was renamed; an unchanged suffix touches
    /// nothing on disk.
    pub fn set_flags(&mut self, new_flags: &Flags) -> Result<bool> {
        let filename = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::io(&self.path, std::io::Error::other("invalid file name")))?;
        let new_name = filename_with_flags(filename, new_flags);

        if new_name == filename {
            self.flags = new_flags.clone();
            return Ok(false);
        }

        let new_path = self.path.with_file_name(&new_name);
        fs::hard_link(&self.path, &new_path).map_err(|e| Error::io(&new_path, e))?;
        if let Err(e) = fs::remove_file(&self.path) {
            let _ = fs::remove_file(&new_path);
            return Err(Error::io(&self.path, e));
        }

        debug!(from = %self.path.display(), to = %new_path.display(), "Renamed for flags");
        self.path = new_path;
        self.flags = new_flags.clone();
        Ok(true)
    }

    /// Last modification time of the file, in whole seconds.
    pub fn get_mtime(&self) -> Result<i64> {
        file_mtime(&self.path)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(path, e))?;
    Ok(cwd.join(path))
}

fn addresses(addr: Option<&mail_parser::Address<'_>>) -> Vec<Address> {
    let list: Vec<&mail_parser::Addr<'_>> = match addr {
        Some(mail_parser::Address::List(list)) => list.iter().collect(),
        Some(mail_parser::Address::Group(groups)) => {
            groups.iter().flat_map(|g| g.addresses.iter()).collect()
        }
        None => Vec::new(),
    };

    list.into_iter()
        .filter_map(|a| {
            let email = a.address.as_deref()?;
            Some(Address::new(a.name.as_deref().map(str::to_string), email))
        })
        .collect()
}

fn text_content(raw: &[u8]) -> String {
    let Some(message) = MessageParser::default().parse(raw) else {
        // Not MIME: everything after the headers is the text.
        let start = header_end(raw).map_or(raw.len(), |p| p + 1);
        return String::from_utf8_lossy(&raw[start.min(raw.len())..])
            .trim_start_matches(['\r', '\n'])
            .to_string();
    };

    let mut text_parts = Vec::new();
    for part in message.parts.iter() {
        match &part.body {
            PartType::Text(text) | PartType::Html(text) => text_parts.push(text.as_ref()),
            _ => {}
        }
    }
    text_parts.join("\n")
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_dir = tmp_dir_for(path);
    fs::create_dir_all(&tmp_dir).map_err(|e| Error::io(&tmp_dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".mutag-")
        .tempfile_in(&tmp_dir)
        .map_err(|e| Error::io(&tmp_dir, e))?;
    tmp.write_all(data).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;

    match fs::metadata(path) {
        Ok(meta) => {
            if let Err(e) = fs::set_permissions(tmp.path(), meta.permissions()) {
                warn!(path = %path.display(), error = %e, "Could not copy permissions");
            }
        }
        // Removed under our feet: do not resurrect it.
        Err(_) => return Err(Error::PathNotFound(path.to_path_buf())),
    }

    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
