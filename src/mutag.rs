//! The orchestrator: query, thread aggregation, mutation, reindex and
//! mtime bookkeeping for one profile.

use std::path::PathBuf;

use chrono::{Local, TimeDelta};
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::error::{Error, Result};
use crate::index::{FindRequest, MailIndex, MuIndex, find_messages};
use crate::mail::maildir::{maildir_files, move_to_folder, should_ignore_folder};
use crate::mail::mtime::{Snapshot, file_mtime, load_last_mtime, save_last_mtime};
use crate::mail::{Message, collect_thread_data};
use crate::output::Printer;
use crate::rules;
use crate::tagging::{self, Actions, Failure, Mode, Outcome};

/// Which messages to work on.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: Option<String>,
    /// Explicit message files; these bypass the index.
    pub paths: Vec<PathBuf>,
    /// Only messages changed since the last recorded mtime.
    pub modified_only: bool,
    pub related: bool,
}

impl QueryRequest {
    pub fn selects_messages(&self) -> bool {
        self.query.is_some() || !self.paths.is_empty() || self.modified_only
    }
}

/// Messages found by a query, plus the explicit paths that were rejected.
#[derive(Debug, Default)]
pub struct Selection {
    pub messages: Vec<Message>,
    pub failures: Vec<Failure>,
}

/// Everything one command line asks for.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub query: QueryRequest,
    pub tag_actions: Vec<String>,
    pub flag_actions: Vec<String>,
    pub list: bool,
    pub count: bool,
    pub autotag: bool,
    pub expire: bool,
    pub index: bool,
    pub rebuild: bool,
    pub update_mtime: bool,
    pub save_snapshot: bool,
    pub restore_mtimes: bool,
    pub mode: Mode,
}

impl Invocation {
    fn needs_messages(&self) -> bool {
        self.list || self.autotag || !self.tag_actions.is_empty() || !self.flag_actions.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub retagged: usize,
    pub expired: usize,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    fn absorb(&mut self, outcome: Outcome) -> usize {
        let changed = outcome.changes.len();
        self.failures.extend(outcome.failures);
        changed
    }
}

/// Result of an expiry pass.
#[derive(Debug, Default)]
pub struct Expired {
    pub processed: usize,
    pub moved: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

pub struct Mutag {
    profile: Profile,
    index: Box<dyn MailIndex>,
    printer: Printer,
}

impl Mutag {
    pub fn new(profile: Profile, index: Box<dyn MailIndex>, printer: Printer) -> Self {
        Self {
            profile,
            index,
            printer,
        }
    }

    /// Orchestrator backed by the `mu` binary configured in `profile`.
    pub fn with_mu(profile: Profile, printer: Printer) -> Self {
        let index = MuIndex::new(
            &profile.mu_command,
            profile.muhome.clone(),
            profile.maildir.clone(),
        );
        Self::new(profile, Box::new(index), printer)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn last_mtime(&self) -> i64 {
        load_last_mtime(&self.profile.lastmtime)
    }

    pub fn query(&self, request: &QueryRequest) -> Result<Selection> {
        if !request.paths.is_empty() {
            return Ok(self.load_paths(&request.paths, request.modified_only));
        }

        let find = FindRequest {
            query: request.query.clone(),
            after: request.modified_only.then(|| self.last_mtime()),
            include_related: request.related,
        };
        let mut messages = find_messages(self.index.as_ref(), &find, &self.profile.tags_header)?;
        collect_thread_data(&mut messages);
        info!(count = messages.len(), "Query returned messages");
        Ok(Selection {
            messages,
            failures: Vec::new(),
        })
    }

    fn load_paths(&self, paths: &[PathBuf], modified_only: bool) -> Selection {
        let since = self.last_mtime();
        let mut selection = Selection::default();
        for path in paths {
            let loaded = Message::from_file(path, &self.profile.maildir, &self.profile.tags_header)
                .and_then(|msg| Ok((msg.get_mtime()?, msg)));
            match loaded {
                Ok((mtime, msg)) => {
                    if !modified_only || mtime > since {
                        selection.messages.push(msg);
                    }
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "Skipping file");
                    selection.failures.push(Failure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }
        selection
    }

    /// Messages on disk modified after `mtime`, found without the index.
    pub fn modified(&self, mtime: i64) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for path in maildir_files(&self.profile.maildir)? {
            if file_mtime(&path)? <= mtime {
                continue;
            }
            match Message::from_file(&path, &self.profile.maildir, &self.profile.tags_header) {
                Ok(msg) => messages.push(msg),
                Err(error) => warn!(path = %path.display(), %error, "Skipping file"),
            }
        }
        Ok(messages)
    }

    pub fn count(&self, query: Option<&str>, modified_only: bool) -> Result<usize> {
        let find = FindRequest {
            query: query.map(str::to_string),
            after: modified_only.then(|| self.last_mtime()),
            include_related: false,
        };
        Ok(find_messages(self.index.as_ref(), &find, &self.profile.tags_header)?.len())
    }

    pub fn change_tags(&self, messages: &mut [Message], actions: &[String], mode: Mode) -> Outcome {
        let actions = Actions::tags(actions);
        let outcome = tagging::compute_and_apply(messages, &actions, mode);
        for change in &outcome.changes {
            self.printer.change(change);
        }
        outcome
    }

    pub fn change_flags(&self, messages: &mut [Message], actions: &[String], mode: Mode) -> Result<Outcome> {
        let actions = Actions::flags(actions)?;
        let outcome = tagging::compute_and_apply_flags(messages, &actions, mode);
        for change in &outcome.changes {
            self.printer.change(change);
        }
        Ok(outcome)
    }

    fn ignored(&self, msg: &Message) -> bool {
        !msg.maildir.is_empty() && should_ignore_folder(&self.profile.maildir, &msg.maildir)
    }

    /// Retags every message with what the tag rules say it should carry.
    ///
    /// A rule failure stops the pass; messages already retagged stay so.
    pub fn autotag(&self, messages: &mut [Message], mode: Mode) -> Result<Outcome> {
        let rules = rules::load(&self.profile.tagrules)?;
        let mut outcome = Outcome::default();
        let mut processed = 0;

        for msg in messages.iter_mut() {
            if self.ignored(msg) {
                debug!(path = %msg.path.display(), "Skipping ignored folder");
                continue;
            }
            processed += 1;
            let new = rules.get_tags(msg)?;
            let path = msg.path.clone();
            let result = tagging::retag(msg, new, mode);
            if let Ok(Some(change)) = &result {
                self.printer.change(change);
            }
            outcome.record(path, result);
        }

        self.printer
            .summary(processed, outcome.changes.len(), "retagged");
        Ok(outcome)
    }

    /// Moves messages the rules consider expired into the trash folder.
    pub fn expire(&self, mode: Mode) -> Result<Expired> {
        let rules = rules::load(&self.profile.tagrules)?;
        let cutoff = Local::now().naive_local() - TimeDelta::days(self.profile.expire_days.into());
        let query = rules
            .expire_query(cutoff)?
            .ok_or_else(|| Error::Rule("tag rules define no expiry".to_string()))?;
        debug!(%query, %cutoff, "Expiring");

        let find = FindRequest {
            query: Some(query),
            after: None,
            include_related: true,
        };
        let mut messages = find_messages(self.index.as_ref(), &find, &self.profile.tags_header)?;
        collect_thread_data(&mut messages);

        let trash = self.profile.maildir.join(&self.profile.trash);
        let trash_folder = format!("/{}", self.profile.trash.trim_matches('/'));
        let mut expired = Expired::default();

        for msg in &messages {
            if self.ignored(msg) || msg.maildir == trash_folder {
                continue;
            }
            expired.processed += 1;
            if !rules.expire(msg, cutoff)? {
                continue;
            }

            self.printer.message(msg);
            if mode.is_dry_run() {
                expired.moved.push(msg.path.clone());
                continue;
            }
            match move_to_folder(&msg.path, &trash) {
                Ok(target) => expired.moved.push(target),
                Err(error) => {
                    warn!(path = %msg.path.display(), %error, "Could not expire");
                    expired.failures.push(Failure {
                        path: msg.path.clone(),
                        error,
                    });
                }
            }
        }

        self.printer
            .summary(expired.processed, expired.moved.len(), "expired");
        Ok(expired)
    }

    pub fn index(&self, mode: Mode, rebuild: bool) -> Result<()> {
        if mode.is_dry_run() {
            info!("Dry run, not reindexing");
            return Ok(());
        }
        info!(rebuild, "Reindexing");
        self.index.update(rebuild)
    }

    /// Records the newest mtime in the maildir as the last-seen mtime.
    /// Records the newest file mtime. An empty maildir keeps the old value.
    pub fn update_mtime(&self, mode: Mode) -> Result<i64> {
        let files = maildir_files(&self.profile.maildir)?;
        if files.is_empty() {
            debug!("No message files, keeping last mtime");
            return Ok(self.last_mtime());
        }
        let mut latest = 0;
        for path in files {
            latest = latest.max(file_mtime(&path)?);
        }
        if !mode.is_dry_run() {
            save_last_mtime(&self.profile.lastmtime, latest)?;
        }
        debug!(mtime = latest, "Updated last mtime");
        Ok(latest)
    }

    pub fn save_snapshot(&self, mode: Mode) -> Result<usize> {
        let snapshot = Snapshot::capture(&maildir_files(&self.profile.maildir)?)?;
        if !mode.is_dry_run() {
            snapshot.save(&self.profile.snapshot)?;
        }
        Ok(snapshot.len())
    }

    pub fn changed_since_snapshot(&self) -> Result<Vec<PathBuf>> {
        let snapshot = Snapshot::load(&self.profile.snapshot)?;
        snapshot.changed(&maildir_files(&self.profile.maildir)?)
    }

    /// Puts the snapshot's mtimes back. In a dry run, only reports how
    /// many files differ from it.
    pub fn restore_mtimes(&self, mode: Mode) -> Result<usize> {
        let snapshot = Snapshot::load(&self.profile.snapshot)?;
        if snapshot.is_empty() {
            warn!(path = %self.profile.snapshot.display(), "No snapshot to restore");
            return Ok(0);
        }
        if mode.is_dry_run() {
            return Ok(self.changed_since_snapshot()?.len());
        }
        snapshot.restore(&maildir_files(&self.profile.maildir)?)
    }

    /// Runs the requested stages in order. The first failing stage stops
    /// the run; mutations already written stay on disk.
    pub fn run(&self, invocation: &Invocation) -> Result<RunSummary> {
        let mode = invocation.mode;
        let mut summary = RunSummary::default();

        if invocation.count {
            let count = self.count(
                invocation.query.query.as_deref(),
                invocation.query.modified_only,
            )?;
            self.printer.count(count);
            return Ok(summary);
        }

        if invocation.needs_messages() {
            if !invocation.query.selects_messages() {
                return Err(Error::Config(
                    "No messages selected: give a query, a path or --changed".to_string(),
                ));
            }

            info!("Querying");
            let Selection {
                mut messages,
                failures,
            } = self.query(&invocation.query)?;
            summary.processed = messages.len();
            summary.failures.extend(failures);

            if invocation.list {
                for msg in &messages {
                    self.printer.message(msg);
                }
            }
            if !invocation.tag_actions.is_empty() {
                info!("Changing tags");
                let outcome = self.change_tags(&mut messages, &invocation.tag_actions, mode);
                let changed = summary.absorb(outcome);
                summary.retagged += changed;
            }
            if !invocation.flag_actions.is_empty() {
                info!("Changing flags");
                let outcome = self.change_flags(&mut messages, &invocation.flag_actions, mode)?;
                summary.absorb(outcome);
            }
            if invocation.autotag {
                info!("Autotagging");
                let outcome = self.autotag(&mut messages, mode)?;
                let changed = summary.absorb(outcome);
                summary.retagged += changed;
            }
        }

        if invocation.expire {
            info!("Expiring");
            let expired = self.expire(mode)?;
            summary.expired = expired.moved.len();
            summary.failures.extend(expired.failures);
        }

        if invocation.index || invocation.rebuild {
            self.index(mode, invocation.rebuild)?;
        }

        if invocation.restore_mtimes {
            info!("Restoring mtimes");
            let restored = self.restore_mtimes(mode)?;
            debug!(restored, "Restored mtimes");
        }

        if invocation.update_mtime {
            info!("Updating last mtime");
            self.update_mtime(mode)?;
        }

        if invocation.save_snapshot {
            info!("Saving snapshot");
            let saved = self.save_snapshot(mode)?;
            debug!(files = saved, "Saved snapshot");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::FindOutput;
    use crate::mail::{Flag, SAMPLE};
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        finds: Vec<FindRequest>,
        updates: Vec<bool>,
    }

    /// Index returning canned output and recording what it was asked.
    struct FakeIndex {
        output: FindOutput,
        calls: Rc<RefCell<Calls>>,
    }

    impl MailIndex for FakeIndex {
        fn find(&self, request: &FindRequest) -> Result<FindOutput> {
            self.calls.borrow_mut().finds.push(request.clone());
            Ok(self.output.clone())
        }

        fn update(&self, rebuild: bool) -> Result<()> {
            self.calls.borrow_mut().updates.push(rebuild);
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        calls: Rc<RefCell<Calls>>,
        mutag: Mutag,
    }

    impl Fixture {
        fn root(&self) -> &Path {
            self.dir.path()
        }
    }

    fn write_message(root: &Path, folder: &str, name: &str, content: &str) -> PathBuf {
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir_all(root.join(folder).join(sub)).unwrap();
        }
        let path = root.join(folder).join("cur").join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn record(path: &Path, id: &str, thread: &str, date: i64) -> String {
        format!(
            "(:docid 1 :path \"{}\" :size 10 :message-id \"{id}\" :subject \"Subject {id}\" \
             :maildir \"/INBOX\" :date {date} :flags (seen) :tags (\"work\" \"urgent\") \
             :from ((\"Alice\" . \"alice@example.org\")) :thread (:path \"{thread}\"))\n",
            path.display()
        )
    }

    fn fixture(output: impl FnOnce(&Path) -> FindOutput, rules: Option<&str>) -> Fixture {
        match rules {
            Some(rules) => fixture_with_rules(output, "rules.toml", rules),
            None => build_fixture(output, "rules.toml", None),
        }
    }

    fn fixture_with_rules(
        output: impl FnOnce(&Path) -> FindOutput,
        name: &str,
        rules: &str,
    ) -> Fixture {
        build_fixture(output, name, Some(rules))
    }

    fn build_fixture(
        output: impl FnOnce(&Path) -> FindOutput,
        name: &str,
        rules: Option<&str>,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Mail");
        fs::create_dir_all(&root).unwrap();

        let mut profile = Config::default().profile("default").unwrap();
        profile.maildir = root.clone();
        profile.lastmtime = dir.path().join("state/last.mtime");
        profile.snapshot = dir.path().join("state/snapshot");
        profile.tagrules = dir.path().join(name);
        if let Some(rules) = rules {
            fs::write(&profile.tagrules, rules).unwrap();
        }

        let calls = Rc::new(RefCell::new(Calls::default()));
        let index = FakeIndex {
            output: output(&root),
            calls: Rc::clone(&calls),
        };
        let mutag = Mutag::new(profile, Box::new(index), Printer::new(false));
        Fixture { dir, calls, mutag }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_results_is_empty() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        let selection = fx
            .mutag
            .query(&QueryRequest {
                query: Some("nothing".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(selection.messages.is_empty());
        assert_eq!(fx.mutag.count(Some("nothing"), false).unwrap(), 0);
    }

    #[test]
    fn test_query_collects_thread_data() {
        let fx = fixture(
            |root| {
                let a = write_message(root, "INBOX", "1:2,S", SAMPLE);
                let b = write_message(root, "INBOX", "2:2,S", SAMPLE);
                FindOutput::Records(record(&a, "a", "0", 0) + &record(&b, "b", "0:1", 0))
            },
            None,
        );
        save_last_mtime(&fx.mutag.profile().lastmtime, 1234).unwrap();

        let selection = fx
            .mutag
            .query(&QueryRequest {
                query: Some("tag:work".to_string()),
                modified_only: true,
                related: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(selection.messages.len(), 2);
        assert!(selection.messages.iter().all(|m| m.thread_root() == "a"));

        let calls = fx.calls.borrow();
        assert_eq!(calls.finds[0].after, Some(1234));
        assert!(calls.finds[0].include_related);
    }

    #[test]
    fn test_explicit_paths_report_failures() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        let good = write_message(fx.root().join("Mail").as_path(), "INBOX", "1:2,", SAMPLE);
        let outside = fx.root().join("stray");
        fs::write(&outside, SAMPLE).unwrap();
        let missing = fx.root().join("Mail/INBOX/cur/missing");

        let selection = fx
            .mutag
            .query(&QueryRequest {
                paths: vec![good, outside, missing],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(selection.messages.len(), 1);
        assert_eq!(selection.failures.len(), 2);
        assert!(matches!(selection.failures[0].error, Error::PathOutsideMaildir(_)));
        assert!(matches!(selection.failures[1].error, Error::PathNotFound(_)));
        assert!(fx.calls.borrow().finds.is_empty());
    }

    #[test]
    fn test_run_changes_tags_and_flags() {
        let mut path = PathBuf::new();
        let fx = fixture(
            |root| {
                path = write_message(root, "INBOX", "1:2,S", SAMPLE);
                FindOutput::Records(record(&path, "a", "0", 0))
            },
            None,
        );

        let invocation = Invocation {
            query: QueryRequest {
                query: Some("tag:urgent".to_string()),
                ..Default::default()
            },
            tag_actions: vec!["+done".to_string(), "-urgent".to_string()],
            flag_actions: vec!["+flagged".to_string()],
            index: true,
            update_mtime: true,
            ..Default::default()
        };
        let summary = fx.mutag.run(&invocation).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.retagged, 1);
        assert!(summary.failures.is_empty());

        let renamed = path.with_file_name("1:2,FS");
        assert!(!path.exists());
        let msg = Message::from_file(&renamed, &fx.mutag.profile().maildir, &Default::default())
            .unwrap();
        assert_eq!(msg.tags, set(&["done", "work"]));
        assert!(msg.flags.contains(&Flag::Flagged));

        assert_eq!(fx.calls.borrow().updates, vec![false]);
        assert!(fx.mutag.last_mtime() > 0);
    }

    #[test]
    fn test_run_dry_run_touches_nothing() {
        let mut path = PathBuf::new();
        let fx = fixture(
            |root| {
                path = write_message(root, "INBOX", "1:2,S", SAMPLE);
                FindOutput::Records(record(&path, "a", "0", 0))
            },
            None,
        );
        let before = fs::read(&path).unwrap();

        let invocation = Invocation {
            query: QueryRequest {
                query: Some("".to_string()),
                ..Default::default()
            },
            tag_actions: vec!["+done".to_string()],
            index: true,
            update_mtime: true,
            mode: Mode::DryRun,
            ..Default::default()
        };
        let summary = fx.mutag.run(&invocation).unwrap();
        assert_eq!(summary.retagged, 1);
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(fx.calls.borrow().updates.is_empty());
        assert!(!fx.mutag.profile().lastmtime.exists());
    }

    #[test]
    fn test_run_without_selection() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        let invocation = Invocation {
            tag_actions: vec!["+x".to_string()],
            ..Default::default()
        };
        assert!(matches!(fx.mutag.run(&invocation), Err(Error::Config(_))));
    }

    #[test]
    fn test_autotag() {
        let mut path = PathBuf::new();
        let fx = fixture(
            |root| {
                path = write_message(root, "INBOX", "1:2,S", SAMPLE);
                let ignored = write_message(root, "Spam", "2:2,S", SAMPLE);
                fs::write(root.join("Spam/.notag"), "").unwrap();
                FindOutput::Records(
                    record(&path, "a", "0", 0)
                        + &record(&ignored, "b", "1", 0).replace("/INBOX", "/Spam"),
                )
            },
            Some("[[rule]]\nemails = [\"alice@example.org\"]\ntags = [\"friends\"]\nremove = [\"urgent\"]\n"),
        );

        let mut selection = fx
            .mutag
            .query(&QueryRequest {
                query: Some("".to_string()),
                ..Default::default()
            })
            .unwrap();
        let outcome = fx
            .mutag
            .autotag(&mut selection.messages, Mode::Apply)
            .unwrap();
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(selection.messages[0].get_tags().unwrap(), set(&["friends", "work"]));
        assert_eq!(selection.messages[1].tags, set(&["urgent", "work"]));

        let outcome = fx
            .mutag
            .autotag(&mut selection.messages, Mode::Apply)
            .unwrap();
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_autotag_without_rules() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        let err = fx.mutag.autotag(&mut [], Mode::Apply).unwrap_err();
        assert!(matches!(err, Error::RuleLoad { .. }));
    }

    #[test]
    fn test_expire_moves_to_trash() {
        let mut old = PathBuf::new();
        let mut recent = PathBuf::new();
        let now = Local::now().timestamp();
        let fx = fixture(
            |root| {
                old = write_message(root, "INBOX", "1:2,S", SAMPLE);
                recent = write_message(root, "INBOX", "2:2,S", SAMPLE);
                FindOutput::Records(
                    record(&old, "a", "0", now - 90 * 86400) + &record(&recent, "b", "1", now),
                )
            },
            Some("[expire]\nquery = \"maildir:/INBOX\"\n"),
        );

        let dry = fx.mutag.expire(Mode::DryRun).unwrap();
        assert_eq!(dry.moved.len(), 1);
        assert!(old.exists());

        let expired = fx.mutag.expire(Mode::Apply).unwrap();
        assert_eq!(expired.processed, 2);
        assert_eq!(expired.moved, vec![fx.root().join("Mail/Trash/cur/1:2,S")]);
        assert!(!old.exists());
        assert!(recent.exists());

        let calls = fx.calls.borrow();
        let query = calls.finds[0].query.as_deref().unwrap();
        assert!(query.starts_with("maildir:/INBOX date:.."));
        assert!(calls.finds[0].include_related);
    }

    #[test]
    fn test_update_mtime_keeps_value_for_empty_maildir() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        save_last_mtime(&fx.mutag.profile().lastmtime, 1234).unwrap();

        assert_eq!(fx.mutag.update_mtime(Mode::Apply).unwrap(), 1234);
        assert_eq!(fx.mutag.last_mtime(), 1234);

        write_message(fx.root().join("Mail").as_path(), "INBOX", "1:2,S", SAMPLE);
        let latest = fx.mutag.update_mtime(Mode::Apply).unwrap();
        assert!(latest > 1234);
        assert_eq!(fx.mutag.last_mtime(), latest);
    }

    #[cfg(unix)]
    #[test]
    fn test_autotag_rule_failure_keeps_earlier_changes() {
        use std::os::unix::fs::PermissionsExt;

        let mut first = PathBuf::new();
        let mut second = PathBuf::new();
        let fx = fixture_with_rules(
            |root| {
                first = write_message(root, "INBOX", "1:2,S", SAMPLE);
                second = write_message(root, "INBOX", "2:2,S", SAMPLE);
                FindOutput::Records(record(&first, "a", "0", 0) + &record(&second, "b", "1", 0))
            },
            "rules.sh",
            "#!/bin/sh\n\
             case \"$1\" in\n\
             capabilities) echo '{\"get_tags\": true}' ;;\n\
             get-tags)\n\
               case \"$(cat)\" in\n\
               *'\"message_id\":\"a\"'*) echo '[\"ruled\"]' ;;\n\
               *) echo fail >&2; exit 1 ;;\n\
               esac ;;\n\
             esac\n",
        );
        let script = &fx.mutag.profile().tagrules;
        fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
        let untouched = fs::read(&second).unwrap();

        let mut selection = fx
            .mutag
            .query(&QueryRequest {
                query: Some("".to_string()),
                ..Default::default()
            })
            .unwrap();
        let err = fx
            .mutag
            .autotag(&mut selection.messages, Mode::Apply)
            .unwrap_err();
        assert!(matches!(err, Error::Rule(_)));

        let msg = Message::from_file(&first, &fx.mutag.profile().maildir, &Default::default())
            .unwrap();
        assert_eq!(msg.tags, set(&["ruled"]));
        assert_eq!(fs::read(&second).unwrap(), untouched);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let fx = fixture(|_| FindOutput::NoResults, None);
        let path = write_message(fx.root().join("Mail").as_path(), "INBOX", "1:2,S", SAMPLE);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000))
            .unwrap();

        assert_eq!(fx.mutag.save_snapshot(Mode::Apply).unwrap(), 1);
        assert!(fx.mutag.changed_since_snapshot().unwrap().is_empty());

        fs::write(&path, SAMPLE.replace("Lunch", "Dinner")).unwrap();
        assert_eq!(fx.mutag.changed_since_snapshot().unwrap(), vec![path.clone()]);
        assert_eq!(fx.mutag.restore_mtimes(Mode::DryRun).unwrap(), 1);
        assert_eq!(fx.mutag.restore_mtimes(Mode::Apply).unwrap(), 1);
        assert_eq!(file_mtime(&path).unwrap(), 1_000_000);

        let modified = fx.mutag.modified(1_000_000).unwrap();
        assert!(modified.is_empty());
        assert_eq!(fx.mutag.modified(999_999).unwrap().len(), 1);
    }
}
