//! Command line arguments.

use std::ffi::OsString;
use std::path::PathBuf;

use structopt::StructOpt;
use structopt::clap::{AppSettings, Error as ClapError, ErrorKind};

use crate::mutag::{Invocation, QueryRequest};
use crate::tagging::Mode;

/// Exit status for usage errors.
pub const USAGE_ERROR: u8 = 2;

/// Positional arguments are tag actions: `+tag` or `tag` adds, `-tag`
/// removes. A removal that reads like a cluster of known short options
/// must follow `--`.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "mutag",
    about = "tag and expire mail indexed by mu",
    setting = AppSettings::AllowLeadingHyphen
)]
pub struct Opt {
    /// mu query selecting the messages to work on
    #[structopt(short, long)]
    pub query: Option<String>,

    /// work on this message file instead of querying the index
    #[structopt(short, long = "path", parse(from_os_str), number_of_values = 1)]
    pub paths: Vec<PathBuf>,

    /// only messages changed on disk since the last --update-mtime
    #[structopt(short, long)]
    pub changed: bool,

    /// include messages related to the matches (whole threads)
    #[structopt(short, long)]
    pub related: bool,

    /// apply the tag rules
    #[structopt(short, long)]
    pub autotag: bool,

    /// move expired messages to the trash folder
    #[structopt(short, long)]
    pub expire: bool,

    /// reindex the maildir
    #[structopt(short, long)]
    pub index: bool,

    /// rebuild the index from scratch
    #[structopt(long)]
    pub rebuild: bool,

    /// record the newest mtime in the maildir
    #[structopt(short, long)]
    pub update_mtime: bool,

    /// print the number of matching messages
    #[structopt(short = "n", long)]
    pub count: bool,

    /// flag action, like +seen or -F
    #[structopt(short, long = "flags", number_of_values = 1)]
    pub flags: Vec<String>,

    /// list the matching messages
    #[structopt(short, long)]
    pub list: bool,

    /// report changes without touching anything on disk
    #[structopt(long)]
    pub dryrun: bool,

    /// configuration profile
    #[structopt(long)]
    pub profile: Option<String>,

    /// use this configuration file
    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// path to the mu database
    #[structopt(long, parse(from_os_str))]
    pub muhome: Option<PathBuf>,

    /// path to the maildir
    #[structopt(long, parse(from_os_str))]
    pub maildir: Option<PathBuf>,

    /// save the mtime of every message file
    #[structopt(long)]
    pub save_snapshot: bool,

    /// set message mtimes back to the saved snapshot
    #[structopt(long)]
    pub restore_mtimes: bool,

    /// disable colored output
    #[structopt(long)]
    pub no_color: bool,

    /// print debug messages
    #[structopt(long)]
    pub debug: bool,

    /// tag actions: +tag, tag or -tag (a removal spelled with option
    /// letters, like -lunch, must follow --)
    #[structopt(name = "ACTIONS")]
    pub actions: Vec<String>,
}

impl Opt {
    /// Parses arguments, rejecting unknown `--options` that clap let
    /// through as tag actions and option clusters that would end in help.
    pub fn parse<I, T>(args: I) -> Result<Self, ClapError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if let Some(cluster) = help_in_cluster(&args) {
            return Err(ClapError::with_description(
                &format!("'{cluster}' reads as options including -h; put tag removals after --"),
                ErrorKind::UnknownArgument,
            ));
        }
        let opt = Self::from_iter_safe(args)?;
        if let Some(unknown) = opt.actions.iter().find(|a| a.starts_with("--")) {
            return Err(ClapError::with_description(
                &format!("Found argument '{unknown}' which wasn't expected"),
                ErrorKind::UnknownArgument,
            ));
        }
        Ok(opt)
    }

    pub fn invocation(&self) -> Invocation {
        Invocation {
            query: QueryRequest {
                query: self.query.clone(),
                paths: self.paths.clone(),
                modified_only: self.changed,
                related: self.related,
            },
            tag_actions: self.actions.clone(),
            flag_actions: self.flags.clone(),
            list: self.list,
            count: self.count,
            autotag: self.autotag,
            expire: self.expire,
            index: self.index,
            rebuild: self.rebuild,
            update_mtime: self.update_mtime,
            save_snapshot: self.save_snapshot,
            restore_mtimes: self.restore_mtimes,
            mode: Mode::from_dryrun(self.dryrun),
        }
    }
}

/// Short options that take a value; the rest of a cluster after one of
/// these is the value.
const VALUE_SHORTS: &[char] = &['q', 'p', 'f'];
const FLAG_SHORTS: &[char] = &['c', 'r', 'a', 'e', 'i', 'u', 'n', 'l', 'V'];
const VALUE_OPTIONS: &[&str] = &[
    "-q", "-p", "-f", "--query", "--path", "--flags", "--profile", "--config", "--muhome",
    "--maildir",
];

/// Finds a short option cluster like `-lunch` that would end in `-h` and
/// print help instead of removing a tag.
fn help_in_cluster(args: &[OsString]) -> Option<String> {
    let mut takes_value = false;
    for arg in args.iter().skip(1) {
        let arg = arg.to_string_lossy();
        if takes_value {
            takes_value = false;
            continue;
        }
        if arg == "--" {
            break;
        }
        if VALUE_OPTIONS.contains(&arg.as_ref()) {
            takes_value = true;
            continue;
        }
        let Some(letters) = arg.strip_prefix('-') else {
            continue;
        };
        if letters.starts_with('-') || letters.chars().count() < 2 {
            continue;
        }
        // Any unknown letter makes clap take the whole argument as a value.
        let known = |c: char| c == 'h' || VALUE_SHORTS.contains(&c) || FLAG_SHORTS.contains(&c);
        if !letters.chars().all(known) {
            continue;
        }
        let flags = letters.split(|c: char| VALUE_SHORTS.contains(&c)).next();
        if flags.is_some_and(|f| f.contains('h')) {
            return Some(arg.into_owned());
        }
    }
    None
}

/// Whether a parse "error" is really `--help` or `--version` output.
pub fn is_info(err: &ClapError) -> bool {
    matches!(
        err.kind,
        ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Opt, ClapError> {
        Opt::parse(std::iter::once("mutag").chain(args.iter().copied()))
    }

    #[test]
    fn test_tag_actions() {
        let opt = parse(&["-q", "tag:work", "+done", "-urgent", "later"]).unwrap();
        assert_eq!(opt.query.as_deref(), Some("tag:work"));
        assert_eq!(opt.actions, vec!["+done", "-urgent", "later"]);

        let opt = parse(&["-c", "--", "-ac"]).unwrap();
        assert!(opt.changed);
        assert_eq!(opt.actions, vec!["-ac"]);
    }

    #[test]
    fn test_removal_that_reads_as_help() {
        let err = parse(&["-q", "x", "-lunch"]).unwrap_err();
        assert!(!is_info(&err));
        assert_eq!(err.kind, ErrorKind::UnknownArgument);

        let opt = parse(&["-q", "x", "--", "-lunch"]).unwrap();
        assert_eq!(opt.actions, vec!["-lunch"]);

        assert!(parse(&["-q", "x", "-chores"]).is_err());

        let opt = parse(&["-q", "-lunch", "-sports"]).unwrap();
        assert_eq!(opt.query.as_deref(), Some("-lunch"));
        assert_eq!(opt.actions, vec!["-sports"]);
    }

    #[test]
    fn test_invocation() {
        let opt = parse(&[
            "-p", "/m/INBOX/cur/1", "-p", "/m/INBOX/cur/2", "-f", "+seen", "-f", "-F", "-ar",
            "--dryrun", "-u", "-i", "--rebuild",
        ])
        .unwrap();
        let inv = opt.invocation();
        assert_eq!(inv.query.paths.len(), 2);
        assert!(inv.query.related);
        assert!(inv.autotag);
        assert_eq!(inv.flag_actions, vec!["+seen", "-F"]);
        assert_eq!(inv.mode, Mode::DryRun);
        assert!(inv.update_mtime && inv.index && inv.rebuild);
        assert!(inv.tag_actions.is_empty());
    }

    #[test]
    fn test_setup_options() {
        let opt = parse(&[
            "--profile", "work", "--config", "/etc/mutag.toml", "--muhome", "/tmp/mu",
            "--maildir", "/srv/mail", "--no-color", "--debug", "-n",
        ])
        .unwrap();
        assert_eq!(opt.profile.as_deref(), Some("work"));
        assert_eq!(opt.config, Some(PathBuf::from("/etc/mutag.toml")));
        assert_eq!(opt.maildir, Some(PathBuf::from("/srv/mail")));
        assert!(opt.no_color && opt.debug && opt.count);
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["-q"]).is_err());

        let err = parse(&["-h"]).unwrap_err();
        assert!(is_info(&err));
        let err = parse(&["--help"]).unwrap_err();
        assert!(is_info(&err));
        assert!(!is_info(&parse(&["--frobnicate"]).unwrap_err()));
    }
}
