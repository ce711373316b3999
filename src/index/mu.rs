use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{Error, Result};

/// Exit status `mu find` uses when the query matched nothing.
pub const NO_MATCHES_STATUS: i32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindRequest {
    pub query: Option<String>,
    /// Only messages changed after this unix time.
    pub after: Option<i64>,
    pub include_related: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutput {
    Records(String),
    NoResults,
}

/// The external full-text index the messages are looked up in.
pub trait MailIndex {
    fn find(&self, request: &FindRequest) -> Result<FindOutput>;

    /// (Re)indexes the maildir.
    fn update(&self, rebuild: bool) -> Result<()>;
}

/// [`MailIndex`] backed by the `mu` command line tool.
#[derive(Debug, Clone)]
pub struct MuIndex {
    command: String,
    muhome: PathBuf,
    maildir: PathBuf,
}

impl MuIndex {
    pub fn new(command: &str, muhome: PathBuf, maildir: PathBuf) -> Self {
        Self {
            command: command.to_string(),
            muhome,
            maildir,
        }
    }

    fn base_args(&self, subcommand: &str) -> Vec<String> {
        vec![
            subcommand.to_string(),
            "--muhome".to_string(),
            self.muhome.to_string_lossy().into_owned(),
        ]
    }

    pub fn find_args(&self, request: &FindRequest) -> Result<Vec<String>> {
        let mut args = self.base_args("find");
        args.push("--threads".to_string());
        args.push("--format=sexp".to_string());

        if request.include_related {
            args.push("--include-related".to_string());
        }
        if let Some(after) = request.after {
            args.push(format!("--after={after}"));
        }

        match request.query.as_deref().map(split_query).transpose()? {
            Some(words) if !words.is_empty() => args.extend(words),
            _ => args.push(String::new()),
        }
        Ok(args)
    }

    pub fn update_args(&self, rebuild: bool) -> Vec<String> {
        let mut args = self.base_args("index");
        args.push("--maildir".to_string());
        args.push(self.maildir.to_string_lossy().into_owned());
        if rebuild {
            args.push("--rebuild".to_string());
        }
        args
    }

    fn run(&self, args: &[String]) -> Result<Output> {
        debug!(command = %self.command, ?args, "Running index command");
        Command::new(&self.command)
            .args(args)
            .output()
            .map_err(|e| Error::ExternalTool {
                tool: self.command.clone(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })
    }

    fn failure(&self, output: &Output) -> Error {
        Error::ExternalTool {
            tool: self.command.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

impl MailIndex for MuIndex {
    fn find(&self, request: &FindRequest) -> Result<FindOutput> {
        let output = self.run(&self.find_args(request)?)?;

        if output.status.success() {
            return Ok(FindOutput::Records(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ));
        }
        if output.status.code() == Some(NO_MATCHES_STATUS) {
            debug!("No messages matched");
            return Ok(FindOutput::NoResults);
        }
        Err(self.failure(&output))
    }

    fn update(&self, rebuild: bool) -> Result<()> {
        let output = self.run(&self.update_args(rebuild))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(self.failure(&output))
        }
    }
}

/// Splits a query into words the way a POSIX shell would: whitespace
/// separates words, single quotes are literal, double quotes allow `\"`
/// and `\\`, and a backslash outside quotes escapes the next character.
pub fn split_query(query: &str) -> Result<Vec<String>> {
    #[derive(PartialEq)]
    enum State {
        Plain,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut state = State::Plain;
    let mut quote_start = 0;
    let mut chars = query.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match state {
            State::Plain => match c {
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut word));
                        in_word = false;
                    }
                }
                '\'' => {
                    state = State::Single;
                    quote_start = i;
                    in_word = true;
                }
                '"' => {
                    state = State::Double;
                    quote_start = i;
                    in_word = true;
                }
                '\\' => {
                    if let Some((_, next)) = chars.next() {
                        word.push(next);
                    }
                    in_word = true;
                }
                c => {
                    word.push(c);
                    in_word = true;
                }
            },
            State::Single => match c {
                '\'' => state = State::Plain,
                c => word.push(c),
            },
            State::Double => match c {
                '"' => state = State::Plain,
                '\\' if matches!(chars.peek(), Some((_, '"' | '\\'))) => {
                    if let Some((_, next)) = chars.next() {
                        word.push(next);
                    }
                }
                c => word.push(c),
            },
        }
    }

    if state != State::Plain {
        return Err(Error::parse(quote_start, "Unterminated quote in query"));
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_query() {
        assert_eq!(
            split_query(r#"from:bob subject:"weekly report" 'a b' c\ d"#).unwrap(),
            vec!["from:bob", "subject:weekly report", "a b", "c d"]
        );
        assert_eq!(split_query(r#""say \"hi\"" ''"#).unwrap(), vec![r#"say "hi""#, ""]);
        assert!(split_query("   ").unwrap().is_empty());
        assert!(matches!(
            split_query("tag:'open").unwrap_err(),
            Error::Parse { offset: 4, .. }
        ));
    }

    #[test]
    fn test_find_args() {
        let mu = MuIndex::new("mu", "/home/u/.mu".into(), "/home/u/Mail".into());
        let args = mu
            .find_args(&FindRequest {
                query: Some("maildir:/INBOX flag:unread".to_string()),
                after: Some(1_700_000_000),
                include_related: true,
            })
            .unwrap();
        assert_eq!(
            args,
            vec![
                "find",
                "--muhome",
                "/home/u/.mu",
                "--threads",
                "--format=sexp",
                "--include-related",
                "--after=1700000000",
                "maildir:/INBOX",
                "flag:unread"
            ]
        );

        let args = mu.find_args(&FindRequest::default()).unwrap();
        assert_eq!(args.last().map(String::as_str), Some(""));
    }

    #[test]
    fn test_update_args() {
        let mu = MuIndex::new("mu", "/h/.mu".into(), "/h/Mail".into());
        assert_eq!(
            mu.update_args(true),
            vec!["index", "--muhome", "/h/.mu", "--maildir", "/h/Mail", "--rebuild"]
        );
    }

    #[cfg(unix)]
    fn fake_mu(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_find_exit_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let request = FindRequest::default();

        let ok = fake_mu(dir.path(), "mu-ok", "echo '(:path \"/m/1\" :size 1)'");
        let mu = MuIndex::new(&ok, dir.path().into(), dir.path().into());
        match mu.find(&request).unwrap() {
            FindOutput::Records(raw) => assert!(raw.contains(":size 1")),
            FindOutput::NoResults => panic!("expected records"),
        }

        let none = fake_mu(dir.path(), "mu-none", "exit 4");
        let mu = MuIndex::new(&none, dir.path().into(), dir.path().into());
        assert_eq!(mu.find(&request).unwrap(), FindOutput::NoResults);

        let broken = fake_mu(dir.path(), "mu-broken", "echo 'database locked' >&2; exit 1");
        let mu = MuIndex::new(&broken, dir.path().into(), dir.path().into());
        match mu.find(&request).unwrap_err() {
            Error::ExternalTool { stderr, .. } => assert_eq!(stderr, "database locked"),
            e => panic!("unexpected error {e}"),
        }
        assert!(mu.update(false).is_err());
    }

    #[test]
    fn test_missing_binary() {
        let mu = MuIndex::new("/nonexistent/mu-binary", "/h".into(), "/h".into());
        assert!(matches!(
            mu.update(false).unwrap_err(),
            Error::ExternalTool { .. }
        ));
    }
}
