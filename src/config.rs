use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::mail::TagHeader;

const APP_DIR: &str = "mutag";
const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Profile used when none is given on the command line
    pub default_profile: Option<String>,
    /// Colorize terminal output
    pub color: bool,
    /// Named profiles
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// A profile as written in the config file; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub maildir: Option<String>,
    pub muhome: Option<String>,
    pub mu_command: Option<String>,
    /// Trash folder, relative to the maildir
    pub trash: Option<String>,
    pub expire_days: Option<u32>,
    pub tagrules: Option<String>,
    pub lastmtime: Option<String>,
    pub snapshot: Option<String>,
    pub tags_header: Option<String>,
}

/// A fully resolved profile.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub maildir: PathBuf,
    pub muhome: PathBuf,
    pub mu_command: String,
    pub trash: String,
    pub expire_days: u32,
    pub tagrules: PathBuf,
    pub lastmtime: PathBuf,
    pub snapshot: PathBuf,
    pub tags_header: TagHeader,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: None,
            color: true,
            profiles: BTreeMap::new(),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| expand("~/.config"))
        .join(APP_DIR)
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| expand("~/.cache"))
        .join(APP_DIR)
}

impl Config {
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Loads the config file; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("{}: {e}", config_path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", config_path.display())))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Name of the profile to use: the requested one, else the configured default.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
    }

    /// Resolves a profile, filling unset keys with defaults.
    ///
    /// Only the implicit `default` profile may be absent from the file.
    pub fn profile(&self, name: &str) -> Result<Profile> {
        let raw = match self.profiles.get(name) {
            Some(raw) => raw.clone(),
            None if name == DEFAULT_PROFILE => ProfileConfig::default(),
            None => return Err(Error::Config(format!("Unknown profile: {name}"))),
        };

        let path_or = |value: &Option<String>, default: PathBuf| {
            value.as_deref().map(expand).unwrap_or(default)
        };

        Ok(Profile {
            name: name.to_string(),
            maildir: path_or(&raw.maildir, expand("~/Maildir")),
            muhome: path_or(&raw.muhome, expand("~/.cache/mu")),
            mu_command: raw.mu_command.unwrap_or_else(|| "mu".to_string()),
            trash: raw.trash.unwrap_or_else(|| "Trash".to_string()),
            expire_days: raw.expire_days.unwrap_or(30),
            tagrules: path_or(&raw.tagrules, config_dir().join("rules.toml")),
            lastmtime: path_or(&raw.lastmtime, cache_dir().join(format!("{name}.mtime"))),
            snapshot: path_or(&raw.snapshot, cache_dir().join(format!("{name}.snapshot"))),
            tags_header: raw
                .tags_header
                .as_deref()
                .map(TagHeader::new)
                .unwrap_or_default(),
        })
    }
}
