#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::TaskflowError;
use crate::notify::SettingsScope;
use crate::reminder::OverduePolicyKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(alias = "dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.local/share/taskflow".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub overdue_policy: OverduePolicyKind,
    pub overdue_cooldown_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            overdue_policy: OverduePolicyKind::EveryTick,
            overdue_cooldown_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationsConfig {
    pub scope: SettingsScope,
    pub backend: NotifyBackend,
    pub command: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            scope: SettingsScope::Shared,
            backend: NotifyBackend::Command,
            command: "notify-send".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyBackend {
    Command,
    Stdout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub icons: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { icons: true }
    }
}


/// Location of `config.toml`: `~/.config/taskflow`, or the platform config
/// directory when no home directory is known.
pub fn config_file() -> anyhow::Result<PathBuf> {
    let dir = match home_dir() {
        Some(home) => home.join(".config").join("taskflow"),
        None => ProjectDirs::from("", "", "taskflow")
            .context("no home directory and no platform config directory")?
            .config_dir()
            .to_path_buf(),
    };
    Ok(dir.join("config.toml"))
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    let rest = match input.strip_prefix('~') {
        Some("") => "",
        Some(after) => match after.strip_prefix('/') {
            Some(rest) => rest,
            None => return input.to_owned(),
        },
        None => return input.to_owned(),
    };
    home_dir().map_or_else(
        || input.to_owned(),
        |home| replace_home(&home, rest),
    )
}

fn replace_home(home: &Path, rest: &str) -> String {
    if rest.is_empty() {
        home.to_string_lossy().into_owned()
    } else {
        home.join(rest).to_string_lossy().into_owned()
    }
}

/// Inverse of [`expand_tilde`] for display.
#[must_use]
pub fn tilde_path(input: &str) -> String {
    let Some(home) = home_dir() else {
        return input.to_owned();
    };
    match Path::new(input).strip_prefix(&home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_owned(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => input.to_owned(),
    }
}

/// Resolves `~`, `$VAR`/`${VAR}` and relative paths against the working directory.
pub fn expand_path(input: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(substitute_env(&expand_tilde(input)));
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("cannot resolve a relative data dir")?;
    Ok(cwd.join(path))
}

fn substitute_env(input: &str) -> String {
    let Ok(var) = regex::Regex::new(r"\$(?:\{([A-Za-z_]\w*)\}|([A-Za-z_]\w*))") else {
        return input.to_owned();
    };
    var.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_owned())
    })
    .into_owned()
}

/// Loads and validates the user's config; a missing file means defaults.
pub fn load() -> anyhow::Result<Config> {
    let file = ConfigFile::open(config_file()?)?;
    file.config.validate()?;
    Ok(file.config)
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&load()?)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    ConfigFile::open(config_file()?)?.get(key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    ConfigFile::open(config_file()?)?.set(key, value)
}

/// A config file kept both as an editable document and as parsed settings,
/// so `set` preserves the user's comments and layout.
struct ConfigFile {
    path: PathBuf,
    doc: toml_edit::DocumentMut,
    config: Config,
}

impl ConfigFile {
    fn open(path: PathBuf) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(TaskflowError::IoPath { path, source }.into()),
        };
        let doc: toml_edit::DocumentMut = raw
            .parse()
            .with_context(|| format!("{} is not valid TOML", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("unexpected settings in {}", path.display()))?;
        Ok(Self { path, doc, config })
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.config.validate()?;
        let (key, _) = ConfigKey::resolve(key)?;
        let mut value = toml::Value::try_from(&self.config)?;
        for seg in key.split('.') {
            match value.get(seg) {
                Some(next) => value = next.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(match value {
            toml::Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    fn set(mut self, key: &str, raw: &str) -> anyhow::Result<()> {
        self.config.validate()?;
        let (name, kind) = ConfigKey::resolve(key)?;
        let item = kind.parse(raw).map_err(|msg| TaskflowError::InvalidConfigValue {
            key: key.to_owned(),
            msg,
        })?;
        let (section, field) = name.split_once('.').unwrap_or(("", name));
        let table = self
            .doc
            .entry(section)
            .or_insert_with(|| {
                let mut t = toml_edit::Table::new();
                t.set_implicit(true);
                toml_edit::Item::Table(t)
            })
            .as_table_mut()
            .ok_or_else(|| TaskflowError::Config(format!("[{section}] is not a table")))?;
        table.insert(field, item);

        let updated = self.doc.to_string();
        let config: Config = toml::from_str(&updated)
            .with_context(|| format!("{key} = {raw} does not fit the config schema"))?;
        config.validate()?;
        self.write(&updated)
    }

    fn write(&self, contents: &str) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TaskflowError {
    let path = path.to_path_buf();
    move |source| TaskflowError::IoPath { path, source }
}

impl Config {
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(TaskflowError::Config(
                "storage.data_dir must not be empty".to_owned(),
            ));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(TaskflowError::Config(
                "scheduler.tick_interval_secs must be >= 1".to_owned(),
            ));
        }
        if self.scheduler.overdue_cooldown_minutes == 0 {
            return Err(TaskflowError::Config(
                "scheduler.overdue_cooldown_minutes must be >= 1".to_owned(),
            ));
        }
        if self.notifications.backend == NotifyBackend::Command
            && self.notifications.command.trim().is_empty()
        {
            return Err(TaskflowError::Config(
                "notifications.command must not be empty when backend = \"command\"".to_owned(),
            ));
        }
        Ok(())
    }

    /// Tick period for the reminder scheduler.
    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler.tick_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Flag,
    Count,
    OneOf(&'static [&'static str]),
}

/// Keys accepted by `config get`/`config set`.
struct ConfigKey {
    name: &'static str,
    aliases: &'static [&'static str],
    kind: ValueKind,
}

const KEYS: &[ConfigKey] = &[
    ConfigKey {
        name: "storage.data_dir",
        aliases: &["storage.dir"],
        kind: ValueKind::Text,
    },
    ConfigKey {
        name: "scheduler.tick_interval_secs",
        aliases: &["scheduler.interval", "scheduler.interval_secs"],
        kind: ValueKind::Count,
    },
    ConfigKey {
        name: "scheduler.overdue_policy",
        aliases: &[],
        kind: ValueKind::OneOf(&["every_tick", "once", "cooldown"]),
    },
    ConfigKey {
        name: "scheduler.overdue_cooldown_minutes",
        aliases: &[],
        kind: ValueKind::Count,
    },
    ConfigKey {
        name: "notifications.scope",
        aliases: &[],
        kind: ValueKind::OneOf(&["shared", "per_device"]),
    },
    ConfigKey {
        name: "notifications.backend",
        aliases: &[],
        kind: ValueKind::OneOf(&["command", "stdout"]),
    },
    ConfigKey {
        name: "notifications.command",
        aliases: &[],
        kind: ValueKind::Text,
    },
    ConfigKey {
        name: "ui.icons",
        aliases: &[],
        kind: ValueKind::Flag,
    },
];

impl ConfigKey {
    fn resolve(key: &str) -> Result<(&'static str, ValueKind), TaskflowError> {
        let key = key.trim();
        KEYS.iter()
            .find(|k| k.name == key || k.aliases.contains(&key))
            .map(|k| (k.name, k.kind))
            .ok_or_else(|| TaskflowError::InvalidConfigKey(key.to_owned()))
    }
}

impl ValueKind {
    fn parse(self, raw: &str) -> Result<toml_edit::Item, String> {
        let v = raw.trim();
        match self {
            Self::Text => Ok(toml_edit::value(raw)),
            Self::Flag => v
                .parse::<bool>()
                .map(toml_edit::value)
                .map_err(|_| format!("expected true or false, got '{v}'")),
            Self::Count => v
                .parse::<u32>()
                .map(|n| toml_edit::value(i64::from(n)))
                .map_err(|e| format!("expected a non-negative integer, got '{v}': {e}")),
            Self::OneOf(allowed) if allowed.contains(&v) => Ok(toml_edit::value(v)),
            Self::OneOf(allowed) => Err(format!("must be one of: {}", allowed.join(", "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_at(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
        ConfigFile::open(path.to_path_buf())?.set(key, value)
    }

    fn get_at(path: &Path, key: &str) -> Option<String> {
        ConfigFile::open(path.to_path_buf())
            .unwrap()
            .get(key)
            .unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
        assert_eq!(Config::default().tick_interval().as_secs(), 300);
    }

    #[test]
    fn config_validation_catches_invalid_values() {
        let mut cfg = Config::default();
        cfg.scheduler.tick_interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.notifications.command = " ".to_owned();
        assert!(cfg.validate().is_err());
        cfg.notifications.backend = NotifyBackend::Stdout;
        cfg.validate().unwrap();
    }

    #[test]
    fn config_set_and_get_dot_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        set_at(&path, "ui.icons", "false").unwrap();
        assert_eq!(get_at(&path, "ui.icons").as_deref(), Some("false"));

        set_at(&path, "storage.dir", "~/tasks").unwrap();
        assert_eq!(get_at(&path, "storage.data_dir").as_deref(), Some("~/tasks"));

        set_at(&path, "scheduler.overdue_policy", "cooldown").unwrap();
        set_at(&path, "notifications.scope", "per_device").unwrap();
        set_at(&path, "scheduler.interval", "60").unwrap();
        assert_eq!(get_at(&path, "scheduler.interval").as_deref(), Some("60"));

        let cfg = ConfigFile::open(path.clone()).unwrap().config;
        cfg.validate().unwrap();
        assert!(!cfg.ui.icons);
        assert_eq!(cfg.storage.data_dir, "~/tasks");
        assert_eq!(cfg.scheduler.overdue_policy, OverduePolicyKind::Cooldown);
        assert_eq!(cfg.notifications.scope, SettingsScope::PerDevice);
        assert_eq!(cfg.scheduler.tick_interval_secs, 60);
    }

    #[test]
    fn config_set_keeps_comments_and_unrelated_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "# mine\n[notifications]\ncommand = \"dunstify\" # custom\n",
        )
        .unwrap();

        set_at(&path, "notifications.backend", "stdout").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("# mine"));
        assert!(raw.contains("\"dunstify\" # custom"));
        assert_eq!(get_at(&path, "notifications.backend").as_deref(), Some("stdout"));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn env_vars_expand_in_paths() {
        let Ok(home) = std::env::var("HOME") else {
            return;
        };
        assert_eq!(substitute_env("$HOME/a"), format!("{home}/a"));
        assert_eq!(substitute_env("${HOME}/a"), format!("{home}/a"));
        assert_eq!(
            substitute_env("$TASKFLOW_SURELY_UNSET_VAR/a"),
            "$TASKFLOW_SURELY_UNSET_VAR/a"
        );
        assert!(expand_path("relative/dir").unwrap().is_absolute());
    }

    #[test]
    fn tilde_helpers_round_trip_home_paths() {
        let Some(home) = home_dir() else {
            return;
        };
        let data = home.join("tasks").join("data");
        assert_eq!(expand_tilde("~/tasks/data"), data.to_string_lossy());
        assert_eq!(expand_tilde("~"), home.to_string_lossy());
        assert_eq!(tilde_path(&data.to_string_lossy()), "~/tasks/data");
        assert_eq!(tilde_path(&home.to_string_lossy()), "~");
        assert_eq!(expand_tilde("~other/x"), "~other/x");
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
    }

    #[test]
    fn config_set_rejects_bad_keys_and_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        assert!(set_at(&path, "ui.colour", "red").is_err());
        assert!(set_at(&path, "ui.icons", "yes").is_err());
        assert!(set_at(&path, "notifications.scope", "global").is_err());
        assert!(set_at(&path, "scheduler.tick_interval_secs", "0").is_err());
        assert!(set_at(&path, "scheduler.tick_interval_secs", "-5").is_err());
        assert!(!path.exists());
    }
}
