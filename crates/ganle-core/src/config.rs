use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info
};

use crate::clock;
use crate::reminder;

pub const CONFIG_ENV: &str = "GANLE_CONFIG";
pub const TIMEZONE_ENV: &str = "GANLE_TIMEZONE";

const APP_DIR: &str = "ganle";
const CONFIG_FILE: &str = "ganle.toml";

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default)]
pub struct ClientConfig {
  pub clock_tick_secs:       u64,
  pub reminder_poll_secs:    u64,
  pub timezone:              String,
  pub reminder_title:        String,
  pub desktop_notifications: bool,
  #[serde(skip)]
  pub loaded_from:           Option<PathBuf>
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      clock_tick_secs:       clock::DEFAULT_TICK
        .as_secs(),
      reminder_poll_secs:    reminder::DEFAULT_POLL
        .as_secs(),
      timezone:              "UTC".to_string(),
      reminder_title:        reminder::DEFAULT_TITLE
        .to_string(),
      desktop_notifications: false,
      loaded_from:           None
    }
  }
}

impl ClientConfig {
  /// Loads from `path_override`, then
  /// `GANLE_CONFIG`, then the user config
  /// directory. Only the last may be absent.
  #[tracing::instrument]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    Self::load_with(path_override, |key| {
      std::env::var(key).ok()
    })
  }

  pub fn load_with(
    path_override: Option<&Path>,
    env: impl Fn(&str) -> Option<String>
  ) -> anyhow::Result<Self> {
    let explicit = path_override
      .map(Path::to_path_buf)
      .or_else(|| env(CONFIG_ENV).map(PathBuf::from));

    let mut cfg = match explicit {
      | Some(path) => Self::from_file(&path)?,
      | None => {
        match default_config_path() {
          | Some(path) if path.exists() => {
            Self::from_file(&path)?
          }
          | _ => {
            info!("no config file found; using defaults");
            Self::default()
          }
        }
      }
    };

    if let Some(tz) = env(TIMEZONE_ENV)
      .filter(|raw| !raw.trim().is_empty())
    {
      debug!(timezone = %tz, "timezone overridden from environment");
      cfg.timezone = tz.trim().to_string();
    }

    cfg.validate()?;
    Ok(cfg)
  }

  pub fn from_file(path: &Path) -> anyhow::Result<Self> {
    let raw =
      fs::read_to_string(path).with_context(|| {
        format!("failed to read {}", path.display())
      })?;
    let mut cfg = Self::from_toml(&raw).with_context(|| {
      format!("invalid config {}", path.display())
    })?;
    info!(config = %path.display(), "loaded config");
    cfg.loaded_from = Some(path.to_path_buf());
    Ok(cfg)
  }

  pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
    toml::from_str(raw)
      .context("failed to parse config TOML")
  }

  pub fn validate(&self) -> anyhow::Result<()> {
    if self.clock_tick_secs == 0 {
      return Err(anyhow!(
        "clock_tick_secs must be at least 1"
      ));
    }
    if self.reminder_poll_secs == 0 {
      return Err(anyhow!(
        "reminder_poll_secs must be at least 1"
      ));
    }
    self.tz()?;
    Ok(())
  }

  pub fn tz(&self) -> anyhow::Result<Tz> {
    self.timezone.trim().parse::<Tz>().map_err(|err| {
      anyhow!("invalid timezone {:?}: {err}", self.timezone)
    })
  }

  pub fn clock_tick(&self) -> Duration {
    Duration::from_secs(self.clock_tick_secs)
  }

  pub fn reminder_poll(&self) -> Duration {
    Duration::from_secs(self.reminder_poll_secs)
  }
}

pub fn default_config_path() -> Option<PathBuf> {
  dirs::config_dir()
    .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn env_of(
    pairs: &[(&str, &str)]
  ) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ganle.toml");
    fs::write(
      &path,
      "reminder_poll_secs = 10\ntimezone = \"Asia/Shanghai\"\n"
    )
    .expect("write config");

    let cfg = ClientConfig::load_with(Some(&path), env_of(&[]))
      .expect("load");
    assert_eq!(cfg.reminder_poll(), Duration::from_secs(10));
    assert_eq!(cfg.clock_tick(), Duration::from_secs(60));
    assert_eq!(cfg.reminder_title, "Task due soon");
    assert_eq!(cfg.tz().expect("tz"), chrono_tz::Asia::Shanghai);
    assert_eq!(cfg.loaded_from.as_deref(), Some(path.as_path()));
  }

  #[test]
  fn env_selects_file_and_overrides_timezone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, "desktop_notifications = true\n")
      .expect("write config");
    let path_str = path.display().to_string();

    let cfg = ClientConfig::load_with(
      None,
      env_of(&[
        (CONFIG_ENV, path_str.as_str()),
        (TIMEZONE_ENV, "Europe/Madrid")
      ])
    )
    .expect("load");
    assert!(cfg.desktop_notifications);
    assert_eq!(cfg.timezone, "Europe/Madrid");
  }

  #[test]
  fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.toml");
    assert!(
      ClientConfig::load_with(Some(&missing), env_of(&[]))
        .is_err()
    );
  }

  #[test]
  fn rejects_zero_interval_and_bad_timezone() {
    let zero = ClientConfig::from_toml("clock_tick_secs = 0")
      .expect("parse");
    assert!(zero.validate().is_err());

    let bad = ClientConfig::from_toml("timezone = \"Mars/Base\"")
      .expect("parse");
    assert!(bad.validate().is_err());

    assert!(ClientConfig::default().validate().is_ok());
  }
}
