use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::controllers::PageSizePolicy;

/// Used when neither flag, env nor file name an API
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const API_URL_ENV: &str = "LINKDECK_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub tables: TablesConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_stale_time_secs")]
  pub stale_time_secs: u64,
  #[serde(default = "default_gc_time_secs")]
  pub gc_time_secs: u64,
  /// Click pages grow while the service runs, so they go stale sooner
  #[serde(default = "default_clicks_stale_time_secs")]
  pub clicks_stale_time_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: default_stale_time_secs(),
      gc_time_secs: default_gc_time_secs(),
      clicks_stale_time_secs: default_clicks_stale_time_secs(),
    }
  }
}

fn default_stale_time_secs() -> u64 {
  30
}

fn default_gc_time_secs() -> u64 {
  300
}

fn default_clicks_stale_time_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TablesConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Jump back to page 1 when the page size changes
  #[serde(default)]
  pub reset_page_on_page_size_change: bool,
}

impl Default for TablesConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      reset_page_on_page_size_change: false,
    }
  }
}

fn default_page_size() -> u32 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./linkdeck.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/linkdeck/config.yaml
  ///
  /// Without any file the built-in defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("linkdeck.yaml");
    if local.exists() {
      return Some(local);
    }

    dirs::config_dir()
      .map(|dir| dir.join("linkdeck").join("config.yaml"))
      .filter(|p| p.exists())
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not a map
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Resolve the API base URL: `--api-url` flag, then `LINKDECK_API_URL`,
  /// then `api.url`, then the localhost default.
  pub fn api_url(&self, cli_override: Option<&str>) -> Result<Url> {
    let env = std::env::var(API_URL_ENV).ok();
    resolve_api_url(cli_override, env.as_deref(), self.api.url.as_deref())
  }

  pub fn api_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs.max(1))
  }

  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.cache.stale_time_secs)
  }

  pub fn gc_time(&self) -> Duration {
    Duration::from_secs(self.cache.gc_time_secs)
  }

  pub fn clicks_stale_time(&self) -> Duration {
    Duration::from_secs(self.cache.clicks_stale_time_secs)
  }

  pub fn page_size(&self) -> u32 {
    self.tables.page_size.max(1)
  }

  pub fn page_size_policy(&self) -> PageSizePolicy {
    if self.tables.reset_page_on_page_size_change {
      PageSizePolicy::ResetPage
    } else {
      PageSizePolicy::KeepPage
    }
  }
}

fn resolve_api_url(cli: Option<&str>, env: Option<&str>, file: Option<&str>) -> Result<Url> {
  let (raw, source) = [(cli, "--api-url"), (env, API_URL_ENV), (file, "api.url")]
    .into_iter()
    .find_map(|(value, source)| {
      value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| (v, source))
    })
    .unwrap_or((DEFAULT_API_URL, "default"));

  let url = Url::parse(raw).map_err(|e| eyre!("Invalid API URL '{}' from {}: {}", raw, source, e))?;
  match url.scheme() {
    "http" | "https" if url.has_host() => Ok(url),
    _ => Err(eyre!(
      "Invalid API URL '{}' from {}: expected an absolute http(s) URL",
      raw,
      source
    )),
  }
}
