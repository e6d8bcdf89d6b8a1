//! Worker configuration.
//!
//! All cache-policy inputs (partition naming, the precache asset list, the
//! excluded-host set, routing markers) live in one explicit struct handed to
//! the router and lifecycle manager at construction. There is no worker-global
//! mutable state.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Prefix shared by all cache partitions, e.g. "mm-marketplace".
  pub cache_prefix: String,
  /// Deploy-time version tag, e.g. "v1.0.0". Bumping it is the sole trigger
  /// for evicting the previous precache partition.
  pub version: String,
  /// Origin the app is served from, e.g. "https://marketplace.example".
  /// Relative asset paths (install list, pre-population URLs) resolve
  /// against it.
  pub origin: String,
  /// Must-have asset paths written to the precache partition at install.
  #[serde(default)]
  pub precache_assets: Vec<String>,
  /// Host substrings that bypass interception entirely (case-insensitive)
  #[serde(default, deserialize_with = "deserialize_lowercase_set")]
  pub excluded_hosts: BTreeSet<String>,
  /// Path substrings that mark a request as an API call (network-first)
  #[serde(default = "default_api_markers")]
  pub api_path_markers: Vec<String>,
  /// Path of the offline fallback page served when cache-first exhausts
  /// both cache and network.
  #[serde(default = "default_offline_fallback")]
  pub offline_fallback: String,
}

fn default_api_markers() -> Vec<String> {
  vec!["/api/".to_string(), "/rest/".to_string()]
}

fn default_offline_fallback() -> String {
  "/offline.html".to_string()
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl WorkerConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mm-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mm-worker/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/mm-worker/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("mm-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mm-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: WorkerConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Name of the versioned precache partition, e.g. "mm-marketplace-v1.0.0".
  pub fn precache_name(&self) -> String {
    format!("{}-{}", self.cache_prefix, self.version)
  }

  /// Name of the unversioned runtime partition, e.g. "mm-marketplace-runtime".
  pub fn runtime_name(&self) -> String {
    format!("{}-runtime", self.cache_prefix)
  }

  /// True if the request host matches the excluded-host set (substring,
  /// case-insensitive).
  pub fn is_excluded_host(&self, host: &str) -> bool {
    let host = host.to_lowercase();
    self.excluded_hosts.iter().any(|h| host.contains(h))
  }

  /// True if the path denotes an API/REST endpoint.
  pub fn is_api_path(&self, path: &str) -> bool {
    self.api_path_markers.iter().any(|m| path.contains(m))
  }

  /// Resolve an app-relative path (or an absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<url::Url> {
    let base = url::Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;
    base
      .join(path)
      .map_err(|e| eyre!("Cannot resolve {} against {}: {}", path, self.origin, e))
  }
}
