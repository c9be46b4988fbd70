//! Configuration Management
//!
//! This module handles loading and saving named Milvus connection profiles.
//!
//! # Configuration Locations
//! - Local: `.milvusctl/config.json` (team-shareable, per-project)
//! - Global: `~/.config/milvusctl/connections.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit connection flags (highest priority, applied by the caller)
//! 2. Local config file
//! 3. Global config file
//!
//! # Secrets
//! A profile may store a token or password inline, or name an environment variable
//! (`token_env`, `password_env`) that is read at resolution time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::client::ConnectionParams;
use crate::error::{MilvusError, Result};

const LOCAL_DIR: &str = ".milvusctl";
const LOCAL_FILE: &str = "config.json";
const GLOBAL_DIR: &str = "milvusctl";
const GLOBAL_FILE: &str = "connections.json";

/// Profile registry as stored in a config file
///
/// ```json
/// {
///   "profiles": {
///     "local": { "uri": "http://localhost:19530" },
///     "cloud": { "uri": "https://in03-xxx.zillizcloud.com", "token_env": "ZILLIZ_TOKEN" }
///   },
///   "default": "local"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    #[serde(default)]
    pub profiles: BTreeMap<String, StoredProfile>,

    /// Name of the default profile (must exist in `profiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Stored connection profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
}

impl StoredProfile {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), ..Self::default() }
    }

    /// Resolve environment references into literal connection parameters
    pub fn resolve(&self) -> Result<ConnectionParams> {
        let token = secret(self.token.as_ref(), self.token_env.as_deref(), "token")?;
        let password = secret(self.password.as_ref(), self.password_env.as_deref(), "password")?;

        Ok(ConnectionParams {
            uri: self.uri.clone().into(),
            token: token.map(Into::into),
            username: self.username.clone().map(Into::into),
            password: password.map(Into::into),
            db_name: self.db_name.clone().map(Into::into),
        })
    }
}

fn secret(inline: Option<&String>, env_var: Option<&str>, what: &str) -> Result<Option<String>> {
    match env_var {
        Some(var) => std::env::var(var).map(Some).map_err(|_| {
            MilvusError::config_error(format!("Environment variable {var} not found for {what}"))
        }),
        None => Ok(inline.cloned()),
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    Local,
    Global,
}

/// Get path to local config file (`.milvusctl/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current = std::env::current_dir()
        .map_err(|e| MilvusError::config_error(format!("Could not determine current directory: {e}")))?;
    Ok(current.join(LOCAL_DIR).join(LOCAL_FILE))
}

/// Get path to global config file (`~/.config/milvusctl/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| MilvusError::config_error("Could not determine user config directory"))?;
    Ok(base.join(GLOBAL_DIR).join(GLOBAL_FILE))
}

/// Resolve a config location to its file path
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a profile registry; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| MilvusError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        MilvusError::config_error(format!("Invalid config file format in {}: {e}", path.display()))
    })
}

/// Save a profile registry, creating parent directories as needed
pub fn save_registry(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MilvusError::config_error(format!("Could not create config directory: {e}")))?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| MilvusError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| MilvusError::config_error(format!("Could not write config file: {e}")))
}

/// Merge two registries; `local` wins per profile name and for the default pointer
#[must_use]
pub fn merge_registries(global: ProfileRegistry, local: ProfileRegistry) -> ProfileRegistry {
    let mut merged = global;
    merged.profiles.extend(local.profiles);
    if local.default.is_some() {
        merged.default = local.default;
    }
    merged
}

/// Load both config files and merge them, local first
pub fn load_with_precedence() -> Result<ProfileRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(merge_registries(global, local))
}

/// Resolve a profile by name, or the registry's default when `name` is `None`
pub fn resolve_profile(registry: &ProfileRegistry, name: Option<&str>) -> Result<ConnectionParams> {
    let available = || registry.profiles.keys().cloned().collect::<Vec<_>>().join(", ");

    let profile_name = match name {
        Some(name) => name,
        None => registry.default.as_deref().ok_or_else(|| {
            MilvusError::config_error(format!(
                "No default profile set. Available profiles: [{}]. Specify one with --profile.",
                available()
            ))
        })?,
    };

    let stored = registry.profiles.get(profile_name).ok_or_else(|| {
        MilvusError::config_error(format!(
            "Profile '{profile_name}' not found. Available profiles: [{}]",
            available()
        ))
    })?;

    debug!(profile = profile_name, "Resolved connection profile");
    stored.resolve()
}

/// Add or replace a profile in the file at `path`
///
/// The first profile saved to a file becomes its default.
pub fn save_profile(path: &Path, name: &str, profile: StoredProfile) -> Result<()> {
    let mut registry = load_registry(path)?;

    if registry.profiles.is_empty() {
        registry.default = Some(name.to_string());
    }
    registry.profiles.insert(name.to_string(), profile);

    save_registry(path, &registry)
}

/// List profiles as `(name, uri)` pairs, skipping ones whose secrets cannot be resolved
pub fn list_profiles(registry: &ProfileRegistry) -> Vec<(String, String)> {
    registry
        .profiles
        .iter()
        .filter_map(|(name, stored)| match stored.resolve() {
            Ok(_) => Some((name.clone(), stored.uri.clone())),
            Err(_) => {
                // Error details are not logged; they may name a secret
                warn!(profile = %name, "Skipping profile that could not be resolved");
                None
            }
        })
        .collect()
}
