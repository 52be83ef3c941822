//! The `tessera.toml` project manifest: maps directly onto the Loader and
//! Poller configuration structs, the way `konvoy.toml` maps onto
//! `konvoy_engine::BuildOptions`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The parsed and validated `tessera.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub loader: LoaderSection,
    #[serde(default, rename = "repository")]
    pub repositories: Vec<RepositorySection>,
}

/// `[loader]`: which platform packages this process's modules may see, and
/// which of the two built-in compiler plugins are installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderSection {
    #[serde(default = "default_app_package_filter")]
    pub app_package_filter: Vec<String>,
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSection>,
}

fn default_app_package_filter() -> Vec<String> {
    vec!["*".to_owned()]
}

/// `[[loader.plugin]]`: selects a built-in compiler by id. The spec's plugin
/// spec also names a `pluginClassName` and `runtimeResources` for dynamically
/// loaded compilers; this crate has no dynamic class loading, so a plugin
/// entry only ever resolves to one of the two compilers this crate ships
/// (see `DESIGN.md`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSection {
    pub plugin_id: String,
}

/// `[[repository]]`: one registered repository plus its own polling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    pub id: String,
    pub kind: RepositoryKind,
    pub root: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub wait_for_initial_poll: bool,
}

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    Filesystem,
    Jar,
}

/// Validate a parsed config and return validation errors.
fn validate(config: &ProjectConfig, path: &str) -> Result<(), ConfigError> {
    if config.loader.app_package_filter.is_empty() {
        return Err(ConfigError::InvalidLoader {
            path: path.to_owned(),
            message: "appPackageFilter must not be empty".to_owned(),
        });
    }
    for plugin in &config.loader.plugins {
        if plugin.plugin_id != tessera_compiler::resource::PLUGIN_ID
            && plugin.plugin_id != tessera_compiler::line_script::PLUGIN_ID
        {
            return Err(ConfigError::UnknownPlugin {
                path: path.to_owned(),
                plugin_id: plugin.plugin_id.clone(),
            });
        }
    }
    let mut seen_ids = std::collections::BTreeSet::new();
    for repository in &config.repositories {
        if repository.id.is_empty() {
            return Err(ConfigError::InvalidRepository {
                path: path.to_owned(),
                message: "repository id must not be empty".to_owned(),
            });
        }
        if !seen_ids.insert(repository.id.clone()) {
            return Err(ConfigError::InvalidRepository {
                path: path.to_owned(),
                message: format!("repository id `{}` is declared more than once", repository.id),
            });
        }
        if repository.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidRepository {
                path: path.to_owned(),
                message: format!("repository `{}` has a zero pollIntervalSecs", repository.id),
            });
        }
    }
    Ok(())
}

impl ProjectConfig {
    /// Read and parse a `tessera.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// has unknown keys, or fails validation.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content, &path.display().to_string())
    }

    /// Parse a config from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the string contains invalid TOML, has unknown
    /// keys, or fails validation.
    pub fn from_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        validate(&config, path)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid tessera.toml at {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("invalid [loader] in {path}: {message}")]
    InvalidLoader { path: String, message: String },
    #[error("invalid [[repository]] in {path}: {message}")]
    InvalidRepository { path: String, message: String },
    #[error("unknown plugin id `{plugin_id}` in {path} (expected \"resource\" or \"line-script\")")]
    UnknownPlugin { path: String, plugin_id: String },
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    const LOADER: &str = "\n[loader]\n";

    #[test]
    fn parse_minimal_config() {
        let toml = format!("{LOADER}");
        let config = ProjectConfig::from_str(&toml, "tessera.toml").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.loader.app_package_filter, vec!["*".to_owned()]);
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[loader]
app_package_filter = ["platform.*"]

[[loader.plugin]]
plugin_id = "resource"

[[loader.plugin]]
plugin_id = "line-script"

[[repository]]
id = "main"
kind = "filesystem"
root = "repo"
output_dir = "out"
poll_interval_secs = 5
wait_for_initial_poll = true
"#;
        let config = ProjectConfig::from_str(toml, "tessera.toml").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.loader.app_package_filter, vec!["platform.*".to_owned()]);
        assert_eq!(config.loader.plugins.len(), 2);
        assert_eq!(config.repositories.len(), 1);
        let repo = &config.repositories[0];
        assert_eq!(repo.id, "main");
        assert_eq!(repo.kind, RepositoryKind::Filesystem);
        assert_eq!(repo.poll_interval_secs, 5);
        assert!(repo.wait_for_initial_poll);
    }

    #[test]
    fn reject_missing_loader_section() {
        let result = ProjectConfig::from_str("", "tessera.toml");
        assert!(result.is_err());
    }

    #[test]
    fn reject_empty_app_package_filter() {
        let toml = "\n[loader]\napp_package_filter = []\n";
        let result = ProjectConfig::from_str(toml, "tessera.toml");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("appPackageFilter"), "error was: {err}");
    }

    #[test]
    fn reject_unknown_plugin_id() {
        let toml = "\n[loader]\n\n[[loader.plugin]]\nplugin_id = \"rustc\"\n";
        let result = ProjectConfig::from_str(toml, "tessera.toml");
        assert!(result.is_err());
        assert!(matches!(result, Err(ConfigError::UnknownPlugin { .. })));
    }

    #[test]
    fn reject_duplicate_repository_ids() {
        let toml = format!(
            r#"{LOADER}
[[repository]]
id = "main"
kind = "filesystem"
root = "a"
output_dir = "a-out"

[[repository]]
id = "main"
kind = "jar"
root = "b"
output_dir = "b-out"
"#
        );
        let result = ProjectConfig::from_str(&toml, "tessera.toml");
        assert!(result.is_err());
    }

    #[test]
    fn reject_zero_poll_interval() {
        let toml = format!(
            r#"{LOADER}
[[repository]]
id = "main"
kind = "filesystem"
root = "a"
output_dir = "a-out"
poll_interval_secs = 0
"#
        );
        let result = ProjectConfig::from_str(&toml, "tessera.toml");
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_keys() {
        let toml = "\n[loader]\nunknown_field = true\n";
        let result = ProjectConfig::from_str(toml, "tessera.toml");
        assert!(result.is_err());
    }
}
