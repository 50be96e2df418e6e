//! Configuration for durafn.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DURAFN_HOME, DURAFN_BIND)
//! 2. Config file (.durafn/config.yaml)
//! 3. Defaults (~/.durafn)
//!
//! Config file discovery:
//! - Searches current directory and parents for .durafn/config.yaml
//! - Relative paths in the config file resolve against the .durafn/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::activities::failure::DEFAULT_FAILURE_ONE_IN;
use crate::core::WorkflowDefinition;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_BIND: &str = "127.0.0.1:7071";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub workflow: Option<WorkflowDefinition>,
    #[serde(default)]
    pub failure: Option<FailureConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .durafn/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailureConfig {
    /// Fail one call in this many; 0 disables injection
    pub one_in: Option<u32>,
    /// Seed for reproducible draws
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// Public base URL used in instance handles
    pub base_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to durafn home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Workflow to run
    pub workflow: WorkflowDefinition,
    /// Failure injection settings
    pub failure: FailureSettings,
    /// Gateway server settings
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSettings {
    pub one_in: u32,
    pub seed: Option<u64>,
}

impl Default for FailureSettings {
    fn default() -> Self {
        Self {
            one_in: DEFAULT_FAILURE_ONE_IN,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: String,
    pub base_url: String,
}

impl ServerSettings {
    fn for_bind(bind: String, base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| format!("http://{}", bind));
        Self { bind, base_url }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::for_bind(DEFAULT_BIND.to_string(), None)
    }
}

impl ResolvedConfig {
    /// Directory holding one subdirectory per instance
    pub fn instances_dir(&self) -> PathBuf {
        self.home.join("instances")
    }
}

/// Environment overrides
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    home: Option<String>,
    bind: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            home: std::env::var("DURAFN_HOME").ok(),
            bind: std::env::var("DURAFN_BIND").ok(),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".durafn").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file, environment and defaults
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: EnvOverrides,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let (config_file, parsed) = match file {
        Some((path, parsed)) => (Some(path), Some(parsed)),
        None => (None, None),
    };

    let file_home = parsed.as_ref().and_then(|c| c.paths.home.clone());
    let home = match (env.home, file_home, config_file.as_deref()) {
        (Some(env_home), _, _) => PathBuf::from(env_home),
        (None, Some(file_home), Some(config_path)) => {
            let durafn_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(durafn_dir, &file_home)
        }
        _ => default_home,
    };

    let workflow = parsed
        .as_ref()
        .and_then(|c| c.workflow.clone())
        .unwrap_or_default();
    workflow.validate().context("Invalid workflow in config file")?;

    let failure = parsed
        .as_ref()
        .and_then(|c| c.failure.as_ref())
        .map(|f| FailureSettings {
            one_in: f.one_in.unwrap_or(DEFAULT_FAILURE_ONE_IN),
            seed: f.seed,
        })
        .unwrap_or_default();

    let server_file = parsed.as_ref().and_then(|c| c.server.clone());
    let bind = env
        .bind
        .or_else(|| server_file.as_ref().and_then(|s| s.bind.clone()))
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let server = ServerSettings::for_bind(bind, server_file.and_then(|s| s.base_url));

    Ok(ResolvedConfig {
        home,
        config_file,
        workflow,
        failure,
        server,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".durafn");

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve(file, EnvOverrides::from_env(), default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
