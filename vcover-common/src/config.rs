//! Configuration model, path resolution and persistence
//!
//! The bot keeps every operator-editable setting in a single TOML file.
//! Runtime mutations (backend URL changes, catalog refreshes) are written
//! back through a [`ConfigStore`].
//!
//! # Path resolution priority
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`VCOVER_CONFIG`)
//! 3. Platform config directory (`~/.config/vcover/config.toml` on Linux)
//! 4. `./vcover.toml` (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "VCOVER_CONFIG";

const DEFAULT_RVC_BASE_URL: &str = "http://127.0.0.1:7860/";
const DEFAULT_SVC_BASE_URL: &str = "http://127.0.0.1:7866/";

/// Voice-conversion backend kind
///
/// The two kinds are structurally interchangeable; each owns an
/// independent base URL and model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Rvc,
    Svc,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Rvc, BackendKind::Svc];

    /// Lowercase command namespace ("rvc" / "svc")
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rvc => "rvc",
            BackendKind::Svc => "svc",
        }
    }

    /// Uppercase label used in chat replies ("RVC" / "SVC")
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Rvc => "RVC",
            BackendKind::Svc => "SVC",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Song search backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchApi {
    /// Public NetEase web search endpoint
    Netease,
    /// Self-hosted NeteaseCloudMusicApi (node.js) instance
    NeteaseNodejs,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Identity shown on forwarded listing messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_forward_name")]
    pub name: String,
    #[serde(default = "default_forward_uin")]
    pub uin: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            name: default_forward_name(),
            uin: default_forward_uin(),
        }
    }
}

/// Persisted bot configuration
///
/// Base URLs are optional so that the legacy `base_url` key can be honored
/// only when `rvc_base_url` is absent. Use the accessors rather than the
/// raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rvc_base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svc_base_url: Option<String>,

    #[serde(default = "default_api")]
    pub default_api: SearchApi,

    #[serde(default = "default_nodejs_base_url")]
    pub nodejs_base_url: String,

    /// Selection wait timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Inference job timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout: u64,

    /// Upper bound on concurrently running backend jobs
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// `modelId|||alias` entries for the RVC backend
    #[serde(default)]
    pub rvc_models_keywords: Vec<String>,

    /// `modelId|||alias` entries for the SVC backend
    #[serde(default)]
    pub svc_models_keywords: Vec<String>,

    /// Deprecated: RVC base URL before the SVC backend existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Deprecated: RVC catalog before the SVC backend existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_keywords: Option<Vec<String>>,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_forward_name() -> String {
    "玖玖瑠".to_string()
}

fn default_forward_uin() -> u64 {
    3974507586
}

fn default_api() -> SearchApi {
    SearchApi::NeteaseNodejs
}

fn default_nodejs_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_inference_timeout() -> u64 {
    300
}

fn default_max_concurrent_jobs() -> usize {
    2
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            rvc_base_url: None,
            svc_base_url: None,
            default_api: default_api(),
            nodejs_base_url: default_nodejs_base_url(),
            timeout: default_timeout(),
            inference_timeout: default_inference_timeout(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            rvc_models_keywords: Vec::new(),
            svc_models_keywords: Vec::new(),
            base_url: None,
            models_keywords: None,
            forward: ForwardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BotConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Effective base URL for a backend kind
    ///
    /// The legacy `base_url` key only applies to RVC, and only while
    /// `rvc_base_url` is unset.
    pub fn base_url(&self, kind: BackendKind) -> String {
        match kind {
            BackendKind::Rvc => self
                .rvc_base_url
                .clone()
                .or_else(|| self.base_url.clone())
                .unwrap_or_else(|| DEFAULT_RVC_BASE_URL.to_string()),
            BackendKind::Svc => self
                .svc_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_SVC_BASE_URL.to_string()),
        }
    }

    /// Effective serialized catalog entries for a backend kind
    ///
    /// The legacy `models_keywords` list only applies to RVC, and only while
    /// `rvc_models_keywords` is empty.
    pub fn models_keywords(&self, kind: BackendKind) -> &[String] {
        match kind {
            BackendKind::Rvc => {
                if self.rvc_models_keywords.is_empty() {
                    if let Some(legacy) = &self.models_keywords {
                        return legacy;
                    }
                }
                &self.rvc_models_keywords
            }
            BackendKind::Svc => &self.svc_models_keywords,
        }
    }

    pub fn set_base_url(&mut self, kind: BackendKind, url: String) {
        match kind {
            BackendKind::Rvc => self.rvc_base_url = Some(url),
            BackendKind::Svc => self.svc_base_url = Some(url),
        }
    }

    /// Replace a catalog
    ///
    /// Writing the RVC catalog retires the legacy list so that an empty
    /// refresh result is not shadowed by stale legacy entries on restart.
    pub fn set_models_keywords(&mut self, kind: BackendKind, entries: Vec<String>) {
        match kind {
            BackendKind::Rvc => {
                self.rvc_models_keywords = entries;
                self.models_keywords = None;
            }
            BackendKind::Svc => self.svc_models_keywords = entries,
        }
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout)
    }
}

/// Resolve the configuration file path
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: Platform config directory
    if let Some(dir) = dirs::config_dir() {
        return dir.join("vcover").join("config.toml");
    }

    // Priority 4: Working directory
    PathBuf::from("vcover.toml")
}

/// Load configuration from a TOML file
///
/// A missing file is not an error: defaults are returned and the file is
/// created on the first save. A file that exists but cannot be parsed is.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(BotConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = BotConfig::from_toml_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write configuration atomically (temp file + rename)
///
/// On Unix the file is restricted to 0600.
pub fn write_toml_config(config: &BotConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Durable configuration storage
pub trait ConfigStore: Send + Sync {
    /// Snapshot of the most recently saved configuration
    fn current(&self) -> BotConfig;

    /// Persist a new configuration
    fn save(&self, config: BotConfig) -> Result<()>;

    /// Apply `apply` to the current configuration and persist the result
    ///
    /// Read, change and write happen under the store lock, so concurrent
    /// updates to different fields never overwrite each other. On error
    /// the stored configuration is left unchanged.
    fn update(&self, apply: &mut dyn FnMut(&mut BotConfig)) -> Result<BotConfig>;
}

/// TOML file backed configuration store
pub struct TomlConfigStore {
    path: PathBuf,
    current: Mutex<BotConfig>,
}

impl TomlConfigStore {
    /// Load (or default) the configuration at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = load_config(&path)?;
        Ok(Self {
            path,
            current: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn current(&self) -> BotConfig {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, config: BotConfig) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        write_toml_config(&config, &self.path)?;
        info!("Configuration saved to {}", self.path.display());
        *current = config;
        Ok(())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut BotConfig)) -> Result<BotConfig> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = current.clone();
        apply(&mut next);
        write_toml_config(&next, &self.path)?;
        info!("Configuration updated in {}", self.path.display());
        *current = next.clone();
        Ok(next)
    }
}

/// In-memory configuration store
///
/// Used when persistence is disabled and by tests.
#[derive(Default)]
pub struct MemoryConfigStore {
    current: Mutex<BotConfig>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: BotConfig) -> Self {
        Self {
            current: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` and `update` calls
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn current(&self) -> BotConfig {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, config: BotConfig) -> Result<()> {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut BotConfig)) -> Result<BotConfig> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut current);
        *self.saves.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.base_url(BackendKind::Rvc), "http://127.0.0.1:7860/");
        assert_eq!(config.base_url(BackendKind::Svc), "http://127.0.0.1:7866/");
        assert_eq!(config.default_api, SearchApi::NeteaseNodejs);
        assert_eq!(config.timeout, 60);
        assert_eq!(config.inference_timeout, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config = BotConfig::from_toml_str("").unwrap();
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn test_legacy_base_url_used_when_rvc_url_absent() {
        let config = BotConfig::from_toml_str(r#"base_url = "http://old:7860/""#).unwrap();
        assert_eq!(config.base_url(BackendKind::Rvc), "http://old:7860/");
        // legacy key never applies to SVC
        assert_eq!(config.base_url(BackendKind::Svc), "http://127.0.0.1:7866/");
    }

    #[test]
    fn test_legacy_base_url_ignored_when_rvc_url_present() {
        let config = BotConfig::from_toml_str(
            r#"
            base_url = "http://old:7860/"
            rvc_base_url = "http://new:7860/"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url(BackendKind::Rvc), "http://new:7860/");
    }

    #[test]
    fn test_legacy_models_keywords() {
        let config = BotConfig::from_toml_str(r#"models_keywords = ["a.pth|||A"]"#).unwrap();
        assert_eq!(config.models_keywords(BackendKind::Rvc), ["a.pth|||A".to_string()]);
        assert!(config.models_keywords(BackendKind::Svc).is_empty());

        let config = BotConfig::from_toml_str(
            r#"
            models_keywords = ["a.pth|||A"]
            rvc_models_keywords = ["b.pth|||"]
            "#,
        )
        .unwrap();
        assert_eq!(config.models_keywords(BackendKind::Rvc), ["b.pth|||".to_string()]);
    }

    #[test]
    fn test_set_rvc_models_retires_legacy_list() {
        let mut config = BotConfig::from_toml_str(r#"models_keywords = ["a.pth|||A"]"#).unwrap();
        config.set_models_keywords(BackendKind::Rvc, Vec::new());
        assert!(config.models_keywords(BackendKind::Rvc).is_empty());
        assert!(config.models_keywords.is_none());
    }

    #[test]
    fn test_search_api_names() {
        let config = BotConfig::from_toml_str(r#"default_api = "netease""#).unwrap();
        assert_eq!(config.default_api, SearchApi::Netease);
        assert!(BotConfig::from_toml_str(r#"default_api = "spotify""#).is_err());
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryConfigStore::new(BotConfig::default());
        let mut config = store.current();
        config.set_base_url(BackendKind::Svc, "http://svc:1/".to_string());
        store.save(config).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current().base_url(BackendKind::Svc), "http://svc:1/");
    }

    #[test]
    fn test_concurrent_updates_keep_both_fields() {
        let store = std::sync::Arc::new(MemoryConfigStore::new(BotConfig::default()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        if i % 2 == 0 {
                            let url = format!("http://rvc-{}-{}/", i, n);
                            store
                                .update(&mut |c| c.set_base_url(BackendKind::Rvc, url.clone()))
                                .unwrap();
                        } else {
                            let models = vec![format!("m{}-{}.pth|||", i, n)];
                            store
                                .update(&mut |c| {
                                    c.set_models_keywords(BackendKind::Svc, models.clone())
                                })
                                .unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let config = store.current();
        assert!(config.base_url(BackendKind::Rvc).starts_with("http://rvc-"));
        assert_eq!(config.models_keywords(BackendKind::Svc).len(), 1);
        assert_eq!(store.save_count(), 400);
    }
}
