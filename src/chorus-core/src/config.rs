use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

pub const ENV_PORT: &str = "CHORUS_PORT";
pub const ENV_STREAMING_API: &str = "CHORUS_STREAMING_API";
pub const ENV_LRC_API: &str = "CHORUS_LRC_API";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            plugins: PluginsConfig::default(),
            lyrics: LyricsConfig::default(),
            import: ImportConfig::default(),
            proxy: ProxyConfig::default(),
            recommend: RecommendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for every path outside `/api`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_stdout_enabled")]
    pub stdout: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: default_stdout_enabled(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Host capabilities a plugin may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostCapability {
    Http,
    Html,
    Crypto,
    Cipher,
    BigInt,
    Date,
    Encoding,
}

impl HostCapability {
    pub const ALL: [HostCapability; 7] = [
        HostCapability::Http,
        HostCapability::Html,
        HostCapability::Crypto,
        HostCapability::Cipher,
        HostCapability::BigInt,
        HostCapability::Date,
        HostCapability::Encoding,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Overrides the platform cache dir for plugin sources and sandboxes.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Environment variable names copied into plugin processes.
    #[serde(default)]
    pub allowed_env: Vec<String>,
    #[serde(default = "default_host_capabilities")]
    pub host_capabilities: Vec<HostCapability>,
    /// Load order is the order of this list.
    #[serde(default)]
    pub providers: Vec<PluginEntry>,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            allowed_env: Vec::new(),
            host_capabilities: default_host_capabilities(),
            providers: Vec::new(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// OS-level confinement of plugin processes (Landlock on Linux).
///
/// A confined plugin can read and execute only `read_paths` and its own
/// source file, read and write only its private sandbox directory, and
/// cannot open TCP connections unless `allow_network` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_enabled")]
    pub enabled: bool,
    /// Read-only locations the interpreter and its libraries live in.
    /// Paths that do not exist are skipped.
    #[serde(default = "default_sandbox_read_paths")]
    pub read_paths: Vec<PathBuf>,
    #[serde(default)]
    pub allow_network: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_sandbox_enabled(),
            read_paths: default_sandbox_read_paths(),
            allow_network: false,
        }
    }
}

impl PluginsConfig {
    pub fn resolve_cache_dir(&self, dirs: &AppDirs) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| dirs.cache_dir().to_path_buf())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub id: String,
    /// Remote location of the plugin executable. Only consulted when no
    /// cached copy exists.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PluginEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            interpreter: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider whose tracks can be looked up by id in `id_lookup_url`.
    #[serde(default = "default_id_lookup_provider")]
    pub id_lookup_provider: String,
    #[serde(default = "default_id_lookup_url")]
    pub id_lookup_url: String,
    #[serde(default = "default_title_artist_url")]
    pub title_artist_url: String,
    #[serde(default = "default_streaming_api_url")]
    pub streaming_api_url: String,
    #[serde(default)]
    pub backup_providers: Vec<String>,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            id_lookup_provider: default_id_lookup_provider(),
            id_lookup_url: default_id_lookup_url(),
            title_artist_url: default_title_artist_url(),
            streaming_api_url: default_streaming_api_url(),
            backup_providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_import_source")]
    pub source_provider: String,
    #[serde(default = "default_import_target")]
    pub target_provider: String,
    #[serde(default = "default_host_pattern")]
    pub host_pattern: String,
    #[serde(default = "default_path_pattern")]
    pub path_pattern: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source_provider: default_import_source(),
            target_provider: default_import_target(),
            host_pattern: default_host_pattern(),
            path_pattern: default_path_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Providers whose streams are proxied even without declared headers.
    #[serde(default = "default_always_proxy")]
    pub always_proxy: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Permit proxying to loopback, private and link-local addresses.
    #[serde(default)]
    pub allow_private_upstreams: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            always_proxy: default_always_proxy(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            allow_private_upstreams: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_recommend_provider")]
    pub provider: String,
    #[serde(default = "default_categories")]
    pub categories: Vec<RecommendCategory>,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            provider: default_recommend_provider(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendCategory {
    pub id: String,
    pub title: String,
    pub badge: String,
    pub queries: Vec<String>,
}

impl RecommendCategory {
    fn new(id: &str, title: &str, badge: &str, queries: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            badge: badge.to_string(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("duplicate plugin id {id}")]
    DuplicatePlugin { id: String },
    #[error("plugin id {id:?} must be non-empty and contain only [A-Za-z0-9_-]")]
    InvalidPluginId { id: String },
    #[error("invalid {field} pattern: {message}")]
    InvalidPattern { field: &'static str, message: String },
    #[error("recommend category {id} has no queries")]
    EmptyCategory { id: String },
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    /// Apply `CHORUS_*` environment overrides. Unparsable values are ignored
    /// with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(ENV_PORT) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid {ENV_PORT}"),
            }
        }
        if let Some(url) = lookup(ENV_STREAMING_API).filter(|v| !v.is_empty()) {
            self.lyrics.streaming_api_url = url;
        }
        if let Some(url) = lookup(ENV_LRC_API).filter(|v| !v.is_empty()) {
            self.lyrics.title_artist_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.plugins.providers {
            if !is_valid_plugin_id(&entry.id) {
                return Err(ValidationError::InvalidPluginId {
                    id: entry.id.clone(),
                });
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ValidationError::DuplicatePlugin {
                    id: entry.id.clone(),
                });
            }
        }

        for (field, pattern) in [
            ("import.host_pattern", &self.import.host_pattern),
            ("import.path_pattern", &self.import.path_pattern),
        ] {
            regex::Regex::new(pattern).map_err(|err| ValidationError::InvalidPattern {
                field,
                message: err.to_string(),
            })?;
        }

        if let Some(category) = self
            .recommend
            .categories
            .iter()
            .find(|c| c.queries.is_empty())
        {
            return Err(ValidationError::EmptyCategory {
                id: category.id.clone(),
            });
        }
        Ok(())
    }
}

/// Plugin ids become file names in the cache dir.
pub fn is_valid_plugin_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_stdout_enabled() -> bool {
    true
}

fn default_host_capabilities() -> Vec<HostCapability> {
    HostCapability::ALL.to_vec()
}

fn default_sandbox_enabled() -> bool {
    true
}

fn default_sandbox_read_paths() -> Vec<PathBuf> {
    [
        "/usr",
        "/bin",
        "/sbin",
        "/lib",
        "/lib64",
        "/etc/ld.so.cache",
        "/etc/ld.so.conf",
        "/etc/ld.so.conf.d",
        "/dev/null",
        "/dev/urandom",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_id_lookup_provider() -> String {
    "qq".to_string()
}

fn default_id_lookup_url() -> String {
    "https://matomo.oiapi.net/api/QQMusicLyric".to_string()
}

fn default_title_artist_url() -> String {
    "https://api.lrc.cx/api/v1/lyrics".to_string()
}

fn default_streaming_api_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_import_source() -> String {
    "netease".to_string()
}

fn default_import_target() -> String {
    "qq".to_string()
}

fn default_host_pattern() -> String {
    r"music\.163\.com".to_string()
}

fn default_path_pattern() -> String {
    r"playlist\?id=\d+".to_string()
}

fn default_always_proxy() -> Vec<String> {
    vec!["bilibili".to_string()]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_referer() -> String {
    "https://www.bilibili.com/".to_string()
}

fn default_recommend_provider() -> String {
    "qq".to_string()
}

fn default_categories() -> Vec<RecommendCategory> {
    vec![
        RecommendCategory::new(
            "rnb",
            "R&B 流行精选",
            "R&B",
            &["R&B 流行", "R&B 热歌", "R&B 经典", "R&B 新歌"],
        ),
        RecommendCategory::new(
            "jp",
            "日语热歌推荐",
            "日语",
            &["日语 流行", "日语 动漫", "日语 治愈", "J-Pop"],
        ),
        RecommendCategory::new(
            "en",
            "英文热门推荐",
            "英文",
            &["欧美 流行", "Billboard 热歌", "欧美 经典", "欧美 节奏"],
        ),
        RecommendCategory::new(
            "cn",
            "中文流行推荐",
            "中文",
            &["华语 流行", "华语 金曲", "华语 新歌", "C-Pop"],
        ),
        RecommendCategory::new(
            "kr",
            "韩语节奏推荐",
            "韩语",
            &["K-Pop 热歌", "韩语 流行", "韩语 OST", "K-Pop 舞曲"],
        ),
    ]
}
