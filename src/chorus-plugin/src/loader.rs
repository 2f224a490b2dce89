//! Startup-time plugin loading with a write-once source cache.

use crate::adapter::ExecPluginProvider;
use crate::host::{ExecPluginHost, PluginConfig, PluginHostError};
use crate::host_services::HostServices;
use crate::sandbox::SandboxPolicy;
use chorus_core::config::{is_valid_plugin_id, PluginEntry, PluginsConfig, SandboxConfig};
use chorus_core::paths::{plugin_sandbox_dir, plugin_source_dir};
use chorus_core::provider::{CapabilitySet, Provider};
use chorus_core::redact::redact_secrets;
use chorus_core::registry::ProviderRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid plugin id {id:?}")]
    InvalidId { id: String },
    #[error("plugin {id} is not cached and has no url")]
    MissingSource { id: String },
    #[error("failed to fetch plugin {id} from {url}: {message}")]
    Fetch {
        id: String,
        url: String,
        message: String,
    },
    #[error("plugin cache error at {path}: {source}")]
    Cache {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("plugin {id} failed to start: {source}")]
    Start {
        id: String,
        source: PluginHostError,
    },
    #[error("plugin {id} did not complete its handshake in time")]
    HandshakeTimeout { id: String },
    #[error("plugin {id} failed to load earlier in this process")]
    PreviouslyFailed { id: String },
}

/// Loads plugins once per process and remembers both successes and
/// failures. A failed id is never retried.
pub struct PluginLoader {
    cache_dir: PathBuf,
    allowed_env: Vec<String>,
    sandbox: SandboxConfig,
    services: Arc<HostServices>,
    client: reqwest::Client,
    loaded: HashMap<String, Provider>,
    failed: HashMap<String, String>,
    order: Vec<String>,
}

impl PluginLoader {
    pub fn new(config: &PluginsConfig, cache_dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        let services = HostServices::new(config.host_capabilities.iter().copied(), client.clone());
        Self {
            cache_dir: cache_dir.into(),
            allowed_env: config.allowed_env.clone(),
            sandbox: config.sandbox.clone(),
            services: Arc::new(services),
            client,
            loaded: HashMap::new(),
            failed: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Load `entry`, or return the provider already loaded under its id.
    pub async fn register(&mut self, entry: &PluginEntry) -> Result<Provider, LoadError> {
        if let Some(provider) = self.loaded.get(&entry.id) {
            return Ok(provider.clone());
        }
        if self.failed.contains_key(&entry.id) {
            return Err(LoadError::PreviouslyFailed {
                id: entry.id.clone(),
            });
        }

        match self.load(entry).await {
            Ok(provider) => {
                self.loaded.insert(entry.id.clone(), provider.clone());
                self.order.push(entry.id.clone());
                Ok(provider)
            }
            Err(err) => {
                tracing::warn!(provider_id = %entry.id, error = %err, "Failed to load plugin");
                self.failed.insert(entry.id.clone(), err.to_string());
                Err(err)
            }
        }
    }

    /// Register every entry in order; failures are logged and skipped.
    pub async fn load_all(&mut self, entries: &[PluginEntry]) -> ProviderRegistry {
        for entry in entries {
            let _ = self.register(entry).await;
        }
        self.registry()
    }

    /// Successfully loaded providers, in load order.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(
            self.order
                .iter()
                .filter_map(|id| self.loaded.get(id).cloned()),
        )
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed.iter().map(|(id, err)| (id.as_str(), err.as_str()))
    }

    async fn load(&self, entry: &PluginEntry) -> Result<Provider, LoadError> {
        if !is_valid_plugin_id(&entry.id) {
            return Err(LoadError::InvalidId {
                id: entry.id.clone(),
            });
        }
        let source = self.ensure_source(entry).await?;
        let sandbox = plugin_sandbox_dir(&self.cache_dir, &entry.id);
        tokio::fs::create_dir_all(&sandbox)
            .await
            .map_err(|source| LoadError::Cache {
                path: sandbox.clone(),
                source,
            })?;

        let config = self.launch_config(entry, &source, sandbox).await?;
        let started = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            ExecPluginHost::start(config, self.services.clone()),
        )
        .await
        .map_err(|_| LoadError::HandshakeTimeout {
            id: entry.id.clone(),
        })?;
        let (host, info) = started.map_err(|source| LoadError::Start {
            id: entry.id.clone(),
            source,
        })?;

        if info.id != entry.id {
            tracing::debug!(
                provider_id = %entry.id,
                plugin_reported_id = %info.id,
                "Plugin reports a different id; using the configured one"
            );
        }
        let capabilities: CapabilitySet = info.capabilities.iter().copied().collect();
        Ok(Provider::new(
            entry.id.clone(),
            info.name,
            capabilities,
            Arc::new(ExecPluginProvider::new(host)),
        ))
    }

    /// Path of the cached source, fetching it first if absent. An existing
    /// file is never refreshed.
    async fn ensure_source(&self, entry: &PluginEntry) -> Result<PathBuf, LoadError> {
        let dir = plugin_source_dir(&self.cache_dir);
        let path = dir.join(&entry.id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(provider_id = %entry.id, "Loading cached plugin");
            return Ok(path);
        }

        let url = entry.url.as_deref().ok_or_else(|| LoadError::MissingSource {
            id: entry.id.clone(),
        })?;
        tracing::info!(provider_id = %entry.id, url = %redact_secrets(url), "Downloading plugin");
        let bytes = self.fetch(&entry.id, url).await?;

        let cache_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| LoadError::Cache { path, source }
        };
        tokio::fs::create_dir_all(&dir).await.map_err(cache_err(&dir))?;
        let partial = dir.join(format!(".{}.partial", entry.id));
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(cache_err(&partial))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(cache_err(&path))?;
        Ok(path)
    }

    async fn fetch(&self, id: &str, url: &str) -> Result<Vec<u8>, LoadError> {
        let fetch_err = |message: String| LoadError::Fetch {
            id: id.to_string(),
            url: redact_secrets(url).into_owned(),
            message,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_err(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn launch_config(
        &self,
        entry: &PluginEntry,
        source: &Path,
        working_dir: PathBuf,
    ) -> Result<PluginConfig, LoadError> {
        let (program, args) = match &entry.interpreter {
            Some(interpreter) => {
                let mut args = entry.args.clone();
                args.push(source.to_string_lossy().into_owned());
                (PathBuf::from(interpreter), args)
            }
            None => {
                make_executable(source).await?;
                (source.to_path_buf(), entry.args.clone())
            }
        };
        let env = self
            .allowed_env
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect();
        let sandbox = self
            .sandbox
            .enabled
            .then(|| SandboxPolicy::new(&self.sandbox, source, working_dir.clone()));
        Ok(PluginConfig {
            plugin_id: entry.id.clone(),
            program,
            args,
            working_dir,
            env,
            sandbox,
        })
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), LoadError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|source| LoadError::Cache {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), LoadError> {
    Ok(())
}
