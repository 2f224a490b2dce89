//! chorus-server: the aggregation orchestrator and its HTTP API.
//!
//! It provides:
//!
//! - Search dispatch to a single named provider
//! - A sequential, fault-tolerant lyric fallback chain
//! - Playlist import with cross-platform re-matching
//! - Media stream resolution and a streaming proxy for hotlink-protected audio
//! - Concurrent recommendation fan-out and similar-song mixes
//! - Graceful shutdown via signal handling

pub mod context;
pub mod dispatch;
pub mod error;
pub mod import;
pub mod lyrics;
pub mod mix;
pub mod proxy;
pub mod recommend;
pub mod router;
pub mod routes;

use chorus_core::config::Config;
use chorus_core::paths::AppDirs;
use chorus_core::registry::ProviderRegistry;
use chorus_plugin::PluginLoader;

pub use context::{AppContext, ContextError};
pub use error::ApiError;
pub use router::{create_router, start_server, ServeError};

/// Load every configured plugin in config order. A plugin that fails to
/// load is logged and left out of the registry.
pub async fn load_providers(
    config: &Config,
    dirs: &AppDirs,
) -> Result<ProviderRegistry, reqwest::Error> {
    let cache_dir = config.plugins.resolve_cache_dir(dirs);
    let mut loader = PluginLoader::new(&config.plugins, cache_dir, context::http_client()?);
    let registry = loader.load_all(&config.plugins.providers).await;

    for (id, error) in loader.failures() {
        tracing::warn!(provider_id = id, %error, "Provider unavailable for this process");
    }
    tracing::info!(providers = ?registry.ids(), "Provider registry ready");
    Ok(registry)
}
