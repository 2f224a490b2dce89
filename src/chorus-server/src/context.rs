//! Shared application context handed to every route handler.

use chorus_core::config::Config;
use chorus_core::registry::ProviderRegistry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::SearchDispatcher;
use crate::import::PlaylistImporter;
use crate::lyrics::LyricResolver;
use crate::mix::MixBuilder;
use crate::proxy::MediaProxy;
use crate::recommend::Recommender;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid import pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Built once at startup; the registry is read-only from then on.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<ProviderRegistry>,
    pub search: SearchDispatcher,
    pub lyrics: Arc<LyricResolver>,
    pub importer: Arc<PlaylistImporter>,
    pub proxy: Arc<MediaProxy>,
    pub recommender: Arc<Recommender>,
    pub mixer: Arc<MixBuilder>,
}

impl AppContext {
    pub fn new(config: Config, registry: ProviderRegistry) -> Result<Self, ContextError> {
        let registry = Arc::new(registry);
        let http = http_client()?;

        Ok(Self {
            search: SearchDispatcher::new(registry.clone()),
            lyrics: Arc::new(LyricResolver::new(
                registry.clone(),
                config.lyrics.clone(),
                http.clone(),
            )),
            importer: Arc::new(PlaylistImporter::new(
                registry.clone(),
                &config.import,
                http,
            )?),
            proxy: Arc::new(MediaProxy::new(
                registry.clone(),
                &config.proxy,
                proxy_client()?,
            )),
            recommender: Arc::new(Recommender::new(registry.clone(), config.recommend.clone())),
            mixer: Arc::new(MixBuilder::new(registry.clone())),
            registry,
            config: Arc::new(config),
        })
    }
}

/// Client for lyric APIs and page scraping.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .build()
}

/// Streams are long-lived, so only connecting is bounded. Bodies are passed
/// through undecoded because the upstream content-length is forwarded.
fn proxy_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .build()
}
