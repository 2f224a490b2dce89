//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds an [`AppContext`] over in-process fake providers
//! and serves it on a random port.

#![allow(dead_code)]

use async_trait::async_trait;
use chorus_core::config::Config;
use chorus_core::lyric::LyricDocument;
use chorus_core::models::{MediaStreamDescriptor, SearchKind, Track};
use chorus_core::provider::{
    CapabilitySet, Provider, ProviderBackend, ProviderError, ProviderResult,
};
use chorus_core::registry::ProviderRegistry;
use chorus_server::{create_router, AppContext};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct TestHarness {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestHarness {
    pub async fn start(config: Config, providers: Vec<Provider>) -> Self {
        let ctx = AppContext::new(config, ProviderRegistry::new(providers))
            .expect("failed to build context");
        let app = create_router(ctx, None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("request failed")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }
}

/// Config whose remote lyric sources all point at `base` (usually a mock
/// server), so no test ever reaches the public internet. Mock servers
/// listen on loopback, so the proxy may stream from private addresses.
pub fn offline_config(base: &str) -> Config {
    let mut config = Config::default();
    config.proxy.allow_private_upstreams = true;
    config.lyrics.id_lookup_url = format!("{base}/id-lookup");
    config.lyrics.title_artist_url = format!("{base}/lrc");
    config.lyrics.streaming_api_url = format!("{base}/stream-api");
    config
}

pub fn provider(id: &str, backend: impl ProviderBackend + 'static) -> Provider {
    Provider::new(id, id, CapabilitySet::all(), Arc::new(backend))
}

/// A scripted provider: canned search results per query, a media source,
/// a lyric and an import result.
#[derive(Default)]
pub struct Scripted {
    pub search: HashMap<String, Value>,
    pub failing_queries: Vec<String>,
    pub media: Option<MediaStreamDescriptor>,
    pub lyric: Option<&'static str>,
    pub import: Option<Value>,
}

#[async_trait]
impl ProviderBackend for Scripted {
    async fn search(&self, query: &str, _page: u32, _kind: SearchKind) -> ProviderResult<Value> {
        if self.failing_queries.iter().any(|q| query.contains(q.as_str())) {
            return Err(ProviderError::PluginError {
                message: format!("search exploded for {query}"),
            });
        }
        Ok(self.search.get(query).cloned().unwrap_or_else(|| json!({"data": []})))
    }

    async fn get_media_source(&self, _track: &Track) -> ProviderResult<Option<MediaStreamDescriptor>> {
        Ok(self.media.clone())
    }

    async fn get_lyric(&self, _track: &Track) -> ProviderResult<Option<LyricDocument>> {
        Ok(self.lyric.and_then(LyricDocument::new))
    }

    async fn import_music_sheet(&self, _url: &str) -> ProviderResult<Option<Value>> {
        Ok(self.import.clone())
    }
}
