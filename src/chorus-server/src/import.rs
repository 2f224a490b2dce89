//! Playlist import: a cross-platform re-matching path for one known
//! platform, and a generic first-provider-wins path for everything else.

use chorus_core::config::ImportConfig;
use chorus_core::models::{PlaylistImportResult, SearchKind, Track};
use chorus_core::provider::{Capability, Provider};
use chorus_core::registry::ProviderRegistry;
use chorus_plugin::page_title;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;

const PAGE_USER_AGENT: &str = "Mozilla/5.0";

pub struct PlaylistImporter {
    registry: Arc<ProviderRegistry>,
    client: reqwest::Client,
    source_provider: String,
    target_provider: String,
    host_pattern: Regex,
    path_pattern: Regex,
}

impl PlaylistImporter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: &ImportConfig,
        client: reqwest::Client,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            registry,
            client,
            source_provider: config.source_provider.clone(),
            target_provider: config.target_provider.clone(),
            host_pattern: Regex::new(&config.host_pattern)?,
            path_pattern: Regex::new(&config.path_pattern)?,
        })
    }

    /// True when `url` is a playlist of the cross-platform source.
    pub fn is_cross_platform(&self, url: &str) -> bool {
        self.host_pattern.is_match(url) && self.path_pattern.is_match(url)
    }

    pub async fn import(
        &self,
        url: &str,
        provider_filter: Option<&str>,
    ) -> Result<PlaylistImportResult, ApiError> {
        if self.is_cross_platform(url) {
            self.import_cross_platform(url).await
        } else {
            self.import_generic(url, provider_filter).await
        }
    }

    /// Import from the source platform and re-match every track on the
    /// target provider. Unmatched tracks are dropped.
    async fn import_cross_platform(&self, url: &str) -> Result<PlaylistImportResult, ApiError> {
        let source = self
            .registry
            .require(&self.source_provider, Capability::ImportMusicSheet)?;
        let target = self
            .registry
            .require(&self.target_provider, Capability::Search)?;

        let songs = source.import_music_sheet(url).await?;
        if songs.is_empty() {
            return Ok(PlaylistImportResult {
                source: target.id().to_string(),
                title: None,
                list: Vec::new(),
            });
        }

        let total = songs.len();
        let mut matched = Vec::with_capacity(total);
        for song in &songs {
            let Some(query) = match_query(song) else {
                continue;
            };
            if let Some(hit) = first_hit(target, &query).await {
                matched.push(hit);
            }
        }
        tracing::info!(
            source_provider = source.id(),
            target_provider = target.id(),
            total,
            matched = matched.len(),
            "Cross-platform import matched"
        );

        Ok(PlaylistImportResult {
            source: target.id().to_string(),
            title: self.scrape_title(url).await,
            list: matched,
        })
    }

    async fn import_generic(
        &self,
        url: &str,
        provider_filter: Option<&str>,
    ) -> Result<PlaylistImportResult, ApiError> {
        let candidates = self
            .registry
            .with_capability(Capability::ImportMusicSheet)
            .filter(|p| provider_filter.map_or(true, |id| p.id() == id));
        for provider in candidates {
            match provider.import_music_sheet(url).await {
                Ok(list) if !list.is_empty() => {
                    return Ok(PlaylistImportResult {
                        source: provider.id().to_string(),
                        title: None,
                        list,
                    })
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(
                    provider_id = provider.id(),
                    %error,
                    "Provider failed to import playlist"
                ),
            }
        }
        Err(ApiError::NotFound("No plugin could import this URL".to_string()))
    }

    /// Page `<title>` cut at the first `-`. Any failure yields `None`.
    async fn scrape_title(&self, url: &str) -> Option<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, PAGE_USER_AGENT)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let html = match response {
            Ok(response) => response.text().await.ok()?,
            Err(error) => {
                tracing::debug!(%error, "Playlist page fetch failed");
                return None;
            }
        };
        let title = page_title(&html)?;
        let title = title.split('-').next().unwrap_or_default().trim();
        (!title.is_empty()).then(|| title.to_string())
    }
}

/// `"title artist"` for a source track, falling back to the field names
/// some platforms use instead.
fn match_query(track: &Track) -> Option<String> {
    let text = |value: Option<&Value>| match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };

    let title = match track.title.trim() {
        "" => text(track.payload.get("name")),
        title => title.to_string(),
    };
    let artist = match track.artist.trim() {
        "" => {
            let artists = text(track.payload.get("artists"));
            if artists.is_empty() {
                text(track.payload.get("singer"))
            } else {
                artists
            }
        }
        artist => artist.to_string(),
    };

    let query = [title, artist]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!query.is_empty()).then_some(query)
}

/// First search hit, accepted without scoring. Failures count as a miss.
async fn first_hit(target: &Provider, query: &str) -> Option<Track> {
    match target.search(query, 1, SearchKind::Music).await {
        Ok(hits) => hits.into_iter().next(),
        Err(error) => {
            tracing::warn!(provider_id = target.id(), query, %error, "Match search failed");
            None
        }
    }
}
