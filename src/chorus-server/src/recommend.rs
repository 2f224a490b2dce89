//! Curated category playlists built by concurrent provider searches.

use chorus_core::config::{RecommendCategory, RecommendConfig};
use chorus_core::models::{SearchKind, Track};
use chorus_core::provider::{Capability, Provider};
use chorus_core::registry::ProviderRegistry;
use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;

const MAX_TRACKS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub cover: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub source: String,
    pub playlists: Vec<Playlist>,
}

pub struct Recommender {
    registry: Arc<ProviderRegistry>,
    config: RecommendConfig,
}

impl Recommender {
    pub fn new(registry: Arc<ProviderRegistry>, config: RecommendConfig) -> Self {
        Self { registry, config }
    }

    /// Search every category concurrently. A category that fails or comes
    /// back empty is left out; the aggregate itself never fails.
    pub async fn recommend(&self) -> Result<RecommendResponse, ApiError> {
        let provider = self
            .registry
            .require(&self.config.provider, Capability::Search)?;

        let picks: Vec<(&RecommendCategory, String, u32)> = {
            let mut rng = rand::thread_rng();
            self.config
                .categories
                .iter()
                .filter_map(|category| {
                    let query = category.queries.choose(&mut rng)?.clone();
                    Some((category, query, rng.gen_range(1..=3)))
                })
                .collect()
        };

        let playlists = join_all(
            picks
                .into_iter()
                .map(|(category, query, page)| category_playlist(provider, category, query, page)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        Ok(RecommendResponse {
            source: provider.id().to_string(),
            playlists,
        })
    }
}

async fn category_playlist(
    provider: &Provider,
    category: &RecommendCategory,
    query: String,
    page: u32,
) -> Option<Playlist> {
    let mut tracks = match provider.search(&query, page, SearchKind::Music).await {
        Ok(tracks) => tracks,
        Err(error) => {
            tracing::warn!(
                provider_id = provider.id(),
                category = %category.id,
                %query,
                %error,
                "Recommend category search failed"
            );
            return None;
        }
    };
    if tracks.is_empty() {
        return None;
    }

    tracks.shuffle(&mut rand::thread_rng());
    tracks.truncate(MAX_TRACKS);
    Some(Playlist {
        id: category.id.clone(),
        title: category.title.clone(),
        subtitle: Some(format!("{} tracks", tracks.len())),
        badge: Some(category.badge.clone()),
        cover: playlist_cover(&tracks),
        tracks,
    })
}

/// Cover of the first track, or empty when it has none.
pub fn playlist_cover(tracks: &[Track]) -> String {
    tracks
        .first()
        .and_then(Track::cover)
        .unwrap_or_default()
        .to_string()
}
