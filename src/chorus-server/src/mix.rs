//! Similar-song mixes seeded from a client's tracks.

use chorus_core::models::{dedupe_tracks, SearchKind, Track};
use chorus_core::provider::Capability;
use chorus_core::registry::ProviderRegistry;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ApiError;
use crate::recommend::{playlist_cover, Playlist};

const MAX_SEEDS: usize = 10;
const CANDIDATE_TARGET: usize = 60;
const MIX_SIZE: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct MixRequest {
    pub source: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub seeds: Vec<Track>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Korean,
    Japanese,
    Chinese,
    English,
    Other,
}

impl Language {
    /// Guess from title, artist and album. Hangul wins, then kana; Han
    /// characters without kana count as Chinese.
    pub fn detect(track: &Track) -> Self {
        let text = [
            track.title.as_str(),
            track.artist.as_str(),
            track.album.as_deref().unwrap_or_default(),
        ]
        .join(" ");

        let has = |range: &[(char, char)]| {
            text.chars()
                .any(|c| range.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)))
        };
        if has(&[('\u{AC00}', '\u{D7A3}')]) {
            Language::Korean
        } else if has(&[('\u{3041}', '\u{309F}'), ('\u{30A0}', '\u{30FF}')]) {
            Language::Japanese
        } else if has(&[('\u{4E00}', '\u{9FA5}')]) {
            Language::Chinese
        } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
            Language::English
        } else {
            Language::Other
        }
    }

    /// Word appended to mix queries to keep results in the same language.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Language::Chinese => Some("华语"),
            Language::Japanese => Some("日语"),
            Language::Korean => Some("韩语"),
            Language::English => Some("英文"),
            Language::Other => None,
        }
    }
}

pub struct MixBuilder {
    registry: Arc<ProviderRegistry>,
}

impl MixBuilder {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Search around up to ten random seeds and return a shuffled mix of
    /// tracks that are not already among the seeds.
    pub async fn build(&self, request: MixRequest) -> Result<Playlist, ApiError> {
        let provider = self.registry.require(&request.source, Capability::Search)?;

        let seeds = dedupe_tracks(request.seeds);
        if seeds.is_empty() {
            return Err(ApiError::NotFound("No seed tracks to build a mix from".into()));
        }
        let mut seen: HashSet<_> = seeds.iter().filter_map(Track::dedup_key).collect();

        let queries: Vec<String> = {
            let mut picked: Vec<&Track> = seeds.iter().collect();
            picked.shuffle(&mut rand::thread_rng());
            picked.into_iter().take(MAX_SEEDS).filter_map(seed_query).collect()
        };

        let mut candidates = Vec::new();
        for query in queries {
            match provider.search(&query, 1, SearchKind::Music).await {
                Ok(hits) => {
                    for hit in hits {
                        if let Some(key) = hit.dedup_key() {
                            if seen.insert(key) {
                                candidates.push(hit);
                            }
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(provider_id = provider.id(), mix = %request.id, %query, %error, "Mix search failed")
                }
            }
            if candidates.len() >= CANDIDATE_TARGET {
                break;
            }
        }

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(MIX_SIZE);
        if candidates.is_empty() {
            return Err(ApiError::NotFound("No tracks found for this mix".into()));
        }

        let cover = match playlist_cover(&candidates) {
            cover if cover.is_empty() => playlist_cover(&seeds),
            cover => cover,
        };
        Ok(Playlist {
            id: request.id,
            title: request.title,
            subtitle: request.subtitle,
            badge: request.badge,
            cover,
            tracks: candidates,
        })
    }
}

/// Seed artist (or title when there is no artist) plus its language hint.
fn seed_query(seed: &Track) -> Option<String> {
    let anchor = [seed.artist.trim(), seed.title.trim()]
        .into_iter()
        .find(|s| !s.is_empty())?;
    Some(match Language::detect(seed).hint() {
        Some(hint) => format!("{anchor} {hint}"),
        None => anchor.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chorus_core::provider::{CapabilitySet, Provider, ProviderBackend, ProviderResult};
    use serde_json::{json, Value};

    #[test]
    fn detects_languages() {
        assert_eq!(Language::detect(&Track::new("봄날", "BTS")), Language::Korean);
        assert_eq!(Language::detect(&Track::new("夜に駆ける", "YOASOBI")), Language::Japanese);
        assert_eq!(Language::detect(&Track::new("晴天", "周杰伦")), Language::Chinese);
        assert_eq!(Language::detect(&Track::new("Halo", "Beyonce")), Language::English);
        assert_eq!(Language::detect(&Track::new("123", "")), Language::Other);
    }

    #[test]
    fn seed_query_prefers_artist() {
        assert_eq!(seed_query(&Track::new("晴天", "周杰伦")).as_deref(), Some("周杰伦 华语"));
        assert_eq!(seed_query(&Track::new("Halo", "")).as_deref(), Some("Halo 英文"));
        assert_eq!(seed_query(&Track::new("", "")), None);
    }

    /// Echoes back the seed itself plus five new tracks per query.
    struct Similar;

    #[async_trait]
    impl ProviderBackend for Similar {
        async fn search(&self, query: &str, _page: u32, _kind: SearchKind) -> ProviderResult<Value> {
            let mut list = vec![json!({"id": "seed-1", "title": "Seed", "artist": "Artist"})];
            list.extend((0..5).map(|i| json!({"id": format!("{query}-{i}"), "title": "T", "artist": "A"})));
            Ok(Value::Array(list))
        }
    }

    fn builder() -> MixBuilder {
        let provider = Provider::new("qq", "QQ", CapabilitySet::all(), Arc::new(Similar));
        MixBuilder::new(Arc::new(ProviderRegistry::new([provider])))
    }

    fn request(seeds: Vec<Track>) -> MixRequest {
        MixRequest {
            source: "qq".into(),
            id: "daily".into(),
            title: "Daily".into(),
            subtitle: None,
            badge: None,
            seeds,
        }
    }

    #[tokio::test]
    async fn mix_excludes_seeds_and_caps_size() {
        let seeds: Vec<Track> = (0..8)
            .map(|i| Track::new("Seed", format!("Artist {i}")))
            .chain([Track::new("Seed", "Artist").with_id("seed-1")])
            .collect();
        let mix = builder().build(request(seeds)).await.unwrap();
        assert_eq!(mix.tracks.len(), MIX_SIZE);
        assert!(mix.tracks.iter().all(|t| t.id.as_ref().map(|id| id.to_string()) != Some("seed-1".into())));
        let unique: HashSet<_> = mix.tracks.iter().filter_map(Track::dedup_key).collect();
        assert_eq!(unique.len(), mix.tracks.len());
    }

    #[tokio::test]
    async fn no_seeds_is_not_found() {
        let err = builder().build(request(Vec::new())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
