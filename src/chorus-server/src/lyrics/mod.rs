//! Best-effort lyric resolution across providers and public lyric APIs.
//!
//! Steps run strictly in order and each one is fault tolerant: a failing
//! step is logged and the chain moves on. Candidates are merged by
//! [`BestLyric::offer`]: synced text beats unsynced text, a longer synced
//! text beats a shorter one, and the first unsynced text is never replaced
//! by another unsynced text.

mod sources;

pub use sources::RemoteLyricSources;

use chorus_core::config::LyricsConfig;
use chorus_core::lyric::LyricDocument;
use chorus_core::models::{SearchKind, Track};
use chorus_core::provider::{Capability, CapabilityError, Provider};
use chorus_core::registry::ProviderRegistry;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricStep {
    Native,
    IdLookup,
    TitleArtist,
    StreamingApi,
    Backup,
}

impl fmt::Display for LyricStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LyricStep::Native => "native",
            LyricStep::IdLookup => "id_lookup",
            LyricStep::TitleArtist => "title_artist",
            LyricStep::StreamingApi => "streaming_api",
            LyricStep::Backup => "backup",
        })
    }
}

/// The best candidate seen so far.
#[derive(Debug, Default)]
pub struct BestLyric {
    current: Option<LyricDocument>,
}

impl BestLyric {
    /// Offer a candidate; returns whether it was adopted.
    pub fn offer(&mut self, candidate: LyricDocument) -> bool {
        let adopt = match &self.current {
            None => true,
            Some(current) if candidate.is_synced() => {
                !current.is_synced() || candidate.len() > current.len()
            }
            Some(_) => false,
        };
        if adopt {
            self.current = Some(candidate);
        }
        adopt
    }

    pub fn is_synced(&self) -> bool {
        self.current.as_ref().is_some_and(LyricDocument::is_synced)
    }

    pub fn into_inner(self) -> Option<LyricDocument> {
        self.current
    }
}

pub struct LyricResolver {
    registry: Arc<ProviderRegistry>,
    config: LyricsConfig,
    sources: RemoteLyricSources,
}

impl LyricResolver {
    pub fn new(registry: Arc<ProviderRegistry>, config: LyricsConfig, client: reqwest::Client) -> Self {
        let sources = RemoteLyricSources::new(client, &config);
        Self {
            registry,
            config,
            sources,
        }
    }

    /// Resolve the best lyric for `track`, owned by provider `provider_id`.
    ///
    /// Only an unknown provider id is an error; every later failure just
    /// contributes no candidate.
    pub async fn resolve(
        &self,
        provider_id: &str,
        track: &Track,
    ) -> Result<Option<LyricDocument>, CapabilityError> {
        let native = self.registry.get(provider_id)?;
        let mut best = BestLyric::default();

        if native.supports(Capability::GetLyric) {
            match native.get_lyric(track).await {
                Ok(Some(doc)) => self.adopt(&mut best, LyricStep::Native, doc),
                Ok(None) => {}
                Err(error) => step_failed(LyricStep::Native, provider_id, &error),
            }
        }

        if !best.is_synced() && native.id() == self.config.id_lookup_provider {
            if let Some(id) = track.id.as_ref().filter(|id| id.is_numeric()) {
                match self.sources.by_id(id).await {
                    Ok(text) => self.adopt_text(&mut best, LyricStep::IdLookup, text),
                    Err(error) => step_failed(LyricStep::IdLookup, provider_id, &error),
                }
            }
        }

        match self.sources.by_title_artist(track).await {
            Ok(text) => self.adopt_text(&mut best, LyricStep::TitleArtist, text),
            Err(error) => step_failed(LyricStep::TitleArtist, provider_id, &error),
        }

        if !best.is_synced() {
            match self.sources.by_streaming_search(track).await {
                Ok(text) => self.adopt_text(&mut best, LyricStep::StreamingApi, text),
                Err(error) => step_failed(LyricStep::StreamingApi, provider_id, &error),
            }
        }

        if !best.is_synced() {
            for backup_id in &self.config.backup_providers {
                let Some(backup) = self.backup(backup_id) else {
                    continue;
                };
                match search_then_lyric(backup, track).await {
                    Ok(Some(doc)) if doc.is_synced() => {
                        self.adopt(&mut best, LyricStep::Backup, doc);
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => step_failed(LyricStep::Backup, backup_id, &error),
                }
            }
        }

        Ok(best.into_inner())
    }

    fn backup(&self, id: &str) -> Option<&Provider> {
        let provider = self.registry.require(id, Capability::Search).ok()?;
        if provider.supports(Capability::GetLyric) {
            Some(provider)
        } else {
            tracing::debug!(provider_id = id, "Backup lyric provider lacks getLyric");
            None
        }
    }

    fn adopt_text(&self, best: &mut BestLyric, step: LyricStep, text: Option<String>) {
        if let Some(doc) = text.and_then(LyricDocument::new) {
            self.adopt(best, step, doc);
        }
    }

    fn adopt(&self, best: &mut BestLyric, step: LyricStep, doc: LyricDocument) {
        let synced = doc.is_synced();
        let len = doc.len();
        let adopted = best.offer(doc);
        tracing::debug!(step = %step, synced, len, adopted, "Lyric candidate");
    }
}

/// Search the provider for the track's "title artist" and take the first
/// hit's lyric.
async fn search_then_lyric(
    provider: &Provider,
    track: &Track,
) -> Result<Option<LyricDocument>, chorus_core::provider::DispatchError> {
    let Some(query) = track.search_query() else {
        return Ok(None);
    };
    let hits = provider.search(&query, 1, SearchKind::Lyric).await?;
    match hits.first() {
        Some(hit) => provider.get_lyric(hit).await,
        None => Ok(None),
    }
}

fn step_failed(step: LyricStep, provider_id: &str, error: &dyn fmt::Display) {
    tracing::warn!(step = %step, provider_id, error = %error, "Lyric step failed");
}
