use crate::models::{SearchKind, Track};
use crate::provider::{Capability, CapabilityError, DispatchError, Provider};
use thiserror::Error;

/// Fixtures a provider implementation supplies to run the shared contract suite.
#[derive(Debug, Clone)]
pub struct ProviderContractExpectations {
    pub provider_id: String,
    /// Query that must return at least one track when search is declared.
    pub search_query: String,
    /// Title expected on the first search hit, if ordering is deterministic.
    pub expected_first_title: Option<String>,
    /// A sheet URL the provider owns (required when import is declared).
    pub import_url: Option<String>,
    /// A URL the provider must decline with an empty result rather than an error.
    pub foreign_import_url: Option<String>,
}

impl ProviderContractExpectations {
    pub fn new(provider_id: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            search_query: search_query.into(),
            expected_first_title: None,
            import_url: None,
            foreign_import_url: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderContractError {
    #[error("provider id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },
    #[error("search returned no tracks for query: {query}")]
    EmptySearch { query: String },
    #[error("search returned wrong first track: expected {expected:?}, got {actual:?}")]
    SearchWrongFirstTrack { expected: String, actual: String },
    #[error("media source for {title:?} has an empty url")]
    EmptyStreamUrl { title: String },
    #[error("lyric for {title:?} was returned but empty")]
    EmptyLyric { title: String },
    #[error("provider declares importMusicSheet but no import url was supplied")]
    MissingImportExpectation,
    #[error("import of {url} returned no tracks")]
    EmptyImport { url: String },
    #[error("foreign url {url} was not declined with an empty result")]
    ForeignImportAccepted { url: String },
    #[error("undeclared {capability} did not fail with a capability error")]
    UndeclaredNotRejected { capability: Capability },
    #[error("provider error while running contract: {0}")]
    ProviderFailure(String),
}

/// Run the shared contract suite against a loaded provider.
///
/// Providers call this from their tests with fixtures that exist in their
/// test setup.
pub async fn run_provider_contract(
    provider: &Provider,
    expectations: &ProviderContractExpectations,
) -> Result<(), ProviderContractError> {
    if provider.id() != expectations.provider_id {
        return Err(ProviderContractError::IdMismatch {
            expected: expectations.provider_id.clone(),
            actual: provider.id().to_string(),
        });
    }

    verify_undeclared(provider).await?;

    let first = if provider.supports(Capability::Search) {
        Some(verify_search(provider, expectations).await?)
    } else {
        None
    };

    if let Some(track) = &first {
        verify_media_source(provider, track).await?;
        verify_lyric(provider, track).await?;
    }
    verify_import(provider, expectations).await?;
    Ok(())
}

async fn verify_search(
    provider: &Provider,
    expectations: &ProviderContractExpectations,
) -> Result<Track, ProviderContractError> {
    let tracks = provider
        .search(&expectations.search_query, 1, SearchKind::Music)
        .await
        .map_err(failure)?;
    let first = tracks
        .into_iter()
        .next()
        .ok_or_else(|| ProviderContractError::EmptySearch {
            query: expectations.search_query.clone(),
        })?;

    if let Some(expected) = &expectations.expected_first_title {
        if &first.title != expected {
            return Err(ProviderContractError::SearchWrongFirstTrack {
                expected: expected.clone(),
                actual: first.title,
            });
        }
    }
    Ok(first)
}

async fn verify_media_source(provider: &Provider, track: &Track) -> Result<(), ProviderContractError> {
    if !provider.supports(Capability::GetMediaSource) {
        return Ok(());
    }
    let source = provider.get_media_source(track).await.map_err(failure)?;
    if let Some(source) = source {
        if source.url.trim().is_empty() {
            return Err(ProviderContractError::EmptyStreamUrl {
                title: track.title.clone(),
            });
        }
    }
    Ok(())
}

async fn verify_lyric(provider: &Provider, track: &Track) -> Result<(), ProviderContractError> {
    if !provider.supports(Capability::GetLyric) {
        return Ok(());
    }
    let lyric = provider.get_lyric(track).await.map_err(failure)?;
    match lyric {
        Some(doc) if doc.is_empty() => Err(ProviderContractError::EmptyLyric {
            title: track.title.clone(),
        }),
        _ => Ok(()),
    }
}

async fn verify_import(
    provider: &Provider,
    expectations: &ProviderContractExpectations,
) -> Result<(), ProviderContractError> {
    if !provider.supports(Capability::ImportMusicSheet) {
        return Ok(());
    }
    let url = expectations
        .import_url
        .as_deref()
        .ok_or(ProviderContractError::MissingImportExpectation)?;
    let tracks = provider.import_music_sheet(url).await.map_err(failure)?;
    if tracks.is_empty() {
        return Err(ProviderContractError::EmptyImport {
            url: url.to_string(),
        });
    }

    if let Some(foreign) = expectations.foreign_import_url.as_deref() {
        match provider.import_music_sheet(foreign).await {
            Ok(tracks) if tracks.is_empty() => {}
            _ => {
                return Err(ProviderContractError::ForeignImportAccepted {
                    url: foreign.to_string(),
                })
            }
        }
    }
    Ok(())
}

async fn verify_undeclared(provider: &Provider) -> Result<(), ProviderContractError> {
    let sample = Track::new("contract sample", "contract");
    for capability in Capability::ALL {
        if provider.supports(capability) {
            continue;
        }
        let result = match capability {
            Capability::Search => provider
                .search("contract sample", 1, SearchKind::Music)
                .await
                .map(|_| ()),
            Capability::GetMediaSource => provider.get_media_source(&sample).await.map(|_| ()),
            Capability::GetLyric => provider.get_lyric(&sample).await.map(|_| ()),
            Capability::ImportMusicSheet => provider
                .import_music_sheet("https://example.invalid/sheet")
                .await
                .map(|_| ()),
        };
        match result {
            Err(DispatchError::Capability(CapabilityError::Unsupported { .. })) => {}
            _ => return Err(ProviderContractError::UndeclaredNotRejected { capability }),
        }
    }
    Ok(())
}

fn failure(err: DispatchError) -> ProviderContractError {
    ProviderContractError::ProviderFailure(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyric::LyricDocument;
    use crate::models::MediaStreamDescriptor;
    use crate::provider::{CapabilitySet, ProviderBackend, ProviderResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct FakeBackend {
        stream_url: String,
    }

    #[async_trait]
    impl ProviderBackend for FakeBackend {
        async fn search(&self, query: &str, _page: u32, _kind: SearchKind) -> ProviderResult<Value> {
            Ok(json!({"data": [{"id": 1, "title": query, "artist": "Fake"}]}))
        }

        async fn get_media_source(
            &self,
            _track: &Track,
        ) -> ProviderResult<Option<MediaStreamDescriptor>> {
            Ok(Some(MediaStreamDescriptor::new(self.stream_url.clone())))
        }

        async fn get_lyric(&self, _track: &Track) -> ProviderResult<Option<LyricDocument>> {
            Ok(LyricDocument::new("[00:01.00]fake"))
        }

        async fn import_music_sheet(&self, url: &str) -> ProviderResult<Option<Value>> {
            if url.contains("fake.example") {
                Ok(Some(json!([{"title": "Imported", "artist": "Fake"}])))
            } else {
                Ok(None)
            }
        }
    }

    fn fake(caps: CapabilitySet, stream_url: &str) -> Provider {
        Provider::new(
            "fake",
            "Fake",
            caps,
            Arc::new(FakeBackend {
                stream_url: stream_url.into(),
            }),
        )
    }

    fn expectations() -> ProviderContractExpectations {
        ProviderContractExpectations {
            expected_first_title: Some("hello".into()),
            import_url: Some("https://fake.example/sheet/1".into()),
            foreign_import_url: Some("https://elsewhere.example/list".into()),
            ..ProviderContractExpectations::new("fake", "hello")
        }
    }

    #[tokio::test]
    async fn full_provider_passes() {
        let provider = fake(CapabilitySet::all(), "https://cdn.fake/1.mp3");
        run_provider_contract(&provider, &expectations())
            .await
            .expect("contract should pass");
    }

    #[tokio::test]
    async fn partial_provider_passes() {
        let provider = fake(
            CapabilitySet::default().with(Capability::Search),
            "https://cdn.fake/1.mp3",
        );
        run_provider_contract(&provider, &expectations())
            .await
            .expect("search-only provider is valid");
    }

    #[tokio::test]
    async fn empty_stream_url_fails() {
        let provider = fake(CapabilitySet::all(), " ");
        let err = run_provider_contract(&provider, &expectations())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderContractError::EmptyStreamUrl { .. }));
    }

    #[tokio::test]
    async fn missing_import_fixture_is_reported() {
        let provider = fake(CapabilitySet::all(), "https://cdn.fake/1.mp3");
        let mut expectations = expectations();
        expectations.import_url = None;
        assert_eq!(
            run_provider_contract(&provider, &expectations).await,
            Err(ProviderContractError::MissingImportExpectation)
        );
    }
}
