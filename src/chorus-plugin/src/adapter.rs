//! [`ProviderBackend`] implementation backed by a plugin process.

use crate::host::{ExecPluginHost, PluginHostError};
use crate::protocol::{PluginMethod, PluginResult};
use async_trait::async_trait;
use chorus_core::lyric::{LyricDocument, LyricPayload};
use chorus_core::models::{MediaStreamDescriptor, SearchKind, Track};
use chorus_core::provider::{ProviderBackend, ProviderError, ProviderResult};
use serde_json::Value;

pub struct ExecPluginProvider {
    host: ExecPluginHost,
}

impl ExecPluginProvider {
    pub fn new(host: ExecPluginHost) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &ExecPluginHost {
        &self.host
    }

    fn map_host_error(err: PluginHostError) -> ProviderError {
        match err {
            PluginHostError::PluginError(err) => err.into(),
            PluginHostError::ProcessTerminated => ProviderError::PluginError {
                message: "plugin process terminated".to_string(),
            },
            err @ (PluginHostError::ParseError(_)
            | PluginHostError::IdMismatch { .. }
            | PluginHostError::UnexpectedResponse { .. }
            | PluginHostError::ProtocolMismatch { .. }) => ProviderError::ProtocolError {
                message: err.to_string(),
            },
            other => ProviderError::Other {
                message: other.to_string(),
            },
        }
    }

    async fn call(&self, method: PluginMethod) -> ProviderResult<PluginResult> {
        let name = method.name();
        self.host.send_request(method).await.map_err(|err| {
            tracing::debug!(
                plugin_id = %self.host.plugin_id(),
                method = name,
                error = %err,
                "Plugin request failed"
            );
            Self::map_host_error(err)
        })
    }

    fn unexpected(method: &str, result: &PluginResult) -> ProviderError {
        ProviderError::ProtocolError {
            message: format!("unexpected response to {method}: {result:?}"),
        }
    }
}

#[async_trait]
impl ProviderBackend for ExecPluginProvider {
    async fn search(&self, query: &str, page: u32, kind: SearchKind) -> ProviderResult<Value> {
        let result = self
            .call(PluginMethod::Search {
                query: query.to_string(),
                page,
                kind,
            })
            .await?;
        match result {
            PluginResult::Tracks { result } => Ok(result),
            other => Err(Self::unexpected("Search", &other)),
        }
    }

    async fn get_media_source(&self, track: &Track) -> ProviderResult<Option<MediaStreamDescriptor>> {
        let result = self
            .call(PluginMethod::GetMediaSource {
                track: track.clone(),
            })
            .await?;
        match result {
            PluginResult::MediaSource { source } => {
                Ok(source.filter(|s| !s.url.trim().is_empty()))
            }
            other => Err(Self::unexpected("GetMediaSource", &other)),
        }
    }

    async fn get_lyric(&self, track: &Track) -> ProviderResult<Option<LyricDocument>> {
        let result = self
            .call(PluginMethod::GetLyric {
                track: track.clone(),
            })
            .await?;
        match result {
            PluginResult::Lyric { lyric } => Ok(lyric.and_then(LyricPayload::into_document)),
            other => Err(Self::unexpected("GetLyric", &other)),
        }
    }

    async fn import_music_sheet(&self, url: &str) -> ProviderResult<Option<Value>> {
        let result = self
            .call(PluginMethod::ImportMusicSheet {
                url: url.to_string(),
            })
            .await?;
        match result {
            PluginResult::Sheet { result } => Ok(result.filter(|v| !v.is_null())),
            other => Err(Self::unexpected("ImportMusicSheet", &other)),
        }
    }
}
