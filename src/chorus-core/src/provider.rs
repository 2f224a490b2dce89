use crate::lyric::LyricDocument;
use crate::models::{normalize_track_list, MediaStreamDescriptor, SearchKind, Track};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One of the four optional operations a provider may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Search,
    GetMediaSource,
    GetLyric,
    ImportMusicSheet,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Search,
        Capability::GetMediaSource,
        Capability::GetLyric,
        Capability::ImportMusicSheet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Search => "search",
            Capability::GetMediaSource => "getMediaSource",
            Capability::GetLyric => "getLyric",
            Capability::ImportMusicSheet => "importMusicSheet",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags declared by a provider at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilitySet {
    pub search: bool,
    pub get_media_source: bool,
    pub get_lyric: bool,
    pub import_music_sheet: bool,
}

impl CapabilitySet {
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        *self.flag_mut(capability) = true;
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Search => self.search,
            Capability::GetMediaSource => self.get_media_source,
            Capability::GetLyric => self.get_lyric,
            Capability::ImportMusicSheet => self.import_music_sheet,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.supports(*c))
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::Search => &mut self.search,
            Capability::GetMediaSource => &mut self.get_media_source,
            Capability::GetLyric => &mut self.get_lyric,
            Capability::ImportMusicSheet => &mut self.import_music_sheet,
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::default(), |set, c| set.with(c))
    }
}

/// Failures raised while a provider executes an operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {message}")]
    NetworkError { message: String },
    #[error("{message}")]
    PluginError { message: String },
    #[error("protocol error: {message}")]
    ProtocolError { message: String },
    #[error("operation not supported: {operation}")]
    NotSupported { operation: String },
    #[error("{message}")]
    Other { message: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// The provider id is unknown, or the provider never declared the operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("provider not found: {id}")]
    UnknownProvider { id: String },
    #[error("provider {provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: Capability,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Upstream(#[from] ProviderError),
}

/// Execution side of a provider.
///
/// Implementations only need the operations they declare in their
/// [`CapabilitySet`]; [`Provider`] never calls an undeclared one.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Raw search response: a bare list or an envelope object.
    async fn search(&self, _query: &str, _page: u32, _kind: SearchKind) -> ProviderResult<Value> {
        Err(ProviderError::NotSupported {
            operation: Capability::Search.to_string(),
        })
    }

    async fn get_media_source(
        &self,
        _track: &Track,
    ) -> ProviderResult<Option<MediaStreamDescriptor>> {
        Err(ProviderError::NotSupported {
            operation: Capability::GetMediaSource.to_string(),
        })
    }

    async fn get_lyric(&self, _track: &Track) -> ProviderResult<Option<LyricDocument>> {
        Err(ProviderError::NotSupported {
            operation: Capability::GetLyric.to_string(),
        })
    }

    /// Raw import response, or `None` when the URL is not this provider's.
    async fn import_music_sheet(&self, _url: &str) -> ProviderResult<Option<Value>> {
        Err(ProviderError::NotSupported {
            operation: Capability::ImportMusicSheet.to_string(),
        })
    }
}

/// A loaded provider: identity, declared capabilities and its backend.
///
/// Every operation checks the declared capability before touching the
/// backend, so calling an undeclared operation yields a
/// [`CapabilityError`] rather than reaching provider code.
#[derive(Clone)]
pub struct Provider {
    id: String,
    name: String,
    capabilities: CapabilitySet,
    backend: Arc<dyn ProviderBackend>,
}

impl Provider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capabilities: CapabilitySet,
        backend: Arc<dyn ProviderBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities,
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }

    fn require(&self, capability: Capability) -> Result<(), CapabilityError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(CapabilityError::Unsupported {
                provider: self.id.clone(),
                capability,
            })
        }
    }

    /// Search and flatten the provider's response. Provider ordering is kept.
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        kind: SearchKind,
    ) -> Result<Vec<Track>, DispatchError> {
        self.require(Capability::Search)?;
        let raw = self.backend.search(query, page, kind).await?;
        Ok(normalize_track_list(raw))
    }

    pub async fn get_media_source(
        &self,
        track: &Track,
    ) -> Result<Option<MediaStreamDescriptor>, DispatchError> {
        self.require(Capability::GetMediaSource)?;
        Ok(self.backend.get_media_source(track).await?)
    }

    pub async fn get_lyric(&self, track: &Track) -> Result<Option<LyricDocument>, DispatchError> {
        self.require(Capability::GetLyric)?;
        Ok(self.backend.get_lyric(track).await?)
    }

    /// Tracks of the sheet at `url`; empty when the provider does not
    /// recognize the URL.
    pub async fn import_music_sheet(&self, url: &str) -> Result<Vec<Track>, DispatchError> {
        self.require(Capability::ImportMusicSheet)?;
        let raw = self.backend.import_music_sheet(url).await?;
        Ok(raw.map(normalize_track_list).unwrap_or_default())
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
