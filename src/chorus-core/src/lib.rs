pub mod config;
pub mod logging;
pub mod lyric;
pub mod models;
pub mod paths;
pub mod playback;
pub mod provider;
pub mod provider_contract;
pub mod redact;
pub mod registry;

pub use config::{
    is_valid_plugin_id, Config, ConfigError, HostCapability, ImportConfig, LogLevel,
    LoggingConfig, LyricsConfig, PluginEntry, PluginsConfig, ProxyConfig, RecommendCategory,
    RecommendConfig, SandboxConfig, ServerConfig, ValidationError,
};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use lyric::{is_synced, LyricDocument, LyricPayload};
pub use models::{
    dedupe_tracks, normalize_track_list, MediaStreamDescriptor, PlaylistImportResult,
    SearchKind, Track, TrackId, TrackKey,
};
pub use paths::{AppDirs, DirsError};
pub use playback::{PlaybackGate, PlaybackToken};
pub use provider::{
    Capability, CapabilityError, CapabilitySet, DispatchError, Provider, ProviderBackend,
    ProviderError, ProviderResult,
};
pub use registry::ProviderRegistry;

pub const APP_NAME: &str = "chorus";
pub const APP_AUTHOR: &str = "Chorus";
pub const APP_QUALIFIER: &str = "io";
