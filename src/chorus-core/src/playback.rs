//! Stale-response suppression for client-side playback requests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Token identifying one `play` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlaybackToken(u64);

impl PlaybackToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing tokens. Only a result carrying the most
/// recently issued token is accepted; everything else has been superseded.
#[derive(Debug, Default)]
pub struct PlaybackGate {
    latest: AtomicU64,
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new playback request, superseding every earlier token.
    pub fn begin(&self) -> PlaybackToken {
        PlaybackToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: PlaybackToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Pass `value` through only if `token` is still current.
    pub fn accept<T>(&self, token: PlaybackToken, value: T) -> Option<T> {
        if self.is_current(token) {
            Some(value)
        } else {
            tracing::debug!(token = token.0, "Dropping superseded playback result");
            None
        }
    }
}
