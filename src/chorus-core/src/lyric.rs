//! Lyric documents and synced-lyric detection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn time_tag() -> &'static Regex {
    static TIME_TAG: OnceLock<Regex> = OnceLock::new();
    TIME_TAG.get_or_init(|| {
        Regex::new(r"\[\d{1,2}:\d{2}(?:\.\d{1,3})?\]").expect("time tag pattern is valid")
    })
}

/// True when `text` carries at least one `[mm:ss]` or `[mm:ss.fff]` tag.
pub fn is_synced(text: &str) -> bool {
    time_tag().is_match(text)
}

/// Lyric text with its synced flag derived from the text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricDocument {
    text: String,
    synced: bool,
}

impl LyricDocument {
    /// Returns `None` for empty or whitespace-only text.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        let synced = is_synced(&text);
        Some(Self { text, synced })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Lyric object as providers return it. Any `synced`-style flag a provider
/// sends is ignored; only the text is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lrc: Option<String>,
    #[serde(rename = "rawLrc", default, skip_serializing_if = "Option::is_none")]
    pub raw_lrc: Option<String>,
}

impl LyricPayload {
    pub fn into_document(self) -> Option<LyricDocument> {
        self.lrc
            .and_then(LyricDocument::new)
            .or_else(|| self.raw_lrc.and_then(LyricDocument::new))
    }
}
