use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A provider-assigned track identifier.
///
/// Providers emit ids as either JSON strings or numbers. The emitted
/// representation is kept so a track round-trips back to its provider
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackId {
    Number(Number),
    Text(String),
}

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self::Text(id.into())
    }

    /// True when the id is a JSON number or a string of ASCII digits.
    pub fn is_numeric(&self) -> bool {
        match self {
            TrackId::Number(n) => n.is_u64(),
            TrackId::Text(s) => !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackId::Number(n) => write!(f, "{n}"),
            TrackId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<u64> for TrackId {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

/// Normalized song metadata shared by every provider.
///
/// Fields the core does not interpret are kept in `payload` and serialized
/// back flat, so a provider always receives the exact object it produced.
/// A known field whose value has an unexpected type (an album object, a
/// `"03:45"` duration, a null title) is left in `payload` untouched rather
/// than rejecting the whole track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: Option<TrackId>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub duration: Option<Number>,
    pub payload: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Track {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut payload = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self {
            id: take_typed(&mut payload, "id"),
            title: take_typed(&mut payload, "title").unwrap_or_default(),
            artist: take_typed(&mut payload, "artist").unwrap_or_default(),
            album: take_typed(&mut payload, "album"),
            artwork: take_typed(&mut payload, "artwork"),
            duration: take_typed(&mut payload, "duration"),
            payload,
        })
    }
}

/// Remove `key` from `payload` only if its value deserializes as `T`.
fn take_typed<T: DeserializeOwned>(payload: &mut Map<String, Value>, key: &str) -> Option<T> {
    let typed = T::deserialize(payload.get(key)?).ok()?;
    payload.remove(key);
    Some(typed)
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        // An untyped value kept in the payload takes the key's place.
        for (key, value) in [("title", &self.title), ("artist", &self.artist)] {
            if !self.payload.contains_key(key) {
                map.serialize_entry(key, value)?;
            }
        }
        for (key, value) in [("album", &self.album), ("artwork", &self.artwork)] {
            if let Some(value) = value {
                map.serialize_entry(key, value)?;
            }
        }
        if let Some(duration) = &self.duration {
            map.serialize_entry("duration", duration)?;
        }
        for (key, value) in &self.payload {
            let shadowed = match key.as_str() {
                "id" => self.id.is_some(),
                "album" => self.album.is_some(),
                "artwork" => self.artwork.is_some(),
                "duration" => self.duration.is_some(),
                _ => false,
            };
            if !shadowed {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            artist: artist.into(),
            album: None,
            artwork: None,
            duration: None,
            payload: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TrackId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Identity used for deduplication: the id when present, otherwise the
    /// (title, artist) pair. Tracks with neither have no key.
    pub fn dedup_key(&self) -> Option<TrackKey> {
        if let Some(id) = &self.id {
            return Some(TrackKey::Id(id.to_string()));
        }
        if !self.title.is_empty() && !self.artist.is_empty() {
            return Some(TrackKey::TitleArtist(self.title.clone(), self.artist.clone()));
        }
        None
    }

    /// `"title artist"` query used for cross-provider lookups.
    pub fn search_query(&self) -> Option<String> {
        let query = [self.title.trim(), self.artist.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if query.is_empty() {
            None
        } else {
            Some(query)
        }
    }

    /// Cover image, falling back to a provider-specific `cover` field.
    pub fn cover(&self) -> Option<&str> {
        self.artwork
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.payload.get("cover").and_then(Value::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    Id(String),
    TitleArtist(String, String),
}

/// Drop later duplicates, keeping first occurrences in order. Tracks without
/// a dedup key are always kept.
pub fn dedupe_tracks(tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| match track.dedup_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}

/// Flatten a provider's raw search/import response into tracks.
///
/// Accepts a bare array or an envelope object carrying the array under
/// `data`. Entries that are not track-shaped are skipped.
pub fn normalize_track_list(raw: Value) -> Vec<Track> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter(|item| !item.is_null())
        .filter_map(|item| match serde_json::from_value::<Track>(item) {
            Ok(track) => Some(track),
            Err(error) => {
                tracing::warn!(%error, "Skipping malformed track entry");
                None
            }
        })
        .collect()
}

/// Result-type hint forwarded to a provider's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Music,
    Album,
    Artist,
    Sheet,
    Lyric,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Music => "music",
            SearchKind::Album => "album",
            SearchKind::Artist => "artist",
            SearchKind::Sheet => "sheet",
            SearchKind::Lyric => "lyric",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "music" => Ok(SearchKind::Music),
            "album" => Ok(SearchKind::Album),
            "artist" => Ok(SearchKind::Artist),
            "sheet" => Ok(SearchKind::Sheet),
            "lyric" => Ok(SearchKind::Lyric),
            other => Err(format!("unknown search type: {other}")),
        }
    }
}

/// A playable URL plus the request headers the upstream insists on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStreamDescriptor {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl MediaStreamDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// A descriptor that declares headers, even an empty set, cannot be
    /// fetched by a plain client request.
    pub fn requires_proxy(&self) -> bool {
        self.headers.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistImportResult {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub list: Vec<Track>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_and_bare_list_normalize_identically() {
        let t1 = json!({"id": 1, "title": "One", "artist": "A", "songmid": "x1"});
        let t2 = json!({"id": "b2", "title": "Two", "artist": "B", "album": "LP"});

        let wrapped = normalize_track_list(json!({"isEnd": false, "data": [t1, t2]}));
        let bare = normalize_track_list(json!([t1, t2]));

        assert_eq!(wrapped, bare);
        assert_eq!(wrapped.len(), 2);
        assert_eq!(serde_json::to_value(&wrapped[0]).unwrap(), t1);
        assert_eq!(serde_json::to_value(&wrapped[1]).unwrap(), t2);
    }

    #[test]
    fn unknown_shapes_normalize_to_empty() {
        assert!(normalize_track_list(json!(null)).is_empty());
        assert!(normalize_track_list(json!({"list": []})).is_empty());
        assert!(normalize_track_list(json!("nope")).is_empty());
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let tracks = normalize_track_list(json!([
            {"title": "Good", "artist": "A"},
            "just a string",
            42,
            null
        ]));
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Good");
    }

    #[test]
    fn oddly_typed_fields_stay_in_the_payload() {
        let raw = vec![
            json!({"id": 1, "title": "A", "artist": "X", "album": {"name": "LP", "mid": "m1"}}),
            json!({"id": 2, "title": "B", "artist": "X", "duration": "03:45"}),
            json!({"id": 3, "title": null, "artist": "X"}),
            json!({"id": 4, "title": "D", "artist": "X", "album": "Plain", "duration": 225}),
        ];
        let tracks = normalize_track_list(Value::Array(raw.clone()));
        assert_eq!(tracks.len(), 4);

        assert_eq!(tracks[0].album, None);
        assert_eq!(tracks[0].payload["album"]["name"], "LP");
        assert_eq!(tracks[1].duration, None);
        assert_eq!(tracks[2].title, "");
        assert_eq!(tracks[3].album.as_deref(), Some("Plain"));
        assert_eq!(tracks[3].duration, Some(Number::from(225)));

        for (track, original) in tracks.iter().zip(&raw) {
            assert_eq!(&serde_json::to_value(track).unwrap(), original);
        }
    }

    #[test]
    fn object_ids_are_carried_opaquely() {
        let track: Track =
            serde_json::from_value(json!({"id": {"bvid": "BV1"}, "title": "T", "artist": "A"}))
                .unwrap();
        assert_eq!(track.id, None);
        assert_eq!(track.dedup_key(), Some(TrackKey::TitleArtist("T".into(), "A".into())));
        assert_eq!(serde_json::to_value(&track).unwrap()["id"]["bvid"], "BV1");
    }

    #[test]
    fn dedup_prefers_id_then_title_artist() {
        let tracks = vec![
            Track::new("Song", "Artist").with_id(7u64),
            Track::new("Song (live)", "Artist").with_id("7"),
            Track::new("Other", "Artist"),
            Track::new("Other", "Artist"),
            Track::new("", ""),
            Track::new("", ""),
        ];
        let deduped = dedupe_tracks(tracks);
        let titles: Vec<_> = deduped.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Song", "Other", "", ""]);
    }

    #[test]
    fn search_query_skips_empty_parts() {
        assert_eq!(
            Track::new("Title", "Artist").search_query().as_deref(),
            Some("Title Artist")
        );
        assert_eq!(Track::new("Title", " ").search_query().as_deref(), Some("Title"));
        assert_eq!(Track::new("", "").search_query(), None);
    }

    #[test]
    fn declared_headers_require_proxy() {
        assert!(!MediaStreamDescriptor::new("https://cdn/a.mp3").requires_proxy());
        let with_headers =
            MediaStreamDescriptor::new("https://cdn/a.m4a").with_header("referer", "https://x/");
        assert!(with_headers.requires_proxy());

        let empty: MediaStreamDescriptor =
            serde_json::from_value(json!({"url": "https://cdn/a.m4a", "headers": {}})).unwrap();
        assert!(empty.requires_proxy());
    }

    #[test]
    fn numeric_ids_are_detected() {
        assert!(TrackId::from(12345u64).is_numeric());
        assert!(!TrackId::new("004Z8Ihr0JIu5s").is_numeric());
        assert!(TrackId::new("98765").is_numeric());
    }
}
