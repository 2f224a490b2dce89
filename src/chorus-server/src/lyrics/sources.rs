//! HTTP lyric sources outside the plugin contract.

use chorus_core::config::LyricsConfig;
use chorus_core::models::{Track, TrackId};
use serde::Deserialize;
use serde_json::Value;

/// Clients for the id-keyed lookup, the title+artist API and the streaming
/// API's search-then-lyric flow.
#[derive(Debug, Clone)]
pub struct RemoteLyricSources {
    client: reqwest::Client,
    id_lookup_url: String,
    title_artist_url: String,
    streaming_api_url: String,
}

#[derive(Debug, Deserialize)]
struct IdLookupResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamingSearch {
    #[serde(default)]
    result: Option<StreamingSearchResult>,
}

#[derive(Debug, Deserialize)]
struct StreamingSearchResult {
    #[serde(default)]
    songs: Vec<StreamingSong>,
}

#[derive(Debug, Deserialize)]
struct StreamingSong {
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamingLyric {
    #[serde(default)]
    lrc: Option<LyricBlock>,
    #[serde(default)]
    klyric: Option<LyricBlock>,
    #[serde(default)]
    yrc: Option<LyricBlock>,
}

#[derive(Debug, Deserialize)]
struct LyricBlock {
    #[serde(default)]
    lyric: Option<String>,
}

impl RemoteLyricSources {
    pub fn new(client: reqwest::Client, config: &LyricsConfig) -> Self {
        Self {
            client,
            id_lookup_url: config.id_lookup_url.clone(),
            title_artist_url: base(&config.title_artist_url),
            streaming_api_url: base(&config.streaming_api_url),
        }
    }

    /// `GET <id_lookup_url>?id=<id>`; a hit is `{"code": 1, "message": "<lrc>"}`.
    pub async fn by_id(&self, id: &TrackId) -> Result<Option<String>, reqwest::Error> {
        let body: IdLookupResponse = self
            .client
            .get(&self.id_lookup_url)
            .query(&[("id", id.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(match (body.code, body.message) {
            (Some(1), Some(Value::String(text))) => Some(text),
            _ => None,
        })
    }

    /// `GET <title_artist_url>/single?title=..&artist=..`. Only a plain text
    /// body counts; structured JSON answers are "not found" responses.
    pub async fn by_title_artist(&self, track: &Track) -> Result<Option<String>, reqwest::Error> {
        if track.title.is_empty() && track.artist.is_empty() {
            return Ok(None);
        }
        let body = self
            .client
            .get(format!("{}/single", self.title_artist_url))
            .query(&[("title", track.title.as_str()), ("artist", track.artist.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        if serde_json::from_str::<Value>(&body).is_ok_and(|v| !v.is_string()) {
            return Ok(None);
        }
        Ok(Some(body))
    }

    /// Search the streaming API by "title artist", then fetch the first
    /// hit's lyric: `lrc`, else `klyric`, else `yrc`.
    pub async fn by_streaming_search(&self, track: &Track) -> Result<Option<String>, reqwest::Error> {
        let Some(keywords) = track.search_query() else {
            return Ok(None);
        };
        let search: StreamingSearch = self
            .client
            .get(format!("{}/search", self.streaming_api_url))
            .query(&[("keywords", keywords.as_str()), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let song_id = search
            .result
            .and_then(|r| r.songs.into_iter().next())
            .and_then(|song| song.id)
            .and_then(|id| match id {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            });
        let Some(song_id) = song_id else {
            return Ok(None);
        };

        let lyric: StreamingLyric = self
            .client
            .get(format!("{}/lyric", self.streaming_api_url))
            .query(&[("id", song_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok([lyric.lrc, lyric.klyric, lyric.yrc]
            .into_iter()
            .flatten()
            .find_map(|block| block.lyric))
    }
}

fn base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sources(server: &MockServer) -> RemoteLyricSources {
        let config = LyricsConfig {
            id_lookup_url: format!("{}/QQMusicLyric", server.uri()),
            title_artist_url: format!("{}/lyrics/", server.uri()),
            streaming_api_url: server.uri(),
            ..LyricsConfig::default()
        };
        RemoteLyricSources::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn id_lookup_requires_code_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/QQMusicLyric"))
            .and(query_param("id", "42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 1, "message": "[00:01.00]hi"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/QQMusicLyric"))
            .and(query_param("id", "7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "message": "not found"})),
            )
            .mount(&server)
            .await;

        let sources = sources(&server);
        assert_eq!(
            sources.by_id(&TrackId::from(42)).await.unwrap().as_deref(),
            Some("[00:01.00]hi")
        );
        assert_eq!(sources.by_id(&TrackId::from(7)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn title_artist_accepts_only_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lyrics/single"))
            .and(query_param("title", "Song"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[00:02.00]line"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lyrics/single"))
            .and(query_param("title", "Missing"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "none"})),
            )
            .mount(&server)
            .await;

        let sources = sources(&server);
        assert_eq!(
            sources
                .by_title_artist(&Track::new("Song", "Singer"))
                .await
                .unwrap()
                .as_deref(),
            Some("[00:02.00]line")
        );
        assert_eq!(
            sources
                .by_title_artist(&Track::new("Missing", "Singer"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(sources.by_title_artist(&Track::new("", "")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn streaming_search_falls_back_through_lyric_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("keywords", "Song Singer"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"result": {"songs": [{"id": 186016, "name": "Song"}]}}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/lyric"))
            .and(query_param("id", "186016"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"klyric": {"lyric": "[00:03.00]k"}, "yrc": {"lyric": "y"}}),
            ))
            .mount(&server)
            .await;

        let text = sources(&server)
            .by_streaming_search(&Track::new("Song", "Singer"))
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("[00:03.00]k"));
    }

    #[tokio::test]
    async fn streaming_search_without_songs_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {}})))
            .mount(&server)
            .await;

        let text = sources(&server)
            .by_streaming_search(&Track::new("Song", "Singer"))
            .await
            .unwrap();
        assert_eq!(text, None);
    }
}
