//! Thin HTTP client for a running chorus server.

use chorus_core::models::{PlaylistImportResult, SearchKind, Track};
use chorus_core::playback::PlaybackGate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct PlayBody {
    url: String,
}

#[derive(Debug, Deserialize)]
struct LyricBody {
    lrc: Option<String>,
}

pub struct ChorusClient {
    base: String,
    http: reqwest::Client,
    playback: PlaybackGate,
}

impl ChorusClient {
    pub fn new(base: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
            playback: PlaybackGate::new(),
        })
    }

    pub async fn providers(&self) -> Result<Vec<String>, ClientError> {
        decode(self.http.get(self.url("/api/plugins")).send().await?).await
    }

    pub async fn search(
        &self,
        source: &str,
        query: &str,
        page: u32,
        kind: SearchKind,
    ) -> Result<Vec<Track>, ClientError> {
        let request = self.http.get(self.url("/api/search")).query(&[
            ("query", query),
            ("source", source),
            ("page", &page.to_string()),
            ("type", kind.as_str()),
        ]);
        decode(request.send().await?).await
    }

    /// Resolve a playable URL. Returns `Ok(None)` when a later `play` call
    /// was issued before this one completed.
    pub async fn play(&self, source: &str, track: &Track) -> Result<Option<String>, ClientError> {
        let token = self.playback.begin();
        let response = self
            .http
            .post(self.url("/api/play"))
            .json(&json!({"source": source, "musicItem": track}))
            .send()
            .await?;
        let body: PlayBody = decode(response).await?;
        Ok(self.playback.accept(token, self.absolute(&body.url)))
    }

    pub async fn lyric(&self, source: &str, track: &Track) -> Result<Option<String>, ClientError> {
        let response = self
            .http
            .post(self.url("/api/lyric"))
            .json(&json!({"source": source, "musicItem": track}))
            .send()
            .await?;
        let body: LyricBody = decode(response).await?;
        Ok(body.lrc)
    }

    pub async fn import(
        &self,
        url: &str,
        source: Option<&str>,
    ) -> Result<PlaylistImportResult, ClientError> {
        let mut params = vec![("url", url)];
        if let Some(source) = source {
            params.push(("source", source));
        }
        decode(
            self.http
                .get(self.url("/api/import"))
                .query(&params)
                .send()
                .await?,
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Proxy references are server-relative.
    fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            self.url(url)
        } else {
            url.to_string()
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse a track given on the command line as a JSON object.
pub fn parse_track(raw: &str) -> Result<Track, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    serde_json::from_value(value)
}
