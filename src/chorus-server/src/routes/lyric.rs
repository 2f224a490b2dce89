use axum::extract::State;
use axum::Json;
use chorus_core::lyric::LyricDocument;
use chorus_core::models::Track;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LyricRequest {
    pub source: String,
    #[serde(rename = "musicItem", default)]
    pub music_item: Option<Track>,
}

#[derive(Debug, Serialize)]
pub struct LyricResponse {
    pub lrc: Option<String>,
}

/// POST /api/lyric {source, musicItem} -> {lrc}
pub async fn lyric(
    State(ctx): State<AppContext>,
    Json(request): Json<LyricRequest>,
) -> Result<Json<LyricResponse>, ApiError> {
    let track = request
        .music_item
        .unwrap_or_else(|| Track::new("", ""));
    let lyric = ctx.lyrics.resolve(&request.source, &track).await?;
    Ok(Json(LyricResponse {
        lrc: lyric.map(LyricDocument::into_text),
    }))
}
