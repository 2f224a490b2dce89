//! Media source resolution and the stream proxy.

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use chorus_core::models::Track;
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::proxy::PlayResponse;

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub source: String,
    #[serde(rename = "musicItem")]
    pub music_item: Track,
}

/// POST /api/play {source, musicItem} -> {url}
pub async fn play(
    State(ctx): State<AppContext>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let response = ctx.proxy.play(&request.source, &request.music_item).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
}

/// GET /api/proxy?url
pub async fn proxy(
    State(ctx): State<AppContext>,
    Query(params): Query<ProxyParams>,
) -> Result<Response, ApiError> {
    let url = params
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing URL".into()))?;
    ctx.proxy.stream(&url).await
}
