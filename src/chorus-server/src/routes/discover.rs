//! Recommendation playlists and similar-song mixes.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::mix::MixRequest;
use crate::recommend::{Playlist, RecommendResponse};

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    pub refresh: Option<String>,
}

/// GET /api/recommendPlaylists?refresh
///
/// Queries and pages are drawn at random on every call, so `refresh` only
/// shows up in the logs.
pub async fn recommend_playlists(
    State(ctx): State<AppContext>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    tracing::debug!(refresh = params.refresh.is_some(), "Building recommend playlists");
    Ok(Json(ctx.recommender.recommend().await?))
}

/// POST /api/mix
pub async fn mix(
    State(ctx): State<AppContext>,
    Json(request): Json<MixRequest>,
) -> Result<Json<Playlist>, ApiError> {
    Ok(Json(ctx.mixer.build(request).await?))
}
