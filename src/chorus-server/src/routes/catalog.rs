//! Provider listing and search.

use axum::extract::{Query, State};
use axum::Json;
use chorus_core::models::{SearchKind, Track};
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::ApiError;

/// GET /api/plugins and /api/platforms: loaded provider ids in load order.
pub async fn list_plugins(State(ctx): State<AppContext>) -> Json<Vec<String>> {
    Json(ctx.registry.ids())
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub source: Option<String>,
    /// Kept as text so a malformed page is a JSON 400 like every other
    /// validation failure.
    pub page: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// GET /api/search?query&source&page&type
pub async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Track>>, ApiError> {
    let source = params
        .source
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Plugin not found or not specified".into()))?;
    let page = parse_page(params.page.as_deref())?;
    let kind = match params.kind.as_deref() {
        None | Some("") => SearchKind::default(),
        Some(kind) => kind.parse().map_err(ApiError::BadRequest)?,
    };

    let tracks = ctx.search.search(&source, &params.query, page, kind).await?;
    Ok(Json(tracks))
}

fn parse_page(raw: Option<&str>) -> Result<u32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(1),
        Some(raw) => raw,
    };
    let page: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("page must be a number, got {raw:?}")))?;
    if page < 1 {
        return Err(ApiError::BadRequest(format!("page must be >= 1, got {page}")));
    }
    u32::try_from(page).map_err(|_| ApiError::BadRequest("page is too large".into()))
}
