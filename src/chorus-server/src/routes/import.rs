use axum::extract::{Query, State};
use axum::Json;
use chorus_core::models::PlaylistImportResult;
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    pub url: Option<String>,
    pub source: Option<String>,
}

/// GET /api/import?url&source
pub async fn import(
    State(ctx): State<AppContext>,
    Query(params): Query<ImportParams>,
) -> Result<Json<PlaylistImportResult>, ApiError> {
    let url = params
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing url".into()))?;
    let filter = params.source.as_deref().filter(|s| !s.is_empty());
    let result = ctx.importer.import(&url, filter).await?;
    Ok(Json(result))
}
