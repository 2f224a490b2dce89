//! Route handlers for the HTTP API, mounted under `/api`.

pub mod catalog;
pub mod discover;
pub mod import;
pub mod lyric;
pub mod playback;

use axum::routing::{get, post};
use axum::Router;

use crate::context::AppContext;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/plugins", get(catalog::list_plugins))
        .route("/platforms", get(catalog::list_plugins))
        .route("/search", get(catalog::search))
        .route("/play", post(playback::play))
        .route("/proxy", get(playback::proxy))
        .route("/lyric", post(lyric::lyric))
        .route("/import", get(import::import))
        .route("/recommendPlaylists", get(discover::recommend_playlists))
        .route("/mix", post(discover::mix))
}
