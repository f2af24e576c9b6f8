use axum::{Router, extract::DefaultBodyLimit};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    AppState,
    handler::{accounts::accounts_handler, blog::blog_handler, category::category_handler},
    utils::media::MAX_UPLOAD_BYTES,
};

/// Room for one maximum-size image plus the rest of the form
const MAX_REQUEST_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    let media = ServeDir::new(&app_state.env.media_root);

    Router::new()
        .merge(blog_handler(app_state.clone()))
        .merge(category_handler(app_state.clone()))
        .nest("/accounts", accounts_handler(app_state.clone()))
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
