use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::{Extension, Form};
use tracing::instrument;

use crate::AppState;
use crate::db::{BlogExt, RatingExt};
use crate::dtos::{RateErrorDto, RateFormDto, RateResponseDto};
use crate::error::{ErrorMessage, HttpError};
use crate::handler::blog::published_blog;
use crate::middleware::JWTAuthMiddleware;
use crate::models::User;

pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 6;

const INVALID_SCORE: &str = "Invalid rating score";

/// Missing score counts as 0; anything that is not an integer in
/// `MIN_SCORE..=MAX_SCORE` is rejected
pub fn parse_score(raw: Option<&str>) -> Option<i32> {
    let score = match raw {
        None => 0,
        Some(raw) => raw.trim().parse::<i32>().ok()?,
    };
    (MIN_SCORE..=MAX_SCORE).contains(&score).then_some(score)
}

/// Upsert the user's score and report the blog's new aggregate
pub async fn rate_process<S: BlogExt + RatingExt>(
    store: &S,
    user: &User,
    blog_id: i64,
    score: i32,
) -> Result<RateResponseDto, HttpError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(HttpError::bad_request(INVALID_SCORE));
    }

    let rating = store
        .upsert_rating(blog_id, user.id, score)
        .await
        .map_err(|e| {
            tracing::error!("DB error, saving rating: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let stats = store.get_rating_stats(blog_id).await.map_err(|e| {
        tracing::error!("DB error, getting rating stats: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    Ok(RateResponseDto {
        success: true,
        average_rating: stats.average,
        rating_count: stats.count,
        user_rating: rating.score,
    })
}

#[instrument(skip(app_state, jwt, body), fields(user_id = %jwt.user.id))]
pub async fn rate_blog(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Form(body): Form<RateFormDto>,
) -> Result<Response, HttpError> {
    let blog = published_blog(&app_state.db_client, &slug).await?;

    let Some(score) = parse_score(body.score.as_deref()) else {
        tracing::warn!(raw = ?body.score, "Rejected rating score");
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(RateErrorDto {
                error: INVALID_SCORE.to_string(),
            }),
        )
            .into_response());
    };

    let response = rate_process(&app_state.db_client, &jwt.user, blog.id, score).await?;

    tracing::info!(blog_id = blog.id, score, "Blog rated");
    Ok(Json(response).into_response())
}
