use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Router, middleware};
use tracing::instrument;
use validator::Validate;

use crate::AppState;
use crate::db::{CategoryExt, is_unique_violation};
use crate::dtos::{CategoryInputDto, CategoryListResponseDto, CategoryResponseDto, Response};
use crate::error::{ErrorMessage, HttpError};
use crate::middleware::{auth, role_check};
use crate::models::{Category, UserRole};

/// Category routes. Listing is public, changes are admin-only.
pub fn category_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/categories/", get(list_categories))
        .merge(
            Router::new()
                .route("/categories/", post(create_category))
                .route("/categories/{category_id}/edit/", post(update_category))
                .route("/categories/{category_id}/delete/", post(delete_category))
                .route_layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .route_layer(middleware::from_fn_with_state(app_state, auth)),
        )
}

fn map_write_error(e: sqlx::Error) -> HttpError {
    match e {
        sqlx::Error::RowNotFound => {
            HttpError::not_found(ErrorMessage::CategoryNotFound.to_string())
        }
        e if is_unique_violation(&e) => {
            let mut err = HttpError::field("name", "A category with this name already exists.");
            err.status = StatusCode::CONFLICT;
            err
        }
        e => {
            tracing::error!("DB error, writing category: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        }
    }
}

pub async fn create_process<S: CategoryExt>(
    store: &S,
    body: CategoryInputDto,
) -> Result<Category, HttpError> {
    let body = body.trimmed();
    body.validate()?;
    store
        .create_category(&body.name, &body.description)
        .await
        .map_err(map_write_error)
}

pub async fn update_process<S: CategoryExt>(
    store: &S,
    category_id: i64,
    body: CategoryInputDto,
) -> Result<Category, HttpError> {
    let body = body.trimmed();
    body.validate()?;
    store
        .update_category(category_id, &body.name, &body.description)
        .await
        .map_err(map_write_error)
}

pub async fn list_categories(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let categories = app_state.db_client.get_categories().await.map_err(|e| {
        tracing::error!("DB error, listing categories: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    Ok(Json(CategoryListResponseDto {
        status: "success".to_string(),
        data: categories,
    }))
}

#[instrument(skip(app_state, body))]
pub async fn create_category(
    State(app_state): State<AppState>,
    Json(body): Json<CategoryInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let category = create_process(&app_state.db_client, body).await?;

    tracing::info!(category_id = category.id, "Category created");
    Ok((
        StatusCode::CREATED,
        Json(CategoryResponseDto {
            status: "success".to_string(),
            data: category,
        }),
    ))
}

#[instrument(skip(app_state, body))]
pub async fn update_category(
    Path(category_id): Path<i64>,
    State(app_state): State<AppState>,
    Json(body): Json<CategoryInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let category = update_process(&app_state.db_client, category_id, body).await?;

    Ok(Json(CategoryResponseDto {
        status: "success".to_string(),
        data: category,
    }))
}

#[instrument(skip(app_state))]
pub async fn delete_category(
    Path(category_id): Path<i64>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .delete_category(category_id)
        .await
        .map_err(map_write_error)?;

    tracing::info!("Category deleted");
    Ok(Json(Response::success("Category deleted.")))
}
