use axum::Extension;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use tracing::instrument;

use crate::AppState;
use crate::db::{BlogExt, FavoriteExt};
use crate::dtos::FavoriteToggleResponseDto;
use crate::error::{ErrorMessage, HttpError};
use crate::handler::blog::published_blog;
use crate::mail::{Mailer, mails::send_favorite_email};
use crate::middleware::JWTAuthMiddleware;
use crate::models::User;

/// Flip the favorite for (user, blog). Adding one mails the user; a failed
/// mail is logged and otherwise ignored.
pub async fn toggle_process<S: BlogExt + FavoriteExt>(
    store: &S,
    mailer: &Mailer,
    site_url: &str,
    user: &User,
    slug: &str,
) -> Result<FavoriteToggleResponseDto, HttpError> {
    let blog = published_blog(store, slug).await?;

    let is_favorited = store.toggle_favorite(user.id, blog.id).await.map_err(|e| {
        tracing::error!("DB error, toggling favorite: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    if !is_favorited {
        return Ok(FavoriteToggleResponseDto {
            is_favorited,
            message: "Removed from favorites".to_string(),
        });
    }

    let author_name = match store.get_blog_item(blog.id).await {
        Ok(Some(item)) => item.author_name,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!("DB error, getting blog author for mail: {}", e);
            String::new()
        }
    };

    if let Err(e) = send_favorite_email(
        mailer,
        &user.email,
        &user.full_name(),
        &blog.title,
        &author_name,
        site_url,
    )
    .await
    {
        tracing::warn!(user_id = %user.id, blog_id = blog.id, "Failed to send favorite email: {}", e);
    }

    Ok(FavoriteToggleResponseDto {
        is_favorited,
        message: "Added to favorites".to_string(),
    })
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn toggle_favorite(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let response = toggle_process(
        &app_state.db_client,
        &app_state.mailer,
        &app_state.env.site_url,
        &jwt.user,
        &slug,
    )
    .await?;

    tracing::info!(is_favorited = response.is_favorited, "Favorite toggled");
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::{BlogStatus, UserRole};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn toggling_twice_leaves_no_favorite() {
        let store = MemoryStore::new();
        let (mailer, sent) = Mailer::outbox();
        let ada = store.add_user("ada", UserRole::Author);
        let bob = store.add_user("bob", UserRole::Reader);
        store.add_blog(&ada, "Ownership", "body", "ownership");

        let first = toggle_process(&store, &mailer, "http://site", &bob, "ownership")
            .await
            .unwrap();
        assert!(first.is_favorited);
        assert_eq!(first.message, "Added to favorites");
        assert_eq!(store.favorites().len(), 1);

        let second = toggle_process(&store, &mailer, "http://site", &bob, "ownership")
            .await
            .unwrap();
        assert!(!second.is_favorited);
        assert_eq!(second.message, "Removed from favorites");
        assert!(store.favorites().is_empty());

        // Only the add sends mail
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@example.com");
        assert_eq!(sent[0].subject, "You favorited: Ownership");
    }

    #[tokio::test]
    async fn mail_failure_does_not_undo_the_favorite() {
        let store = MemoryStore::new();
        let ada = store.add_user("ada", UserRole::Author);
        let bob = store.add_user("bob", UserRole::Reader);
        store.add_blog(&ada, "Ownership", "body", "ownership");

        let response = toggle_process(&store, &Mailer::failing(), "http://site", &bob, "ownership")
            .await
            .unwrap();
        assert!(response.is_favorited);
        assert_eq!(store.favorites().len(), 1);
    }

    #[tokio::test]
    async fn drafts_cannot_be_favorited() {
        let store = MemoryStore::new();
        let (mailer, _) = Mailer::outbox();
        let ada = store.add_user("ada", UserRole::Author);
        let blog = store.add_blog(&ada, "Draft", "body", "draft");
        store.set_status(blog.id, BlogStatus::Draft);

        let err = toggle_process(&store, &mailer, "http://site", &ada, "draft")
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(store.favorites().is_empty());
    }
}
