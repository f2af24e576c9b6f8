use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::IntoResponse,
};

use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    db::UserExt,
    error::{ErrorMessage, HttpError},
    models::{User, UserRole},
    utils::token,
};

/// Authenticated user, inserted into the request extensions by `auth`
/// (always) and `optional_auth` (when a valid token is present).
///
/// ```ignore
/// async fn my_handler(Extension(auth): Extension<JWTAuthMiddleware>) {
///     // auth.user
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddleware {
    pub user: User,
}

/// Access token from the `access_token` cookie, falling back to an
/// `Authorization: Bearer <token>` header
pub fn extract_token(cookie_jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    cookie_jar
        .get("access_token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|auth_header| auth_header.to_str().ok())
                .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
                .map(str::to_owned)
        })
}

/// Decode the token and load its user. Deleted or deactivated accounts are
/// rejected even while their token is still valid.
pub async fn resolve_user<S: UserExt>(
    store: &S,
    token: &str,
    secret: &[u8],
) -> Result<User, HttpError> {
    let token_details = token::decode_token(token, secret)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    let user_id = uuid::Uuid::parse_str(&token_details)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    let user = store
        .get_user(Some(user_id), None, None, None)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user for token: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    if !user.is_active {
        return Err(HttpError::unauthorized(
            ErrorMessage::InactiveAccount.to_string(),
        ));
    }

    Ok(user)
}

/// Authentication middleware for login-required routes
///
/// # Errors
/// Returns 401 Unauthorized if:
/// - No token is provided
/// - Token is invalid or expired
/// - User no longer exists or is inactive
pub async fn auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = extract_token(&cookie_jar, req.headers())
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let user = resolve_user(
        &app_state.db_client,
        &token,
        app_state.env.jwt_secret.as_bytes(),
    )
    .await?;

    req.extensions_mut().insert(JWTAuthMiddleware { user });

    Ok(next.run(req).await)
}

/// Like `auth`, but anonymous requests (or stale tokens) pass through
/// without a user attached
pub async fn optional_auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> impl IntoResponse {
    if let Some(token) = extract_token(&cookie_jar, req.headers()) {
        match resolve_user(
            &app_state.db_client,
            &token,
            app_state.env.jwt_secret.as_bytes(),
        )
        .await
        {
            Ok(user) => {
                req.extensions_mut().insert(JWTAuthMiddleware { user });
            }
            Err(e) => tracing::debug!("Ignoring unusable token: {}", e),
        }
    }

    next.run(req).await
}

/// Role-based access control middleware, layered after `auth`
///
/// # Errors
/// Returns 401 if user is not authenticated
/// Returns 403 if user doesn't have any of the required roles
pub async fn role_check(
    req: Request,
    next: Next,
    required_roles: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let user = req
        .extensions()
        .get::<JWTAuthMiddleware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&user.user.role) {
        return Err(HttpError::forbidden(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use axum::{Extension, Router, middleware};
    use axum_extra::extract::cookie::Cookie;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn cookie_wins_over_bearer_header() {
        let jar = CookieJar::new().add(Cookie::new("access_token", "from-cookie"));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(extract_token(&jar, &headers).as_deref(), Some("from-cookie"));
        assert_eq!(
            extract_token(&CookieJar::new(), &headers).as_deref(),
            Some("from-header")
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&CookieJar::new(), &headers), None);
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let store = MemoryStore::new();
        let user = store.add_user("ada", UserRole::Author);
        let token = token::create_token(&user.id.to_string(), SECRET, 60).unwrap();

        let resolved = resolve_user(&store, &token, SECRET).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn unknown_user_and_bad_token_are_unauthorized() {
        let store = MemoryStore::new();
        let token = token::create_token(&uuid::Uuid::new_v4().to_string(), SECRET, 60).unwrap();

        let err = resolve_user(&store, &token, SECRET).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, ErrorMessage::UserNoLongerExist.to_string());

        let err = resolve_user(&store, "garbage", SECRET).await.unwrap_err();
        assert_eq!(err.message, ErrorMessage::InvalidToken.to_string());
    }

    fn admin_only(user: Option<User>) -> Router {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![UserRole::Admin])
            }));
        match user {
            Some(user) => router.layer(Extension(JWTAuthMiddleware { user })),
            None => router,
        }
    }

    async fn status_for(router: Router) -> StatusCode {
        router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn role_check_gates_on_role() {
        let store = MemoryStore::new();
        let admin = store.add_user("root", UserRole::Admin);
        let author = store.add_user("ada", UserRole::Author);

        assert_eq!(status_for(admin_only(Some(admin))).await, StatusCode::OK);
        assert_eq!(
            status_for(admin_only(Some(author))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(admin_only(None)).await, StatusCode::UNAUTHORIZED);
    }
}
