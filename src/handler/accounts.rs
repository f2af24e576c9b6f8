use crate::{
    AppState,
    config::AdminConfig,
    db::{FavoriteExt, NewUser, ProfileChanges, UserExt, is_unique_violation},
    dtos::{
        AuthorDetailResponseDto, AuthorDto, ChoiceDto, FavoriteListResponseDto, FilterUserDto,
        LoginFormResponseDto, LoginUserDto, ProfileFormResponseDto, ProfileResponseDto,
        ProfileUpdateDto, RefreshResponseDto, RegisterFormResponseDto, RegisterUserDto, Response,
        UserLoginResponseDto,
    },
    error::{ErrorMessage, HttpError},
    handler::blog::published_by_author,
    mail::{Mailer, mails::send_verification_email},
    middleware::{JWTAuthMiddleware, auth},
    models::{User, UserRole},
    redisdb::attempts_exceeded,
    utils::{
        media::{
            FormData, PROFILE_PICTURES_DIR, UploadedFile, remove_image, save_image,
            validate_image,
        },
        password, token,
    },
};
use axum::{
    Extension, Form, Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_client_ip::ClientIp;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::instrument;
use validator::Validate;

/// Router for `/accounts`
pub fn accounts_handler(app_state: AppState) -> Router<AppState> {
    let login_required = middleware::from_fn_with_state(app_state.clone(), auth);

    Router::new()
        .route("/register/", get(register_form).post(register))
        .route("/verify-email/{token}/", get(verify_email))
        .route(
            "/login/",
            get(login_form)
                .post(login)
                .layer(app_state.ip_extraction.clone().into_extension()),
        )
        .route("/refresh/", post(refresh))
        .route("/author/{username}/", get(author_detail))
        .merge(
            Router::new()
                .route("/logout/", post(logout))
                .route("/profile/", get(profile))
                .route("/profile/update/", get(profile_form).post(profile_update))
                .route("/favorites/", get(favorites))
                .route_layer(login_required),
        )
}

fn conflict(field: &str, message: &str) -> HttpError {
    let mut err = HttpError::field(field, message);
    err.status = StatusCode::CONFLICT;
    err
}

fn map_db_error(context: &str, e: sqlx::Error) -> HttpError {
    tracing::error!("DB error, {}: {}", context, e);
    HttpError::server_error(ErrorMessage::ServerError.to_string())
}

fn build_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .max_age(time::Duration::ZERO)
        .build()
}

// ============================================================================
// Registration & verification
// ============================================================================

/// Create an inactive, unverified account and mail its verification link.
/// A mail failure is reported as a server error; the account stays
/// unverified.
pub async fn register_process<S: UserExt>(
    store: &S,
    mailer: &Mailer,
    site_url: &str,
    body: RegisterUserDto,
) -> Result<User, HttpError> {
    body.validate()?;

    if store
        .get_user(None, Some(&body.username), None, None)
        .await
        .map_err(|e| map_db_error("checking username", e))?
        .is_some()
    {
        return Err(conflict(
            "username",
            "A user with that username already exists.",
        ));
    }

    if store
        .get_user(None, None, Some(&body.email), None)
        .await
        .map_err(|e| map_db_error("checking email", e))?
        .is_some()
    {
        return Err(conflict("email", "User with this Email already exists."));
    }

    let password_hash = password::hash(&body.password1).map_err(|e| {
        tracing::error!("Password hashing error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let verification_token = token::generate_verification_token();

    let user = store
        .save_user(NewUser {
            username: body.username,
            email: body.email,
            password_hash,
            first_name: body.first_name,
            last_name: body.last_name,
            role: body.role.unwrap_or_default(),
            is_active: false,
            is_email_verified: false,
            verification_token: Some(verification_token.clone()),
        })
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                tracing::error!("DB error, saving user, unique_violation: {}", e);
                HttpError::unique_constraint_violation("Username or email already exists")
            } else {
                map_db_error("saving user", e)
            }
        })?;

    send_verification_email(
        mailer,
        &user.email,
        &user.full_name(),
        &verification_token,
        site_url,
    )
    .await
    .map_err(|e| {
        tracing::error!(user_id = %user.id, "Failed to send verification email: {}", e);
        HttpError::server_error("Failed to send verification email")
    })?;

    Ok(user)
}

/// Create the configured admin account on startup unless the username is
/// already taken. Returns the new admin, if one was created.
pub async fn ensure_admin<S: UserExt>(
    store: &S,
    admin: &AdminConfig,
) -> Result<Option<User>, HttpError> {
    if store
        .get_user(None, Some(&admin.username), None, None)
        .await
        .map_err(|e| map_db_error("checking admin", e))?
        .is_some()
    {
        return Ok(None);
    }

    let password_hash = password::hash(&admin.password).map_err(|e| {
        tracing::error!("Password hashing error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let user = store
        .save_user(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            role: UserRole::Admin,
            is_active: true,
            is_email_verified: true,
            verification_token: None,
        })
        .await
        .map_err(|e| map_db_error("saving admin", e))?;

    Ok(Some(user))
}

pub async fn register_form() -> impl IntoResponse {
    Json(RegisterFormResponseDto {
        status: "success".to_string(),
        roles: [UserRole::Reader, UserRole::Author]
            .iter()
            .map(|role| ChoiceDto {
                value: role.to_str().to_string(),
                label: match role {
                    UserRole::Author => "Author".to_string(),
                    _ => "Reader".to_string(),
                },
            })
            .collect(),
    })
}

#[instrument(skip(app_state, body), fields(username = %body.username, email = %body.email))]
pub async fn register(
    State(app_state): State<AppState>,
    Form(body): Form<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    let user = register_process(
        &app_state.db_client,
        &app_state.mailer,
        &app_state.env.site_url,
        body,
    )
    .await?;

    tracing::info!(user_id = %user.id, "Register Successful");
    Ok((
        StatusCode::CREATED,
        Json(
            Response::success(
                "Registration successful! Please check your email to verify your account.",
            )
            .redirect_to("/accounts/login/"),
        ),
    ))
}

#[instrument(skip(app_state, token))]
pub async fn verify_email(
    Path(token): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let verified = app_state
        .db_client
        .verify_email_token(&token)
        .await
        .map_err(|e| map_db_error("verifying email token", e))?;

    match verified {
        Some(user) => {
            tracing::info!(user_id = %user.id, "Email verification successful");
            Ok((
                StatusCode::OK,
                Json(
                    Response::success("Email verified successfully! You can now login.")
                        .redirect_to("/accounts/login/"),
                ),
            ))
        }
        None => {
            tracing::warn!("Unknown or used verification token");
            Ok((
                StatusCode::BAD_REQUEST,
                Json(Response {
                    status: "fail",
                    message: ErrorMessage::InvalidVerificationToken.to_string(),
                    redirect: Some("/accounts/register/".to_string()),
                }),
            ))
        }
    }
}

// ============================================================================
// Login / logout / refresh
// ============================================================================

/// Check credentials. Username or email both identify the account.
pub async fn login_process<S: UserExt>(store: &S, body: &LoginUserDto) -> Result<User, HttpError> {
    body.validate()?;

    // Usernames may contain '@', so an unknown email still gets a
    // username lookup
    let mut user = None;
    if body.identifier.contains('@') {
        user = store
            .get_user(None, None, Some(&body.identifier), None)
            .await
            .map_err(|e| map_db_error("getting user by email", e))?;
    }
    if user.is_none() {
        user = store
            .get_user(None, Some(&body.identifier), None, None)
            .await
            .map_err(|e| map_db_error("getting user", e))?;
    }

    let user = user.ok_or_else(|| {
        tracing::warn!("User not found");
        HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string())
    })?;

    let password_matched = password::compare(&body.password, &user.password).map_err(|e| {
        tracing::warn!("Password error: {}", e);
        HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string())
    })?;

    if !password_matched {
        tracing::warn!(user_id = %user.id, "password mismatch");
        return Err(HttpError::unauthorized(
            ErrorMessage::WrongCredentials.to_string(),
        ));
    }

    if !user.is_email_verified {
        return Err(HttpError::forbidden(
            ErrorMessage::EmailNotVerified.to_string(),
        ));
    }

    if !user.is_active {
        return Err(HttpError::forbidden(
            ErrorMessage::InactiveAccount.to_string(),
        ));
    }

    Ok(user)
}

pub async fn login_form() -> impl IntoResponse {
    Json(LoginFormResponseDto {
        status: "success".to_string(),
        fields: vec!["identifier".to_string(), "password".to_string()],
    })
}

/// Login with rate limiting (100 failures per IP per day, 10 per identifier
/// per hour)
#[instrument(skip(app_state, body, cookie_jar), fields(identifier = %body.identifier))]
pub async fn login(
    ClientIp(ip): ClientIp,
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    Form(body): Form<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    let ip_attempts = app_state
        .redis_client
        .get_ip_attempts(ip)
        .await
        .map_err(|e| {
            tracing::error!("RedisDB error, getting ip attempts: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .unwrap_or(0);

    let identifier_ip_attempts = app_state
        .redis_client
        .get_identifier_ip_attempts(ip, &body.identifier)
        .await
        .map_err(|e| {
            tracing::error!("RedisDB error, getting identifier+ip attempts: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .unwrap_or(0);

    if attempts_exceeded(ip_attempts, identifier_ip_attempts) {
        tracing::warn!(ip = %ip, "Login attempt exceeded the limit");
        return Err(HttpError::new(
            ErrorMessage::TooManyLoginAttempts.to_string(),
            StatusCode::TOO_MANY_REQUESTS,
        ));
    }

    let user = match login_process(&app_state.db_client, &body).await {
        Ok(user) => user,
        Err(e) => {
            if e.status == StatusCode::UNAUTHORIZED {
                if let Err(e) = app_state
                    .redis_client
                    .increment_attempts(ip, &body.identifier)
                    .await
                {
                    tracing::warn!("Failed to increment the rate {:?}", e);
                }
            }
            return Err(e);
        }
    };

    if let Err(e) = app_state
        .redis_client
        .delete_identifier_ip_attempts(ip, &body.identifier)
        .await
    {
        tracing::warn!("Failed to clear rate limit: {:?}", e);
    }

    let secret = app_state.env.jwt_secret.as_bytes();
    let access_token = token::create_token(&user.id.to_string(), secret, app_state.env.jwt_maxage)
        .map_err(|e| {
            tracing::error!("Access token creation error: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;
    let refresh_token = token::create_token(
        &user.id.to_string(),
        secret,
        app_state.env.refresh_token_maxage,
    )
    .map_err(|e| {
        tracing::error!("Refresh token creation error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    // Stored so logout can revoke it
    app_state
        .redis_client
        .save_refresh_token(
            &user.id.to_string(),
            &refresh_token,
            app_state.env.refresh_token_maxage,
        )
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, "RedisDB error, saving refresh token: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let jar = cookie_jar
        .add(build_cookie(
            "access_token",
            access_token.clone(),
            app_state.env.jwt_maxage,
        ))
        .add(build_cookie(
            "refresh_token",
            refresh_token,
            app_state.env.refresh_token_maxage,
        ));

    tracing::info!(user_id = %user.id, ip = %ip, "Login Successful");
    Ok((
        jar,
        Json(UserLoginResponseDto {
            status: "success".to_string(),
            access_token,
            username: user.username,
        }),
    ))
}

#[instrument(skip(app_state, jwt, cookie_jar), fields(user_id = %jwt.user.id))]
pub async fn logout(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .redis_client
        .delete_refresh_token(&jwt.user.id.to_string())
        .await
        .map_err(|e| {
            tracing::error!("RedisDB error, deleting refresh token: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let jar = cookie_jar
        .add(expired_cookie("access_token"))
        .add(expired_cookie("refresh_token"));

    tracing::info!("Logout successful");
    Ok((
        jar,
        Json(Response::success("You have been logged out successfully.").redirect_to("/")),
    ))
}

/// Re-issue the access token from a refresh token that is still stored
#[instrument(skip(app_state, cookie_jar))]
pub async fn refresh(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get("refresh_token")
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| {
            tracing::warn!("Refresh token not provided");
            HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string())
        })?;

    let user_id = token::decode_token(&token, app_state.env.jwt_secret.as_bytes())?;

    let stored_refresh_token = app_state
        .redis_client
        .get_refresh_token(&user_id)
        .await
        .map_err(|e| {
            tracing::error!("RedisDB error, getting refresh token: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    if stored_refresh_token.as_deref() != Some(token.as_str()) {
        tracing::warn!("Refresh token mismatch or not found in Redis");
        return Err(HttpError::unauthorized(
            ErrorMessage::InvalidToken.to_string(),
        ));
    }

    let access_token = token::create_token(
        &user_id,
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| {
        tracing::error!("Access token creation error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let jar = cookie_jar.add(build_cookie(
        "access_token",
        access_token.clone(),
        app_state.env.jwt_maxage,
    ));

    tracing::info!("Access token refreshed successfully");
    Ok((
        jar,
        Json(RefreshResponseDto {
            status: "success".to_string(),
            access_token,
        }),
    ))
}

// ============================================================================
// Profile
// ============================================================================

pub async fn profile(Extension(jwt): Extension<JWTAuthMiddleware>) -> impl IntoResponse {
    Json(ProfileResponseDto {
        status: "success".to_string(),
        data: FilterUserDto::filter_user(&jwt.user),
    })
}

pub async fn profile_form(Extension(jwt): Extension<JWTAuthMiddleware>) -> impl IntoResponse {
    Json(ProfileFormResponseDto {
        status: "success".to_string(),
        form: ProfileUpdateDto::from_user(&jwt.user),
        profile_picture: jwt.user.profile_picture.clone(),
    })
}

/// Validate and apply a profile update. The picture is written to disk only
/// once every other check has passed.
pub async fn profile_update_process<S: UserExt>(
    store: &S,
    media_root: &str,
    user: &User,
    body: ProfileUpdateDto,
    picture: Option<UploadedFile>,
) -> Result<User, HttpError> {
    body.validate()?;

    if let Some(file) = &picture {
        validate_image("profile_picture", file)?;
    }

    if store
        .email_taken_by_other(user.id, &body.email)
        .await
        .map_err(|e| map_db_error("checking email", e))?
    {
        return Err(conflict("email", "User with this Email already exists."));
    }

    let profile_picture = match &picture {
        Some(file) => {
            Some(save_image(media_root, PROFILE_PICTURES_DIR, "profile_picture", file).await?)
        }
        None => None,
    };

    let result = store
        .update_profile(
            user.id,
            ProfileChanges {
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
                bio: body.bio,
                website: body.website.unwrap_or_default(),
                twitter: body.twitter,
                linkedin: body.linkedin,
                github: body.github,
                profile_picture: profile_picture.clone(),
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                conflict("email", "User with this Email already exists.")
            } else {
                map_db_error("updating profile", e)
            }
        });

    if let (Err(_), Some(path)) = (&result, &profile_picture) {
        remove_image(media_root, path).await;
    }
    result
}

#[instrument(skip(app_state, jwt, multipart), fields(user_id = %jwt.user.id))]
pub async fn profile_update(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let picture = form.take_file("profile_picture");
    let body = ProfileUpdateDto::from_form(&form);

    let user = profile_update_process(
        &app_state.db_client,
        &app_state.env.media_root,
        &jwt.user,
        body,
        picture,
    )
    .await?;

    tracing::info!("Profile updated");
    Ok(Json(ProfileResponseDto {
        status: "success".to_string(),
        data: FilterUserDto::filter_user(&user),
    }))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn favorites(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let data = app_state
        .db_client
        .get_user_favorites(jwt.user.id)
        .await
        .map_err(|e| map_db_error("getting favorites", e))?;

    Ok(Json(FavoriteListResponseDto {
        status: "success".to_string(),
        data,
    }))
}

// ============================================================================
// Author page
// ============================================================================

/// Author (or admin) by username; readers and unknown names are not found
pub async fn find_author<S: UserExt>(store: &S, username: &str) -> Result<User, HttpError> {
    store
        .get_user(None, Some(username), None, None)
        .await
        .map_err(|e| map_db_error("getting author", e))?
        .filter(|user| user.role.can_author())
        .ok_or_else(|| HttpError::not_found(ErrorMessage::AuthorNotFound.to_string()))
}

#[instrument(skip(app_state))]
pub async fn author_detail(
    Path(username): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let author = find_author(&app_state.db_client, &username).await?;
    let blogs = published_by_author(&app_state.db_client, author.id).await?;

    Ok(Json(AuthorDetailResponseDto {
        status: "success".to_string(),
        author: AuthorDto::from_user(&author),
        blogs,
    }))
}
