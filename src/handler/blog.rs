use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Extension, Router, middleware};
use tracing::instrument;
use uuid::Uuid;

use crate::AppState;
use crate::db::{
    BlogChanges, BlogExt, BlogFilter, BlogSort, CategoryExt, FavoriteExt, NewBlog, RatingExt,
    UserExt, is_unique_violation,
};
use crate::dtos::{
    AuthorDto, AuthorListResponseDto, BlogDetailDto, BlogDetailResponseDto, BlogFormDto,
    BlogFormOptionsDto, BlogListItemDto, BlogListResponseDto, BlogResponseDto,
    BlogSavedResponseDto, HomeQueryDto, HomeResponseDto, PageQueryDto, Response,
};
use crate::error::{ErrorMessage, HttpError};
use crate::handler::favorite::toggle_favorite;
use crate::handler::rating::rate_blog;
use crate::middleware::{JWTAuthMiddleware, auth, optional_auth};
use crate::models::{Blog, BlogStatus, User};
use crate::utils::media::{
    BLOG_IMAGES_DIR, FormData, UploadedFile, remove_image, save_image, validate_image,
};
use crate::utils::pagination::{AUTHORS_PAGE_SIZE, HOME_PAGE_SIZE, MY_BLOGS_PAGE_SIZE, Page};
use crate::utils::slug::{slug_base, unique_slug};

const RELATED_BLOGS: i64 = 3;
const SLUG_ATTEMPTS: usize = 3;

pub fn blog_handler(app_state: AppState) -> Router<AppState> {
    let login_required = middleware::from_fn_with_state(app_state.clone(), auth);

    Router::new()
        .route("/", get(home))
        .route("/authors/", get(authors))
        .route(
            "/blog/{slug}/",
            get(blog_detail).route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                optional_auth,
            )),
        )
        .merge(
            Router::new()
                .route("/create/", get(create_form).post(create_blog))
                .route("/blog/{slug}/edit/", get(edit_form).post(edit_blog))
                .route("/blog/{slug}/delete/", get(delete_form).post(delete_blog))
                .route("/blog/{slug}/rate/", post(rate_blog))
                .route("/blog/{slug}/favorite/", post(toggle_favorite))
                .route("/my-blogs/", get(my_blogs))
                .route_layer(login_required),
        )
}

fn map_db_error(context: &str, e: sqlx::Error) -> HttpError {
    tracing::error!("DB error, {}: {}", context, e);
    HttpError::server_error(ErrorMessage::ServerError.to_string())
}

/// Blank query values mean "not set"
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Published blog by slug; drafts and unknown slugs are not found
pub async fn published_blog<S: BlogExt>(store: &S, slug: &str) -> Result<Blog, HttpError> {
    store
        .get_blog_by_slug(slug)
        .await
        .map_err(|e| map_db_error("getting blog", e))?
        .filter(|blog| blog.status == BlogStatus::Published)
        .ok_or_else(|| HttpError::not_found(ErrorMessage::BlogNotFound.to_string()))
}

/// Blog by slug, only when `user` wrote it. Someone else's blog is
/// reported as missing.
pub async fn owned_blog<S: BlogExt>(store: &S, slug: &str, user: &User) -> Result<Blog, HttpError> {
    store
        .get_blog_by_slug(slug)
        .await
        .map_err(|e| map_db_error("getting blog", e))?
        .filter(|blog| blog.author_id == user.id)
        .ok_or_else(|| HttpError::not_found(ErrorMessage::BlogNotFound.to_string()))
}

/// Every published blog of an author, newest first
pub async fn published_by_author<S: BlogExt>(
    store: &S,
    author_id: Uuid,
) -> Result<Vec<BlogListItemDto>, HttpError> {
    let filter = BlogFilter {
        author_id: Some(author_id),
        published_only: true,
        ..Default::default()
    };
    let blogs = store
        .list_blogs(&filter, BlogSort::Newest, i64::MAX, 0)
        .await
        .map_err(|e| map_db_error("listing author blogs", e))?;
    Ok(BlogListItemDto::with_excerpts(blogs))
}

// ============================================================================
// Listing
// ============================================================================

pub async fn home_process<S: BlogExt + CategoryExt + UserExt>(
    store: &S,
    query: HomeQueryDto,
) -> Result<HomeResponseDto, HttpError> {
    let filter = BlogFilter {
        search: non_empty(&query.search).map(str::to_string),
        category_id: non_empty(&query.category).and_then(|c| c.parse::<i64>().ok()),
        author_id: non_empty(&query.author).and_then(|a| Uuid::parse_str(a).ok()),
        published_only: true,
        exclude_id: None,
    };
    let sort = BlogSort::from_param(query.sort.as_deref());

    let total = store
        .count_blogs(&filter)
        .await
        .map_err(|e| map_db_error("counting blogs", e))?;
    let page = Page::resolve(query.page.as_deref(), total, HOME_PAGE_SIZE);

    let blogs = store
        .list_blogs(&filter, sort, page.per_page, page.offset())
        .await
        .map_err(|e| map_db_error("listing blogs", e))?;

    let categories = store
        .get_categories()
        .await
        .map_err(|e| map_db_error("listing categories", e))?;
    let authors = store
        .get_publishing_authors(None, 0)
        .await
        .map_err(|e| map_db_error("listing authors", e))?;

    Ok(HomeResponseDto {
        status: "success".to_string(),
        data: BlogListItemDto::with_excerpts(blogs),
        pagination: page.to_dto(),
        categories,
        authors: AuthorDto::from_users(&authors),
        search_query: query.search,
        selected_category: query.category,
        selected_author: query.author,
        sort_by: query.sort,
    })
}

#[instrument(skip(app_state))]
pub async fn home(
    Query(query): Query<HomeQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let response = home_process(&app_state.db_client, query).await?;
    Ok(Json(response))
}

pub async fn authors_process<S: UserExt>(
    store: &S,
    page: Option<&str>,
) -> Result<AuthorListResponseDto, HttpError> {
    let total = store
        .count_publishing_authors()
        .await
        .map_err(|e| map_db_error("counting authors", e))?;
    let page = Page::resolve(page, total, AUTHORS_PAGE_SIZE);

    let authors = store
        .get_publishing_authors(Some(page.per_page), page.offset())
        .await
        .map_err(|e| map_db_error("listing authors", e))?;

    Ok(AuthorListResponseDto {
        status: "success".to_string(),
        data: AuthorDto::from_users(&authors),
        pagination: page.to_dto(),
    })
}

pub async fn authors(
    Query(query): Query<PageQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let response = authors_process(&app_state.db_client, query.page.as_deref()).await?;
    Ok(Json(response))
}

/// The caller's own blogs, any status, newest first
pub async fn my_blogs_process<S: BlogExt>(
    store: &S,
    user: &User,
    page: Option<&str>,
) -> Result<BlogListResponseDto, HttpError> {
    if !user.role.can_author() {
        return Err(HttpError::forbidden(
            ErrorMessage::AuthorRequired.to_string(),
        ));
    }

    let filter = BlogFilter {
        author_id: Some(user.id),
        ..Default::default()
    };
    let total = store
        .count_blogs(&filter)
        .await
        .map_err(|e| map_db_error("counting own blogs", e))?;
    let page = Page::resolve(page, total, MY_BLOGS_PAGE_SIZE);

    let blogs = store
        .list_blogs(&filter, BlogSort::Newest, page.per_page, page.offset())
        .await
        .map_err(|e| map_db_error("listing own blogs", e))?;

    Ok(BlogListResponseDto {
        status: "success".to_string(),
        data: BlogListItemDto::with_excerpts(blogs),
        pagination: page.to_dto(),
    })
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn my_blogs(
    Query(query): Query<PageQueryDto>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let response = my_blogs_process(&app_state.db_client, &jwt.user, query.page.as_deref()).await?;
    Ok(Json(response))
}

// ============================================================================
// Detail
// ============================================================================

/// Count the view, then assemble the page. The viewer's rating and favorite
/// flag are only looked up for logged-in users.
pub async fn detail_process<S: BlogExt + RatingExt + FavoriteExt>(
    store: &S,
    slug: &str,
    viewer: Option<&User>,
) -> Result<BlogDetailDto, HttpError> {
    let blog = published_blog(store, slug).await?;

    store
        .increment_views(blog.id)
        .await
        .map_err(|e| map_db_error("incrementing views", e))?;

    let item = store
        .get_blog_item(blog.id)
        .await
        .map_err(|e| map_db_error("getting blog item", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::BlogNotFound.to_string()))?;

    let (user_rating, is_favorited) = match viewer {
        Some(user) => {
            let rating = store
                .get_user_rating(blog.id, user.id)
                .await
                .map_err(|e| map_db_error("getting user rating", e))?;
            let favorited = store
                .is_favorited(user.id, blog.id)
                .await
                .map_err(|e| map_db_error("getting favorite", e))?;
            (rating, favorited)
        }
        None => (None, false),
    };

    let related = BlogFilter {
        author_id: Some(blog.author_id),
        published_only: true,
        exclude_id: Some(blog.id),
        ..Default::default()
    };
    let related_blogs = store
        .list_blogs(&related, BlogSort::Newest, RELATED_BLOGS, 0)
        .await
        .map_err(|e| map_db_error("listing related blogs", e))?;

    Ok(BlogDetailDto {
        body: item.body.clone(),
        blog: item.with_excerpt(),
        user_rating,
        is_favorited,
        related_blogs: BlogListItemDto::with_excerpts(related_blogs),
    })
}

#[instrument(skip(app_state, jwt))]
pub async fn blog_detail(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    jwt: Option<Extension<JWTAuthMiddleware>>,
) -> Result<impl IntoResponse, HttpError> {
    let viewer = jwt.as_ref().map(|Extension(jwt)| &jwt.user);
    let data = detail_process(&app_state.db_client, &slug, viewer).await?;

    Ok(Json(BlogDetailResponseDto {
        status: "success".to_string(),
        data,
    }))
}

// ============================================================================
// Authoring
// ============================================================================

fn require_author(user: &User, message: &str) -> Result<(), HttpError> {
    if user.role.can_author() {
        Ok(())
    } else {
        Err(HttpError::forbidden(message))
    }
}

const CREATE_REQUIRES_AUTHOR: &str = "You need to be an author to create blogs.";

async fn check_category<S: CategoryExt>(store: &S, category_id: Option<i64>) -> Result<(), HttpError> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let exists = store
        .get_category(category_id)
        .await
        .map_err(|e| map_db_error("getting category", e))?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(HttpError::field(
            "category",
            "Select a valid choice. That choice is not one of the available choices.",
        ))
    }
}

async fn store_featured_image(
    media_root: &str,
    image: Option<&UploadedFile>,
) -> Result<Option<String>, HttpError> {
    match image {
        Some(file) => Ok(Some(
            save_image(media_root, BLOG_IMAGES_DIR, "featured_image", file).await?,
        )),
        None => Ok(None),
    }
}

/// An image saved for a record that was never written is deleted again
async fn discard_on_error<T>(
    media_root: &str,
    featured_image: Option<&str>,
    result: Result<T, HttpError>,
) -> Result<T, HttpError> {
    if let (Err(_), Some(path)) = (&result, featured_image) {
        remove_image(media_root, path).await;
    }
    result
}

/// Create a blog for `user`. The slug is the first free one among `base`,
/// `base-1`, `base-2`, … and a lost race for it is retried.
pub async fn create_process<S: BlogExt + CategoryExt>(
    store: &S,
    media_root: &str,
    user: &User,
    form: BlogFormDto,
    image: Option<UploadedFile>,
) -> Result<Blog, HttpError> {
    require_author(user, CREATE_REQUIRES_AUTHOR)?;
    check_category(store, form.category_id).await?;
    if let Some(file) = &image {
        validate_image("featured_image", file)?;
    }

    let featured_image = store_featured_image(media_root, image.as_ref()).await?;
    let result = insert_with_unique_slug(store, user, form, featured_image.clone()).await;
    discard_on_error(media_root, featured_image.as_deref(), result).await
}

async fn insert_with_unique_slug<S: BlogExt>(
    store: &S,
    user: &User,
    form: BlogFormDto,
    featured_image: Option<String>,
) -> Result<Blog, HttpError> {
    let body = ammonia::clean(&form.body);
    let base = slug_base(&form.title);

    for _ in 0..SLUG_ATTEMPTS {
        let taken = store
            .get_taken_slugs(&base)
            .await
            .map_err(|e| map_db_error("getting slugs", e))?;
        let slug = unique_slug(&base, &taken);

        let result = store
            .create_blog(NewBlog {
                title: form.title.clone(),
                slug,
                author_id: user.id,
                body: body.clone(),
                category_id: form.category_id,
                status: form.status,
                featured_image: featured_image.clone(),
            })
            .await;

        match result {
            Ok(blog) => return Ok(blog),
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(base = %base, "Slug taken concurrently, retrying");
            }
            Err(e) => return Err(map_db_error("creating blog", e)),
        }
    }

    Err(HttpError::unique_constraint_violation(
        "Could not allocate a unique slug, please try again",
    ))
}

async fn form_options<S: CategoryExt>(
    store: &S,
    blog: Option<Blog>,
) -> Result<BlogFormOptionsDto, HttpError> {
    let categories = store
        .get_categories()
        .await
        .map_err(|e| map_db_error("listing categories", e))?;

    Ok(BlogFormOptionsDto {
        status: "success".to_string(),
        categories,
        statuses: vec![BlogStatus::Published],
        blog,
    })
}

pub async fn create_form(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    require_author(&jwt.user, CREATE_REQUIRES_AUTHOR)?;
    Ok(Json(form_options(&app_state.db_client, None).await?))
}

#[instrument(skip(app_state, jwt, multipart), fields(user_id = %jwt.user.id))]
pub async fn create_blog(
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    require_author(&jwt.user, CREATE_REQUIRES_AUTHOR)?;

    let mut form = FormData::from_multipart(multipart).await?;
    let image = form.take_file("featured_image");
    let body = BlogFormDto::from_form(&form)?;

    let blog = create_process(
        &app_state.db_client,
        &app_state.env.media_root,
        &jwt.user,
        body,
        image,
    )
    .await?;

    tracing::info!(blog_id = blog.id, slug = %blog.slug, "Blog created");
    Ok((
        StatusCode::CREATED,
        Json(BlogSavedResponseDto {
            status: "success".to_string(),
            message: "Blog created successfully!".to_string(),
            redirect: format!("/blog/{}/", blog.slug),
            data: blog,
        }),
    ))
}

/// Update `blog`, already checked to belong to the caller. The slug stays
/// as created.
pub async fn edit_process<S: BlogExt + CategoryExt>(
    store: &S,
    media_root: &str,
    blog: Blog,
    form: BlogFormDto,
    image: Option<UploadedFile>,
) -> Result<Blog, HttpError> {
    check_category(store, form.category_id).await?;
    if let Some(file) = &image {
        validate_image("featured_image", file)?;
    }

    let featured_image = store_featured_image(media_root, image.as_ref()).await?;

    let result = store
        .update_blog(
            blog.id,
            BlogChanges {
                title: form.title,
                body: ammonia::clean(&form.body),
                category_id: form.category_id,
                status: form.status,
                featured_image: featured_image.clone(),
            },
        )
        .await
        .map_err(|e| match e {
            // Deleted since the ownership check
            sqlx::Error::RowNotFound => {
                HttpError::not_found(ErrorMessage::BlogNotFound.to_string())
            }
            e => map_db_error("updating blog", e),
        });
    discard_on_error(media_root, featured_image.as_deref(), result).await
}

pub async fn edit_form(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let blog = owned_blog(&app_state.db_client, &slug, &jwt.user).await?;
    Ok(Json(form_options(&app_state.db_client, Some(blog)).await?))
}

#[instrument(skip(app_state, jwt, multipart), fields(user_id = %jwt.user.id))]
pub async fn edit_blog(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    // Ownership first, so strangers get 404 rather than form errors
    let blog = owned_blog(&app_state.db_client, &slug, &jwt.user).await?;

    let mut form = FormData::from_multipart(multipart).await?;
    let image = form.take_file("featured_image");
    let body = BlogFormDto::from_form(&form)?;

    let blog = edit_process(
        &app_state.db_client,
        &app_state.env.media_root,
        blog,
        body,
        image,
    )
    .await?;

    tracing::info!(blog_id = blog.id, "Blog updated");
    Ok(Json(BlogSavedResponseDto {
        status: "success".to_string(),
        message: "Blog updated successfully!".to_string(),
        redirect: format!("/blog/{}/", blog.slug),
        data: blog,
    }))
}

pub async fn delete_process<S: BlogExt>(store: &S, user: &User, slug: &str) -> Result<Blog, HttpError> {
    let blog = owned_blog(store, slug, user).await?;
    store
        .delete_blog(blog.id)
        .await
        .map_err(|e| map_db_error("deleting blog", e))?;
    Ok(blog)
}

/// Confirmation data for the delete page
pub async fn delete_form(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let blog = owned_blog(&app_state.db_client, &slug, &jwt.user).await?;
    Ok(Json(BlogResponseDto {
        status: "success".to_string(),
        data: blog,
    }))
}

#[instrument(skip(app_state, jwt), fields(user_id = %jwt.user.id))]
pub async fn delete_blog(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let blog = delete_process(&app_state.db_client, &jwt.user, &slug).await?;

    tracing::info!(blog_id = blog.id, "Blog deleted");
    Ok(Json(
        Response::success("Blog deleted successfully!").redirect_to("/my-blogs/"),
    ))
}
