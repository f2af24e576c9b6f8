use crate::error::HttpError;
use crate::models::{Blog, BlogStatus, Category, User, UserRole};
use crate::utils::media::FormData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

// DTOs define exactly what crosses the HTTP boundary; database models stay
// internal (password hashes and verification tokens never leave).

// ============================================================================
// Account DTOs
// ============================================================================

/// Registration form. Only `reader` and `author` may be self-selected.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[validate(length(min = 1, max = 30, message = "First name is required (max 30)"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 30, message = "Last name is required (max 30)"))]
    pub last_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Enter a valid email address.")
    )]
    pub email: String,

    #[validate(custom(function = "validate_registration_role"))]
    pub role: Option<UserRole>,

    #[validate(length(
        min = 8,
        max = 64,
        message = "Password must be 8 to 64 characters"
    ))]
    pub password1: String,

    #[validate(must_match(
        other = "password1",
        message = "The two password fields didn't match."
    ))]
    pub password2: String,
}

/// Letters, digits and @/./+/-/_ only
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username").with_message(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        ))
    }
}

fn validate_registration_role(role: &UserRole) -> Result<(), ValidationError> {
    if *role == UserRole::Admin {
        Err(ValidationError::new("invalid_role")
            .with_message("Select a valid choice. admin is not one of the available choices.".into()))
    } else {
        Ok(())
    }
}

/// Login accepts either the username or the email as `identifier`
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email or username is required"))]
    pub identifier: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Profile update form (multipart, picture handled separately)
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProfileUpdateDto {
    #[validate(length(max = 150, message = "First name must not exceed 150 characters"))]
    pub first_name: String,

    #[validate(length(max = 150, message = "Last name must not exceed 150 characters"))]
    pub last_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Enter a valid email address.")
    )]
    pub email: String,

    #[validate(length(max = 500, message = "Bio must not exceed 500 characters"))]
    pub bio: String,

    #[validate(url(message = "Enter a valid URL."))]
    pub website: Option<String>,

    #[validate(length(max = 100, message = "Must not exceed 100 characters"))]
    pub twitter: String,

    #[validate(length(max = 100, message = "Must not exceed 100 characters"))]
    pub linkedin: String,

    #[validate(length(max = 100, message = "Must not exceed 100 characters"))]
    pub github: String,
}

impl ProfileUpdateDto {
    pub fn from_form(form: &FormData) -> Self {
        ProfileUpdateDto {
            first_name: form.text("first_name"),
            last_name: form.text("last_name"),
            email: form.text("email"),
            bio: form.text("bio"),
            website: form.optional("website"),
            twitter: form.text("twitter"),
            linkedin: form.text("linkedin"),
            github: form.text("github"),
        }
    }

    pub fn from_user(user: &User) -> Self {
        ProfileUpdateDto {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            bio: user.bio.clone(),
            website: if user.website.is_empty() {
                None
            } else {
                Some(user.website.clone())
            },
            twitter: user.twitter.clone(),
            linkedin: user.linkedin.clone(),
            github: user.github.clone(),
        }
    }
}

/// Full profile of the logged-in user (no password hash, no token)
#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: String,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub website: String,
    pub twitter: String,
    pub linkedin: String,
    pub github: String,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
            full_name: user.full_name(),
            role: user.role.to_str().to_string(),
            bio: user.bio.to_owned(),
            profile_picture: user.profile_picture.to_owned(),
            website: user.website.to_owned(),
            twitter: user.twitter.to_owned(),
            linkedin: user.linkedin.to_owned(),
            github: user.github.to_owned(),
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
        }
    }
}

/// Public view of an author
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorDto {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub website: String,
    pub twitter: String,
    pub linkedin: String,
    pub github: String,
}

impl AuthorDto {
    pub fn from_user(user: &User) -> Self {
        AuthorDto {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
            role: user.role,
            bio: user.bio.clone(),
            profile_picture: user.profile_picture.clone(),
            website: user.website.clone(),
            twitter: user.twitter.clone(),
            linkedin: user.linkedin.clone(),
            github: user.github.clone(),
        }
    }

    pub fn from_users(users: &[User]) -> Vec<AuthorDto> {
        users.iter().map(AuthorDto::from_user).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponseDto {
    pub status: String,
    pub data: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileFormResponseDto {
    pub status: String,
    pub form: ProfileUpdateDto,
    pub profile_picture: Option<String>,
}

/// Login success response with JWT token
#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub access_token: String,
    pub username: String,
}

/// Token refresh response
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponseDto {
    pub status: String,
    pub access_token: String,
}

/// Generic message response; `redirect` names the page a browser client
/// should show next
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Response {
            status: "success",
            message: message.into(),
            redirect: None,
        }
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect = Some(path.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChoiceDto {
    pub value: String,
    pub label: String,
}

/// Choices shown on the registration form
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterFormResponseDto {
    pub status: String,
    pub roles: Vec<ChoiceDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginFormResponseDto {
    pub status: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorDetailResponseDto {
    pub status: String,
    pub author: AuthorDto,
    pub blogs: Vec<BlogListItemDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorListResponseDto {
    pub status: String,
    pub data: Vec<AuthorDto>,
    pub pagination: PaginationDto,
}

// ============================================================================
// Pagination & Query DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaginationDto {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

/// `?page=` is kept as text; unparsable values fall back to the first page
#[derive(Debug, Deserialize, Default)]
pub struct PageQueryDto {
    pub page: Option<String>,
}

/// Home listing query. Empty strings mean "no filter".
#[derive(Debug, Deserialize, Default, Clone)]
pub struct HomeQueryDto {
    pub search: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

// ============================================================================
// Blog DTOs
// ============================================================================

/// Create/edit form for a blog (multipart, image handled separately)
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BlogFormDto {
    #[validate(length(min = 1, max = 200, message = "Title is required (max 200 characters)."))]
    pub title: String,

    #[validate(length(min = 1, message = "Body is required."))]
    pub body: String,

    pub category_id: Option<i64>,

    pub status: BlogStatus,
}

impl BlogFormDto {
    /// Parse the raw form. `category` must be an id, `status` may only be
    /// `published` (the default when omitted).
    pub fn from_form(form: &FormData) -> Result<Self, HttpError> {
        let category_id = match form.optional("category") {
            None => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                HttpError::field(
                    "category",
                    "Select a valid choice. That choice is not one of the available choices.",
                )
            })?),
        };

        let status = match form.optional("status").as_deref() {
            None | Some("published") => BlogStatus::Published,
            Some(other) => {
                return Err(HttpError::field(
                    "status",
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        other
                    ),
                ));
            }
        };

        let dto = BlogFormDto {
            title: form.text("title"),
            body: form.text("body"),
            category_id,
            status,
        };
        dto.validate()?;
        Ok(dto)
    }
}

/// Blog row joined with author, category and rating aggregate
///
/// This is the shape of every listing (home, my blogs, author page, related
/// posts). `body` is loaded for the excerpt but not serialized.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BlogListItemDto {
    pub id: i64,
    pub title: String,
    pub slug: String,
    #[serde(skip_serializing, default)]
    pub body: String,
    #[sqlx(skip)]
    pub excerpt: String,
    pub status: BlogStatus,
    pub featured_image: Option<String>,
    pub views: i64,
    pub author_id: Uuid,
    pub author_username: String,
    pub author_name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const EXCERPT_CHARS: usize = 200;

impl BlogListItemDto {
    /// Fill `excerpt` with the first characters of the body as plain text
    pub fn with_excerpt(mut self) -> Self {
        let text = html2text::from_read(self.body.as_bytes(), 10_000)
            .unwrap_or_else(|_| self.body.clone());
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        self.excerpt = if text.chars().count() > EXCERPT_CHARS {
            let cut: String = text.chars().take(EXCERPT_CHARS).collect();
            format!("{}…", cut.trim_end())
        } else {
            text
        };
        self
    }

    pub fn with_excerpts(items: Vec<Self>) -> Vec<Self> {
        items.into_iter().map(BlogListItemDto::with_excerpt).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlogListResponseDto {
    pub status: String,
    pub data: Vec<BlogListItemDto>,
    pub pagination: PaginationDto,
}

/// Home page: listing plus the filter choices and the echoed selection
#[derive(Debug, Serialize, Deserialize)]
pub struct HomeResponseDto {
    pub status: String,
    pub data: Vec<BlogListItemDto>,
    pub pagination: PaginationDto,
    pub categories: Vec<Category>,
    pub authors: Vec<AuthorDto>,
    pub search_query: Option<String>,
    pub selected_category: Option<String>,
    pub selected_author: Option<String>,
    pub sort_by: Option<String>,
}

/// Detail page of a published blog
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogDetailDto {
    pub blog: BlogListItemDto,
    pub body: String,
    pub user_rating: Option<i32>,
    pub is_favorited: bool,
    pub related_blogs: Vec<BlogListItemDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlogDetailResponseDto {
    pub status: String,
    pub data: BlogDetailDto,
}

/// Reply to a successful create/edit
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogSavedResponseDto {
    pub status: String,
    pub message: String,
    pub redirect: String,
    pub data: Blog,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlogResponseDto {
    pub status: String,
    pub data: Blog,
}

/// What the create/edit form needs to render
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogFormOptionsDto {
    pub status: String,
    pub categories: Vec<Category>,
    pub statuses: Vec<BlogStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<Blog>,
}

// ============================================================================
// Engagement DTOs
// ============================================================================

/// `score` arrives as a form field; a missing score counts as 0
#[derive(Debug, Deserialize, Default)]
pub struct RateFormDto {
    pub score: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RateResponseDto {
    pub success: bool,
    pub average_rating: f64,
    pub rating_count: i64,
    pub user_rating: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateErrorDto {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FavoriteToggleResponseDto {
    pub is_favorited: bool,
    pub message: String,
}

/// One entry of the "my favorites" page
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct FavoriteItemDto {
    pub favorite_id: i64,
    pub favorited_at: DateTime<Utc>,
    pub blog_id: i64,
    pub title: String,
    pub slug: String,
    pub status: BlogStatus,
    pub featured_image: Option<String>,
    pub author_username: String,
    pub author_name: String,
    pub blog_created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteListResponseDto {
    pub status: String,
    pub data: Vec<FavoriteItemDto>,
}

// ============================================================================
// Category DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CategoryInputDto {
    #[validate(length(min = 1, max = 100, message = "Name is required (max 100 characters)."))]
    pub name: String,

    #[serde(default)]
    pub description: String,
}

impl CategoryInputDto {
    /// Surrounding whitespace is not part of the name, so trim before
    /// validating
    pub fn trimmed(self) -> Self {
        CategoryInputDto {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryListResponseDto {
    pub status: String,
    pub data: Vec<Category>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponseDto {
    pub status: String,
    pub data: Category,
}
