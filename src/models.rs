use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User role used for authorship checks
///
/// Stored as the PostgreSQL ENUM `user_role`. Variants are lowercased in the
/// database and in JSON (Author -> "author").
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Author,
    #[default]
    Reader,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Author => "author",
            UserRole::Reader => "reader",
        }
    }

    /// Roles allowed to write blogs
    pub fn can_author(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Author)
    }
}

/// Publication status of a blog
///
/// Only `Published` is reachable through the authoring endpoints; `Draft`
/// exists in the schema and is never listed.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "blog_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BlogStatus {
    Draft,
    #[default]
    Published,
}

/// User model representing the users table
///
/// Security notes:
/// - `password`: argon2 PHC string, never the plain text
/// - `email_verification_token`: set at registration, NULL once consumed
/// - `is_active` and `is_email_verified` both flip to true on verification
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub bio: String,
    pub profile_picture: Option<String>, // relative to MEDIA_ROOT
    pub website: String,
    pub twitter: String,
    pub linkedin: String,
    pub github: String,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "First Last", falling back to the username when both are blank
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Blog model representing the blogs table
///
/// `slug` is unique across all blogs and never changes after creation.
/// `author_id` cascades on user deletion, `category_id` is nulled when the
/// category goes away.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Blog {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub author_id: Uuid,
    pub body: String,
    pub category_id: Option<i64>,
    pub status: BlogStatus,
    pub featured_image: Option<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One score per (blog, user); writing again overwrites the score
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Rating {
    pub id: i64,
    pub blog_id: i64,
    pub user_id: Uuid,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over a blog's ratings. `average` is 0 when there are none.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, Copy, PartialEq, Default)]
pub struct RatingStats {
    pub average: f64,
    pub count: i64,
}
