use super::DBClient;
use crate::models::{User, UserRole};
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    id, username, email, password, first_name, last_name, role, bio,
    profile_picture, website, twitter, linkedin, github,
    is_active, is_email_verified, email_verification_token,
    created_at, updated_at
"#;

/// Everything needed to insert a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub verification_token: Option<String>,
}

/// Editable profile fields. `profile_picture` is only replaced when `Some`.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: String,
    pub website: String,
    pub twitter: String,
    pub linkedin: String,
    pub github: String,
    pub profile_picture: Option<String>,
}

/// User database operations trait
pub trait UserExt {
    /// Get single user by ID, username, email, or verification token
    /// Returns Option - Some(user) if found, None if not found
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error>;

    /// Activate the account holding `token` and clear the token in the same
    /// statement. `None` when no account holds it (unknown or already used).
    async fn verify_email_token(&self, token: &str) -> Result<Option<User>, sqlx::Error>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, sqlx::Error>;

    /// Check if email is already in use by another user
    async fn email_taken_by_other(&self, user_id: Uuid, email: &str) -> Result<bool, sqlx::Error>;

    /// Authors/admins with at least one published blog, ordered by name.
    /// `limit = None` returns all of them.
    async fn get_publishing_authors(
        &self,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<User>, sqlx::Error>;

    async fn count_publishing_authors(&self) -> Result<i64, sqlx::Error>;
}

impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE id = $1",
                USER_COLUMNS
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(username) = username {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE username = $1",
                USER_COLUMNS
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE email = $1",
                USER_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(token) = token {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE email_verification_token = $1",
                USER_COLUMNS
            ))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(user)
    }

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, role,
                               is_active, is_email_verified, email_verification_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(new_user.username)
        .bind(new_user.email)
        .bind(new_user.password_hash)
        .bind(new_user.first_name)
        .bind(new_user.last_name)
        .bind(new_user.role)
        .bind(new_user.is_active)
        .bind(new_user.is_email_verified)
        .bind(new_user.verification_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn verify_email_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET is_active = true,
                is_email_verified = true,
                email_verification_token = NULL,
                updated_at = Now()
            WHERE email_verification_token = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, bio = $4, website = $5,
                twitter = $6, linkedin = $7, github = $8,
                profile_picture = COALESCE($9, profile_picture),
                updated_at = Now()
            WHERE id = $10
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.email)
        .bind(changes.bio)
        .bind(changes.website)
        .bind(changes.twitter)
        .bind(changes.linkedin)
        .bind(changes.github)
        .bind(changes.profile_picture)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn email_taken_by_other(&self, user_id: Uuid, email: &str) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND id != $2)",
        )
        .bind(email)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get_publishing_authors(
        &self,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        // LIMIT NULL means no limit in PostgreSQL
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {} FROM users u
            WHERE u.role IN ('author', 'admin')
              AND EXISTS (
                SELECT 1 FROM blogs b WHERE b.author_id = u.id AND b.status = 'published'
              )
            ORDER BY u.first_name, u.last_name, u.username
            LIMIT $1 OFFSET $2
            "#,
            USER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count_publishing_authors(&self) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE u.role IN ('author', 'admin')
              AND EXISTS (
                SELECT 1 FROM blogs b WHERE b.author_id = u.id AND b.status = 'published'
              )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
