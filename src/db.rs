use sqlx::{Pool, Postgres};

mod user;
pub use user::{NewUser, ProfileChanges, UserExt};

mod category;
pub use category::CategoryExt;

mod blog;
pub use blog::{BlogChanges, BlogExt, BlogFilter, BlogSort, NewBlog};

mod rating;
pub use rating::RatingExt;

mod favorite;
pub use favorite::FavoriteExt;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Clone)]
pub struct DBClient {
    pool: Pool<Postgres>,
}
impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    /// Apply the embedded migrations under `migrations/`
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// True when the error is a PostgreSQL unique constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
