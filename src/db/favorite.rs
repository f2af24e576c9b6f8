use super::DBClient;
use crate::dtos::FavoriteItemDto;
use uuid::Uuid;

pub trait FavoriteExt {
    /// Remove the favorite if present, otherwise create it.
    /// Returns whether the blog is now favorited.
    async fn toggle_favorite(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error>;

    async fn is_favorited(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error>;

    /// Most recent first
    async fn get_user_favorites(&self, user_id: Uuid) -> Result<Vec<FavoriteItemDto>, sqlx::Error>;
}

impl FavoriteExt for DBClient {
    async fn toggle_favorite(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND blog_id = $2")
            .bind(user_id)
            .bind(blog_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let favorited = if removed > 0 {
            false
        } else {
            // A concurrent toggle may have inserted first; that still leaves
            // exactly one row
            sqlx::query(
                r#"
                INSERT INTO favorites (user_id, blog_id) VALUES ($1, $2)
                ON CONFLICT (user_id, blog_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(blog_id)
            .execute(&mut *tx)
            .await?;
            true
        };

        tx.commit().await?;
        Ok(favorited)
    }

    async fn is_favorited(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND blog_id = $2)",
        )
        .bind(user_id)
        .bind(blog_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get_user_favorites(&self, user_id: Uuid) -> Result<Vec<FavoriteItemDto>, sqlx::Error> {
        let favorites = sqlx::query_as::<_, FavoriteItemDto>(
            r#"
            SELECT f.id AS favorite_id, f.created_at AS favorited_at,
                   b.id AS blog_id, b.title, b.slug, b.status, b.featured_image,
                   u.username AS author_username,
                   COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS author_name,
                   b.created_at AS blog_created_at
            FROM favorites f
            JOIN blogs b ON b.id = f.blog_id
            JOIN users u ON u.id = b.author_id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(favorites)
    }
}
