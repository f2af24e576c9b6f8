use super::DBClient;
use crate::models::{Rating, RatingStats};
use uuid::Uuid;

pub trait RatingExt {
    /// Insert or overwrite the user's score for the blog
    async fn upsert_rating(
        &self,
        blog_id: i64,
        user_id: Uuid,
        score: i32,
    ) -> Result<Rating, sqlx::Error>;

    async fn get_user_rating(&self, blog_id: i64, user_id: Uuid)
    -> Result<Option<i32>, sqlx::Error>;

    async fn get_rating_stats(&self, blog_id: i64) -> Result<RatingStats, sqlx::Error>;
}

impl RatingExt for DBClient {
    async fn upsert_rating(
        &self,
        blog_id: i64,
        user_id: Uuid,
        score: i32,
    ) -> Result<Rating, sqlx::Error> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (blog_id, user_id, score)
            VALUES ($1, $2, $3)
            ON CONFLICT (blog_id, user_id) DO UPDATE SET score = EXCLUDED.score
            RETURNING id, blog_id, user_id, score, created_at
            "#,
        )
        .bind(blog_id)
        .bind(user_id)
        .bind(score)
        .fetch_one(&self.pool)
        .await?;

        Ok(rating)
    }

    async fn get_user_rating(
        &self,
        blog_id: i64,
        user_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error> {
        let score: Option<i32> =
            sqlx::query_scalar("SELECT score FROM ratings WHERE blog_id = $1 AND user_id = $2")
                .bind(blog_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(score)
    }

    async fn get_rating_stats(&self, blog_id: i64) -> Result<RatingStats, sqlx::Error> {
        let stats = sqlx::query_as::<_, RatingStats>(
            r#"
            SELECT COALESCE(AVG(score)::FLOAT8, 0) AS average, COUNT(*) AS count
            FROM ratings
            WHERE blog_id = $1
            "#,
        )
        .bind(blog_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}
