use super::DBClient;
use crate::models::Category;

pub trait CategoryExt {
    /// All categories ordered by name
    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error>;

    async fn get_category(&self, category_id: i64) -> Result<Option<Category>, sqlx::Error>;

    async fn create_category(&self, name: &str, description: &str)
    -> Result<Category, sqlx::Error>;

    /// `RowNotFound` when the id does not exist
    async fn update_category(
        &self,
        category_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Category, sqlx::Error>;

    /// Blogs in the category keep existing with no category
    async fn delete_category(&self, category_id: i64) -> Result<(), sqlx::Error>;
}

impl CategoryExt for DBClient {
    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn get_category(&self, category_id: i64) -> Result<Option<Category>, sqlx::Error> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories WHERE id = $1",
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Category, sqlx::Error> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(category)
    }

    async fn update_category(
        &self,
        category_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Category, sqlx::Error> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET name = $1, description = $2
            WHERE id = $3
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(category)
    }

    async fn delete_category(&self, category_id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }
}
