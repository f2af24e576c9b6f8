use super::DBClient;
use crate::dtos::BlogListItemDto;
use crate::models::{Blog, BlogStatus};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

const BLOG_COLUMNS: &str = r#"
    id, title, slug, author_id, body, category_id, status, featured_image,
    views, created_at, updated_at
"#;

// Listing rows carry author, category and the rating aggregate
const LIST_SELECT: &str = r#"
    SELECT b.id, b.title, b.slug, b.body, b.status, b.featured_image, b.views,
           b.author_id,
           u.username AS author_username,
           COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS author_name,
           b.category_id,
           c.name AS category_name,
           COALESCE(r.average, 0)::FLOAT8 AS average_rating,
           COALESCE(r.count, 0) AS rating_count,
           b.created_at, b.updated_at
    FROM blogs b
    JOIN users u ON u.id = b.author_id
    LEFT JOIN categories c ON c.id = b.category_id
    LEFT JOIN (
        SELECT blog_id, AVG(score)::FLOAT8 AS average, COUNT(*) AS count
        FROM ratings
        GROUP BY blog_id
    ) r ON r.blog_id = b.id
"#;

const LIST_COUNT: &str = r#"
    SELECT COUNT(*)
    FROM blogs b
    JOIN users u ON u.id = b.author_id
"#;

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub slug: String,
    pub author_id: Uuid,
    pub body: String,
    pub category_id: Option<i64>,
    pub status: BlogStatus,
    pub featured_image: Option<String>,
}

/// Editable fields. The slug is fixed at creation; `featured_image` is only
/// replaced when `Some`.
#[derive(Debug, Clone)]
pub struct BlogChanges {
    pub title: String,
    pub body: String,
    pub category_id: Option<i64>,
    pub status: BlogStatus,
    pub featured_image: Option<String>,
}

/// Narrowing applied to a blog listing. Empty search terms must be
/// normalised to `None` by the caller.
#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub search: Option<String>,
    pub category_id: Option<i64>,
    pub author_id: Option<Uuid>,
    pub published_only: bool,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlogSort {
    #[default]
    Newest,
    Rating,
    Views,
}

impl BlogSort {
    /// `rating` and `views` are recognised, anything else is newest first
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("rating") => BlogSort::Rating,
            Some("views") => BlogSort::Views,
            _ => BlogSort::Newest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            BlogSort::Newest => " ORDER BY b.created_at DESC, b.id DESC",
            BlogSort::Rating => " ORDER BY average_rating DESC, b.created_at DESC, b.id DESC",
            BlogSort::Views => " ORDER BY b.views DESC, b.created_at DESC, b.id DESC",
        }
    }
}

/// `%term%` for ILIKE with the term's own wildcards taken literally
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BlogFilter) {
    qb.push(" WHERE TRUE");

    if filter.published_only {
        qb.push(" AND b.status = 'published'");
    }

    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.body ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.username ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(category_id) = filter.category_id {
        qb.push(" AND b.category_id = ").push_bind(category_id);
    }

    if let Some(author_id) = filter.author_id {
        qb.push(" AND b.author_id = ").push_bind(author_id);
    }

    if let Some(exclude_id) = filter.exclude_id {
        qb.push(" AND b.id != ").push_bind(exclude_id);
    }
}

pub trait BlogExt {
    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, sqlx::Error>;

    /// Listing row (author, category, rating aggregate) of one blog
    async fn get_blog_item(&self, blog_id: i64) -> Result<Option<BlogListItemDto>, sqlx::Error>;

    /// Slugs equal to `base` or of the form `base-…`
    async fn get_taken_slugs(&self, base: &str) -> Result<Vec<String>, sqlx::Error>;

    async fn create_blog(&self, new_blog: NewBlog) -> Result<Blog, sqlx::Error>;

    async fn update_blog(&self, blog_id: i64, changes: BlogChanges) -> Result<Blog, sqlx::Error>;

    /// Ratings and favorites go with it (ON DELETE CASCADE)
    async fn delete_blog(&self, blog_id: i64) -> Result<(), sqlx::Error>;

    async fn list_blogs(
        &self,
        filter: &BlogFilter,
        sort: BlogSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BlogListItemDto>, sqlx::Error>;

    async fn count_blogs(&self, filter: &BlogFilter) -> Result<i64, sqlx::Error>;

    /// Atomic `views = views + 1`
    async fn increment_views(&self, blog_id: i64) -> Result<(), sqlx::Error>;
}

impl BlogExt for DBClient {
    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, sqlx::Error> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {} FROM blogs WHERE slug = $1",
            BLOG_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blog)
    }

    async fn get_blog_item(&self, blog_id: i64) -> Result<Option<BlogListItemDto>, sqlx::Error> {
        let item = sqlx::query_as::<_, BlogListItemDto>(&format!("{} WHERE b.id = $1", LIST_SELECT))
            .bind(blog_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn get_taken_slugs(&self, base: &str) -> Result<Vec<String>, sqlx::Error> {
        let prefix = like_pattern(&format!("{}-", base));
        // like_pattern wraps in %…%; only the trailing wildcard is wanted here
        let prefix = &prefix[1..];

        let slugs: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM blogs WHERE slug = $1 OR slug LIKE $2")
                .bind(base)
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;

        Ok(slugs)
    }

    async fn create_blog(&self, new_blog: NewBlog) -> Result<Blog, sqlx::Error> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            r#"
            INSERT INTO blogs (title, slug, author_id, body, category_id, status, featured_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            BLOG_COLUMNS
        ))
        .bind(new_blog.title)
        .bind(new_blog.slug)
        .bind(new_blog.author_id)
        .bind(new_blog.body)
        .bind(new_blog.category_id)
        .bind(new_blog.status)
        .bind(new_blog.featured_image)
        .fetch_one(&self.pool)
        .await?;

        Ok(blog)
    }

    async fn update_blog(&self, blog_id: i64, changes: BlogChanges) -> Result<Blog, sqlx::Error> {
        let blog = sqlx::query_as::<_, Blog>(&format!(
            r#"
            UPDATE blogs
            SET title = $1, body = $2, category_id = $3, status = $4,
                featured_image = COALESCE($5, featured_image),
                updated_at = Now()
            WHERE id = $6
            RETURNING {}
            "#,
            BLOG_COLUMNS
        ))
        .bind(changes.title)
        .bind(changes.body)
        .bind(changes.category_id)
        .bind(changes.status)
        .bind(changes.featured_image)
        .bind(blog_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(blog)
    }

    async fn delete_blog(&self, blog_id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = $1")
            .bind(blog_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn list_blogs(
        &self,
        filter: &BlogFilter,
        sort: BlogSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BlogListItemDto>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(LIST_SELECT);
        push_filters(&mut qb, filter);
        qb.push(sort.order_by());
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let blogs = qb
            .build_query_as::<BlogListItemDto>()
            .fetch_all(&self.pool)
            .await?;

        Ok(blogs)
    }

    async fn count_blogs(&self, filter: &BlogFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(LIST_COUNT);
        push_filters(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn increment_views(&self, blog_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE blogs SET views = views + 1 WHERE id = $1")
            .bind(blog_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[test]
    fn sort_param_defaults_to_newest() {
        assert_eq!(BlogSort::from_param(Some("rating")), BlogSort::Rating);
        assert_eq!(BlogSort::from_param(Some("views")), BlogSort::Views);
        assert_eq!(BlogSort::from_param(Some("oldest")), BlogSort::Newest);
        assert_eq!(BlogSort::from_param(None), BlogSort::Newest);
    }
}
