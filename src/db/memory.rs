//! In-memory store implementing the database traits, used by flow tests.
//! Mirrors the PostgreSQL constraints that the flows rely on: unique
//! username/email/slug/category name, one rating and one favorite per
//! (user, blog) and cascading deletes.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use uuid::Uuid;

use super::{
    BlogChanges, BlogExt, BlogFilter, BlogSort, CategoryExt, FavoriteExt, NewBlog, NewUser,
    ProfileChanges, RatingExt, UserExt,
};
use crate::dtos::{BlogListItemDto, FavoriteItemDto};
use crate::models::{Blog, BlogStatus, Category, Rating, RatingStats, User, UserRole};

#[derive(Debug)]
struct UniqueViolation(&'static str);

impl fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate key value violates unique constraint \"{}\"", self.0)
    }
}

impl StdError for UniqueViolation {}

impl DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.0)
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

fn unique_violation(constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(UniqueViolation(constraint)))
}

/// Row of the `favorites` table
#[derive(Debug, Clone)]
pub struct Favorite {
    pub id: i64,
    pub user_id: Uuid,
    pub blog_id: i64,
    pub created_at: chrono::DateTime<Utc>,
}

/// Same result as `COALESCE(AVG(score), 0), COUNT(*)`
fn rating_stats(scores: &[i32]) -> RatingStats {
    if scores.is_empty() {
        return RatingStats::default();
    }
    let sum: i64 = scores.iter().map(|s| *s as i64).sum();
    RatingStats {
        average: sum as f64 / scores.len() as f64,
        count: scores.len() as i64,
    }
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    categories: Vec<Category>,
    blogs: Vec<Blog>,
    ratings: Vec<Rating>,
    favorites: Vec<Favorite>,
    // Slugs committed by a "concurrent" writer: inserts collide with them
    // but the slug scan does not see them yet
    unseen_slugs: Vec<String>,
    next_id: i64,
    clock: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    // Strictly increasing timestamps keep "newest first" deterministic
    fn now(&mut self) -> chrono::DateTime<Utc> {
        self.clock += 1;
        Utc::now() + Duration::milliseconds(self.clock)
    }

    fn stats(&self, blog_id: i64) -> RatingStats {
        let scores: Vec<i32> = self
            .ratings
            .iter()
            .filter(|r| r.blog_id == blog_id)
            .map(|r| r.score)
            .collect();
        rating_stats(&scores)
    }

    fn list_item(&self, blog: &Blog) -> Option<BlogListItemDto> {
        let author = self.users.iter().find(|u| u.id == blog.author_id)?;
        let category_name = blog.category_id.and_then(|id| {
            self.categories
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
        });
        let stats = self.stats(blog.id);

        Some(BlogListItemDto {
            id: blog.id,
            title: blog.title.clone(),
            slug: blog.slug.clone(),
            body: blog.body.clone(),
            excerpt: String::new(),
            status: blog.status,
            featured_image: blog.featured_image.clone(),
            views: blog.views,
            author_id: author.id,
            author_username: author.username.clone(),
            author_name: author.full_name(),
            category_id: blog.category_id,
            category_name,
            average_rating: stats.average,
            rating_count: stats.count,
            created_at: blog.created_at,
            updated_at: blog.updated_at,
        })
    }

    fn matches(&self, item: &BlogListItemDto, filter: &BlogFilter) -> bool {
        if filter.published_only && item.status != BlogStatus::Published {
            return false;
        }
        if let Some(term) = &filter.search {
            let term = term.to_lowercase();
            let hit = item.title.to_lowercase().contains(&term)
                || item.body.to_lowercase().contains(&term)
                || item.author_username.to_lowercase().contains(&term);
            if !hit {
                return false;
            }
        }
        if filter.category_id.is_some() && item.category_id != filter.category_id {
            return false;
        }
        if filter.author_id.is_some_and(|id| item.author_id != id) {
            return false;
        }
        if filter.exclude_id == Some(item.id) {
            return false;
        }
        true
    }

    fn filtered(&self, filter: &BlogFilter) -> Vec<BlogListItemDto> {
        self.blogs
            .iter()
            .filter_map(|b| self.list_item(b))
            .filter(|item| self.matches(item, filter))
            .collect()
    }

    fn has_published(&self, user_id: Uuid) -> bool {
        self.blogs
            .iter()
            .any(|b| b.author_id == user_id && b.status == BlogStatus::Published)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Active, verified user with password "password123"
    pub fn add_user(&self, username: &str, role: UserRole) -> User {
        let password = crate::utils::password::hash("password123").unwrap();
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password,
            first_name: String::new(),
            last_name: String::new(),
            role,
            bio: String::new(),
            profile_picture: None,
            website: String::new(),
            twitter: String::new(),
            linkedin: String::new(),
            github: String::new(),
            is_active: true,
            is_email_verified: true,
            email_verification_token: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        user
    }

    pub fn add_blog(&self, author: &User, title: &str, body: &str, slug: &str) -> Blog {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let now = state.now();
        let blog = Blog {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
            author_id: author.id,
            body: body.to_string(),
            category_id: None,
            status: BlogStatus::Published,
            featured_image: None,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        state.blogs.push(blog.clone());
        blog
    }

    pub fn set_status(&self, blog_id: i64, status: BlogStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(blog) = state.blogs.iter_mut().find(|b| b.id == blog_id) {
            blog.status = status;
        }
    }

    /// Keep `slug` out of `get_taken_slugs`, as if another request had
    /// just inserted it
    pub fn hide_slug(&self, slug: &str) {
        self.state.lock().unwrap().unseen_slugs.push(slug.to_string());
    }

    pub fn set_category(&self, blog_id: i64, category_id: Option<i64>) {
        let mut state = self.state.lock().unwrap();
        if let Some(blog) = state.blogs.iter_mut().find(|b| b.id == blog_id) {
            blog.category_id = category_id;
        }
    }

    pub fn set_views(&self, blog_id: i64, views: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(blog) = state.blogs.iter_mut().find(|b| b.id == blog_id) {
            blog.views = views;
        }
    }

    pub fn blog(&self, blog_id: i64) -> Option<Blog> {
        let state = self.state.lock().unwrap();
        state.blogs.iter().find(|b| b.id == blog_id).cloned()
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        let state = self.state.lock().unwrap();
        state.users.iter().find(|u| u.id == user_id).cloned()
    }

    pub fn ratings(&self) -> Vec<Rating> {
        self.state.lock().unwrap().ratings.clone()
    }

    pub fn favorites(&self) -> Vec<Favorite> {
        self.state.lock().unwrap().favorites.clone()
    }
}

impl UserExt for MemoryStore {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let found = state.users.iter().find(|u| {
            if let Some(id) = user_id {
                u.id == id
            } else if let Some(username) = username {
                u.username == username
            } else if let Some(email) = email {
                u.email == email
            } else if let Some(token) = token {
                u.email_verification_token.as_deref() == Some(token)
            } else {
                false
            }
        });
        Ok(found.cloned())
    }

    async fn save_user(&self, new_user: NewUser) -> Result<User, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(unique_violation("users_username_key"));
        }
        if state.users.iter().any(|u| u.email == new_user.email) {
            return Err(unique_violation("users_email_key"));
        }
        let now = state.now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            role: new_user.role,
            bio: String::new(),
            profile_picture: None,
            website: String::new(),
            twitter: String::new(),
            linkedin: String::new(),
            github: String::new(),
            is_active: new_user.is_active,
            is_email_verified: new_user.is_email_verified,
            email_verification_token: new_user.verification_token,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn verify_email_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let found = state
            .users
            .iter_mut()
            .find(|u| u.email_verification_token.as_deref() == Some(token));
        Ok(found.map(|user| {
            user.is_active = true;
            user.is_email_verified = true;
            user.email_verification_token = None;
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .iter()
            .any(|u| u.email == changes.email && u.id != user_id)
        {
            return Err(unique_violation("users_email_key"));
        }
        let now = state.now();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.first_name = changes.first_name;
        user.last_name = changes.last_name;
        user.email = changes.email;
        user.bio = changes.bio;
        user.website = changes.website;
        user.twitter = changes.twitter;
        user.linkedin = changes.linkedin;
        user.github = changes.github;
        if changes.profile_picture.is_some() {
            user.profile_picture = changes.profile_picture;
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn email_taken_by_other(&self, user_id: Uuid, email: &str) -> Result<bool, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .any(|u| u.email == email && u.id != user_id))
    }

    async fn get_publishing_authors(
        &self,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let mut authors: Vec<User> = state
            .users
            .iter()
            .filter(|u| u.role.can_author() && state.has_published(u.id))
            .cloned()
            .collect();
        authors.sort_by(|a, b| {
            (&a.first_name, &a.last_name, &a.username).cmp(&(
                &b.first_name,
                &b.last_name,
                &b.username,
            ))
        });
        let limit = limit.unwrap_or(i64::MAX);
        Ok(authors
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_publishing_authors(&self) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| u.role.can_author() && state.has_published(u.id))
            .count() as i64)
    }
}

impl CategoryExt for MemoryStore {
    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let mut categories = state.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, category_id: i64) -> Result<Option<Category>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.categories.iter().find(|c| c.id == category_id).cloned())
    }

    async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Category, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if state.categories.iter().any(|c| c.name == name) {
            return Err(unique_violation("categories_name_key"));
        }
        let id = state.next_id();
        let created_at = state.now();
        let category = Category {
            id,
            name: name.to_string(),
            description: description.to_string(),
            created_at,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        category_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Category, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if state
            .categories
            .iter()
            .any(|c| c.name == name && c.id != category_id)
        {
            return Err(unique_violation("categories_name_key"));
        }
        let category = state
            .categories
            .iter_mut()
            .find(|c| c.id == category_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        category.name = name.to_string();
        category.description = description.to_string();
        Ok(category.clone())
    }

    async fn delete_category(&self, category_id: i64) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let before = state.categories.len();
        state.categories.retain(|c| c.id != category_id);
        if state.categories.len() == before {
            return Err(sqlx::Error::RowNotFound);
        }
        for blog in state.blogs.iter_mut() {
            if blog.category_id == Some(category_id) {
                blog.category_id = None;
            }
        }
        Ok(())
    }
}

impl BlogExt for MemoryStore {
    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.blogs.iter().find(|b| b.slug == slug).cloned())
    }

    async fn get_blog_item(&self, blog_id: i64) -> Result<Option<BlogListItemDto>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blogs
            .iter()
            .find(|b| b.id == blog_id)
            .and_then(|b| state.list_item(b)))
    }

    async fn get_taken_slugs(&self, base: &str) -> Result<Vec<String>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let prefix = format!("{}-", base);
        Ok(state
            .blogs
            .iter()
            .filter(|b| b.slug == base || b.slug.starts_with(&prefix))
            .filter(|b| !state.unseen_slugs.contains(&b.slug))
            .map(|b| b.slug.clone())
            .collect())
    }

    async fn create_blog(&self, new_blog: NewBlog) -> Result<Blog, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if state.blogs.iter().any(|b| b.slug == new_blog.slug) {
            return Err(unique_violation("blogs_slug_key"));
        }
        let id = state.next_id();
        let now = state.now();
        let blog = Blog {
            id,
            title: new_blog.title,
            slug: new_blog.slug,
            author_id: new_blog.author_id,
            body: new_blog.body,
            category_id: new_blog.category_id,
            status: new_blog.status,
            featured_image: new_blog.featured_image,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        state.blogs.push(blog.clone());
        Ok(blog)
    }

    async fn update_blog(&self, blog_id: i64, changes: BlogChanges) -> Result<Blog, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let blog = state
            .blogs
            .iter_mut()
            .find(|b| b.id == blog_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        blog.title = changes.title;
        blog.body = changes.body;
        blog.category_id = changes.category_id;
        blog.status = changes.status;
        if changes.featured_image.is_some() {
            blog.featured_image = changes.featured_image;
        }
        blog.updated_at = now;
        Ok(blog.clone())
    }

    async fn delete_blog(&self, blog_id: i64) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let before = state.blogs.len();
        state.blogs.retain(|b| b.id != blog_id);
        if state.blogs.len() == before {
            return Err(sqlx::Error::RowNotFound);
        }
        state.ratings.retain(|r| r.blog_id != blog_id);
        state.favorites.retain(|f| f.blog_id != blog_id);
        Ok(())
    }

    async fn list_blogs(
        &self,
        filter: &BlogFilter,
        sort: BlogSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BlogListItemDto>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let mut items = state.filtered(filter);
        items.sort_by(|a, b| {
            let primary = match sort {
                BlogSort::Newest => std::cmp::Ordering::Equal,
                BlogSort::Rating => b.average_rating.total_cmp(&a.average_rating),
                BlogSort::Views => b.views.cmp(&a.views),
            };
            primary
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_blogs(&self, filter: &BlogFilter) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.filtered(filter).len() as i64)
    }

    async fn increment_views(&self, blog_id: i64) -> Result<(), sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(blog) = state.blogs.iter_mut().find(|b| b.id == blog_id) {
            blog.views += 1;
        }
        Ok(())
    }
}

impl RatingExt for MemoryStore {
    async fn upsert_rating(
        &self,
        blog_id: i64,
        user_id: Uuid,
        score: i32,
    ) -> Result<Rating, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(rating) = state
            .ratings
            .iter_mut()
            .find(|r| r.blog_id == blog_id && r.user_id == user_id)
        {
            rating.score = score;
            return Ok(rating.clone());
        }
        let id = state.next_id();
        let created_at = state.now();
        let rating = Rating {
            id,
            blog_id,
            user_id,
            score,
            created_at,
        };
        state.ratings.push(rating.clone());
        Ok(rating)
    }

    async fn get_user_rating(
        &self,
        blog_id: i64,
        user_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ratings
            .iter()
            .find(|r| r.blog_id == blog_id && r.user_id == user_id)
            .map(|r| r.score))
    }

    async fn get_rating_stats(&self, blog_id: i64) -> Result<RatingStats, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.stats(blog_id))
    }
}

impl FavoriteExt for MemoryStore {
    async fn toggle_favorite(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let before = state.favorites.len();
        state
            .favorites
            .retain(|f| !(f.user_id == user_id && f.blog_id == blog_id));
        if state.favorites.len() < before {
            return Ok(false);
        }
        let id = state.next_id();
        let created_at = state.now();
        state.favorites.push(Favorite {
            id,
            user_id,
            blog_id,
            created_at,
        });
        Ok(true)
    }

    async fn is_favorited(&self, user_id: Uuid, blog_id: i64) -> Result<bool, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .favorites
            .iter()
            .any(|f| f.user_id == user_id && f.blog_id == blog_id))
    }

    async fn get_user_favorites(&self, user_id: Uuid) -> Result<Vec<FavoriteItemDto>, sqlx::Error> {
        let state = self.state.lock().unwrap();
        let mut items: Vec<FavoriteItemDto> = state
            .favorites
            .iter()
            .filter(|f| f.user_id == user_id)
            .filter_map(|f| {
                let blog = state.blogs.iter().find(|b| b.id == f.blog_id)?;
                let author = state.users.iter().find(|u| u.id == blog.author_id)?;
                Some(FavoriteItemDto {
                    favorite_id: f.id,
                    favorited_at: f.created_at,
                    blog_id: blog.id,
                    title: blog.title.clone(),
                    slug: blog.slug.clone(),
                    status: blog.status,
                    featured_image: blog.featured_image.clone(),
                    author_username: author.username.clone(),
                    author_name: author.full_name(),
                    blog_created_at: blog.created_at,
                })
            })
            .collect();
        items.sort_by(|a, b| {
            b.favorited_at
                .cmp(&a.favorited_at)
                .then(b.favorite_id.cmp(&a.favorite_id))
        });
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_no_ratings_is_zero() {
        let stats = rating_stats(&[]);
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn average_is_arithmetic_mean() {
        let stats = rating_stats(&[2, 3, 6]);
        assert!((stats.average - 11.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(stats.count, 3);
    }
}
