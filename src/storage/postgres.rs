//! PostgreSQL storage backend

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{like_pattern, Storage};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::models::{
    Favorite, FeedPage, FeedPost, FeedScope, ListItem, ListSearchHit, ListSummary, ListUpdate,
    MediaCategory, MediaList, NewFavorite, NewList, NewListItem, NewPost, NewRating, NewUser,
    Post, ProfileUpdate, Rating, User, UserSearchHit, SEARCH_LIMIT,
};

const FEED_SELECT: &str = r#"
    SELECT p.*, u.name AS user_name, u.avatar_url AS user_avatar
    FROM posts p
    JOIN users u ON u.id = p.user_id
"#;

/// `Storage` over a `sqlx` Postgres pool
#[derive(Clone)]
pub struct PgStorage {
    db: Database,
}

impl PgStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }
}

/// Insert or replace the user's rating for one piece of media
async fn save_rating<'e, E>(executor: E, user_id: Uuid, rating: &NewRating) -> Result<Rating>
where
    E: PgExecutor<'e>,
{
    let saved = sqlx::query_as::<_, Rating>(
        r#"
        INSERT INTO user_ratings
            (user_id, media_id, media_type, media_title, media_image, rating, comment)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, media_id, media_type) DO UPDATE
        SET rating = EXCLUDED.rating,
            comment = EXCLUDED.comment,
            media_title = EXCLUDED.media_title,
            media_image = EXCLUDED.media_image
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&rating.media_id)
    .bind(rating.media_type)
    .bind(&rating.media_title)
    .bind(&rating.media_image)
    .bind(rating.rating)
    .bind(rating.comment_text())
    .fetch_one(executor)
    .await?;

    debug!(
        "Saved {}-star rating for {} {} by {}",
        saved.rating, saved.media_type, saved.media_id, user_id
    );
    Ok(saved)
}

/// Name of the violated constraint, if `err` is a constraint violation
fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl Storage for PgStorage {
    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(c) if c.contains("email") => Error::conflict("Email already registered"),
            Some(c) if c.contains("username") => Error::conflict("Username already taken"),
            _ => Error::from(e),
        })?;

        info!("Created user {}", created.id);
        Ok(created)
    }

    async fn update_user_bio(&self, user_id: Uuid, bio: &str) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("UPDATE users SET bio = $2 WHERE id = $1 RETURNING *")
                .bind(user_id)
                .bind(bio)
                .fetch_optional(self.pool())
                .await?;
        Ok(user)
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $2, email = $3, bio = COALESCE($4, bio), avatar_url = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.bio)
        .bind(&update.avatar_url)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(c) if c.contains("email") => Error::conflict("Email already registered"),
            _ => Error::from(e),
        })?;
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("user", user_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        // Withdraw the user's likes from other people's counters before the
        // cascade removes the like rows.
        sqlx::query(
            r#"
            UPDATE posts SET like_count = GREATEST(like_count - 1, 0)
            WHERE id IN (SELECT post_id FROM post_likes WHERE user_id = $1)
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::not_found("user", user_id));
        }

        tx.commit().await?;
        info!("Deleted user {} and owned records", user_id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    async fn get_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>> {
        let favorites = sqlx::query_as::<_, Favorite>(
            "SELECT * FROM user_favorites WHERE user_id = $1 ORDER BY category",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(favorites)
    }

    async fn set_favorite(&self, user_id: Uuid, favorite: &NewFavorite) -> Result<Favorite> {
        let saved = sqlx::query_as::<_, Favorite>(
            r#"
            INSERT INTO user_favorites (user_id, category, title, media_id, media_image)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, category) DO UPDATE
            SET title = EXCLUDED.title,
                media_id = EXCLUDED.media_id,
                media_image = EXCLUDED.media_image
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(favorite.category)
        .bind(&favorite.title)
        .bind(&favorite.media_id)
        .bind(&favorite.media_image)
        .fetch_one(self.pool())
        .await?;
        Ok(saved)
    }

    async fn delete_favorite(&self, user_id: Uuid, category: MediaCategory) -> Result<()> {
        sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND category = $2")
            .bind(user_id)
            .bind(category)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------------

    async fn get_ratings(&self, user_id: Uuid) -> Result<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            "SELECT * FROM user_ratings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(ratings)
    }

    async fn upsert_rating(&self, user_id: Uuid, rating: &NewRating) -> Result<Rating> {
        save_rating(self.pool(), user_id, rating).await
    }

    async fn delete_rating(
        &self,
        user_id: Uuid,
        media_id: &str,
        media_type: MediaCategory,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM user_ratings WHERE user_id = $1 AND media_id = $2 AND media_type = $3",
        )
        .bind(user_id)
        .bind(media_id)
        .bind(media_type)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    async fn get_lists(&self, user_id: Uuid) -> Result<Vec<ListSummary>> {
        let lists = sqlx::query_as::<_, ListSummary>(
            r#"
            SELECT l.*, COUNT(i.id) AS item_count
            FROM user_lists l
            LEFT JOIN user_list_items i ON i.list_id = l.id
            WHERE l.user_id = $1
            GROUP BY l.id
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(lists)
    }

    async fn get_list_by_id(&self, list_id: Uuid) -> Result<Option<MediaList>> {
        let list = sqlx::query_as::<_, MediaList>("SELECT * FROM user_lists WHERE id = $1")
            .bind(list_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(list)
    }

    async fn create_list(&self, user_id: Uuid, list: &NewList) -> Result<MediaList> {
        let created = sqlx::query_as::<_, MediaList>(
            r#"
            INSERT INTO user_lists (user_id, name, description, cover_image)
            VALUES ($1, $2, COALESCE($3, ''), $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&list.name)
        .bind(&list.description)
        .bind(&list.cover_image)
        .fetch_one(self.pool())
        .await?;
        Ok(created)
    }

    async fn update_list(
        &self,
        user_id: Uuid,
        list_id: Uuid,
        update: &ListUpdate,
    ) -> Result<Option<MediaList>> {
        let list = sqlx::query_as::<_, MediaList>(
            r#"
            UPDATE user_lists
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                cover_image = COALESCE($5, cover_image)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(list_id)
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.cover_image)
        .fetch_optional(self.pool())
        .await?;
        Ok(list)
    }

    async fn delete_list(&self, user_id: Uuid, list_id: Uuid) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            DELETE FROM user_list_items
            WHERE list_id = (SELECT id FROM user_lists WHERE id = $1 AND user_id = $2)
            "#,
        )
        .bind(list_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM user_lists WHERE id = $1 AND user_id = $2")
            .bind(list_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>> {
        let items = sqlx::query_as::<_, ListItem>(
            "SELECT * FROM user_list_items WHERE list_id = $1 ORDER BY added_at",
        )
        .bind(list_id)
        .fetch_all(self.pool())
        .await?;
        Ok(items)
    }

    async fn add_list_item(&self, list_id: Uuid, item: &NewListItem) -> Result<ListItem> {
        let added = sqlx::query_as::<_, ListItem>(
            r#"
            INSERT INTO user_list_items (list_id, media_id, media_type, media_title, media_image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(list_id)
        .bind(&item.media_id)
        .bind(&item.media_type)
        .bind(&item.media_title)
        .bind(&item.media_image)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(c) if c.contains("list_id") => Error::not_found("list", list_id),
            _ => Error::from(e),
        })?;
        Ok(added)
    }

    async fn remove_list_item(&self, list_id: Uuid, item_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_list_items WHERE id = $1 AND list_id = $2")
            .bind(item_id)
            .bind(list_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_lists(&self, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_lists WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------------

    async fn find_post_by_user_and_media(
        &self,
        user_id: Uuid,
        media_id: &str,
        media_type: MediaCategory,
    ) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE user_id = $1 AND media_id = $2 AND media_type = $3",
        )
        .bind(user_id)
        .bind(media_id)
        .bind(media_type)
        .fetch_optional(self.pool())
        .await?;
        Ok(post)
    }

    #[instrument(skip(self, post), fields(media_id = %post.media_id))]
    async fn create_post(&self, user_id: Uuid, post: &NewPost) -> Result<Post> {
        let mut tx = self.pool().begin().await?;

        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts
                (user_id, media_id, media_type, media_title, media_image, rating, comment,
                 is_favorite, first_time, has_spoilers)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&post.media_id)
        .bind(post.media_type)
        .bind(&post.media_title)
        .bind(&post.media_image)
        .bind(post.rating)
        .bind(&post.comment)
        .bind(post.is_favorite())
        .bind(post.first_time())
        .bind(post.has_spoilers())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(c) if c == "posts_user_media_idx" => {
                Error::conflict("You already posted about this title")
            }
            _ => Error::from(e),
        })?;

        save_rating(&mut *tx, user_id, &post.to_rating()).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(post)
    }

    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<FeedPost>> {
        let sql = format!(
            "{} WHERE p.user_id = $1 ORDER BY p.created_at DESC, p.id DESC",
            FEED_SELECT
        );
        let posts = sqlx::query_as::<_, FeedPost>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(posts)
    }

    async fn get_all_posts(&self) -> Result<Vec<FeedPost>> {
        let sql = format!("{} ORDER BY p.created_at DESC, p.id DESC", FEED_SELECT);
        let posts = sqlx::query_as::<_, FeedPost>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(posts)
    }

    #[instrument(skip(self))]
    async fn get_feed(
        &self,
        viewer_id: Uuid,
        scope: FeedScope,
        limit: i64,
        offset: i64,
    ) -> Result<FeedPage> {
        let following_only = scope == FeedScope::Following;
        let filter = r#"
            WHERE ($1 = FALSE
                   OR p.user_id = $2
                   OR p.user_id IN (SELECT following_id FROM follows WHERE follower_id = $2))
        "#;

        let sql = format!(
            "{} {} ORDER BY p.created_at DESC, p.id DESC LIMIT $3 OFFSET $4",
            FEED_SELECT, filter
        );
        let items = sqlx::query_as::<_, FeedPost>(&sql)
            .bind(following_only)
            .bind(viewer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM posts p {}", filter);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(following_only)
            .bind(viewer_id)
            .fetch_one(self.pool())
            .await?;

        Ok(FeedPage { items, total })
    }

    async fn like_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32> {
        let mut tx = self.pool().begin().await?;

        let current =
            sqlx::query_scalar::<_, i32>("SELECT like_count FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::not_found("post", post_id))?;

        let inserted = sqlx::query(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let count = if inserted > 0 {
            sqlx::query_scalar::<_, i32>(
                "UPDATE posts SET like_count = like_count + 1 WHERE id = $1 RETURNING like_count",
            )
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            current
        };

        tx.commit().await?;
        Ok(count)
    }

    async fn unlike_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32> {
        let mut tx = self.pool().begin().await?;

        let current =
            sqlx::query_scalar::<_, i32>("SELECT like_count FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::not_found("post", post_id))?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let count = if removed > 0 {
            sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE posts SET like_count = GREATEST(like_count - 1, 0)
                WHERE id = $1
                RETURNING like_count
                "#,
            )
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            current
        };

        tx.commit().await?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Social graph and search
    // ------------------------------------------------------------------------

    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchHit>> {
        let hits = sqlx::query_as::<_, UserSearchHit>(
            r#"
            SELECT id, name, username, avatar_url, bio
            FROM users
            WHERE name ILIKE $1 OR username ILIKE $1
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(like_pattern(query))
        .bind(SEARCH_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(hits)
    }

    async fn search_lists(&self, query: &str) -> Result<Vec<ListSearchHit>> {
        let hits = sqlx::query_as::<_, ListSearchHit>(
            r#"
            SELECT l.id, l.name, l.cover_image, l.user_id, u.name AS user_name,
                   COUNT(i.id) AS item_count
            FROM user_lists l
            JOIN users u ON u.id = l.user_id
            LEFT JOIN user_list_items i ON i.list_id = l.id
            WHERE l.name ILIKE $1
            GROUP BY l.id, u.name
            ORDER BY l.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(like_pattern(query))
        .bind(SEARCH_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(hits)
    }

    async fn follow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()> {
        if follower_id == following_id {
            return Err(Error::bad_request("You cannot follow yourself"));
        }

        sqlx::query(
            r#"
            INSERT INTO follows (follower_id, following_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(following_id)
        .execute(self.pool())
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(c) if c.contains("following_id") => Error::not_found("user", following_id),
            _ => Error::from(e),
        })?;
        Ok(())
    }

    async fn unfollow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
            .bind(follower_id)
            .bind(following_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2)",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn get_follower_count(&self, user_id: Uuid) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE following_id = $1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    async fn get_following_count(&self, user_id: Uuid) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }
}
