//! Persistence for users, favorites, ratings, lists, posts and follows
//!
//! `Storage` is the seam between the HTTP layer and the data store. Two
//! backends implement it:
//!
//! - [`PgStorage`] - PostgreSQL through `sqlx`, used in production
//! - [`MemoryStorage`] - process-local maps, used for tests and local demos
//!
//! Uniqueness rules (one favorite per category, one rating and one post per
//! media item, one like per post, one follow per pair) are enforced by both
//! backends with upsert or insert-if-absent semantics.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Favorite, FeedPage, FeedPost, FeedScope, ListItem, ListSearchHit, ListSummary, ListUpdate,
    MediaCategory, MediaList, NewFavorite, NewList, NewListItem, NewPost, NewRating, NewUser,
    Post, ProfileUpdate, PublicProfile, PublicUser, Rating, RatingStats, User, UserSearchHit,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fails with `Conflict` when the username or email is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn update_user_bio(&self, user_id: Uuid, bio: &str) -> Result<Option<User>>;

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Removes the account and everything it owns. Likes the user gave are
    /// withdrawn from the liked posts' counters.
    async fn delete_user(&self, user_id: Uuid) -> Result<()>;

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    async fn get_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>>;

    /// Inserts or replaces the user's favorite for `favorite.category`
    async fn set_favorite(&self, user_id: Uuid, favorite: &NewFavorite) -> Result<Favorite>;

    async fn delete_favorite(&self, user_id: Uuid, category: MediaCategory) -> Result<()>;

    // ------------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------------

    async fn get_ratings(&self, user_id: Uuid) -> Result<Vec<Rating>>;

    /// Inserts or replaces the rating keyed by (user, media id, media type)
    async fn upsert_rating(&self, user_id: Uuid, rating: &NewRating) -> Result<Rating>;

    async fn delete_rating(
        &self,
        user_id: Uuid,
        media_id: &str,
        media_type: MediaCategory,
    ) -> Result<()>;

    async fn get_rating_stats(&self, user_id: Uuid) -> Result<RatingStats> {
        let ratings = self.get_ratings(user_id).await?;
        Ok(RatingStats::from_ratings(&ratings))
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    async fn get_lists(&self, user_id: Uuid) -> Result<Vec<ListSummary>>;

    async fn get_list_by_id(&self, list_id: Uuid) -> Result<Option<MediaList>>;

    async fn create_list(&self, user_id: Uuid, list: &NewList) -> Result<MediaList>;

    /// Returns `None` when the list does not exist or belongs to someone else
    async fn update_list(
        &self,
        user_id: Uuid,
        list_id: Uuid,
        update: &ListUpdate,
    ) -> Result<Option<MediaList>>;

    /// Deletes the list and its items; false when nothing of the user's matched
    async fn delete_list(&self, user_id: Uuid, list_id: Uuid) -> Result<bool>;

    async fn get_list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>>;

    async fn add_list_item(&self, list_id: Uuid, item: &NewListItem) -> Result<ListItem>;

    async fn remove_list_item(&self, list_id: Uuid, item_id: Uuid) -> Result<bool>;

    async fn count_lists(&self, user_id: Uuid) -> Result<i64>;

    // ------------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------------

    async fn find_post_by_user_and_media(
        &self,
        user_id: Uuid,
        media_id: &str,
        media_type: MediaCategory,
    ) -> Result<Option<Post>>;

    /// Publish a post and, in the same write, create or replace the
    /// author's rating for that media. Fails with `Conflict` when the user
    /// already posted about this media, leaving the rating untouched.
    async fn create_post(&self, user_id: Uuid, post: &NewPost) -> Result<Post>;

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>>;

    /// The user's posts, newest first
    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<FeedPost>>;

    /// Every post, newest first
    async fn get_all_posts(&self) -> Result<Vec<FeedPost>>;

    async fn get_feed(
        &self,
        viewer_id: Uuid,
        scope: FeedScope,
        limit: i64,
        offset: i64,
    ) -> Result<FeedPage>;

    /// Idempotent; returns the post's like count. `NotFound` for unknown posts.
    async fn like_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32>;

    /// Idempotent; returns the post's like count. `NotFound` for unknown posts.
    async fn unlike_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32>;

    // ------------------------------------------------------------------------
    // Social graph and search
    // ------------------------------------------------------------------------

    /// Case-insensitive substring match on name or username
    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchHit>>;

    /// Case-insensitive substring match on list name
    async fn search_lists(&self, query: &str) -> Result<Vec<ListSearchHit>>;

    /// Idempotent. Rejects self follows.
    async fn follow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()>;

    async fn unfollow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()>;

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool>;

    async fn get_follower_count(&self, user_id: Uuid) -> Result<i64>;

    async fn get_following_count(&self, user_id: Uuid) -> Result<i64>;

    async fn get_public_profile(&self, user_id: Uuid) -> Result<PublicProfile> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| crate::error::Error::not_found("user", user_id))?;

        Ok(PublicProfile {
            user: PublicUser::from(&user),
            favorites: self.get_favorites(user_id).await?,
            stats: self.get_rating_stats(user_id).await?,
            posts: self.get_user_posts(user_id).await?,
            list_count: self.count_lists(user_id).await?,
        })
    }

    async fn health_check(&self) -> Result<()>;
}

/// Escapes LIKE metacharacters and wraps the term for a substring match
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ana"), "%ana%");
        assert_eq!(like_pattern(" 100%_done "), "%100\\%\\_done%");
    }
}
