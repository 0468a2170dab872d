//! In-process storage backend
//!
//! Everything lives in one `RwLock`-guarded struct, so each operation is
//! atomic with respect to the others. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Storage;
use crate::error::{Error, Result};
use crate::models::{
    Favorite, FeedPage, FeedPost, FeedScope, ListItem, ListSearchHit, ListSummary, ListUpdate,
    MediaCategory, MediaList, NewFavorite, NewList, NewListItem, NewPost, NewRating, NewUser,
    Post, ProfileUpdate, Rating, User, UserSearchHit, SEARCH_LIMIT,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    favorites: Vec<Favorite>,
    ratings: Vec<Rating>,
    lists: Vec<MediaList>,
    list_items: Vec<ListItem>,
    /// Insertion order doubles as creation order
    posts: Vec<Post>,
    post_likes: HashSet<(Uuid, Uuid)>,
    /// (follower, following)
    follows: HashSet<(Uuid, Uuid)>,
}

impl Tables {
    fn save_rating(&mut self, user_id: Uuid, rating: &NewRating) -> Rating {
        if let Some(existing) = self.ratings.iter_mut().find(|r| {
            r.user_id == user_id
                && r.media_id == rating.media_id
                && r.media_type == rating.media_type
        }) {
            existing.rating = rating.rating;
            existing.comment = rating.comment_text().to_string();
            existing.media_title = rating.media_title.clone();
            existing.media_image = rating.media_image.clone();
            return existing.clone();
        }

        let created = Rating {
            id: Uuid::new_v4(),
            user_id,
            media_id: rating.media_id.clone(),
            media_type: rating.media_type,
            media_title: rating.media_title.clone(),
            media_image: rating.media_image.clone(),
            rating: rating.rating,
            comment: rating.comment_text().to_string(),
            created_at: Utc::now(),
        };
        self.ratings.push(created.clone());
        created
    }

    fn feed_post(&self, post: &Post) -> Option<FeedPost> {
        let author = self.users.get(&post.user_id)?;
        Some(FeedPost {
            post: post.clone(),
            user_name: author.name.clone(),
            user_avatar: author.avatar_url.clone(),
        })
    }

    fn newest_posts<'a>(
        &'a self,
        mut keep: impl FnMut(&Post) -> bool + 'a,
    ) -> impl Iterator<Item = FeedPost> + 'a {
        self.posts
            .iter()
            .rev()
            .filter(move |p| keep(*p))
            .filter_map(move |p| self.feed_post(p))
    }

    fn item_count(&self, list_id: Uuid) -> i64 {
        self.list_items.iter().filter(|i| i.list_id == list_id).count() as i64
    }

    fn post_mut(&mut self, post_id: Uuid) -> Result<&mut Post> {
        self.posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| Error::not_found("post", post_id))
    }
}

/// `Storage` kept entirely in memory
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[async_trait]
impl Storage for MemoryStorage {
    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(Error::conflict("Email already registered"));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(Error::conflict("Username already taken"));
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            bio: String::new(),
            avatar_url: None,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user_bio(&self, user_id: Uuid, bio: &str) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&user_id).map(|user| {
            user.bio = bio.to_string();
            user.clone()
        }))
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|u| u.id != user_id && u.email == update.email)
        {
            return Err(Error::conflict("Email already registered"));
        }

        Ok(tables.users.get_mut(&user_id).map(|user| {
            user.name = update.name.clone();
            user.email = update.email.clone();
            if let Some(bio) = &update.bio {
                user.bio = bio.clone();
            }
            user.avatar_url = update.avatar_url.clone();
            user.clone()
        }))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::not_found("user", user_id))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Err(Error::not_found("user", user_id));
        }

        let liked: Vec<Uuid> = tables
            .post_likes
            .iter()
            .filter(|(_, liker)| *liker == user_id)
            .map(|(post, _)| *post)
            .collect();
        for post in tables.posts.iter_mut().filter(|p| liked.contains(&p.id)) {
            post.like_count = (post.like_count - 1).max(0);
        }

        let owned_lists: HashSet<Uuid> = tables
            .lists
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.id)
            .collect();
        let owned_posts: HashSet<Uuid> = tables
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect();

        tables.favorites.retain(|f| f.user_id != user_id);
        tables.ratings.retain(|r| r.user_id != user_id);
        tables.list_items.retain(|i| !owned_lists.contains(&i.list_id));
        tables.lists.retain(|l| l.user_id != user_id);
        tables.posts.retain(|p| p.user_id != user_id);
        tables
            .post_likes
            .retain(|(post, liker)| *liker != user_id && !owned_posts.contains(post));
        tables
            .follows
            .retain(|(follower, following)| *follower != user_id && *following != user_id);

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    async fn get_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>> {
        let tables = self.tables.read().await;
        let mut favorites: Vec<Favorite> = tables
            .favorites
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        favorites.sort_by_key(|f| f.category.as_str());
        Ok(favorites)
    }

    async fn set_favorite(&self, user_id: Uuid, favorite: &NewFavorite) -> Result<Favorite> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .favorites
            .iter_mut()
            .find(|f| f.user_id == user_id && f.category == favorite.category)
        {
            existing.title = favorite.title.clone();
            existing.media_id = favorite.media_id.clone();
            existing.media_image = favorite.media_image.clone();
            return Ok(existing.clone());
        }

        let created = Favorite {
            id: Uuid::new_v4(),
            user_id,
            category: favorite.category,
            title: favorite.title.clone(),
            media_id: favorite.media_id.clone(),
            media_image: favorite.media_image.clone(),
        };
        tables.favorites.push(created.clone());
        Ok(created)
    }

    async fn delete_favorite(&self, user_id: Uuid, category: MediaCategory) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .favorites
            .retain(|f| !(f.user_id == user_id && f.category == category));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------------

    async fn get_ratings(&self, user_id: Uuid) -> Result<Vec<Rating>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratings
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_rating(&self, user_id: Uuid, rating: &NewRating) -> Result<Rating> {
        let mut tables = self.tables.write().await;
        Ok(tables.save_rating(user_id, rating))
    }

    async fn delete_rating(
        &self,
        user_id: Uuid,
        media_id: &str,
        media_type: MediaCategory,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.ratings.retain(|r| {
            !(r.user_id == user_id && r.media_id == media_id && r.media_type == media_type)
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    async fn get_lists(&self, user_id: Uuid) -> Result<Vec<ListSummary>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lists
            .iter()
            .rev()
            .filter(|l| l.user_id == user_id)
            .map(|l| ListSummary {
                list: l.clone(),
                item_count: tables.item_count(l.id),
            })
            .collect())
    }

    async fn get_list_by_id(&self, list_id: Uuid) -> Result<Option<MediaList>> {
        let tables = self.tables.read().await;
        Ok(tables.lists.iter().find(|l| l.id == list_id).cloned())
    }

    async fn create_list(&self, user_id: Uuid, list: &NewList) -> Result<MediaList> {
        let mut tables = self.tables.write().await;
        let created = MediaList {
            id: Uuid::new_v4(),
            user_id,
            name: list.name.clone(),
            description: list.description.clone().unwrap_or_default(),
            cover_image: list.cover_image.clone(),
            created_at: Utc::now(),
        };
        tables.lists.push(created.clone());
        Ok(created)
    }

    async fn update_list(
        &self,
        user_id: Uuid,
        list_id: Uuid,
        update: &ListUpdate,
    ) -> Result<Option<MediaList>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .lists
            .iter_mut()
            .find(|l| l.id == list_id && l.user_id == user_id)
            .map(|list| {
                update.apply(list);
                list.clone()
            }))
    }

    async fn delete_list(&self, user_id: Uuid, list_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .lists
            .iter()
            .any(|l| l.id == list_id && l.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        tables.list_items.retain(|i| i.list_id != list_id);
        tables.lists.retain(|l| l.id != list_id);
        Ok(true)
    }

    async fn get_list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .list_items
            .iter()
            .filter(|i| i.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn add_list_item(&self, list_id: Uuid, item: &NewListItem) -> Result<ListItem> {
        let mut tables = self.tables.write().await;
        if !tables.lists.iter().any(|l| l.id == list_id) {
            return Err(Error::not_found("list", list_id));
        }
        let added = ListItem {
            id: Uuid::new_v4(),
            list_id,
            media_id: item.media_id.clone(),
            media_type: item.media_type.clone(),
            media_title: item.media_title.clone(),
            media_image: item.media_image.clone(),
            added_at: Utc::now(),
        };
        tables.list_items.push(added.clone());
        Ok(added)
    }

    async fn remove_list_item(&self, list_id: Uuid, item_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.list_items.len();
        tables
            .list_items
            .retain(|i| !(i.id == item_id && i.list_id == list_id));
        Ok(tables.list_items.len() < before)
    }

    async fn count_lists(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables.lists.iter().filter(|l| l.user_id == user_id).count() as i64)
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
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .iter()
            .find(|p| p.user_id == user_id && p.media_id == media_id && p.media_type == media_type)
            .cloned())
    }

    async fn create_post(&self, user_id: Uuid, post: &NewPost) -> Result<Post> {
        let mut tables = self.tables.write().await;

        if tables.posts.iter().any(|p| {
            p.user_id == user_id && p.media_id == post.media_id && p.media_type == post.media_type
        }) {
            return Err(Error::conflict("You already posted about this title"));
        }

        let created = Post {
            id: Uuid::new_v4(),
            user_id,
            media_id: post.media_id.clone(),
            media_type: post.media_type,
            media_title: post.media_title.clone(),
            media_image: post.media_image.clone(),
            rating: post.rating,
            comment: post.comment.clone(),
            is_favorite: post.is_favorite(),
            first_time: post.first_time(),
            has_spoilers: post.has_spoilers(),
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
        };
        tables.posts.push(created.clone());
        tables.save_rating(user_id, &post.to_rating());
        Ok(created)
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().find(|p| p.id == post_id).cloned())
    }

    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<FeedPost>> {
        let tables = self.tables.read().await;
        Ok(tables.newest_posts(|p| p.user_id == user_id).collect())
    }

    async fn get_all_posts(&self) -> Result<Vec<FeedPost>> {
        let tables = self.tables.read().await;
        Ok(tables.newest_posts(|_| true).collect())
    }

    async fn get_feed(
        &self,
        viewer_id: Uuid,
        scope: FeedScope,
        limit: i64,
        offset: i64,
    ) -> Result<FeedPage> {
        let tables = self.tables.read().await;

        let followed: HashSet<Uuid> = tables
            .follows
            .iter()
            .filter(|(follower, _)| *follower == viewer_id)
            .map(|(_, following)| *following)
            .collect();

        let visible: Vec<FeedPost> = tables
            .newest_posts(|p| match scope {
                FeedScope::All => true,
                FeedScope::Following => p.user_id == viewer_id || followed.contains(&p.user_id),
            })
            .collect();

        let total = visible.len() as i64;
        let items = visible
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok(FeedPage { items, total })
    }

    async fn like_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32> {
        let mut tables = self.tables.write().await;
        if !tables.posts.iter().any(|p| p.id == post_id) {
            return Err(Error::not_found("post", post_id));
        }
        let added = tables.post_likes.insert((post_id, user_id));
        let post = tables.post_mut(post_id)?;
        if added {
            post.like_count += 1;
        }
        Ok(post.like_count)
    }

    async fn unlike_post(&self, user_id: Uuid, post_id: Uuid) -> Result<i32> {
        let mut tables = self.tables.write().await;
        let removed = tables.post_likes.remove(&(post_id, user_id));
        let post = tables.post_mut(post_id)?;
        if removed {
            post.like_count = (post.like_count - 1).max(0);
        }
        Ok(post.like_count)
    }

    // ------------------------------------------------------------------------
    // Social graph and search
    // ------------------------------------------------------------------------

    async fn search_users(&self, query: &str) -> Result<Vec<UserSearchHit>> {
        let needle = query.trim().to_lowercase();
        let tables = self.tables.read().await;

        let mut hits: Vec<UserSearchHit> = tables
            .users
            .values()
            .filter(|u| contains_ci(&u.name, &needle) || contains_ci(&u.username, &needle))
            .map(|u| UserSearchHit {
                id: u.id,
                name: u.name.clone(),
                username: u.username.clone(),
                avatar_url: u.avatar_url.clone(),
                bio: u.bio.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits.truncate(SEARCH_LIMIT as usize);
        Ok(hits)
    }

    async fn search_lists(&self, query: &str) -> Result<Vec<ListSearchHit>> {
        let needle = query.trim().to_lowercase();
        let tables = self.tables.read().await;

        Ok(tables
            .lists
            .iter()
            .rev()
            .filter(|l| contains_ci(&l.name, &needle))
            .filter_map(|l| {
                let owner = tables.users.get(&l.user_id)?;
                Some(ListSearchHit {
                    id: l.id,
                    name: l.name.clone(),
                    cover_image: l.cover_image.clone(),
                    item_count: tables.item_count(l.id),
                    user_name: owner.name.clone(),
                    user_id: l.user_id,
                })
            })
            .take(SEARCH_LIMIT as usize)
            .collect())
    }

    async fn follow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()> {
        if follower_id == following_id {
            return Err(Error::bad_request("You cannot follow yourself"));
        }
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&following_id) {
            return Err(Error::not_found("user", following_id));
        }
        tables.follows.insert((follower_id, following_id));
        Ok(())
    }

    async fn unfollow_user(&self, follower_id: Uuid, following_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.follows.remove(&(follower_id, following_id));
        Ok(())
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.follows.contains(&(follower_id, following_id)))
    }

    async fn get_follower_count(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables.follows.iter().filter(|(_, f)| *f == user_id).count() as i64)
    }

    async fn get_following_count(&self, user_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables.follows.iter().filter(|(f, _)| *f == user_id).count() as i64)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
