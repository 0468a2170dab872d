//! Domain types shared by storage and the HTTP layer
//!
//! Row types derive `sqlx::FromRow` and serialize to camelCase JSON for the
//! mobile client. Request payloads carry a `validate()` that normalizes
//! optional strings and enforces field rules before anything is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Media categories
// ============================================================================

/// The media kinds a user can rate, favorite or post about
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MediaCategory {
    Film,
    Series,
    Music,
    Anime,
    Manga,
    Book,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 6] = [
        MediaCategory::Film,
        MediaCategory::Series,
        MediaCategory::Music,
        MediaCategory::Anime,
        MediaCategory::Manga,
        MediaCategory::Book,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCategory::Film => "film",
            MediaCategory::Series => "series",
            MediaCategory::Music => "music",
            MediaCategory::Anime => "anime",
            MediaCategory::Manga => "manga",
            MediaCategory::Book => "book",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MediaCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::validation("category", format!("unknown media category '{}'", s)))
    }
}

// ============================================================================
// Users
// ============================================================================

/// A stored account. Holds the password hash, so it is never serialized.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user's own view of their account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for AccountUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
        }
    }
}

/// What other users see
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
        }
    }
}

/// Insert payload for a new account; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Profile edit from the settings screen
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(mut self) -> Result<Self> {
        self.name = required("name", &self.name)?;
        self.email = normalize_email(&self.email)?;
        self.bio = Some(self.bio.unwrap_or_default().trim().to_string());
        self.avatar_url = optional(self.avatar_url);
        Ok(self)
    }
}

/// Lowercases and sanity-checks an email address
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(Error::validation("email", "must be a valid email address")),
    }
}

// ============================================================================
// Favorites
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: MediaCategory,
    pub title: String,
    pub media_id: Option<String>,
    pub media_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFavorite {
    pub category: MediaCategory,
    pub title: String,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub media_image: Option<String>,
}

impl NewFavorite {
    pub fn validate(mut self) -> Result<Self> {
        self.title = required("title", &self.title)?;
        self.media_id = optional(self.media_id);
        self.media_image = optional(self.media_image);
        Ok(self)
    }
}

// ============================================================================
// Ratings
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_id: String,
    pub media_type: MediaCategory,
    pub media_title: String,
    pub media_image: Option<String>,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRating {
    pub media_id: String,
    pub media_type: MediaCategory,
    pub media_title: String,
    #[serde(default)]
    pub media_image: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewRating {
    pub fn validate(mut self) -> Result<Self> {
        self.media_id = required("mediaId", &self.media_id)?;
        self.media_title = required("mediaTitle", &self.media_title)?;
        self.media_image = optional(self.media_image);
        check_stars(self.rating)?;
        self.comment = Some(self.comment.unwrap_or_default().trim().to_string());
        Ok(self)
    }

    /// Comment as stored: absent comments become the empty string
    pub fn comment_text(&self) -> &str {
        self.comment.as_deref().unwrap_or("")
    }
}

fn check_stars(rating: i32) -> Result<()> {
    if (MIN_STARS..=MAX_STARS).contains(&rating) {
        Ok(())
    } else {
        Err(Error::validation(
            "rating",
            format!("must be between {} and {}", MIN_STARS, MAX_STARS),
        ))
    }
}

pub const MIN_STARS: i32 = 1;
pub const MAX_STARS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarCount {
    pub stars: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: MediaCategory,
    pub count: i64,
}

/// Star distribution and per-category totals for one user's ratings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    /// Always five entries, 5 stars first
    pub distribution: Vec<StarCount>,
    /// Only categories with at least one rating, in `MediaCategory::ALL` order
    pub category_stats: Vec<CategoryCount>,
}

impl RatingStats {
    pub fn from_ratings(ratings: &[Rating]) -> Self {
        let mut by_stars = [0i64; MAX_STARS as usize];
        let mut by_category = [0i64; MediaCategory::ALL.len()];

        for r in ratings {
            if let Some(slot) = usize::try_from(r.rating - 1)
                .ok()
                .and_then(|i| by_stars.get_mut(i))
            {
                *slot += 1;
            }
            if let Some(idx) = MediaCategory::ALL.iter().position(|c| *c == r.media_type) {
                by_category[idx] += 1;
            }
        }

        let distribution = (MIN_STARS..=MAX_STARS)
            .rev()
            .map(|stars| StarCount {
                stars,
                count: by_stars[(stars - 1) as usize],
            })
            .collect();

        let category_stats = MediaCategory::ALL
            .iter()
            .zip(by_category)
            .filter(|(_, count)| *count > 0)
            .map(|(category, count)| CategoryCount {
                category: *category,
                count,
            })
            .collect();

        Self {
            distribution,
            category_stats,
        }
    }
}

// ============================================================================
// Lists
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MediaList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A list together with how many items it holds
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub list: MediaList,
    pub item_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub media_id: String,
    pub media_type: String,
    pub media_title: String,
    pub media_image: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

impl NewList {
    pub fn validate(mut self) -> Result<Self> {
        self.name = required("name", &self.name)?;
        self.description = Some(self.description.unwrap_or_default().trim().to_string());
        self.cover_image = optional(self.cover_image);
        Ok(self)
    }
}

/// Partial list edit; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

impl ListUpdate {
    pub fn validate(mut self) -> Result<Self> {
        if let Some(name) = &self.name {
            self.name = Some(required("name", name)?);
        }
        self.description = self.description.map(|d| d.trim().to_string());
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.cover_image.is_none()
    }

    /// Applies the present fields to `list`
    pub fn apply(&self, list: &mut MediaList) {
        if let Some(name) = &self.name {
            list.name = name.clone();
        }
        if let Some(description) = &self.description {
            list.description = description.clone();
        }
        if let Some(cover) = &self.cover_image {
            list.cover_image = Some(cover.clone());
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListItem {
    pub media_id: String,
    pub media_type: String,
    pub media_title: String,
    #[serde(default)]
    pub media_image: Option<String>,
}

impl NewListItem {
    pub fn validate(mut self) -> Result<Self> {
        self.media_id = required("mediaId", &self.media_id)?;
        self.media_type = required("mediaType", &self.media_type)?;
        self.media_title = required("mediaTitle", &self.media_title)?;
        self.media_image = optional(self.media_image);
        Ok(self)
    }
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_id: String,
    pub media_type: MediaCategory,
    pub media_title: String,
    pub media_image: Option<String>,
    pub rating: i32,
    pub comment: String,
    pub is_favorite: bool,
    pub first_time: bool,
    pub has_spoilers: bool,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
}

/// A post joined with its author, as shown in feeds and profiles
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub post: Post,
    pub user_name: String,
    pub user_avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub media_id: String,
    pub media_type: MediaCategory,
    pub media_title: String,
    #[serde(default)]
    pub media_image: Option<String>,
    pub rating: i32,
    pub comment: String,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub first_time: Option<bool>,
    #[serde(default)]
    pub has_spoilers: Option<bool>,
}

impl NewPost {
    pub fn validate(mut self) -> Result<Self> {
        self.media_id = required("mediaId", &self.media_id)?;
        self.media_title = required("mediaTitle", &self.media_title)?;
        self.comment = required("comment", &self.comment)?;
        self.media_image = optional(self.media_image);
        check_stars(self.rating)?;
        Ok(self)
    }

    pub fn is_favorite(&self) -> bool {
        self.is_favorite.unwrap_or(false)
    }

    pub fn first_time(&self) -> bool {
        self.first_time.unwrap_or(true)
    }

    pub fn has_spoilers(&self) -> bool {
        self.has_spoilers.unwrap_or(false)
    }

    /// The rating the author implicitly gives by posting
    pub fn to_rating(&self) -> NewRating {
        NewRating {
            media_id: self.media_id.clone(),
            media_type: self.media_type,
            media_title: self.media_title.clone(),
            media_image: self.media_image.clone(),
            rating: self.rating,
            comment: Some(self.comment.clone()),
        }
    }
}

/// Which posts a feed request covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedScope {
    /// Every post on the platform
    #[default]
    All,
    /// Posts by followed users plus the viewer's own
    Following,
}

/// One page of a feed plus the size of the whole feed
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<FeedPost>,
    pub total: i64,
}

// ============================================================================
// Search and profiles
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchHit {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub bio: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListSearchHit {
    pub id: Uuid,
    pub name: String,
    pub cover_image: Option<String>,
    pub item_count: i64,
    pub user_name: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub user: PublicUser,
    pub favorites: Vec<Favorite>,
    pub stats: RatingStats,
    pub posts: Vec<FeedPost>,
    pub list_count: i64,
}

/// Max rows returned by user and list search
pub const SEARCH_LIMIT: i64 = 20;

// ============================================================================
// Field helpers
// ============================================================================

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Blank optional strings are stored as null
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
