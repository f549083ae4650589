//! # Core Traits (Ports)
//!
//! Adapters implement these traits; the services only ever see the traits.

use crate::errors::Result;
use crate::models::{AuthorId, AuthorProfile, Comment, Post, PostDraft, PostId};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Bearer token for the current session.
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Value for the `Authorization: Bearer` header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// The remote community backend. One method per REST call; every call is
/// authenticated with the token the caller obtained from a `TokenSource`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedBackend: Send + Sync {
    /// `GET /community/posts`. Entries that cannot be fully parsed are dropped.
    async fn fetch_posts(&self, token: &AccessToken) -> Result<Vec<Post>>;

    /// `POST /community/posts` as multipart (`content`, optional `image`).
    async fn create_post(&self, token: &AccessToken, draft: &PostDraft) -> Result<()>;

    /// `DELETE /community/posts/{postId}`
    async fn delete_post(&self, token: &AccessToken, post_id: &PostId) -> Result<()>;

    /// `POST /community/posts/{postId}/like`. The backend flips its own state.
    async fn toggle_like(&self, token: &AccessToken, post_id: &PostId) -> Result<()>;

    /// `GET /community/posts/{postId}/comments`
    async fn fetch_comments(&self, token: &AccessToken, post_id: &PostId) -> Result<Vec<Comment>>;

    /// `POST /community/posts/{postId}/comments` with JSON `{"comment": text}`.
    async fn post_comment(&self, token: &AccessToken, post_id: &PostId, text: &str) -> Result<()>;

    /// `GET /profile/{authorId}`
    async fn fetch_profile(&self, token: &AccessToken, author_id: &AuthorId) -> Result<AuthorProfile>;

    /// `GET /profile/me`. `None` when the profile carries no usable id.
    async fn fetch_current_user(&self, token: &AccessToken) -> Result<Option<AuthorId>>;
}

/// Session collaborator consulted before every backend call.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Option<AccessToken>;
}
