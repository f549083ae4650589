//! # Feed Store
//!
//! Single source of truth for the visible community feed. Owns the post
//! snapshot, the comment threads and (through the resolver) the author
//! cache, and mediates every mutation against the backend.
//!
//! Synchronization is pull based. Likes are applied optimistically; every
//! other mutation settles by re-fetching the affected collection. A failed
//! like is reconciled by re-fetching the feed, not by undoing the local
//! delta, so two overlapping toggles can leave the cache off by one until
//! the next `load_feed`.

use crate::author_resolver::AuthorResolver;
use crate::snapshot::FeedSnapshot;
use dashmap::DashMap;
use domains::{
    AccessToken, AuthorId, AuthorProfile, Comment, FeedBackend, FeedError, ImageRef, Post,
    PostDraft, PostId, Result, TokenSource, ValidationError, ANONYMOUS,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub struct FeedStore {
    backend: Arc<dyn FeedBackend>,
    tokens: Arc<dyn TokenSource>,
    feed: RwLock<FeedSnapshot>,
    comments: DashMap<PostId, Vec<Comment>>,
    authors: AuthorResolver,
    current_user: RwLock<Option<AuthorId>>,

    // Local UI state
    draft: Mutex<PostDraft>,
    comment_inputs: DashMap<PostId, String>,
    expanded: DashMap<PostId, bool>,
    loads_in_flight: AtomicUsize,
}

/// Counts one in-flight feed load for `is_loading`.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FeedStore {
    pub fn new(backend: Arc<dyn FeedBackend>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            authors: AuthorResolver::new(Arc::clone(&backend)),
            backend,
            tokens,
            feed: RwLock::new(FeedSnapshot::default()),
            comments: DashMap::new(),
            current_user: RwLock::new(None),
            draft: Mutex::new(PostDraft::default()),
            comment_inputs: DashMap::new(),
            expanded: DashMap::new(),
            loads_in_flight: AtomicUsize::new(0),
        }
    }

    async fn token(&self) -> Result<AccessToken> {
        self.tokens.token().await.ok_or(FeedError::AuthenticationMissing)
    }

    // ── Session ─────────────────────────────────────────────────────────────

    /// Loads the current user, then the feed. A failed user lookup only
    /// disables deletes; the feed load still runs.
    pub async fn bootstrap(&self) -> Result<()> {
        if let Err(err) = self.load_current_user().await {
            warn!(error = %err, "could not resolve current user");
        }
        self.load_feed().await
    }

    pub async fn load_current_user(&self) -> Result<Option<AuthorId>> {
        let token = self.token().await?;
        let user = self.backend.fetch_current_user(&token).await?;
        debug!(user = ?user, "current user loaded");
        *self.current_user.write().await = user.clone();
        Ok(user)
    }

    pub async fn current_user(&self) -> Option<AuthorId> {
        self.current_user.read().await.clone()
    }

    // ── Feed ────────────────────────────────────────────────────────────────

    /// Fetches the whole feed and replaces the cached posts wholesale, then
    /// resolves authors not yet cached. Overlapping loads are not sequenced;
    /// the last response to arrive wins.
    pub async fn load_feed(&self) -> Result<()> {
        let _loading = LoadingGuard::enter(&self.loads_in_flight);
        let token = self.token().await?;
        let posts = self.backend.fetch_posts(&token).await?;

        let author_ids: HashSet<AuthorId> =
            posts.iter().filter_map(|p| p.author_id.clone()).collect();

        let count = {
            let mut feed = self.feed.write().await;
            *feed = FeedSnapshot::from_posts(posts);
            feed.len()
        };
        debug!(posts = count, "feed replaced");

        self.authors.resolve(&token, author_ids).await;
        Ok(())
    }

    /// Flips the like state locally, then tells the backend. An unknown post
    /// is a silent no-op. On failure the feed is re-fetched and the backend
    /// error is returned.
    pub async fn toggle_like(&self, post_id: &PostId) -> Result<()> {
        let token = self.token().await?;
        {
            let mut feed = self.feed.write().await;
            let Some(post) = feed.get_mut(post_id) else {
                debug!(%post_id, "like on a post not in the feed ignored");
                return Ok(());
            };
            post.toggle_like();
        }

        match self.backend.toggle_like(&token, post_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%post_id, error = %err, "like rejected, resynchronizing feed");
                if let Err(resync) = self.load_feed().await {
                    warn!(error = %resync, "resync after failed like also failed");
                }
                Err(err)
            }
        }
    }

    /// Publishes a new post. Nothing is inserted locally; the post appears
    /// with the follow-up feed load. The held draft is cleared only on success.
    pub async fn create_post(&self, content: impl Into<String>, image: Option<ImageRef>) -> Result<()> {
        let draft = PostDraft::new(content, image);
        if draft.is_empty() {
            return Err(ValidationError::EmptyPost.into());
        }
        let token = self.token().await?;
        self.backend.create_post(&token, &draft).await?;
        info!(has_image = draft.image.is_some(), "post created");

        *self.draft.lock().await = PostDraft::default();
        self.refresh_feed("create_post").await;
        Ok(())
    }

    /// Publishes whatever the composer currently holds.
    pub async fn submit_draft(&self) -> Result<()> {
        let PostDraft { content, image } = self.draft.lock().await.clone();
        self.create_post(content, image).await
    }

    /// Deletes a post owned by the current user. Ownership is checked
    /// locally; a non-owner never reaches the backend.
    pub async fn delete_post(&self, post_id: &PostId) -> Result<()> {
        let current_user = self.current_user().await;
        {
            let feed = self.feed.read().await;
            let post = feed.get(post_id).ok_or_else(|| ValidationError::UnknownPost {
                post_id: post_id.clone(),
            })?;
            let owned = current_user
                .as_ref()
                .is_some_and(|user| post.is_authored_by(user));
            if !owned {
                return Err(ValidationError::NotPostOwner { post_id: post_id.clone() }.into());
            }
        }

        let token = self.token().await?;
        self.backend.delete_post(&token, post_id).await?;
        info!(%post_id, "post deleted");

        self.refresh_feed("delete_post").await;
        Ok(())
    }

    // ── Comments ────────────────────────────────────────────────────────────

    /// Replaces the cached thread of `post_id` with the backend's.
    pub async fn fetch_comments(&self, post_id: &PostId) -> Result<()> {
        let token = self.token().await?;
        let comments = self.backend.fetch_comments(&token, post_id).await?;
        debug!(%post_id, comments = comments.len(), "comments replaced");
        self.comments.insert(post_id.clone(), comments);
        Ok(())
    }

    /// Posts a comment, then re-fetches the thread and the feed (for the
    /// comment count). Blank text is rejected without a request.
    pub async fn post_comment(&self, post_id: &PostId, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }
        let token = self.token().await?;
        self.backend.post_comment(&token, post_id, text).await?;
        info!(%post_id, "comment posted");

        self.comment_inputs.insert(post_id.clone(), String::new());
        if let Err(err) = self.fetch_comments(post_id).await {
            warn!(%post_id, error = %err, "comment refresh after posting failed");
        }
        self.refresh_feed("post_comment").await;
        Ok(())
    }

    /// Current input buffer of `post_id`, empty when never typed into.
    pub fn comment_input(&self, post_id: &PostId) -> String {
        self.comment_inputs
            .get(post_id)
            .map(|text| text.value().clone())
            .unwrap_or_default()
    }

    pub fn set_comment_input(&self, post_id: &PostId, text: impl Into<String>) {
        self.comment_inputs.insert(post_id.clone(), text.into());
    }

    /// Posts the text held in the input buffer of `post_id`.
    pub async fn submit_comment_input(&self, post_id: &PostId) -> Result<()> {
        let text = self.comment_input(post_id);
        self.post_comment(post_id, &text).await
    }

    /// Opens or closes the comment section of a post and returns the new
    /// state. Opening fetches the thread; closing keeps the cached thread.
    pub async fn toggle_comments_expanded(&self, post_id: &PostId) -> Result<bool> {
        let opened = {
            let mut expanded = self.expanded.entry(post_id.clone()).or_insert(false);
            *expanded = !*expanded;
            *expanded
        };
        if opened {
            self.fetch_comments(post_id).await?;
        }
        Ok(opened)
    }

    pub fn is_expanded(&self, post_id: &PostId) -> bool {
        self.expanded.get(post_id).is_some_and(|open| *open)
    }

    // ── Draft ───────────────────────────────────────────────────────────────

    pub async fn draft(&self) -> PostDraft {
        self.draft.lock().await.clone()
    }

    pub async fn set_draft_text(&self, content: impl Into<String>) {
        self.draft.lock().await.content = content.into();
    }

    pub async fn attach_image(&self, image: ImageRef) {
        self.draft.lock().await.image = Some(image);
    }

    pub async fn clear_image(&self) {
        self.draft.lock().await.image = None;
    }

    // ── Read accessors ──────────────────────────────────────────────────────

    /// Posts in feed order.
    pub async fn posts(&self) -> Vec<Post> {
        self.feed.read().await.to_vec()
    }

    pub async fn post(&self, post_id: &PostId) -> Option<Post> {
        self.feed.read().await.get(post_id).cloned()
    }

    /// `None` when the thread was never fetched.
    pub fn comments(&self, post_id: &PostId) -> Option<Vec<Comment>> {
        self.comments.get(post_id).map(|c| c.value().clone())
    }

    pub fn author(&self, author_id: &AuthorId) -> Option<AuthorProfile> {
        self.authors.get(author_id)
    }

    /// Resolved username, else the name embedded in the post, else `Anonymous`.
    pub fn display_name(&self, post: &Post) -> String {
        post.author_id
            .as_ref()
            .and_then(|id| self.authors.get(id))
            .and_then(|profile| profile.username)
            .or_else(|| post.author_name.clone())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    /// Whether the delete action should be offered for this post.
    pub async fn can_delete(&self, post: &Post) -> bool {
        self.current_user
            .read()
            .await
            .as_ref()
            .is_some_and(|user| post.is_authored_by(user))
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Follow-up load after a confirmed mutation. The mutation already
    /// succeeded, so a failure here is only logged.
    async fn refresh_feed(&self, after: &'static str) {
        if let Err(err) = self.load_feed().await {
            warn!(after, error = %err, "feed refresh failed");
        }
    }
}
