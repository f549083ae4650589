//! Shared fixtures for the integration tests.
//!
//! [`FakeBackend`] keeps server-side state in memory and applies mutations
//! the way the real API does. Individual calls can be held open with
//! [`FakeBackend::hold_like`] and [`FakeBackend::hold_feed`] so tests can
//! observe the store while a request is still on the wire.

use async_trait::async_trait;
use domains::{
    AccessToken, AuthorId, AuthorProfile, Comment, CommentId, FeedBackend, FeedError, Post,
    PostDraft, PostId, Result, TokenSource,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{oneshot, Mutex};

pub fn post(id: &str, author: &str, likes: u32, liked: bool) -> Post {
    Post {
        id: PostId::new(id),
        author_id: Some(AuthorId::new(author)),
        author_name: None,
        content: Some(format!("post {id}")),
        image_url: None,
        like_count: likes,
        liked_by_me: liked,
        comment_count: 0,
        created_at: None,
    }
}

pub fn profile(id: &str, username: &str) -> AuthorProfile {
    AuthorProfile {
        id: AuthorId::new(id),
        username: Some(username.to_string()),
        full_name: None,
        photo_url: None,
    }
}

/// Always yields the same token.
pub struct FixedToken(pub &'static str);

#[async_trait]
impl TokenSource for FixedToken {
    async fn token(&self) -> Option<AccessToken> {
        Some(AccessToken::new(self.0))
    }
}

/// Backend side of a held call.
struct Hold<T> {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<T>,
}

impl<T> Hold<T> {
    async fn wait(self) -> Option<T> {
        let _ = self.reached.send(());
        self.release.await.ok()
    }
}

/// Test side of a held call: wait until the request arrives, then decide
/// its outcome.
pub struct HeldCall<T> {
    reached: Option<oneshot::Receiver<()>>,
    release: oneshot::Sender<T>,
}

impl<T> HeldCall<T> {
    fn pair() -> (Hold<T>, Self) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        (
            Hold { reached: reached_tx, release: release_rx },
            Self { reached: Some(reached_rx), release: release_tx },
        )
    }

    /// Resolves once the backend has received the call.
    pub async fn reached(&mut self) {
        if let Some(rx) = self.reached.take() {
            let _ = rx.await;
        }
    }

    pub fn release(self, outcome: T) {
        let _ = self.release.send(outcome);
    }
}

#[derive(Default)]
pub struct FakeBackend {
    posts: Mutex<Vec<Post>>,
    comments: Mutex<HashMap<PostId, Vec<Comment>>>,
    profiles: Mutex<HashMap<AuthorId, AuthorProfile>>,
    current_user: Mutex<Option<AuthorId>>,
    held_likes: Mutex<VecDeque<Hold<Result<()>>>>,
    held_feeds: Mutex<VecDeque<Hold<Vec<Post>>>>,
    next_id: AtomicUsize,
    profile_fetches: AtomicUsize,
}

impl FakeBackend {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts: Mutex::new(posts), ..Default::default() }
    }

    pub async fn with_profile(self, profile: AuthorProfile) -> Self {
        self.profiles.lock().await.insert(profile.id.clone(), profile);
        self
    }

    pub async fn signed_in_as(self, user: &str) -> Self {
        *self.current_user.lock().await = Some(AuthorId::new(user));
        self
    }

    /// Server-side view of a post.
    pub async fn server_post(&self, post_id: &PostId) -> Option<Post> {
        self.posts.lock().await.iter().find(|p| &p.id == post_id).cloned()
    }

    pub fn profile_fetches(&self) -> usize {
        self.profile_fetches.load(Ordering::SeqCst)
    }

    /// Holds the next like request. An `Ok` release applies the toggle on
    /// the server; an `Err` release leaves the server untouched.
    pub async fn hold_like(&self) -> HeldCall<Result<()>> {
        let (hold, call) = HeldCall::pair();
        self.held_likes.lock().await.push_back(hold);
        call
    }

    /// Holds the next feed request. The released posts are returned as the
    /// response instead of the server state.
    pub async fn hold_feed(&self) -> HeldCall<Vec<Post>> {
        let (hold, call) = HeldCall::pair();
        self.held_feeds.lock().await.push_back(hold);
        call
    }

    async fn apply_like(&self, post_id: &PostId) -> Result<()> {
        let mut posts = self.posts.lock().await;
        let post = posts
            .iter_mut()
            .find(|p| &p.id == post_id)
            .ok_or_else(|| FeedError::rejected(404, "post not found"))?;
        post.toggle_like();
        Ok(())
    }
}

fn dropped() -> FeedError {
    FeedError::NetworkFailure("held call dropped".into())
}

#[async_trait]
impl FeedBackend for FakeBackend {
    async fn fetch_posts(&self, _token: &AccessToken) -> Result<Vec<Post>> {
        let hold = self.held_feeds.lock().await.pop_front();
        match hold {
            Some(hold) => hold.wait().await.ok_or_else(dropped),
            None => Ok(self.posts.lock().await.clone()),
        }
    }

    async fn create_post(&self, _token: &AccessToken, draft: &PostDraft) -> Result<()> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let author = self.current_user.lock().await.clone();
        let mut created = post(&format!("new-{n}"), "", 0, false);
        created.author_id = author;
        created.content = Some(draft.content.clone());
        self.posts.lock().await.insert(0, created);
        Ok(())
    }

    async fn delete_post(&self, _token: &AccessToken, post_id: &PostId) -> Result<()> {
        let mut posts = self.posts.lock().await;
        let before = posts.len();
        posts.retain(|p| &p.id != post_id);
        if posts.len() == before {
            return Err(FeedError::rejected(404, "post not found"));
        }
        Ok(())
    }

    async fn toggle_like(&self, _token: &AccessToken, post_id: &PostId) -> Result<()> {
        let hold = self.held_likes.lock().await.pop_front();
        match hold {
            Some(hold) => {
                hold.wait().await.unwrap_or_else(|| Err(dropped()))?;
                self.apply_like(post_id).await
            }
            None => self.apply_like(post_id).await,
        }
    }

    async fn fetch_comments(&self, _token: &AccessToken, post_id: &PostId) -> Result<Vec<Comment>> {
        Ok(self.comments.lock().await.get(post_id).cloned().unwrap_or_default())
    }

    async fn post_comment(&self, _token: &AccessToken, post_id: &PostId, text: &str) -> Result<()> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut posts = self.posts.lock().await;
            let post = posts
                .iter_mut()
                .find(|p| &p.id == post_id)
                .ok_or_else(|| FeedError::rejected(404, "post not found"))?;
            post.comment_count += 1;
        }
        self.comments
            .lock()
            .await
            .entry(post_id.clone())
            .or_default()
            .push(Comment {
                id: CommentId::new(format!("c-{n}")),
                post_id: post_id.clone(),
                author_name: None,
                text: text.to_string(),
                created_at: None,
            });
        Ok(())
    }

    async fn fetch_profile(&self, _token: &AccessToken, author_id: &AuthorId) -> Result<AuthorProfile> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .await
            .get(author_id)
            .cloned()
            .ok_or_else(|| FeedError::rejected(404, "profile not found"))
    }

    async fn fetch_current_user(&self, _token: &AccessToken) -> Result<Option<AuthorId>> {
        Ok(self.current_user.lock().await.clone())
    }
}
