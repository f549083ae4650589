//! # Domain Models
//!
//! These structs represent the community feed as the client sees it.
//! Identifiers are opaque strings minted by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Shown for a post whose author is neither resolved nor named by the post.
pub const ANONYMOUS: &str = "Anonymous";

/// Shown for a comment that carries no author name.
pub const UNKNOWN_COMMENTER: &str = "User";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Stable identity of a post.
    PostId
);
string_id!(
    /// Identity of a profile; posts and the current user both refer to it.
    AuthorId
);
string_id!(
    /// Identity of a comment, unique within its post.
    CommentId
);

/// A post in the community feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Logical reference into the author cache; the backend may omit it.
    pub author_id: Option<AuthorId>,
    /// Name the backend embeds in the post, used when the author is unresolved.
    pub author_name: Option<String>,
    pub content: Option<String>,
    /// Absolute URL of the attached image
    pub image_url: Option<String>,
    pub like_count: u32,
    pub liked_by_me: bool,
    pub comment_count: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Flips `liked_by_me` and moves `like_count` by one in the matching direction.
    pub fn toggle_like(&mut self) {
        if self.liked_by_me {
            self.like_count = self.like_count.saturating_sub(1);
        } else {
            self.like_count = self.like_count.saturating_add(1);
        }
        self.liked_by_me = !self.liked_by_me;
    }

    pub fn is_authored_by(&self, user: &AuthorId) -> bool {
        self.author_id.as_ref() == Some(user)
    }
}

/// A comment under a post. `post_id` is a back-reference only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_name: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn display_author(&self) -> &str {
        self.author_name.as_deref().unwrap_or(UNKNOWN_COMMENTER)
    }
}

/// Display data for an author. Immutable once cached for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: AuthorId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub photo_url: Option<String>,
}

/// A local image selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    path: PathBuf,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name sent with the multipart part.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string())
    }

    /// Guessed from the extension; JPEG when the extension says nothing.
    pub fn mime(&self) -> mime::Mime {
        mime_guess::from_path(&self.path).first_or(mime::IMAGE_JPEG)
    }
}

/// The composer state for a new post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub content: String,
    pub image: Option<ImageRef>,
}

impl PostDraft {
    pub fn new(content: impl Into<String>, image: Option<ImageRef>) -> Self {
        Self { content: content.into(), image }
    }

    /// A draft needs non-blank text or an image to be postable.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.image.is_none()
    }
}
