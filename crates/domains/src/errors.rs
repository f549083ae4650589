//! # FeedError
//!
//! Centralized error handling for the feed client.
//! Every operation of the Feed Store reports one of these kinds.

use crate::models::PostId;
use std::path::PathBuf;
use thiserror::Error;

/// The primary error type surfaced by feed operations.
#[derive(Error, Debug)]
pub enum FeedError {
    /// No session token is available; no request was made.
    #[error("not signed in: no session token available")]
    AuthenticationMissing,

    /// Transport-level failure (connection refused, reset, unreadable body)
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The backend answered with a non-2xx status.
    #[error("backend rejected request ({status}): {message}")]
    BackendRejected { status: u16, message: String },

    /// Rejected locally before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Local rejections. None of these cost a round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a post needs text or an image")]
    EmptyPost,

    #[error("comment text is empty")]
    EmptyComment,

    #[error("post {post_id} can only be deleted by its author")]
    NotPostOwner { post_id: PostId },

    #[error("post {post_id} is not in the feed")]
    UnknownPost { post_id: PostId },

    #[error("cannot read image {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },
}

impl FeedError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::BackendRejected { status, message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A specialized Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
