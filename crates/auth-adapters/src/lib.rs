//! # auth-adapters
//!
//! `TokenSource` implementations. The session token is either handed over
//! directly (e.g. by the login flow) or read from a token file kept between
//! runs; `FallbackTokenSource` tries them in order.

use async_trait::async_trait;
use domains::{AccessToken, TokenSource};
use secrecy::{ExposeSecret, SecretString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A token known up front. Never changes for the life of the source.
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Option<AccessToken> {
        let token = self.token.expose_secret().trim();
        (!token.is_empty()).then(|| AccessToken::new(token))
    }
}

/// Token persisted in a single file. Read on every call so a token written
/// by another process is picked up without restarting.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, token: &SecretString) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, token.expose_secret().as_bytes()).await?;
        debug!(path = %self.path.display(), "session token saved");
        Ok(())
    }

    /// Removes the stored token. A missing file is not an error.
    pub async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TokenSource for FileTokenStore {
    async fn token(&self) -> Option<AccessToken> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| AccessToken::new(token))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read token file");
                None
            }
        }
    }
}

/// First source that yields a token wins.
#[derive(Default)]
pub struct FallbackTokenSource {
    sources: Vec<Arc<dyn TokenSource>>,
}

impl FallbackTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl TokenSource for FallbackTokenSource {
    async fn token(&self) -> Option<AccessToken> {
        for source in &self.sources {
            if let Some(token) = source.token().await {
                return Some(token);
            }
        }
        None
    }
}
