//! # Author Resolver
//!
//! Deduplicates profile lookups so each author id is fetched at most once
//! while its profile is cached. Failures are logged and left unresolved.

use dashmap::{DashMap, DashSet};
use domains::{AccessToken, AuthorId, AuthorProfile, FeedBackend};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AuthorResolver {
    backend: Arc<dyn FeedBackend>,
    authors: DashMap<AuthorId, AuthorProfile>,
    /// Ids with a fetch currently outstanding
    in_flight: DashSet<AuthorId>,
}

/// Removes its id from `in_flight` when dropped, including on cancellation.
struct Claim<'a> {
    in_flight: &'a DashSet<AuthorId>,
    id: AuthorId,
}

impl<'a> Claim<'a> {
    fn acquire(in_flight: &'a DashSet<AuthorId>, id: AuthorId) -> Option<Self> {
        in_flight
            .insert(id.clone())
            .then(|| Self { in_flight, id })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl AuthorResolver {
    pub fn new(backend: Arc<dyn FeedBackend>) -> Self {
        Self {
            backend,
            authors: DashMap::new(),
            in_flight: DashSet::new(),
        }
    }

    pub fn get(&self, id: &AuthorId) -> Option<AuthorProfile> {
        self.authors.get(id).map(|entry| entry.value().clone())
    }

    pub fn is_cached(&self, id: &AuthorId) -> bool {
        self.authors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    /// Fetches every id not yet cached, concurrently, and caches the
    /// successes. Returns how many profiles were newly cached.
    ///
    /// An id that is cached, or already being fetched by another call, is
    /// skipped. A failed fetch stays unresolved and is retried by the next
    /// call that names it.
    pub async fn resolve<I>(&self, token: &AccessToken, ids: I) -> usize
    where
        I: IntoIterator<Item = AuthorId>,
    {
        let unique: HashSet<AuthorId> = ids.into_iter().collect();

        let mut claims = Vec::new();
        for id in unique {
            if self.authors.contains_key(&id) {
                continue;
            }
            let Some(claim) = Claim::acquire(&self.in_flight, id) else {
                continue;
            };
            // Re-check under the claim: a fetch that finished in between has
            // already cached the profile.
            if self.authors.contains_key(&claim.id) {
                continue;
            }
            claims.push(claim);
        }

        if claims.is_empty() {
            return 0;
        }
        debug!(count = claims.len(), "resolving author profiles");

        let fetches = claims.into_iter().map(|claim| async move {
            let result = self.backend.fetch_profile(token, &claim.id).await;
            (claim, result)
        });

        let mut resolved = 0;
        for (claim, result) in join_all(fetches).await {
            match result {
                Ok(profile) => {
                    self.authors.entry(claim.id.clone()).or_insert(profile);
                    resolved += 1;
                }
                Err(err) => {
                    warn!(author_id = %claim.id, error = %err, "author profile fetch failed");
                }
            }
            // claim dropped here, after the profile is visible
        }
        resolved
    }
}
