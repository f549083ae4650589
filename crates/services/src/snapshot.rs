//! Ordered, keyed view of the posts returned by the last feed fetch.

use domains::{Post, PostId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct FeedSnapshot {
    /// Feed order as the backend returned it
    order: Vec<PostId>,
    posts: HashMap<PostId, Post>,
}

impl FeedSnapshot {
    /// Builds a snapshot from a fetched page. A repeated id keeps its first
    /// position and its last body.
    pub(crate) fn from_posts(posts: Vec<Post>) -> Self {
        let mut snapshot = Self {
            order: Vec::with_capacity(posts.len()),
            posts: HashMap::with_capacity(posts.len()),
        };
        for post in posts {
            let id = post.id.clone();
            if snapshot.posts.insert(id.clone(), post).is_none() {
                snapshot.order.push(id);
            }
        }
        snapshot
    }

    pub(crate) fn get(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.posts.get_mut(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn to_vec(&self) -> Vec<Post> {
        self.order
            .iter()
            .filter_map(|id| self.posts.get(id))
            .cloned()
            .collect()
    }
}
