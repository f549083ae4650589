//! # services
//!
//! Client-side synchronization of the community feed: the Feed Store and
//! the Author Resolver it hydrates authors through.

pub mod author_resolver;
pub mod feed_store;
mod snapshot;

pub use author_resolver::AuthorResolver;
pub use feed_store::FeedStore;
