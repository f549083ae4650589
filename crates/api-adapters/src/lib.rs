//! # api-adapters
//!
//! Adapters from the `FeedBackend` port to the community REST API.

pub mod wire;

#[cfg(feature = "http-reqwest")]
pub mod client;

#[cfg(feature = "http-reqwest")]
pub use client::RestFeedBackend;
