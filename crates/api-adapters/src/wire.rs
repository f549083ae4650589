//! # Wire format
//!
//! The backend is loosely typed: ids arrive under several keys, counters may
//! be missing, and the feed body is not guaranteed to be an array. Every
//! entry is converted as a whole or dropped with a warning.

use chrono::{DateTime, Utc};
use domains::{AuthorId, AuthorProfile, Comment, CommentId, Post, PostId};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{field}` should be {expected}")]
    WrongType { field: &'static str, expected: &'static str },

    #[error("field `{0}` is not an RFC 3339 timestamp")]
    BadTimestamp(&'static str),
}

type WireResult<T> = Result<T, WireError>;

/// Typed access to one JSON object. Lookups over several keys take the first
/// key holding a non-empty value.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn of(value: &'a Value) -> WireResult<Self> {
        value.as_object().map(Fields).ok_or(WireError::NotAnObject)
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        match self.0.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(v) => Some(v),
        }
    }

    /// Identifier given as a string or an integer.
    fn id(&self, keys: &[&'static str]) -> WireResult<Option<String>> {
        for &key in keys {
            match self.present(key) {
                None => continue,
                Some(Value::String(s)) => return Ok(Some(s.clone())),
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => return Ok(Some(n.to_string())),
                Some(_) => return Err(WireError::WrongType { field: key, expected: "a string or integer id" }),
            }
        }
        Ok(None)
    }

    fn text(&self, keys: &[&'static str]) -> WireResult<Option<String>> {
        for &key in keys {
            match self.present(key) {
                None => continue,
                Some(Value::String(s)) => return Ok(Some(s.clone())),
                Some(_) => return Err(WireError::WrongType { field: key, expected: "a string" }),
            }
        }
        Ok(None)
    }

    /// Non-negative counter, as a number or a numeric string; missing means zero.
    fn count(&self, key: &'static str) -> WireResult<u32> {
        let wrong = WireError::WrongType { field: key, expected: "a non-negative integer" };
        match self.present(key) {
            None => Ok(0),
            Some(Value::String(s)) => s.trim().parse::<u32>().map_err(|_| wrong),
            Some(v) => v.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or(wrong),
        }
    }

    /// Boolean, or an integer where non-zero is true (SQL-style 0/1 flags).
    fn flag(&self, key: &'static str) -> WireResult<bool> {
        match self.present(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(n.as_i64().map_or(true, |n| n != 0))
            }
            Some(_) => Err(WireError::WrongType { field: key, expected: "a boolean or integer flag" }),
        }
    }

    fn timestamp(&self, key: &'static str) -> WireResult<Option<DateTime<Utc>>> {
        match self.text(&[key])? {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| WireError::BadTimestamp(key)),
        }
    }
}

/// Makes a backend media path absolute. Paths already carrying a scheme
/// are kept as they are.
pub fn resolve_media_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

pub fn parse_post(value: &Value, base_url: &str) -> WireResult<Post> {
    let f = Fields::of(value)?;
    let id = f.id(&["postID", "id"])?.ok_or(WireError::Missing("postID"))?;
    Ok(Post {
        id: PostId::new(id),
        author_id: f.id(&["profileID", "profileId"])?.map(AuthorId::new),
        author_name: f.text(&["fullName"])?,
        content: f.text(&["content"])?,
        image_url: f.text(&["image"])?.map(|p| resolve_media_url(base_url, &p)),
        like_count: f.count("likeCount")?,
        liked_by_me: f.flag("likedByMe")?,
        comment_count: f.count("commentCount")?,
        created_at: f.timestamp("createdAt")?,
    })
}

pub fn parse_comment(value: &Value, post_id: &PostId) -> WireResult<Comment> {
    let f = Fields::of(value)?;
    let id = f.id(&["commentID", "id"])?.ok_or(WireError::Missing("commentID"))?;
    let text = f.text(&["comment"])?.ok_or(WireError::Missing("comment"))?;
    Ok(Comment {
        id: CommentId::new(id),
        post_id: post_id.clone(),
        author_name: f.text(&["fullName"])?,
        text,
        created_at: f.timestamp("createdAt")?,
    })
}

/// Profiles are display data only, so they never fail on missing names.
pub fn parse_profile(value: &Value, author_id: &AuthorId, base_url: &str) -> WireResult<AuthorProfile> {
    let f = Fields::of(value)?;
    Ok(AuthorProfile {
        id: author_id.clone(),
        username: f.text(&["username", "fullName", "name"])?,
        full_name: f.text(&["fullName", "name"])?,
        photo_url: f.text(&["photo"])?.map(|p| resolve_media_url(base_url, &p)),
    })
}

pub fn parse_current_user(value: &Value) -> WireResult<Option<AuthorId>> {
    let f = Fields::of(value)?;
    Ok(f.id(&["profileID", "id", "_id"])?.map(AuthorId::new))
}

/// Parses a feed body. Anything but an array is an empty feed.
pub fn parse_feed(body: &Value, base_url: &str) -> Vec<Post> {
    let Some(entries) = body.as_array() else {
        warn!("feed body is not an array, treating as empty");
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match parse_post(entry, base_url) {
            Ok(post) => Some(post),
            Err(err) => {
                warn!(index, error = %err, "dropping unparseable post");
                None
            }
        })
        .collect()
}

pub fn parse_comments(body: &Value, post_id: &PostId) -> Vec<Comment> {
    let Some(entries) = body.as_array() else {
        warn!(%post_id, "comments body is not an array, treating as empty");
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match parse_comment(entry, post_id) {
            Ok(comment) => Some(comment),
            Err(err) => {
                warn!(%post_id, index, error = %err, "dropping unparseable comment");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "http://api.test";

    #[test]
    fn post_fields_and_aliases() {
        let post = parse_post(
            &json!({
                "id": "p1",
                "profileId": "a1",
                "fullName": "Ana Peak",
                "content": "Sunrise on the ridge",
                "image": "/uploads/ridge.jpg",
                "likeCount": 3,
                "likedByMe": true,
                "commentCount": 2,
                "createdAt": "2024-05-01T06:30:00Z"
            }),
            BASE,
        )
        .unwrap();

        assert_eq!(post.id, PostId::new("p1"));
        assert_eq!(post.author_id, Some(AuthorId::new("a1")));
        assert_eq!(post.image_url.as_deref(), Some("http://api.test/uploads/ridge.jpg"));
        assert_eq!((post.like_count, post.liked_by_me, post.comment_count), (3, true, 2));
        assert!(post.created_at.is_some());
    }

    #[test]
    fn post_id_prefers_post_id_key_and_accepts_both() {
        let post = parse_post(&json!({"postID": "canonical", "id": "other"}), BASE).unwrap();
        assert_eq!(post.id, PostId::new("canonical"));

        let numeric = parse_post(&json!({"postID": 42}), BASE).unwrap();
        assert_eq!(numeric.id, PostId::new("42"));
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let post = parse_post(&json!({"postID": "p1", "likeCount": null}), BASE).unwrap();
        assert_eq!(post.like_count, 0);
        assert!(!post.liked_by_me);
        assert_eq!(post.author_id, None);
    }

    #[test]
    fn malformed_posts_are_rejected_whole() {
        assert_eq!(parse_post(&json!({"content": "no id"}), BASE), Err(WireError::Missing("postID")));
        assert!(matches!(
            parse_post(&json!({"postID": "p", "likeCount": -1}), BASE),
            Err(WireError::WrongType { field: "likeCount", .. })
        ));
        assert!(matches!(
            parse_post(&json!({"postID": "p", "likedByMe": "yes"}), BASE),
            Err(WireError::WrongType { field: "likedByMe", .. })
        ));
        assert_eq!(
            parse_post(&json!({"postID": "p", "createdAt": "yesterday"}), BASE),
            Err(WireError::BadTimestamp("createdAt"))
        );
        assert_eq!(parse_post(&json!("p1"), BASE), Err(WireError::NotAnObject));
    }

    #[test]
    fn integer_flags_and_numeric_string_counters_are_accepted() {
        let posts = parse_feed(
            &json!([
                {"postID": "p1", "likeCount": 2, "likedByMe": 1},
                {"postID": "p2", "likedByMe": 0, "commentCount": "4"},
                {"postID": "p3", "likeCount": " 7 "}
            ]),
            BASE,
        );
        let summary: Vec<_> = posts
            .iter()
            .map(|p| (p.id.as_str(), p.like_count, p.liked_by_me, p.comment_count))
            .collect();
        assert_eq!(
            summary,
            vec![("p1", 2, true, 0), ("p2", 0, false, 4), ("p3", 7, false, 0)]
        );
    }

    #[test]
    fn negative_or_fractional_counters_still_drop_the_post() {
        for bad in [json!("-1"), json!("1.5"), json!("many"), json!(-3), json!(2.5)] {
            assert!(
                matches!(
                    parse_post(&json!({"postID": "p", "likeCount": bad.clone()}), BASE),
                    Err(WireError::WrongType { field: "likeCount", .. })
                ),
                "likeCount {bad} should be rejected"
            );
        }
        assert!(matches!(
            parse_post(&json!({"postID": "p", "likedByMe": 0.5}), BASE),
            Err(WireError::WrongType { field: "likedByMe", .. })
        ));
    }

    #[test]
    fn feed_drops_only_the_bad_entries() {
        let posts = parse_feed(
            &json!([
                {"postID": "ok-1"},
                {"likeCount": 4},
                {"postID": "bad", "commentCount": 1.5},
                {"postID": "ok-2"}
            ]),
            BASE,
        );
        let ids: Vec<_> = posts.into_iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec!["ok-1", "ok-2"]);
    }

    #[test]
    fn non_array_feed_is_empty() {
        assert!(parse_feed(&json!({"error": "maintenance"}), BASE).is_empty());
        assert!(parse_feed(&json!("<html>"), BASE).is_empty());
    }

    #[test]
    fn comments_carry_owning_post() {
        let post_id = PostId::new("p1");
        let comments = parse_comments(
            &json!([
                {"commentID": "c1", "fullName": "Bo", "comment": "Nice!", "createdAt": "2024-05-01T07:00:00+02:00"},
                {"commentID": "c2"}
            ]),
            &post_id,
        );
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].post_id, post_id);
        assert_eq!(comments[0].display_author(), "Bo");
    }

    #[test]
    fn profile_name_fallbacks() {
        let id = AuthorId::new("a1");
        let p = parse_profile(&json!({"name": "Cam", "photo": "/p/cam.png"}), &id, BASE).unwrap();
        assert_eq!(p.username.as_deref(), Some("Cam"));
        assert_eq!(p.full_name.as_deref(), Some("Cam"));
        assert_eq!(p.photo_url.as_deref(), Some("http://api.test/p/cam.png"));

        let p = parse_profile(&json!({"username": "cam99", "fullName": "Cam Hill"}), &id, BASE).unwrap();
        assert_eq!(p.username.as_deref(), Some("cam99"));
        assert_eq!(p.full_name.as_deref(), Some("Cam Hill"));
    }

    #[test]
    fn current_user_id_keys() {
        assert_eq!(parse_current_user(&json!({"profileID": "me"})).unwrap(), Some(AuthorId::new("me")));
        assert_eq!(parse_current_user(&json!({"_id": "mongo"})).unwrap(), Some(AuthorId::new("mongo")));
        assert_eq!(parse_current_user(&json!({"username": "x"})).unwrap(), None);
    }

    #[test]
    fn media_urls() {
        assert_eq!(resolve_media_url("http://h/", "/a.png"), "http://h/a.png");
        assert_eq!(resolve_media_url("http://h", "a.png"), "http://h/a.png");
        assert_eq!(resolve_media_url("http://h", "https://cdn/a.png"), "https://cdn/a.png");
    }
}
