//! reqwest implementation of `FeedBackend` against the community REST API.

use crate::wire;
use async_trait::async_trait;
use domains::{
    AccessToken, AuthorId, AuthorProfile, Comment, FeedBackend, FeedError, Post, PostDraft,
    PostId, Result, ValidationError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub struct RestFeedBackend {
    http: Client,
    /// e.g. "https://api.trailhead.app", no trailing slash
    base_url: String,
}

impl RestFeedBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Uses a preconfigured client (user agent, proxies, timeouts).
    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends an authenticated request. Transport errors become
    /// `NetworkFailure`, non-2xx answers `BackendRejected` with the body text.
    async fn send(&self, token: &AccessToken, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| FeedError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        debug!(status = status.as_u16(), %message, "backend rejected request");
        Err(FeedError::rejected(status.as_u16(), message))
    }

    async fn json(response: Response) -> Result<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| FeedError::NetworkFailure(format!("unreadable response body: {e}")))
    }

    async fn image_part(draft: &PostDraft) -> Result<Option<Part>> {
        let Some(image) = &draft.image else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(image.path()).await.map_err(|e| {
            ValidationError::UnreadableImage {
                path: image.path().to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        let part = Part::bytes(bytes)
            .file_name(image.file_name())
            .mime_str(image.mime().as_ref())
            .map_err(|e| ValidationError::UnreadableImage {
                path: image.path().to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Some(part))
    }
}

#[async_trait]
impl FeedBackend for RestFeedBackend {
    async fn fetch_posts(&self, token: &AccessToken) -> Result<Vec<Post>> {
        let response = self
            .send(token, self.http.get(self.url("/community/posts")))
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| FeedError::NetworkFailure(e.to_string()))?;

        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
            warn!("feed body is not JSON");
            Value::Null
        });
        Ok(wire::parse_feed(&body, &self.base_url))
    }

    async fn create_post(&self, token: &AccessToken, draft: &PostDraft) -> Result<()> {
        let mut form = Form::new().text("content", draft.content.clone());
        if let Some(part) = Self::image_part(draft).await? {
            form = form.part("image", part);
        }
        self.send(token, self.http.post(self.url("/community/posts")).multipart(form))
            .await?;
        Ok(())
    }

    async fn delete_post(&self, token: &AccessToken, post_id: &PostId) -> Result<()> {
        let url = self.url(&format!("/community/posts/{post_id}"));
        self.send(token, self.http.delete(url)).await?;
        Ok(())
    }

    async fn toggle_like(&self, token: &AccessToken, post_id: &PostId) -> Result<()> {
        let url = self.url(&format!("/community/posts/{post_id}/like"));
        self.send(token, self.http.post(url)).await?;
        Ok(())
    }

    async fn fetch_comments(&self, token: &AccessToken, post_id: &PostId) -> Result<Vec<Comment>> {
        let url = self.url(&format!("/community/posts/{post_id}/comments"));
        let response = self.send(token, self.http.get(url)).await?;
        let body = Self::json(response).await?;
        Ok(wire::parse_comments(&body, post_id))
    }

    async fn post_comment(&self, token: &AccessToken, post_id: &PostId, text: &str) -> Result<()> {
        let url = self.url(&format!("/community/posts/{post_id}/comments"));
        self.send(token, self.http.post(url).json(&json!({ "comment": text })))
            .await?;
        Ok(())
    }

    async fn fetch_profile(&self, token: &AccessToken, author_id: &AuthorId) -> Result<AuthorProfile> {
        let url = self.url(&format!("/profile/{author_id}"));
        let response = self.send(token, self.http.get(url)).await?;
        let body = Self::json(response).await?;
        wire::parse_profile(&body, author_id, &self.base_url)
            .map_err(|e| FeedError::NetworkFailure(format!("malformed profile {author_id}: {e}")))
    }

    async fn fetch_current_user(&self, token: &AccessToken) -> Result<Option<AuthorId>> {
        let response = self.send(token, self.http.get(self.url("/profile/me"))).await?;
        let body = Self::json(response).await?;
        wire::parse_current_user(&body)
            .map_err(|e| FeedError::NetworkFailure(format!("malformed current profile: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::ImageRef;
    use mockito::Matcher;
    use std::io::Write;
    use tokio_test::assert_ok;

    fn token() -> AccessToken {
        AccessToken::new("t0k3n")
    }

    #[tokio::test]
    async fn fetch_posts_sends_bearer_and_parses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/community/posts")
            .match_header("authorization", "Bearer t0k3n")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"postID":"p1","profileID":"a1","likeCount":2,"image":"/u/x.jpg"},{"content":"orphan"}]"#)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        let posts = backend.fetch_posts(&token()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].like_count, 2);
        assert_eq!(posts[0].image_url, Some(format!("{}/u/x.jpg", server.url())));
    }

    #[tokio::test]
    async fn non_json_feed_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/community/posts")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        assert!(backend.fetch_posts(&token()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_2xx_maps_to_backend_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/community/posts/p1/like")
            .with_status(409)
            .with_body("already toggling")
            .create_async()
            .await;
        server
            .mock("DELETE", "/community/posts/p1")
            .with_status(403)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        let p1 = PostId::new("p1");

        match backend.toggle_like(&token(), &p1).await {
            Err(FeedError::BackendRejected { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "already toggling");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match backend.delete_post(&token(), &p1).await {
            Err(FeedError::BackendRejected { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_network_failure() {
        // Port 9 (discard) on localhost is not expected to accept connections.
        let backend = RestFeedBackend::new("http://127.0.0.1:9");
        let err = backend.fetch_posts(&token()).await.unwrap_err();
        assert!(matches!(err, FeedError::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn post_comment_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/community/posts/p7/comments")
            .match_header("authorization", "Bearer t0k3n")
            .match_body(Matcher::Json(serde_json::json!({ "comment": "See you at the hut" })))
            .with_status(201)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        assert_ok!(
            backend
                .post_comment(&token(), &PostId::new("p7"), "See you at the hut")
                .await
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_comments_and_profiles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/community/posts/p1/comments")
            .with_status(200)
            .with_body(r#"[{"commentID":"c1","fullName":"Bo","comment":"Wow","createdAt":"2024-05-01T07:00:00Z"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/profile/a1")
            .with_status(200)
            .with_body(r#"{"fullName":"Ana Peak","photo":"/p/a1.png"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/profile/me")
            .with_status(200)
            .with_body(r#"{"profileID":"a1","fullName":"Ana Peak"}"#)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(format!("{}/", server.url()));
        let comments = backend.fetch_comments(&token(), &PostId::new("p1")).await.unwrap();
        assert_eq!(comments[0].text, "Wow");

        let profile = backend.fetch_profile(&token(), &AuthorId::new("a1")).await.unwrap();
        assert_eq!(profile.username.as_deref(), Some("Ana Peak"));
        assert_eq!(profile.photo_url, Some(format!("{}/p/a1.png", server.url())));

        let me = backend.fetch_current_user(&token()).await.unwrap();
        assert_eq!(me, Some(AuthorId::new("a1")));
    }

    #[tokio::test]
    async fn create_post_uploads_multipart_image() {
        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(b"fake png bytes").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/community/posts")
            .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="content""#.into()),
                Matcher::Regex("Larch valley".into()),
                Matcher::Regex(r#"name="image""#.into()),
                Matcher::Regex("image/png".into()),
            ]))
            .with_status(201)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        let draft = PostDraft::new("Larch valley", Some(ImageRef::new(image.path())));
        assert_ok!(backend.create_post(&token(), &draft).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_image_fails_before_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/community/posts")
            .expect(0)
            .create_async()
            .await;

        let backend = RestFeedBackend::new(server.url());
        let draft = PostDraft::new("", Some(ImageRef::new("/definitely/not/here.jpg")));
        let err = backend.create_post(&token(), &draft).await.unwrap_err();

        assert!(matches!(
            err,
            FeedError::Validation(ValidationError::UnreadableImage { .. })
        ));
        mock.assert_async().await;
    }
}
