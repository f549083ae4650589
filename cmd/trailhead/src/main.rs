//! # Trailhead Binary
//!
//! Command-line controller for the community feed. Assembles settings,
//! logging, the REST backend and the token chain into a `FeedStore`, then
//! maps each subcommand onto one store operation.

use anyhow::{bail, Context};
use api_adapters::RestFeedBackend;
use auth_adapters::{FallbackTokenSource, FileTokenStore, StaticTokenSource};
use clap::{Parser, Subcommand};
use configs::{LogFormat, LogSettings, Settings};
use domains::{ImageRef, Post, PostId};
use secrecy::SecretString;
use services::FeedStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "trailhead", version, about = "Browse and post to the Trailhead community feed")]
struct Cli {
    /// Session token; wins over the configured token and the token file
    #[arg(long, global = true, env = "TRAILHEAD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the feed
    Feed,
    /// Like a post, or take the like back
    Like { post_id: String },
    /// Publish a post with text, an image, or both
    Post {
        #[arg(long)]
        image: Option<PathBuf>,
        text: Vec<String>,
    },
    /// Delete one of your own posts
    Delete { post_id: String },
    /// Show the comments under a post
    Comments { post_id: String },
    /// Comment on a post
    Comment { post_id: String, text: Vec<String> },
    /// Manage the stored session token
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Store a token in the configured token file
    Set { token: String },
    /// Remove the stored token
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // before parsing, so `TRAILHEAD_TOKEN` from `.env` reaches the CLI
    configs::load_env_file(None);
    let cli = Cli::parse();
    let mut settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    let command = match cli.command {
        Command::Token(command) => return manage_token(&settings, &command).await,
        command => command,
    };

    let http = reqwest::Client::builder()
        .user_agent(settings.api.user_agent.as_str())
        .build()
        .context("building HTTP client")?;
    let backend = Arc::new(RestFeedBackend::with_client(http, settings.api.base_url.as_str()));
    tracing::debug!(base_url = backend.base_url(), "REST backend ready");
    let tokens = Arc::new(token_chain(&mut settings, cli.token));
    let store = FeedStore::new(backend, tokens);

    match command {
        Command::Feed => {
            store.bootstrap().await?;
            print_feed(&store).await;
        }
        Command::Like { post_id } => {
            let post_id = PostId::new(post_id);
            store.load_feed().await?;
            if store.post(&post_id).await.is_none() {
                bail!("post {post_id} is not in the feed");
            }
            store.toggle_like(&post_id).await?;
            if let Some(post) = store.post(&post_id).await {
                let verb = if post.liked_by_me { "Liked" } else { "Unliked" };
                println!("{verb} {post_id} ({})", plural(post.like_count, "Like", "Likes"));
            }
        }
        Command::Post { image, text } => {
            store.create_post(text.join(" "), image.map(ImageRef::new)).await?;
            println!("Posted.");
            print_feed(&store).await;
        }
        Command::Delete { post_id } => {
            let post_id = PostId::new(post_id);
            store.bootstrap().await?;
            store.delete_post(&post_id).await?;
            println!("Post deleted successfully");
        }
        Command::Comments { post_id } => {
            let post_id = PostId::new(post_id);
            store.fetch_comments(&post_id).await?;
            print_comments(&store, &post_id);
        }
        Command::Comment { post_id, text } => {
            let post_id = PostId::new(post_id);
            store.set_comment_input(&post_id, text.join(" "));
            store.submit_comment_input(&post_id).await?;
            print_comments(&store, &post_id);
        }
        Command::Token(_) => {}
    }
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.compact().init(),
    }
}

/// Command-line token first, then the configured token, then the token file.
fn token_chain(settings: &mut Settings, cli_token: Option<String>) -> FallbackTokenSource {
    let mut chain = FallbackTokenSource::new();
    if let Some(token) = cli_token {
        chain = chain.with(Arc::new(StaticTokenSource::new(SecretString::from(token))));
    }
    if let Some(token) = settings.auth.token.take() {
        chain = chain.with(Arc::new(StaticTokenSource::new(token)));
    }
    if let Some(path) = &settings.auth.token_file {
        chain = chain.with(Arc::new(FileTokenStore::new(path)));
    }
    if chain.is_empty() {
        tracing::warn!("no token configured; every request will fail as unauthenticated");
    }
    chain
}

async fn manage_token(settings: &Settings, command: &TokenCommand) -> anyhow::Result<()> {
    let Some(path) = &settings.auth.token_file else {
        bail!("auth.token_file is not configured");
    };
    let store = FileTokenStore::new(path);
    let path = store.path().display();
    match command {
        TokenCommand::Set { token } => {
            store
                .save(&SecretString::from(token.clone()))
                .await
                .with_context(|| format!("writing {path}"))?;
            println!("Token saved to {path}");
        }
        TokenCommand::Clear => {
            store
                .clear()
                .await
                .with_context(|| format!("removing {path}"))?;
            println!("Token cleared from {path}");
        }
    }
    Ok(())
}

fn plural(n: u32, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

async fn print_feed(store: &FeedStore) {
    let posts = store.posts().await;
    if posts.is_empty() {
        println!("No posts yet.");
        return;
    }
    for post in &posts {
        print_post(store, post).await;
    }
}

async fn print_post(store: &FeedStore, post: &Post) {
    let when = post
        .created_at
        .map(|t| t.date_naive().to_string())
        .unwrap_or_else(|| "Today".to_string());
    let owner = if store.can_delete(post).await { "  [yours]" } else { "" };

    println!("── {} · {} · {}{}", post.id, store.display_name(post), when, owner);
    if let Some(content) = post.content.as_deref().filter(|c| !c.trim().is_empty()) {
        println!("   {content}");
    }
    if let Some(url) = &post.image_url {
        println!("   [image] {url}");
    }
    println!(
        "   {} · {}{}",
        plural(post.like_count, "Like", "Likes"),
        plural(post.comment_count, "Comment", "Comments"),
        if post.liked_by_me { " · liked by you" } else { "" }
    );
}

fn print_comments(store: &FeedStore, post_id: &PostId) {
    let comments = store.comments(post_id).unwrap_or_default();
    if comments.is_empty() {
        println!("No comments yet. Be the first!");
        return;
    }
    for comment in comments {
        let when = comment
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} ({}): {}", comment.display_author(), when, comment.text);
    }
}
