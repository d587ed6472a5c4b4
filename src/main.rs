//! LinkUp terminal client
//!
//! Signs in, prints the home feed, then tails live inserts and deletes
//! until Ctrl-C.

use anyhow::Context;
use linkup::platform::ChangeKind;
use linkup::{LinkUp, config, screen::ScreenScope};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Follow auth changes and sign in with LINKUP_EMAIL / LINKUP_PASSWORD
/// 4. Print the first page of the home feed
/// 5. Follow the live feed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("LINKUP__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "linkup=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "linkup=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting LinkUp...");

    linkup::metrics::init_metrics();

    // 2. Load configuration
    let config = config::AppConfig::load().context("loading configuration")?;
    tracing::info!(project = %config.backend.base_url(), "Configuration loaded");

    let app = LinkUp::new(config)?;

    // 3. Sign in
    let session_task = tokio::spawn({
        let app = app.clone();
        async move {
            app.run_session(|route| tracing::info!(?route, "Route changed"))
                .await;
        }
    });

    let email = std::env::var("LINKUP_EMAIL").context("LINKUP_EMAIL is not set")?;
    let password = std::env::var("LINKUP_PASSWORD").context("LINKUP_PASSWORD is not set")?;
    app.auth
        .sign_in(&email, &password)
        .await
        .map_err(|failure| anyhow::anyhow!(failure.msg))?;

    // 4. Home feed
    let scope = ScreenScope::new();
    let mut feed = app.live_feed(&scope);
    feed.start()
        .await
        .map_err(|failure| anyhow::anyhow!(failure.msg))?;
    for post in feed.items() {
        print_post(post);
    }

    // 5. Live changes
    if feed.is_subscribed() {
        tracing::info!("Following live feed; Ctrl-C to quit");
    } else {
        tracing::warn!("Live feed unavailable; Ctrl-C to quit");
    }
    loop {
        tokio::select! {
            change = feed.next_change() => {
                let Some(change) = change else {
                    tracing::warn!("Live feed closed");
                    break;
                };
                let inserted = change.kind == ChangeKind::Insert;
                if feed.handle_change(change).await {
                    match feed.items().first() {
                        Some(post) if inserted => print_post(post),
                        _ => println!("({} posts in feed)", feed.items().len()),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    drop(feed);
    if let Err(failure) = app.auth.sign_out().await {
        tracing::warn!(reason = %failure, "Sign-out failed");
    }
    session_task.abort();
    Ok(())
}

fn print_post(post: &linkup::data::Post) {
    let author = post.user.name.as_deref().unwrap_or("unknown");
    println!(
        "#{} {} ({} likes, {} comments)\n    {}",
        post.id(),
        author,
        post.likes.len(),
        post.comment_count,
        linkup::screen::share_message(&post.row.body)
    );
}
