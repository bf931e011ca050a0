use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_client::config::{self, Config};
use notify_client::models::Notification;
use notify_client::{MirrorView, NotificationApi, NotificationCenter, Session};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("NOTIFY_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "notify_client=info,notify_cli=info".into()),
        ))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let args = cli::Cli::parse();
    let cfg = build_config(&args.connection)?;

    let result = match args.command {
        cli::Commands::List { unread } => list(cfg, unread).await,
        cli::Commands::Read { id } => mark_read(cfg, &id).await,
        cli::Commands::ReadAll => mark_all_read(cfg).await,
        cli::Commands::Watch { poll_secs } => {
            let mut cfg = cfg;
            if let Some(secs) = poll_secs {
                cfg.poll_interval = (secs > 0).then(|| Duration::from_secs(secs));
            }
            watch(cfg).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn build_config(args: &cli::ConnectionArgs) -> anyhow::Result<Config> {
    let mut cfg = config::load()?;
    if let Some(api_url) = &args.api_url {
        let base = Config::new(api_url, cfg.user_id.clone())?;
        cfg.api_url = base.api_url;
    }
    if let Some(ws_url) = &args.ws_url {
        cfg = cfg.with_ws_url(ws_url)?;
    }
    if let Some(user_id) = &args.user_id {
        cfg.user_id = user_id.clone();
    }
    if let Some(token) = &args.token {
        cfg = cfg.with_token(token.clone());
    }
    Ok(cfg)
}

async fn list(cfg: Config, unread_only: bool) -> anyhow::Result<()> {
    let session = Session::new(cfg)?;
    let center = NotificationCenter::new(session.api());
    center.refresh().await.context("failed to fetch notifications")?;

    let view = center.snapshot();
    let now = chrono::Utc::now();
    for n in view.notifications.iter().filter(|n| !unread_only || !n.is_read) {
        println!("{}", render_line(n, now));
    }
    println!("{} unread of {}", view.unread_count, view.notifications.len());
    Ok(())
}

async fn mark_read(cfg: Config, id: &str) -> anyhow::Result<()> {
    let session = Session::new(cfg)?;
    let n = session
        .api()
        .mark_read(id)
        .await
        .with_context(|| format!("failed to mark {} read", id))?;
    println!("marked read: {}", render_line(&n, chrono::Utc::now()));
    Ok(())
}

async fn mark_all_read(cfg: Config) -> anyhow::Result<()> {
    let session = Session::new(cfg)?;
    let ack = session
        .api()
        .mark_all_read()
        .await
        .context("failed to mark all notifications read")?;
    println!("{}", ack.message);
    Ok(())
}

async fn watch(cfg: Config) -> anyhow::Result<()> {
    if cfg.user_id.is_empty() {
        anyhow::bail!("watch needs a user id (--user-id or NOTIFY_USER_ID)");
    }
    let session = Session::new(cfg)?;
    let center = session.start_center().await;
    let mut rx = center.watch();

    let mut seen: HashSet<String> = HashSet::new();
    let initial = center.snapshot();
    print_changes(&initial, &mut seen, None);
    let mut last_unread = initial.unread_count;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                print_changes(&view, &mut seen, Some(last_unread));
                last_unread = view.unread_count;
                tracing::debug!(unread = last_unread, "mirror updated");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, closing session");
                break;
            }
        }
    }

    session.logout().await;
    Ok(())
}

fn print_changes(view: &MirrorView, seen: &mut HashSet<String>, last_unread: Option<usize>) {
    let now = chrono::Utc::now();
    // newest first on screen means printing new arrivals oldest-first
    for n in view.notifications.iter().rev() {
        if seen.insert(n.id.clone()) {
            println!("{}", render_line(n, now));
        }
    }
    if last_unread != Some(view.unread_count) {
        println!("-- {} unread", view.unread_count);
    }
    if let Some(err) = &view.sync_error {
        println!("-- {} (will retry)", err);
    }
}

fn render_line(n: &Notification, now: chrono::DateTime<chrono::Utc>) -> String {
    let marker = if n.is_read { ' ' } else { '*' };
    let mut line = format!(
        "{} {:<10} {:<8} {}: {}  [{}]",
        marker,
        n.relative_time(now),
        n.r#type,
        n.title,
        n.message,
        n.id
    );
    if let Some(target) = n.view_target() {
        line.push_str(&format!("  view: {}", target));
    }
    line
}
