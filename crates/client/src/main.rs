//! SceneSync headless client - main entry point.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scenesync_client::infrastructure::game_bridge::ChannelRuntime;
use scenesync_client::infrastructure::snapshot_store::InMemorySnapshotProvider;
use scenesync_client::infrastructure::storage::FileSessionStore;
use scenesync_client::infrastructure::websocket::WsConnector;
use scenesync_client::ports::outbound::SnapshotProvider;
use scenesync_client::{ClientConfig, Collaborators, SceneSync};
use scenesync_shared::BridgeEnvelope;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scenesync_client=debug,scenesync_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("invalid configuration")?;

    let snapshots: Arc<dyn SnapshotProvider> = match &config.snapshot_path {
        Some(path) => {
            let provider = InMemorySnapshotProvider::from_path(path)
                .with_context(|| format!("loading snapshots from {}", path.display()))?;
            tracing::info!(rooms = provider.len(), path = %path.display(), "Loaded snapshots");
            Arc::new(provider)
        }
        None => Arc::new(InMemorySnapshotProvider::default()),
    };

    let session = FileSessionStore::default_location();
    tracing::debug!(path = %session.path().display(), "Using session store");

    // No embedded runtime in headless mode: log what it would receive
    let (runtime, mut runtime_rx) = ChannelRuntime::new();
    tokio::spawn(async move {
        while let Some(envelope) = runtime_rx.recv().await {
            tracing::debug!(kind = %envelope.kind, data = %envelope.data, "Game runtime message");
        }
    });

    let sync = SceneSync::start(
        &config,
        Collaborators {
            connector: Arc::new(WsConnector::new(config.ws_url.as_str())),
            snapshots,
            session: Arc::new(session),
            runtime: Arc::new(runtime),
        },
    )?;
    sync.bridge().receive(BridgeEnvelope::ready());

    let mut presentations = sync.controller().subscribe_presentation();
    let watcher = tokio::spawn(async move {
        while presentations.changed().await.is_ok() {
            let view = presentations.borrow_and_update().clone();
            tracing::info!(
                scene = ?view.identity.as_ref().map(|i| i.external_id().to_string()),
                tag = ?view.tag.as_ref().map(|t| t.to_string()),
                posts = view.snapshot.as_ref().map_or(0, |s| s.posts.len()),
                source = ?view.source,
                loading = view.loading,
                connection = %view.connection,
                "Scene updated"
            );
        }
    });

    let outcome = sync.controller().activate(&config.scene_id).await;
    tracing::info!(scene_id = %config.scene_id, outcome = ?outcome, "Scene activation finished");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");

    sync.shutdown().await;
    watcher.abort();
    Ok(())
}
