//! End-to-end scenarios against the scripted in-process server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use scenesync_client::infrastructure::game_bridge::ChannelRuntime;
use scenesync_client::infrastructure::messaging::CommandError;
use scenesync_client::infrastructure::snapshot_store::InMemorySnapshotProvider;
use scenesync_client::infrastructure::storage::InMemorySessionStore;
use scenesync_client::infrastructure::testing::{post, snapshot_with_posts, wait_until, MockServer};
use scenesync_client::ports::outbound::{SnapshotError, SnapshotProvider};
use scenesync_client::{ClientConfig, Collaborators, SceneSync};
use scenesync_domain::{PostId, RoomId, SceneSnapshot};
use scenesync_shared::{BridgeEnvelope, ConnectionState};

fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

fn test_config() -> ClientConfig {
    ClientConfig::from_lookup(|key| match key {
        "SCENESYNC_RECONNECT_JITTER" => Some("0".into()),
        _ => None,
    })
    .unwrap()
}

fn snapshots() -> InMemorySnapshotProvider {
    InMemorySnapshotProvider::new([
        snapshot_with_posts(&room("4"), vec![post(1, "Mabel", "ranch morning")]),
        snapshot_with_posts(&room("3"), vec![post(10, "Otto", "idol rehearsal")]),
    ])
}

struct Client {
    server: MockServer,
    sync: SceneSync,
    runtime_rx: mpsc::UnboundedReceiver<BridgeEnvelope>,
}

async fn start_with(provider: Arc<dyn SnapshotProvider>) -> Client {
    let server = MockServer::new();
    let (runtime, runtime_rx) = ChannelRuntime::new();
    let sync = SceneSync::start(
        &test_config(),
        Collaborators {
            connector: server.connector(),
            snapshots: provider,
            session: Arc::new(InMemorySessionStore::new()),
            runtime: Arc::new(runtime),
        },
    )
    .unwrap();
    wait_until(|| sync.connection().is_connected()).await;
    Client {
        server,
        sync,
        runtime_rx,
    }
}

async fn start() -> Client {
    start_with(Arc::new(snapshots())).await
}

fn new_post(room_id: &str, id: u64, body: &str) -> Value {
    json!({
        "event": "newPost",
        "roomId": room_id,
        "payload": {"id": id, "author": "Otto", "body": body, "createdAt": "2024-05-01T13:00:00Z"}
    })
}

fn room_requests(server: &MockServer) -> Vec<Value> {
    server
        .sent_json()
        .into_iter()
        .filter(|v| v.get("action").is_some())
        .collect()
}

fn post_ids(client: &Client) -> Vec<u64> {
    client
        .sync
        .controller()
        .presentation()
        .snapshot
        .map(|s| s.posts.iter().map(|p| p.id.get()).collect())
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn scene_switch_during_outage_subscribes_only_the_new_room() {
    let client = start().await;
    let controller = client.sync.controller().clone();
    controller.activate("10016").await;

    client.server.set_accepting(false);
    client.server.drop_connection();
    let connection = client.sync.connection().clone();
    wait_until(|| connection.state() == ConnectionState::Reconnecting).await;
    assert!(controller.presentation().is_stale());

    controller.activate("10022").await;
    assert_eq!(post_ids(&client), vec![10]);
    client.server.clear_sent();

    client.server.set_accepting(true);
    wait_until(|| connection.is_connected()).await;
    wait_until(|| !room_requests(&client.server).is_empty()).await;

    assert_eq!(
        room_requests(&client.server),
        vec![json!({"action": "subscribe", "roomId": "3"})]
    );

    // A late frame for the old room is ignored; the new room merges
    client.server.push_json(&new_post("4", 2, "stale ranch post"));
    client.server.push_json(&new_post("3", 11, "idol encore"));
    let watched = controller.clone();
    wait_until(move || watched.presentation().snapshot.is_some_and(|s| s.posts.len() == 2)).await;

    assert_eq!(post_ids(&client), vec![11, 10]);
    assert!(!controller.presentation().is_stale());
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn switching_rooms_while_live_moves_the_server_subscription() {
    let client = start().await;
    let controller = client.sync.controller();

    controller.activate("10016").await;
    controller.activate("10012").await;
    // Same room, different scene id: no resubscription
    controller.activate("10009").await;
    wait_until(|| room_requests(&client.server).len() >= 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        room_requests(&client.server),
        vec![
            json!({"action": "subscribe", "roomId": "4"}),
            json!({"action": "unsubscribe", "roomId": "4"}),
            json!({"action": "subscribe", "roomId": "3"}),
        ]
    );
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn offline_like_is_flushed_on_reconnect_and_kept_when_confirmed() {
    let client = start().await;
    let controller = client.sync.controller().clone();
    controller.activate("10016").await;

    client.server.set_accepting(false);
    client.server.drop_connection();
    let connection = client.sync.connection().clone();
    wait_until(|| !connection.is_connected()).await;

    let handle = controller.like(PostId::new(1)).unwrap();
    let duplicate = controller.like(PostId::new(1)).unwrap();
    assert!(duplicate.coalesced);
    assert_eq!(client.sync.dispatcher().queued_count(), 1);
    assert_eq!(
        controller.presentation().snapshot.unwrap().posts[0].like_count,
        1
    );

    client.server.set_accepting(true);
    let server = client.server.clone();
    wait_until(move || server.sent_commands().len() == 1).await;

    let command = &client.server.sent_commands()[0];
    assert_eq!(command["kind"], "like");
    assert_eq!(command["targetId"], 1);
    assert!(command.get("userId").is_none());

    client.server.push_json(&json!({
        "correlationId": handle.correlation_id.to_string(),
        "status": "ok"
    }));
    assert_eq!(handle.outcome().await, Ok(()));
    assert_eq!(duplicate.outcome().await, Ok(()));
    assert_eq!(
        controller.presentation().snapshot.unwrap().posts[0].like_count,
        1
    );
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_vote_times_out_and_reverts() {
    let client = start().await;
    let controller = client.sync.controller().clone();
    controller.activate("10016").await;

    let handle = controller.vote(PostId::new(1), 2).unwrap();
    assert_eq!(controller.presentation().snapshot.unwrap().posts[0].vote_count, 1);

    let correlation_id = handle.correlation_id;
    assert_eq!(
        handle.outcome().await,
        Err(CommandError::TimedOut {
            correlation_id,
            attempts: 4
        })
    );
    assert_eq!(client.server.sent_commands().len(), 4);

    let watched = controller.clone();
    wait_until(move || {
        watched
            .presentation()
            .snapshot
            .is_some_and(|s| s.posts[0].vote_count == 0)
    })
    .await;
    assert_eq!(client.sync.dispatcher().pending_count(), 0);
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn updates_for_unknown_posts_do_not_corrupt_the_feed() {
    let client = start().await;
    let controller = client.sync.controller().clone();
    controller.activate("10016").await;

    client.server.push_json(&json!({
        "event": "postUpdated", "roomId": 4,
        "payload": {"id": 99, "author": "ghost", "body": "never created", "createdAt": "2024-05-01T13:00:00Z"}
    }));
    client.server.push_json(&json!({
        "event": "voteCast", "roomId": "4",
        "payload": {"postId": 99, "voteCount": 5}
    }));
    client.server.push("{not json");
    client.server.push_json(&json!({"event": "typing", "roomId": "4", "payload": {}}));
    client.server.push_json(&new_post("4", 2, "still flowing"));

    let watched = controller.clone();
    wait_until(move || watched.presentation().snapshot.is_some_and(|s| s.posts.len() == 2)).await;

    let snapshot = controller.presentation().snapshot.unwrap();
    assert_eq!(snapshot.posts.iter().map(|p| p.id.get()).collect::<Vec<_>>(), vec![2, 1]);
    assert!(snapshot.votes.is_empty());
    assert!(client.sync.connection().is_connected());
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn feed_replacement_swaps_the_post_list() {
    let client = start().await;
    let controller = client.sync.controller().clone();
    controller.activate("10016").await;

    client.server.push_json(&json!({
        "event": "sceneFeed", "roomId": "4",
        "payload": {"posts": [
            {"id": 7, "author": "a", "body": "x", "likeCount": 3, "createdAt": "2024-05-02T09:00:00Z"},
            {"id": 8, "author": "b", "body": "y", "createdAt": "2024-05-02T08:00:00Z"}
        ]}
    }));

    let watched = controller.clone();
    wait_until(move || {
        watched
            .presentation()
            .snapshot
            .is_some_and(|s| s.posts.first().is_some_and(|p| p.id == PostId::new(7)))
    })
    .await;
    assert_eq!(post_ids(&client), vec![7, 8]);
    client.sync.shutdown().await;
}

/// Provider that takes a while, so events can arrive mid-activation.
struct SlowProvider {
    inner: InMemorySnapshotProvider,
    delay: Duration,
}

#[async_trait]
impl SnapshotProvider for SlowProvider {
    async fn get_snapshot(&self, room_id: &RoomId) -> Result<Option<SceneSnapshot>, SnapshotError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_snapshot(room_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn events_received_while_loading_are_replayed_on_the_snapshot() {
    let mut client = start_with(Arc::new(SlowProvider {
        inner: snapshots(),
        delay: Duration::from_secs(2),
    }))
    .await;
    client.sync.bridge().receive(BridgeEnvelope::ready());
    let controller = client.sync.controller().clone();

    let activation = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.activate("10018").await })
    };
    let watched = controller.clone();
    wait_until(move || watched.presentation().loading).await;
    assert!(controller.presentation().snapshot.is_none());

    client.server.push_json(&new_post("4", 5, "posted during load"));
    activation.await.unwrap();

    assert_eq!(post_ids(&client), vec![5, 1]);
    assert!(!controller.presentation().loading);

    let forwarded: Vec<BridgeEnvelope> = std::iter::from_fn(|| client.runtime_rx.try_recv().ok()).collect();
    let kinds: Vec<&str> = forwarded.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["UPDATE_SCENE", "NEW_POST"]);
    assert_eq!(forwarded[0].data, json!({"sceneId": "10018", "tag": "ranch"}));
    assert_eq!(forwarded[1].data["id"], 5);
    client.sync.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_max_attempts() {
    let server = MockServer::new();
    server.set_accepting(false);
    let (runtime, _runtime_rx) = ChannelRuntime::new();
    let config = ClientConfig::from_lookup(|key| match key {
        "SCENESYNC_RECONNECT_JITTER" => Some("0".into()),
        "SCENESYNC_RECONNECT_MAX_ATTEMPTS" => Some("3".into()),
        "SCENESYNC_RECONNECT_MAX_MS" => Some("2000".into()),
        _ => None,
    })
    .unwrap();
    let sync = SceneSync::start(
        &config,
        Collaborators {
            connector: server.connector(),
            snapshots: Arc::new(snapshots()),
            session: Arc::new(InMemorySessionStore::new()),
            runtime: Arc::new(runtime),
        },
    )
    .unwrap();

    let connection = sync.connection().clone();
    wait_until(|| connection.state() == ConnectionState::Failed).await;
    // First attempt plus three retries
    assert_eq!(server.connect_attempts(), 4);
    assert_eq!(
        sync.controller().presentation().connection,
        ConnectionState::Failed
    );

    server.set_accepting(true);
    connection.connect();
    wait_until(|| connection.is_connected()).await;
    sync.shutdown().await;
}
