//! Scene State Controller - orchestrates scene activation and live merging
//!
//! Activation of a new external scene id:
//! 1. resolve the canonical room,
//! 2. drop the previous room's subscription and state,
//! 3. subscribe to the new room's live events (buffered while loading),
//! 4. point the connection's room interest and the game runtime at the scene,
//! 5. load the snapshot, falling back to the default room's content,
//! 6. replay buffered events on top of it and present the result.
//!
//! Each activation bumps a generation counter. Every asynchronous result and
//! every live callback checks its generation on resumption, so a slow snapshot
//! or a late event from a previous scene can never overwrite the current one.

use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tokio::sync::{oneshot, watch};

use scenesync_domain::{
    PostEntry, PostId, RoomId, SceneIdentity, SceneResolver, SceneSnapshot, SceneTag,
};
use scenesync_shared::bridge::{MSG_LIKE_POST, MSG_NEW_POST, MSG_UPDATE_SCENE, MSG_VOTE_POST};
use scenesync_shared::{
    BridgeEnvelope, Command, ConnectionState, LiveEvent, PostActionPayload, UpdateScenePayload,
};

use crate::infrastructure::game_bridge::GameBridge;
use crate::infrastructure::messaging::{
    lock, CommandDispatcher, CommandError, CommandOutcome, PendingCommandHandle,
    SubscriptionHandle,
};
use crate::infrastructure::websocket::ConnectionManager;
use crate::ports::outbound::SnapshotProvider;

use super::presentation::{ScenePresentation, SnapshotSource};
use super::scene_merge::{apply_live_event, empty_sections, fill_sections, MergeOutcome};

/// Collaborators the controller orchestrates.
pub struct SceneControllerDeps {
    pub resolver: SceneResolver,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub connection: ConnectionManager,
    pub dispatcher: CommandDispatcher,
    pub bridge: GameBridge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated { source: SnapshotSource },
    /// The scene was already active
    Unchanged,
    /// Another activation started before this one finished loading
    Superseded,
}

struct ControllerState {
    generation: u64,
    identity: Option<SceneIdentity>,
    tag: Option<SceneTag>,
    snapshot: Option<SceneSnapshot>,
    source: SnapshotSource,
    loading: bool,
    /// Live events for the loading room, in arrival order
    buffered: Vec<LiveEvent>,
    live_handle: Option<SubscriptionHandle>,
    connection: ConnectionState,
}

struct ControllerInner {
    resolver: SceneResolver,
    snapshots: Arc<dyn SnapshotProvider>,
    connection: ConnectionManager,
    dispatcher: CommandDispatcher,
    bridge: GameBridge,
    state: Mutex<ControllerState>,
    presentation: watch::Sender<ScenePresentation>,
    /// Connection-status and game-runtime subscriptions, held until shutdown
    status_handle: Mutex<Option<SubscriptionHandle>>,
    bridge_handle: Mutex<Option<SubscriptionHandle>>,
}

/// Cheap to clone; clones drive the same scene.
#[derive(Clone)]
pub struct SceneStateController {
    inner: Arc<ControllerInner>,
}

impl SceneStateController {
    pub fn new(deps: SceneControllerDeps) -> Self {
        let connection_state = deps.connection.state();
        let (presentation, _) = watch::channel(ScenePresentation::idle(connection_state));

        let inner = Arc::new(ControllerInner {
            resolver: deps.resolver,
            snapshots: deps.snapshots,
            connection: deps.connection,
            dispatcher: deps.dispatcher,
            bridge: deps.bridge,
            state: Mutex::new(ControllerState {
                generation: 0,
                identity: None,
                tag: None,
                snapshot: None,
                source: SnapshotSource::Pending,
                loading: false,
                buffered: Vec::new(),
                live_handle: None,
                connection: connection_state,
            }),
            presentation,
            status_handle: Mutex::new(None),
            bridge_handle: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let status = inner
            .connection
            .registry()
            .subscribe("scene-controller:status", move |event: &LiveEvent| {
                if let LiveEvent::ConnectionStateChanged { state, .. } = event {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_connection_state(*state);
                    }
                }
                Ok(())
            });
        *lock(&inner.status_handle) = Some(status);

        let weak = Arc::downgrade(&inner);
        let bridge = inner
            .bridge
            .on_message("scene-controller", move |envelope: &BridgeEnvelope| {
                match weak.upgrade() {
                    Some(inner) => inner.on_runtime_message(envelope),
                    None => Ok(()),
                }
            });
        *lock(&inner.bridge_handle) = Some(bridge);

        Self { inner }
    }

    /// Receiver that sees every merged state.
    pub fn subscribe_presentation(&self) -> watch::Receiver<ScenePresentation> {
        self.inner.presentation.subscribe()
    }

    pub fn presentation(&self) -> ScenePresentation {
        self.inner.presentation.borrow().clone()
    }

    pub fn active_scene(&self) -> Option<SceneIdentity> {
        lock(&self.inner.state).identity.clone()
    }

    pub fn resolver(&self) -> &SceneResolver {
        &self.inner.resolver
    }

    /// Make `external_id` the active scene.
    pub async fn activate(&self, external_id: &str) -> ActivationOutcome {
        let inner = &self.inner;
        let identity = inner.resolver.resolve(external_id);
        let tag = inner.resolver.tag_for(identity.external_id());
        let room = identity.room_id().clone();

        let generation = {
            let mut state = lock(&inner.state);
            if state.identity.as_ref() == Some(&identity) {
                tracing::debug!(scene_id = %identity.external_id(), "Scene already active");
                return ActivationOutcome::Unchanged;
            }

            state.generation += 1;
            let generation = state.generation;

            // Unsubscribe the old room before subscribing the new one
            if let Some(previous) = state.live_handle.take() {
                inner.connection.registry().unsubscribe(previous);
            }
            state.identity = Some(identity.clone());
            state.tag = Some(tag.clone());
            state.snapshot = None;
            state.source = SnapshotSource::Pending;
            state.loading = true;
            state.buffered.clear();
            state.live_handle = Some(inner.subscribe_room(room.clone(), generation));

            tracing::info!(
                scene_id = %identity.external_id(),
                room_id = %room,
                tag = %tag,
                "Activating scene"
            );
            // Under the lock so concurrent activations apply in generation order.
            // Neither call takes the controller lock.
            inner.connection.set_room_interest(Some(room.clone()));
            inner.post_to_runtime(
                MSG_UPDATE_SCENE,
                &UpdateScenePayload {
                    scene_id: identity.external_id().to_string(),
                    tag: tag.to_string(),
                },
            );

            inner.publish_locked(&state);
            generation
        };

        let (mut snapshot, source) = inner.load_snapshot(&room).await;

        let new_posts = {
            let mut state = lock(&inner.state);
            if state.generation != generation {
                tracing::debug!(room_id = %room, "Discarding snapshot for superseded scene");
                return ActivationOutcome::Superseded;
            }

            let buffered = std::mem::take(&mut state.buffered);
            if !buffered.is_empty() {
                tracing::debug!(room_id = %room, count = buffered.len(), "Replaying events received while loading");
            }
            let new_posts: Vec<PostEntry> = buffered
                .iter()
                .filter_map(|event| merge_logged(&mut snapshot, event))
                .collect();

            state.snapshot = Some(snapshot);
            state.source = source.clone();
            state.loading = false;
            inner.publish_locked(&state);
            new_posts
        };

        for post in &new_posts {
            inner.post_to_runtime(MSG_NEW_POST, post);
        }
        tracing::info!(room_id = %room, source = ?source, "Scene ready");
        ActivationOutcome::Activated { source }
    }

    /// Like a post, optimistically bumping its count until the server
    /// confirms or the command fails.
    pub fn like(&self, post_id: PostId) -> Result<PendingCommandHandle, CommandError> {
        self.inner.issue(Command::Like, post_id)
    }

    /// Vote on a post, optimistically bumping its count.
    pub fn vote(&self, post_id: PostId, choice: u32) -> Result<PendingCommandHandle, CommandError> {
        self.inner.issue(Command::Vote { choice }, post_id)
    }

    /// Detach from the connection and the game runtime.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let registry = inner.connection.registry();
        if let Some(handle) = lock(&inner.status_handle).take() {
            registry.unsubscribe(handle);
        }
        if let Some(handle) = lock(&inner.bridge_handle).take() {
            inner.bridge.remove_handler(handle);
        }
        {
            let mut state = lock(&inner.state);
            state.generation += 1;
            if let Some(handle) = state.live_handle.take() {
                registry.unsubscribe(handle);
            }
            state.loading = false;
            state.buffered.clear();
        }
        inner.connection.set_room_interest(None);
        tracing::debug!("Scene controller shut down");
    }
}

impl ControllerInner {
    fn subscribe_room(self: &Arc<Self>, room: RoomId, generation: u64) -> SubscriptionHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let consumer = format!("scene-controller:room-{room}");
        self.connection
            .registry()
            .subscribe(consumer, move |event: &LiveEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_live_event(generation, &room, event);
                }
                Ok(())
            })
    }

    fn on_live_event(&self, generation: u64, room: &RoomId, event: &LiveEvent) {
        if matches!(event, LiveEvent::ConnectionStateChanged { .. }) {
            return;
        }
        if !event.concerns(room) {
            tracing::debug!(
                event = event.kind(),
                event_room = ?event.room_id(),
                active_room = %room,
                "Discarding event for inactive room"
            );
            return;
        }

        let new_post = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return;
            }
            if state.loading {
                state.buffered.push(event.clone());
                return;
            }
            let Some(snapshot) = state.snapshot.as_mut() else {
                return;
            };
            let new_post = merge_logged(snapshot, event);
            self.publish_locked(&state);
            new_post
        };

        if let Some(post) = new_post {
            self.post_to_runtime(MSG_NEW_POST, &post);
        }
    }

    fn on_connection_state(&self, connection: ConnectionState) {
        let mut state = lock(&self.state);
        state.connection = connection;
        self.publish_locked(&state);
    }

    fn on_runtime_message(self: &Arc<Self>, envelope: &BridgeEnvelope) -> anyhow::Result<()> {
        if envelope.is(MSG_LIKE_POST) {
            let action: PostActionPayload = envelope.payload()?;
            self.issue(Command::Like, action.post_id)?;
        } else if envelope.is(MSG_VOTE_POST) {
            let action: PostActionPayload = envelope.payload()?;
            let choice = action.choice.unwrap_or_default();
            self.issue(Command::Vote { choice }, action.post_id)?;
        } else {
            tracing::debug!(kind = %envelope.kind, "Ignoring game runtime message");
        }
        Ok(())
    }

    fn issue(
        self: &Arc<Self>,
        command: Command,
        post_id: PostId,
    ) -> Result<PendingCommandHandle, CommandError> {
        let (handle, observer) = self.dispatcher.send_observed(command, post_id)?;
        if handle.coalesced {
            // The first caller already applied the optimistic update
            return Ok(handle);
        }

        let applied_in = {
            let mut state = lock(&self.state);
            let generation = state.generation;
            let applied = state
                .snapshot
                .as_mut()
                .is_some_and(|snapshot| adjust_count(snapshot, command, post_id, 1));
            if applied {
                self.publish_locked(&state);
            }
            applied.then_some(generation)
        };

        if let Some(generation) = applied_in {
            self.revert_on_failure(observer, generation, command, post_id);
        }
        Ok(handle)
    }

    fn revert_on_failure(
        self: &Arc<Self>,
        observer: oneshot::Receiver<CommandOutcome>,
        generation: u64,
        command: Command,
        post_id: PostId,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = observer.await.unwrap_or(Err(CommandError::Cancelled));
            let Err(error) = outcome else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = lock(&inner.state);
            if state.generation != generation {
                return;
            }
            let Some(snapshot) = state.snapshot.as_mut() else {
                return;
            };
            if adjust_count(snapshot, command, post_id, -1) {
                tracing::warn!(
                    post_id = %post_id,
                    kind = %command.kind(),
                    error = %error,
                    "Command failed, reverting optimistic update"
                );
                inner.publish_locked(&state);
            }
        });
    }

    async fn load_snapshot(&self, room: &RoomId) -> (SceneSnapshot, SnapshotSource) {
        let default_room = self.resolver.default_room().clone();

        match self.snapshots.get_snapshot(room).await {
            Ok(Some(mut snapshot)) => {
                snapshot.room_id = room.clone();
                if *room == default_room {
                    return (snapshot, SnapshotSource::Provider);
                }
                let missing = empty_sections(&snapshot);
                if missing.is_empty() {
                    return (snapshot, SnapshotSource::Provider);
                }
                let Some(fallback) = self.fetch_default(&default_room).await else {
                    return (snapshot, SnapshotSource::Provider);
                };
                let sections = fill_sections(&mut snapshot, &fallback, &missing);
                if sections.is_empty() {
                    return (snapshot, SnapshotSource::Provider);
                }
                tracing::warn!(
                    room_id = %room,
                    default_room = %default_room,
                    sections = ?sections,
                    "Snapshot sections empty, using default room content"
                );
                (
                    snapshot,
                    SnapshotSource::PartialFallback {
                        from: default_room,
                        sections,
                    },
                )
            }
            Ok(None) => {
                tracing::warn!(room_id = %room, "No snapshot for room, using default room content");
                self.whole_fallback(room, default_room).await
            }
            Err(e) => {
                tracing::warn!(room_id = %room, error = %e, "Snapshot provider failed, using default room content");
                self.whole_fallback(room, default_room).await
            }
        }
    }

    async fn whole_fallback(
        &self,
        room: &RoomId,
        default_room: RoomId,
    ) -> (SceneSnapshot, SnapshotSource) {
        if *room == default_room {
            return (SceneSnapshot::empty(room.clone()), SnapshotSource::Empty);
        }
        match self.fetch_default(&default_room).await {
            Some(mut snapshot) => {
                // Presented as the active room so its live deltas still apply
                snapshot.room_id = room.clone();
                (snapshot, SnapshotSource::DefaultFallback { from: default_room })
            }
            None => (SceneSnapshot::empty(room.clone()), SnapshotSource::Empty),
        }
    }

    async fn fetch_default(&self, default_room: &RoomId) -> Option<SceneSnapshot> {
        match self.snapshots.get_snapshot(default_room).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(room_id = %default_room, error = %e, "Default room snapshot unavailable");
                None
            }
        }
    }

    fn post_to_runtime<T: serde::Serialize>(&self, kind: &str, payload: &T) {
        let result = BridgeEnvelope::with_payload(kind, payload)
            .map_err(|e| crate::ports::outbound::BridgeError::Encode(e.to_string()))
            .and_then(|envelope| self.bridge.post(envelope));
        if let Err(e) = result {
            tracing::warn!(kind, error = %e, "Failed to post to game runtime");
        }
    }

    /// Must be called with the state lock held so presentations go out in
    /// the order they were produced.
    fn publish_locked(&self, state: &ControllerState) {
        self.presentation.send_replace(ScenePresentation {
            identity: state.identity.clone(),
            tag: state.tag.clone(),
            snapshot: state.snapshot.clone(),
            source: state.source.clone(),
            loading: state.loading,
            connection: state.connection,
        });
    }
}

/// Apply one event, logging missed creates. Returns a newly inserted post.
fn merge_logged(snapshot: &mut SceneSnapshot, event: &LiveEvent) -> Option<PostEntry> {
    match apply_live_event(snapshot, event, Utc::now()) {
        MergeOutcome::Inserted => match event {
            LiveEvent::NewPost { post, .. } => Some(post.clone()),
            _ => None,
        },
        MergeOutcome::MissedCreate => {
            tracing::warn!(
                event = event.kind(),
                room_id = %snapshot.room_id,
                "Live update for unknown post dropped"
            );
            None
        }
        MergeOutcome::Updated | MergeOutcome::WrongRoom | MergeOutcome::NotApplicable => None,
    }
}

fn adjust_count(snapshot: &mut SceneSnapshot, command: Command, post_id: PostId, delta: i64) -> bool {
    match command {
        Command::Like => snapshot.adjust_likes(post_id, delta),
        Command::Vote { .. } => snapshot.adjust_votes(post_id, delta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::game_bridge::ChannelRuntime;
    use crate::infrastructure::messaging::{CommandConfig, SubscriptionRegistry};
    use crate::infrastructure::testing::{post, snapshot_with_posts, wait_until, MockServer};
    use crate::infrastructure::websocket::ReconnectConfig;
    use crate::ports::outbound::{MockSessionStore, MockSnapshotProvider, SnapshotError};
    use mockall::predicate::eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        server: MockServer,
        connection: ConnectionManager,
        controller: SceneStateController,
        runtime_rx: mpsc::UnboundedReceiver<BridgeEnvelope>,
        bridge: GameBridge,
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn harness(snapshots: MockSnapshotProvider) -> Harness {
        let server = MockServer::new();
        let connection = ConnectionManager::new(
            server.connector(),
            SubscriptionRegistry::new(),
            ReconnectConfig {
                jitter_factor: 0.0,
                ..ReconnectConfig::default()
            },
        );
        let mut session = MockSessionStore::new();
        session.expect_get().returning(|_| None);
        let dispatcher =
            CommandDispatcher::new(connection.clone(), Arc::new(session), CommandConfig::default());
        let (runtime, runtime_rx) = ChannelRuntime::new();
        let bridge = GameBridge::new(Arc::new(runtime), 16);
        let controller = SceneStateController::new(SceneControllerDeps {
            resolver: SceneResolver::default(),
            snapshots: Arc::new(snapshots),
            connection: connection.clone(),
            dispatcher,
            bridge: bridge.clone(),
        });
        Harness {
            server,
            connection,
            controller,
            runtime_rx,
            bridge,
        }
    }

    fn provider_with(rooms: Vec<SceneSnapshot>) -> MockSnapshotProvider {
        let mut provider = MockSnapshotProvider::new();
        provider.expect_get_snapshot().returning(move |room_id| {
            Ok(rooms.iter().find(|s| &s.room_id == room_id).cloned())
        });
        provider
    }

    async fn connected(h: &Harness) {
        h.connection.connect();
        wait_until(|| h.connection.is_connected()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn activation_loads_snapshot_and_merges_live_posts() {
        let h = harness(provider_with(vec![snapshot_with_posts(
            &room("4"),
            vec![post(1, "Mabel", "first")],
        )]));
        connected(&h).await;

        let outcome = h.controller.activate("10016").await;
        assert_eq!(outcome, ActivationOutcome::Activated { source: SnapshotSource::Provider });

        h.server.push_json(&json!({
            "event": "newPost", "roomId": "4",
            "payload": {"id": 2, "author": "Otto", "body": "second", "createdAt": "2024-05-01T13:00:00Z"}
        }));
        let controller = h.controller.clone();
        wait_until(move || {
            controller
                .presentation()
                .snapshot
                .is_some_and(|s| s.posts.len() == 2)
        })
        .await;

        let presented = h.controller.presentation();
        let ids: Vec<u64> = presented.snapshot.unwrap().posts.iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(presented.tag, Some(SceneTag::new("ranch")));
        assert!(!presented.loading);
        h.connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_room_falls_back_to_default_content() {
        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_get_snapshot()
            .with(eq(room("3")))
            .returning(|_| Err(SnapshotError::Unavailable("offline".into())));
        provider
            .expect_get_snapshot()
            .with(eq(room("4")))
            .returning(|r| Ok(Some(snapshot_with_posts(r, vec![post(7, "a", "default")]))));
        let h = harness(provider);

        let outcome = h.controller.activate("10012").await;

        assert_eq!(
            outcome,
            ActivationOutcome::Activated {
                source: SnapshotSource::DefaultFallback { from: room("4") }
            }
        );
        let presented = h.controller.presentation();
        assert!(presented.source.uses_default_content());
        let snapshot = presented.snapshot.unwrap();
        assert_eq!(snapshot.room_id, room("3"));
        assert_eq!(snapshot.posts[0].id, PostId::new(7));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_from_previous_scene_is_discarded() {
        let mut provider = MockSnapshotProvider::new();
        provider.expect_get_snapshot().returning(|r| {
            Ok(Some(snapshot_with_posts(r, vec![post(1, "a", r.as_str())])))
        });

        // Slow provider for room 3 only
        struct Slow(MockSnapshotProvider);
        #[async_trait::async_trait]
        impl SnapshotProvider for Slow {
            async fn get_snapshot(
                &self,
                room_id: &RoomId,
            ) -> Result<Option<SceneSnapshot>, SnapshotError> {
                if room_id.as_str() == "3" {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                self.0.get_snapshot(room_id).await
            }
        }

        let h = harness(MockSnapshotProvider::new());
        let controller = SceneStateController::new(SceneControllerDeps {
            resolver: SceneResolver::default(),
            snapshots: Arc::new(Slow(provider)),
            connection: h.connection.clone(),
            dispatcher: CommandDispatcher::new(
                h.connection.clone(),
                Arc::new(crate::infrastructure::storage::InMemorySessionStore::new()),
                CommandConfig::default(),
            ),
            bridge: h.bridge.clone(),
        });

        let slow = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.activate("10012").await })
        };
        let started = controller.clone();
        wait_until(move || started.active_scene().is_some()).await;
        let fast = controller.activate("10016").await;

        assert!(matches!(fast, ActivationOutcome::Activated { .. }));
        assert_eq!(slow.await.unwrap(), ActivationOutcome::Superseded);
        let presented = controller.presentation();
        assert_eq!(presented.identity.unwrap().room_id(), &room("4"));
        assert_eq!(presented.snapshot.unwrap().posts[0].body, "4");
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_previous_room_are_ignored_after_switch() {
        let h = harness(provider_with(vec![
            snapshot_with_posts(&room("3"), vec![post(1, "a", "idol")]),
            snapshot_with_posts(&room("4"), vec![post(1, "a", "ranch")]),
        ]));
        connected(&h).await;
        h.controller.activate("10012").await;
        h.controller.activate("10016").await;

        h.server.push_json(&json!({
            "event": "postUpdated", "roomId": "3",
            "payload": {"id": 1, "author": "a", "body": "edited idol", "createdAt": "2024-05-01T12:00:00Z"}
        }));
        h.server.push_json(&json!({
            "event": "postUpdated", "roomId": "4",
            "payload": {"id": 1, "author": "a", "body": "edited ranch", "createdAt": "2024-05-01T12:00:00Z"}
        }));
        let controller = h.controller.clone();
        wait_until(move || {
            controller
                .presentation()
                .snapshot
                .is_some_and(|s| s.posts[0].body == "edited ranch")
        })
        .await;

        let snapshot = h.controller.presentation().snapshot.unwrap();
        assert_eq!(snapshot.room_id, room("4"));
        assert_eq!(snapshot.posts.len(), 1);
        h.connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_like_reverts_optimistic_count() {
        let h = harness(provider_with(vec![snapshot_with_posts(
            &room("4"),
            vec![post(5, "a", "likeable")],
        )]));
        connected(&h).await;
        h.controller.activate("10016").await;

        let handle = h.controller.like(PostId::new(5)).unwrap();
        let likes = |c: &SceneStateController| c.presentation().snapshot.unwrap().posts[0].like_count;
        assert_eq!(likes(&h.controller), 1);

        // Duplicate tap while pending: coalesced, no second bump
        let again = h.controller.like(PostId::new(5)).unwrap();
        assert!(again.coalesced);
        assert_eq!(likes(&h.controller), 1);

        wait_until(|| h.server.sent_commands().len() == 1).await;
        h.server.push_json(&json!({
            "correlationId": handle.correlation_id.to_string(),
            "status": "error",
            "message": "already liked"
        }));
        assert!(handle.outcome().await.is_err());

        let controller = h.controller.clone();
        wait_until(move || likes(&controller) == 0).await;
        h.connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_receives_scene_updates_and_routes_votes() {
        let mut h = harness(provider_with(vec![snapshot_with_posts(
            &room("3"),
            vec![post(9, "a", "vote")],
        )]));
        connected(&h).await;
        h.controller.activate("10009").await;

        // Runtime not ready yet: UPDATE_SCENE is buffered
        assert!(h.runtime_rx.try_recv().is_err());
        h.bridge.receive(BridgeEnvelope::ready());
        let update = h.runtime_rx.try_recv().unwrap();
        assert!(update.is(MSG_UPDATE_SCENE));
        assert_eq!(update.data, json!({"sceneId": "10009", "tag": "idol"}));

        h.bridge
            .receive(BridgeEnvelope::new(MSG_VOTE_POST, json!({"postId": 9, "choice": 2})));
        wait_until(|| h.server.sent_commands().len() == 1).await;

        let command = &h.server.sent_commands()[0];
        assert_eq!(command["kind"], "vote");
        assert_eq!(command["targetId"], 9);
        assert_eq!(command["choice"], 2);
        assert_eq!(
            h.controller.presentation().snapshot.unwrap().posts[0].vote_count,
            1
        );
        h.connection.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connection_state_is_presented() {
        let h = harness(provider_with(vec![]));
        assert_eq!(h.controller.presentation().connection, ConnectionState::Disconnected);

        connected(&h).await;
        assert_eq!(h.controller.presentation().connection, ConnectionState::Connected);
        assert!(!h.controller.presentation().is_stale());

        h.server.drop_connection();
        let controller = h.controller.clone();
        wait_until(move || controller.presentation().is_stale()).await;
        h.connection.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_activations_leave_interest_on_the_active_room() {
        let mut h = harness(provider_with(vec![]));
        h.bridge.receive(BridgeEnvelope::ready());

        for round in 0..50 {
            let tasks: Vec<_> = ["10016", "10022", "10012", "10022"]
                .into_iter()
                .map(|scene_id| {
                    let controller = h.controller.clone();
                    tokio::spawn(async move { controller.activate(scene_id).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let active = h.controller.active_scene().unwrap();
            assert_eq!(
                h.connection.room_interest().as_ref(),
                Some(active.room_id()),
                "round {round}"
            );

            let last_update = std::iter::from_fn(|| h.runtime_rx.try_recv().ok())
                .filter(|e| e.is(MSG_UPDATE_SCENE))
                .last();
            if let Some(update) = last_update {
                assert_eq!(update.data["sceneId"], active.external_id(), "round {round}");
            }
        }
        h.controller.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn reactivating_same_scene_is_unchanged() {
        let h = harness(provider_with(vec![]));

        let first = h.controller.activate("10016").await;
        assert_eq!(first, ActivationOutcome::Activated { source: SnapshotSource::Empty });
        assert_eq!(h.controller.activate("10016").await, ActivationOutcome::Unchanged);

        h.controller.shutdown();
        assert_eq!(h.connection.room_interest(), None);
    }
}
