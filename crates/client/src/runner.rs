//! Composition root: wires the infrastructure into a running client.

use std::sync::Arc;

use scenesync_domain::{SceneResolver, SceneTable};

use crate::application::{SceneControllerDeps, SceneStateController};
use crate::config::{ClientConfig, ConfigError};
use crate::infrastructure::game_bridge::GameBridge;
use crate::infrastructure::messaging::{CommandDispatcher, SubscriptionRegistry};
use crate::infrastructure::websocket::ConnectionManager;
use crate::ports::outbound::{Connector, RuntimeChannel, SessionStore, SnapshotProvider};

/// External collaborators supplied by the host.
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub session: Arc<dyn SessionStore>,
    pub runtime: Arc<dyn RuntimeChannel>,
}

/// A started client. Dropping it without [`shutdown`](Self::shutdown) leaves
/// the connection task running until the runtime stops.
pub struct SceneSync {
    connection: ConnectionManager,
    dispatcher: CommandDispatcher,
    bridge: GameBridge,
    controller: SceneStateController,
}

impl SceneSync {
    /// Build every component and start connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &ClientConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let Collaborators {
            connector,
            snapshots,
            session,
            runtime,
        } = collaborators;

        let table = SceneTable::builtin_with_default(config.default_room.clone())
            .map_err(|e| ConfigError::Room(e.to_string()))?;

        let connection =
            ConnectionManager::new(connector, SubscriptionRegistry::new(), config.reconnect.clone());
        let dispatcher =
            CommandDispatcher::new(connection.clone(), session, config.commands.clone());
        let bridge = GameBridge::new(runtime, config.bridge_buffer_limit);
        let controller = SceneStateController::new(SceneControllerDeps {
            resolver: SceneResolver::new(table),
            snapshots,
            connection: connection.clone(),
            dispatcher: dispatcher.clone(),
            bridge: bridge.clone(),
        });

        tracing::info!(
            endpoint = %config.ws_url,
            default_room = %config.default_room,
            "Starting SceneSync client"
        );
        connection.connect();

        Ok(Self {
            connection,
            dispatcher,
            bridge,
            controller,
        })
    }

    pub fn controller(&self) -> &SceneStateController {
        &self.controller
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn bridge(&self) -> &GameBridge {
        &self.bridge
    }

    /// Tear down in reverse build order: detach the controller, cancel
    /// pending commands, then close the transport.
    pub async fn shutdown(self) {
        self.controller.shutdown();
        self.dispatcher.shutdown();
        self.connection.disconnect().await;
        tracing::info!("SceneSync client stopped");
    }
}
