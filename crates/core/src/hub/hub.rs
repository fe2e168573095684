//! Client registry, broadcast fan-out and cooperative editing sessions.
//!
//! The hub is a single task owning all of its maps; every other task talks to
//! it through the command channel. Slow consumers are disconnected rather
//! than allowed to stall the loop.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::message::{ClientEvent, WsEvent};

/// Per-client outbound buffer. A client that falls this far behind is dropped.
pub const CLIENT_BUFFER: usize = 256;

const COMMAND_BUFFER: usize = 256;

/// A connected WebSocket client as the hub tracks it.
/// `user_id` is 0 for anonymous clients.
#[derive(Debug)]
pub struct Client {
    pub id: String,
    pub user_id: i64,
    pub tx: mpsc::Sender<String>,
}

impl Client {
    pub fn is_authenticated(&self) -> bool {
        self.user_id > 0
    }
}

enum HubCommand {
    Register(Client),
    Unregister { client_id: String },
    Broadcast(WsEvent),
    Incoming { client_id: String, text: String },
}

/// Cheaply cloneable handle for talking to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn register(&self, client: Client) {
        if self.tx.send(HubCommand::Register(client)).await.is_err() {
            error!("Hub is gone, register dropped");
        }
    }

    pub async fn unregister(&self, client_id: String) {
        if self
            .tx
            .send(HubCommand::Unregister { client_id })
            .await
            .is_err()
        {
            error!("Hub is gone, unregister dropped");
        }
    }

    /// Non-blocking broadcast. Events are emitted after commit; a full hub
    /// queue loses the event for connected clients but never fails the caller.
    pub fn try_broadcast(&self, event: WsEvent) -> bool {
        match self.tx.try_send(HubCommand::Broadcast(event)) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to enqueue hub broadcast: {}", e);
                false
            }
        }
    }

    /// Feed one raw frame received from a client into the hub loop.
    pub async fn incoming(&self, client_id: String, text: String) {
        if self
            .tx
            .send(HubCommand::Incoming { client_id, text })
            .await
            .is_err()
        {
            error!("Hub is gone, incoming frame dropped");
        }
    }
}

struct SessionHolder {
    client_id: String,
    user_id: i64,
}

/// The hub task state. Spawn with `tokio::spawn(hub.run())`.
pub struct Hub {
    rx: mpsc::Receiver<HubCommand>,
    /// Authoritative registry, keyed by client id.
    clients: HashMap<String, Client>,
    /// Secondary pointer for authenticated users, used to evict a superseded
    /// session on reconnect. Valid only while it matches `clients`.
    user_clients: HashMap<i64, String>,
    /// `entity:context_id` -> holder.
    editing_sessions: HashMap<String, SessionHolder>,
}

/// Create the hub and its handle.
pub fn create_hub() -> (HubHandle, Hub) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    (
        HubHandle { tx },
        Hub {
            rx,
            clients: HashMap::new(),
            user_clients: HashMap::new(),
            editing_sessions: HashMap::new(),
        },
    )
}

impl Hub {
    pub async fn run(mut self) {
        info!("Realtime hub started");
        while let Some(command) = self.rx.recv().await {
            match command {
                HubCommand::Register(client) => self.register(client),
                HubCommand::Unregister { client_id } => self.unregister(&client_id),
                HubCommand::Broadcast(event) => self.broadcast(&event, None),
                HubCommand::Incoming { client_id, text } => self.handle_incoming(&client_id, &text),
            }
        }
        info!("Realtime hub shutting down");
    }

    fn register(&mut self, client: Client) {
        if client.is_authenticated() {
            // One live connection per authenticated user: evict the old one
            // and free whatever it was editing.
            if let Some(old_id) = self.user_clients.remove(&client.user_id) {
                if let Some(old) = self.clients.remove(&old_id) {
                    debug!(
                        "Evicting superseded connection for user {}: {}",
                        client.user_id, old.id
                    );
                    self.release_sessions_of(&old.id);
                }
            }
            self.user_clients.insert(client.user_id, client.id.clone());
            info!(
                "WebSocket client registered: client_id={} user_id={} (authenticated)",
                client.id, client.user_id
            );
        } else {
            info!(
                "WebSocket client registered: client_id={} (anonymous)",
                client.id
            );
        }
        self.clients.insert(client.id.clone(), client);
    }

    fn unregister(&mut self, client_id: &str) {
        let Some(client) = self.clients.remove(client_id) else {
            return;
        };

        self.release_sessions_of(client_id);

        if client.is_authenticated() {
            // Only clear the user pointer if it still points at this exact
            // client; a reconnect may already have replaced it.
            if self.user_clients.get(&client.user_id).map(String::as_str) == Some(client_id) {
                self.user_clients.remove(&client.user_id);
            }
        }
        info!(
            "WebSocket client unregistered: client_id={} user_id={}",
            client.id, client.user_id
        );
        // Dropping `client` closes its send channel.
    }

    fn broadcast(&mut self, event: &WsEvent, exclude: Option<&str>) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize hub event: {}", e);
                return;
            }
        };

        let mut dropped = Vec::new();
        for (id, client) in &self.clients {
            if exclude == Some(id.as_str()) {
                continue;
            }
            // Full buffer means a slow consumer: disconnect, never block.
            if client.tx.try_send(text.clone()).is_err() {
                dropped.push(id.clone());
            }
        }

        for id in dropped {
            warn!("Dropping slow WebSocket client {}", id);
            self.unregister(&id);
        }
    }

    fn handle_incoming(&mut self, client_id: &str, text: &str) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring unparseable client frame: {}", e);
                return;
            }
        };

        let Some(client) = self.clients.get(client_id) else {
            return;
        };
        let user_id = client.user_id;

        match event {
            ClientEvent::StartEditing { entity, context_id } => {
                if user_id == 0 {
                    debug!("Anonymous client attempted to start editing, rejected");
                    return;
                }
                let key = session_key(&entity, context_id);
                if self.editing_sessions.contains_key(&key) {
                    // Already held (possibly by this same client): silently ignore.
                    return;
                }
                self.editing_sessions.insert(
                    key.clone(),
                    SessionHolder {
                        client_id: client_id.to_string(),
                        user_id,
                    },
                );
                info!("User {} started editing {}", user_id, key);
                self.broadcast(&WsEvent::EditingStarted { entity, context_id }, Some(client_id));
            }
            ClientEvent::FinishEditing { entity, context_id } => {
                if user_id == 0 {
                    debug!("Anonymous client attempted to finish editing, rejected");
                    return;
                }
                let key = session_key(&entity, context_id);
                let held_by_caller = self
                    .editing_sessions
                    .get(&key)
                    .is_some_and(|holder| holder.client_id == client_id);
                if !held_by_caller {
                    return;
                }
                self.editing_sessions.remove(&key);
                info!("User {} finished editing {}", user_id, key);
                self.broadcast(&WsEvent::EditingFinished { entity, context_id }, Some(client_id));
            }
        }
    }

    fn release_sessions_of(&mut self, client_id: &str) {
        let released: Vec<String> = self
            .editing_sessions
            .iter()
            .filter(|(_, holder)| holder.client_id == client_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in released {
            if let Some(holder) = self.editing_sessions.remove(&key) {
                info!(
                    "Released editing session {} of disconnected user {}",
                    key, holder.user_id
                );
            }
        }
    }
}

fn session_key(entity: &str, context_id: i64) -> String {
    format!("{entity}:{context_id}")
}
