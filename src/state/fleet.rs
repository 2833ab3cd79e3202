//! The Fleet - central shared state for the control plane.
//!
//! Mirrors the "central DI container" role the rest of this codebase gives
//! its top-level state type: it owns the durable handle and the per-process
//! indices, and hands out references to the components (C1-C8) that operate
//! over them. It holds no business logic of its own beyond attach/detach,
//! which is the one place that needs to see both a `ClientSession` and the
//! `ClientStore` entry it binds to (spec.md §4.4).

use crate::config::Config;
use crate::db::Database;
use crate::error::StoreError;
use crate::jobs::JobStore;
use crate::state::client::{Client, ClientId};
use crate::state::session::{ClientSession, Transport};
use crate::state::store::ClientStore;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Holds every connected client's live session. Kept separate from
/// `ClientStore` (which owns only the durable `Client` row) so `ClientStore`
/// keeps its narrow, single-purpose contract (spec.md §4.2) while attach
/// still gets id → (persistent state, optional session handle) lookups
/// (spec.md §8 "Session/tunnel back-references").
pub struct SessionRegistry {
    sessions: DashMap<ClientId, Arc<ClientSession>>,
}

impl SessionRegistry {
    fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }
}

pub struct Fleet {
    pub config: Config,
    pub db: Database,
    pub clients: ClientStore,
    pub jobs: JobStore,
    pub sessions: SessionRegistry,
}

impl Fleet {
    pub async fn new(config: Config, db: Database) -> Result<Self, StoreError> {
        let clients = ClientStore::load(db.clone()).await?;
        Ok(Self {
            config,
            jobs: JobStore::new(db.clone()),
            db,
            clients,
            sessions: SessionRegistry::new(),
        })
    }

    /// Attach a transport to `client_id` (spec.md §4.4). If a live session
    /// already exists for this id it is superseded: signaled to shut down,
    /// awaited with a bounded grace period, then replaced (last-writer-wins).
    pub async fn attach(
        &self,
        client_id: ClientId,
        client_auth_id: String,
        name: String,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<ClientSession>, StoreError> {
        let _span = crate::telemetry::create_session_span(&client_id, "attach").entered();

        if let Some(old) = self.sessions.get(&client_id) {
            old.begin_supersede();
            let grace = self.config.dispatch.session_supersede_grace();
            if let Err(err) = old.wait_superseded(grace).await {
                warn!(client_id = %client_id, error = %err, "previous session did not acknowledge supersession within grace period");
            }
            old.teardown().await;
            info!(client_id = %client_id, "superseded previous session");
        }

        let now = Utc::now();
        let mut client = self
            .clients
            .get(&client_id)
            .unwrap_or_else(|| Client::new_active(client_id.clone(), client_auth_id, name, now));
        client.mark_connected(now);
        self.clients.save(client).await?;

        let session = Arc::new(ClientSession::new(client_id.clone(), transport));
        self.sessions.sessions.insert(client_id, session.clone());
        Ok(session)
    }

    /// Detach: tear down tunnels, mark the client disconnected, persist
    /// (spec.md §4.4 "on detach").
    pub async fn detach(&self, client_id: &str) -> Result<(), StoreError> {
        let _span = crate::telemetry::create_session_span(client_id, "detach").entered();

        let Some((_, session)) = self.sessions.sessions.remove(client_id) else {
            return Ok(());
        };
        session.teardown().await;

        if let Some(mut client) = self.clients.get(client_id) {
            client.mark_disconnected(Utc::now());
            self.clients.save(client).await?;
        }
        Ok(())
    }

    pub fn keep_disconnected_clients(&self) -> Option<Duration> {
        self.config.retention.keep_disconnected_clients
    }
}
