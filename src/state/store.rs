//! ClientStore (C2): in-memory index over the durable `clients` table.
//!
//! Readers and writers share a `DashMap` index; `save` is durable-first, then
//! index, per spec.md §4.2. `save` and `delete_obsolete` are additionally
//! serialized against each other with a single `RwLock<()>` gate so a
//! just-deleted id can't be resurrected by a `save` that raced the reaper
//! (spec.md §4.2 "save must be serializable with delete_obsolete").

use crate::db::Database;
use crate::error::StoreError;
use crate::state::client::{Client, ClientId};
use crate::state::dashmap_ext::DashMapExt;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct ClientStore {
    db: Database,
    index: DashMap<ClientId, Client>,
    /// Write-gate: held briefly during `save` (read) and `delete_obsolete`
    /// (write) so the two can't interleave on the same id.
    write_gate: RwLock<()>,
}

impl ClientStore {
    /// Construct a store and warm its index from durable storage.
    pub async fn load(db: Database) -> Result<Self, StoreError> {
        let index = DashMap::new();
        for client in db.clients().get_all().await? {
            index.insert(client.id.clone(), client);
        }
        Ok(Self {
            db,
            index,
            write_gate: RwLock::new(()),
        })
    }

    pub async fn save(&self, client: Client) -> Result<(), StoreError> {
        let _gate = self.write_gate.read().await;
        self.db.clients().save(&client).await?;
        self.index.insert(client.id.clone(), client);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Client> {
        self.index.get_cloned(id)
    }

    /// All clients not currently obsolete under `keep_disconnected_clients`
    /// (spec.md §4.2). Ordering is unspecified.
    pub fn get_non_obsolete(
        &self,
        now: DateTime<Utc>,
        keep_disconnected_clients: Option<Duration>,
    ) -> Vec<Client> {
        self.index
            .iter_cloned()
            .into_iter()
            .map(|(_, c)| c)
            .filter(|c| !c.is_obsolete(now, keep_disconnected_clients))
            .collect()
    }

    /// Remove every obsolete client from both the durable store and the
    /// index. A no-op when `keep_disconnected_clients` is unset (spec.md
    /// §4.2 "noObsoleteProvider").
    pub async fn delete_obsolete(
        &self,
        now: DateTime<Utc>,
        keep_disconnected_clients: Option<Duration>,
    ) -> Result<usize, StoreError> {
        let _gate = self.write_gate.write().await;

        if keep_disconnected_clients.is_none() {
            return Ok(0);
        }

        let obsolete_ids: Vec<ClientId> = self
            .index
            .iter_cloned()
            .into_iter()
            .filter(|(_, c)| c.is_obsolete(now, keep_disconnected_clients))
            .map(|(id, _)| id)
            .collect();

        if obsolete_ids.is_empty() {
            return Ok(0);
        }

        self.db.clients().delete_many(&obsolete_ids).await?;
        for id in &obsolete_ids {
            self.index.remove(id);
        }
        Ok(obsolete_ids.len())
    }

    pub fn count_active(&self) -> usize {
        self.index.iter().filter(|e| e.value().is_connected()).count()
    }

    pub fn count_disconnected(&self, now: DateTime<Utc>, keep_disconnected_clients: Option<Duration>) -> usize {
        self.index
            .iter()
            .filter(|e| {
                matches!(
                    e.value().lifecycle(now, keep_disconnected_clients),
                    crate::state::client::Lifecycle::Disconnected
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ClientStore {
        ClientStore::load(Database::new(":memory:").await.unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store().await;
        let now = Utc::now();
        let client = Client::new_active("c1".into(), "auth1".into(), "box1".into(), now);
        store.save(client).await.unwrap();
        assert!(store.get("c1").is_some());
    }

    #[tokio::test]
    async fn get_non_obsolete_excludes_obsolete_clients() {
        let store = store().await;
        let now = Utc::now();
        let mut stale = Client::new_active("stale".into(), "auth1".into(), "box1".into(), now);
        stale.disconnected_at = Some(now - chrono::Duration::hours(2));
        store.save(stale).await.unwrap();

        let fresh = Client::new_active("fresh".into(), "auth1".into(), "box2".into(), now);
        store.save(fresh).await.unwrap();

        let visible = store.get_non_obsolete(now, Some(Duration::from_secs(3600)));
        let ids: Vec<_> = visible.iter().map(|c| c.id.clone()).collect();
        assert!(ids.contains(&"fresh".to_string()));
        assert!(!ids.contains(&"stale".to_string()));
    }

    #[tokio::test]
    async fn delete_obsolete_is_noop_when_retention_unset() {
        let store = store().await;
        let now = Utc::now();
        let mut stale = Client::new_active("stale".into(), "auth1".into(), "box1".into(), now);
        stale.disconnected_at = Some(now - chrono::Duration::days(365));
        store.save(stale).await.unwrap();

        let removed = store.delete_obsolete(now, None).await.unwrap();
        assert_eq!(removed, 0);
        assert!(store.get("stale").is_some());
    }

    #[tokio::test]
    async fn delete_obsolete_removes_only_obsolete_rows() {
        let store = store().await;
        let now = Utc::now();
        let mut stale = Client::new_active("stale".into(), "auth1".into(), "box1".into(), now);
        stale.disconnected_at = Some(now - chrono::Duration::hours(2));
        store.save(stale).await.unwrap();

        let fresh = Client::new_active("fresh".into(), "auth1".into(), "box2".into(), now);
        store.save(fresh).await.unwrap();

        let removed = store.delete_obsolete(now, Some(Duration::from_secs(3600))).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("stale").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[tokio::test]
    async fn count_active_counts_only_connected_clients() {
        let store = store().await;
        let now = Utc::now();
        let active = Client::new_active("active".into(), "auth1".into(), "box1".into(), now);
        store.save(active).await.unwrap();

        let mut disconnected = Client::new_active("disc".into(), "auth1".into(), "box2".into(), now);
        disconnected.disconnected_at = Some(now);
        store.save(disconnected).await.unwrap();

        assert_eq!(store.count_active(), 1);
        assert_eq!(store.count_disconnected(now, Some(Duration::from_secs(3600))), 1);
    }
}
