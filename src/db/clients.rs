//! Durable storage for `Client` rows (spec.md §6 `clients` table).

use super::DbError;
use crate::state::client::Client;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::Row;
use std::collections::HashSet;

/// Repository for client persistence.
pub struct ClientRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ClientRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert by id (spec.md §4.2 `save`: id collisions are upserts, not errors).
    pub async fn save(&self, client: &Client) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO clients
                (id, client_auth_id, name, os, hostname, ipv4, ipv6, tags, version,
                 connected_at, disconnected_at, allowed_user_groups)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                client_auth_id = excluded.client_auth_id,
                name = excluded.name,
                os = excluded.os,
                hostname = excluded.hostname,
                ipv4 = excluded.ipv4,
                ipv6 = excluded.ipv6,
                tags = excluded.tags,
                version = excluded.version,
                connected_at = excluded.connected_at,
                disconnected_at = excluded.disconnected_at,
                allowed_user_groups = excluded.allowed_user_groups
            "#,
        )
        .bind(&client.id)
        .bind(&client.client_auth_id)
        .bind(&client.name)
        .bind(&client.os)
        .bind(&client.hostname)
        .bind(serde_json::to_string(&client.ipv4).map_err(|e| DbError::Internal(e.to_string()))?)
        .bind(serde_json::to_string(&client.ipv6).map_err(|e| DbError::Internal(e.to_string()))?)
        .bind(serde_json::to_string(&client.tags).map_err(|e| DbError::Internal(e.to_string()))?)
        .bind(&client.version)
        .bind(client.connected_at.to_rfc3339())
        .bind(client.disconnected_at.map(|t| t.to_rfc3339()))
        .bind(
            serde_json::to_string(&client.allowed_user_groups)
                .map_err(|e| DbError::Internal(e.to_string()))?,
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Client>, DbError> {
        let row = sqlx::query("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        row.map(row_to_client).transpose()
    }

    /// Every client row, regardless of lifecycle — the obsolescence filter is
    /// applied in-memory by `ClientStore` (spec.md §4.2).
    pub async fn get_all(&self) -> Result<Vec<Client>, DbError> {
        let rows = sqlx::query("SELECT * FROM clients").fetch_all(self.pool).await?;
        rows.into_iter().map(row_to_client).collect()
    }

    pub async fn delete(&self, id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM clients WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn row_to_client(row: sqlx::sqlite::SqliteRow) -> Result<Client, DbError> {
    let ipv4: String = row.try_get("ipv4")?;
    let ipv6: String = row.try_get("ipv6")?;
    let tags: String = row.try_get("tags")?;
    let groups: String = row.try_get("allowed_user_groups")?;
    let connected_at: String = row.try_get("connected_at")?;
    let disconnected_at: Option<String> = row.try_get("disconnected_at")?;

    Ok(Client {
        id: row.try_get("id")?,
        client_auth_id: row.try_get("client_auth_id")?,
        name: row.try_get("name")?,
        os: row.try_get("os")?,
        hostname: row.try_get("hostname")?,
        ipv4: serde_json::from_str(&ipv4).unwrap_or_default(),
        ipv6: serde_json::from_str(&ipv6).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        version: row.try_get("version")?,
        connected_at: parse_timestamp(&connected_at)?,
        disconnected_at: disconnected_at
            .map(|t| parse_timestamp(&t))
            .transpose()?,
        allowed_user_groups: serde_json::from_str::<HashSet<String>>(&groups).unwrap_or_default(),
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Internal(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let db = Database::new(":memory:").await.unwrap();
        let now = Utc::now();
        let client = Client::new_active("c1".into(), "auth1".into(), "box1".into(), now);
        db.clients().save(&client).await.unwrap();

        let got = db.clients().get("c1").await.unwrap().unwrap();
        assert_eq!(got.id, "c1");
        assert!(got.is_connected());
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let db = Database::new(":memory:").await.unwrap();
        let now = Utc::now();
        let mut client = Client::new_active("c1".into(), "auth1".into(), "box1".into(), now);
        db.clients().save(&client).await.unwrap();

        client.disconnected_at = Some(now);
        db.clients().save(&client).await.unwrap();

        let got = db.clients().get("c1").await.unwrap().unwrap();
        assert!(!got.is_connected());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let db = Database::new(":memory:").await.unwrap();
        let now = Utc::now();
        let client = Client::new_active("c1".into(), "auth1".into(), "box1".into(), now);
        db.clients().save(&client).await.unwrap();
        db.clients().delete("c1").await.unwrap();
        assert!(db.clients().get("c1").await.unwrap().is_none());
    }
}
