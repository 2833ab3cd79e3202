//! Client entity and derived lifecycle (spec.md §3).
//!
//! A `Client` is the durable+in-memory record of a remote agent known to
//! the server. Lifecycle (active/disconnected/obsolete) is *derived* from
//! `disconnected_at` and the retention window — it is never stored as its
//! own field, so there is exactly one place (`Client::lifecycle`) where the
//! predicate can drift from spec.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// Opaque, client-chosen, stable-across-reconnects identifier.
pub type ClientId = String;

/// Lifecycle state derived from `disconnected_at` and the retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `disconnected_at` is null and a session is bound.
    Active,
    /// Disconnected but within the retention window (or retention unset).
    Disconnected,
    /// Disconnected longer than the retention window; eligible for deletion.
    Obsolete,
}

/// A remote agent known to the server (spec.md §3).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub client_auth_id: String,
    pub name: String,
    pub os: Option<String>,
    pub hostname: Option<String>,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub tags: Vec<String>,
    pub version: Option<String>,
    pub connected_at: DateTime<Utc>,
    /// Null iff the client currently holds a live session.
    pub disconnected_at: Option<DateTime<Utc>>,
    pub allowed_user_groups: HashSet<String>,
}

impl Client {
    /// Construct a freshly-attached client (spec.md §4.4 step 2).
    pub fn new_active(id: ClientId, client_auth_id: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            client_auth_id,
            name,
            os: None,
            hostname: None,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            tags: Vec::new(),
            version: None,
            connected_at: now,
            disconnected_at: None,
            allowed_user_groups: HashSet::new(),
        }
    }

    /// Is a live session currently bound? (`disconnected_at` is null.)
    pub fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }

    /// Derive this client's lifecycle state at time `now` under the given
    /// retention window. `keep_disconnected_clients = None` means no client
    /// is ever obsolete (the noObsoleteProvider behavior, spec.md §4.2).
    ///
    /// Boundary: a client disconnected for *exactly* the retention window is
    /// still disconnected, not obsolete (strict inequality, spec.md §4.2).
    pub fn lifecycle(&self, now: DateTime<Utc>, keep_disconnected_clients: Option<Duration>) -> Lifecycle {
        let Some(disconnected_at) = self.disconnected_at else {
            return Lifecycle::Active;
        };
        let Some(retention) = keep_disconnected_clients else {
            return Lifecycle::Disconnected;
        };
        let age = (now - disconnected_at).to_std().unwrap_or(Duration::ZERO);
        if age > retention {
            Lifecycle::Obsolete
        } else {
            Lifecycle::Disconnected
        }
    }

    pub fn is_obsolete(&self, now: DateTime<Utc>, keep_disconnected_clients: Option<Duration>) -> bool {
        matches!(
            self.lifecycle(now, keep_disconnected_clients),
            Lifecycle::Obsolete
        )
    }

    /// Mark detached: clears the session binding (spec.md §4.4 "On detach").
    pub fn mark_disconnected(&mut self, now: DateTime<Utc>) {
        self.disconnected_at = Some(now);
    }

    /// Mark (re)attached (spec.md §4.4 step 2).
    pub fn mark_connected(&mut self, now: DateTime<Utc>) {
        self.connected_at = now;
        self.disconnected_at = None;
    }
}
