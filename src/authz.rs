//! AuthorizationGate (C7): intersects a caller's groups with ClientStore.
//!
//! Every read or command path is expected to call through here first; the
//! Dispatcher and any listing endpoint only ever see the already-filtered
//! set (spec.md §4.7).

use crate::state::{Client, Fleet, TunnelInfo};
use chrono::Utc;

/// An authenticated caller (spec.md §4.1 IdentityResolver output).
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub groups: Vec<String>,
}

impl Principal {
    fn is_admin(&self, admin_groups: &[String]) -> bool {
        self.groups.iter().any(|g| admin_groups.contains(g))
    }
}

/// `visible_clients(user, groups) → [client]` (spec.md §4.7): the subset of
/// non-obsolete clients whose `allowed_user_groups` intersects the caller's
/// groups, or every client if the caller is a global admin.
pub fn visible_clients(fleet: &Fleet, caller: &Principal) -> Vec<Client> {
    let now = Utc::now();
    let non_obsolete = fleet
        .clients
        .get_non_obsolete(now, fleet.keep_disconnected_clients());

    if caller.is_admin(&fleet.config.groups.admin_groups) {
        return non_obsolete;
    }

    non_obsolete
        .into_iter()
        .filter(|c| c.allowed_user_groups.iter().any(|g| caller.groups.contains(g)))
        .collect()
}

/// Whether `caller` may see `client_id` at all (spec.md §4.7, used to gate a
/// single-client lookup rather than a listing).
pub fn can_see_client(fleet: &Fleet, caller: &Principal, client_id: &str) -> bool {
    if caller.is_admin(&fleet.config.groups.admin_groups) {
        return fleet.clients.get(client_id).is_some();
    }
    fleet
        .clients
        .get(client_id)
        .is_some_and(|c| c.allowed_user_groups.iter().any(|g| caller.groups.contains(g)))
}

/// Visible tunnels across every client a caller can see — supplemented from
/// the original source's tunnel listing read path (spec.md §9.8): the gate
/// filters by client visibility first, then flattens each visible client's
/// live tunnels. A client with no live session contributes no tunnels.
pub fn visible_tunnels(fleet: &Fleet, caller: &Principal) -> Vec<(String, TunnelInfo)> {
    visible_clients(fleet, caller)
        .into_iter()
        .filter_map(|client| {
            let session = fleet.sessions.get(&client.id)?;
            Some(
                session
                    .tunnels
                    .list()
                    .into_iter()
                    .map(move |t| (client.id.clone(), t))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::state::Client;
    use std::collections::HashSet;

    async fn fleet_with_admin_groups(admin_groups: Vec<String>) -> Fleet {
        let mut config = Config::default_for_tests();
        config.groups.admin_groups = admin_groups;
        Fleet::new(config, Database::new(":memory:").await.unwrap()).await.unwrap()
    }

    fn client_with_groups(id: &str, groups: &[&str]) -> Client {
        let now = Utc::now();
        let mut c = Client::new_active(id.into(), "auth".into(), "box".into(), now);
        c.allowed_user_groups = groups.iter().map(|g| g.to_string()).collect::<HashSet<_>>();
        c
    }

    #[tokio::test]
    async fn non_admin_sees_only_intersecting_groups() {
        let fleet = fleet_with_admin_groups(vec![]).await;
        fleet.clients.save(client_with_groups("a", &["ops"])).await.unwrap();
        fleet.clients.save(client_with_groups("b", &["dev"])).await.unwrap();

        let caller = Principal { username: "alice".into(), groups: vec!["ops".into()] };
        let visible = visible_clients(&fleet, &caller);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a");
    }

    #[tokio::test]
    async fn admin_sees_every_non_obsolete_client() {
        let fleet = fleet_with_admin_groups(vec!["admins".into()]).await;
        fleet.clients.save(client_with_groups("a", &["ops"])).await.unwrap();
        fleet.clients.save(client_with_groups("b", &["dev"])).await.unwrap();

        let caller = Principal { username: "root".into(), groups: vec!["admins".into()] };
        assert_eq!(visible_clients(&fleet, &caller).len(), 2);
    }

    #[tokio::test]
    async fn can_see_client_matches_visible_clients() {
        let fleet = fleet_with_admin_groups(vec![]).await;
        fleet.clients.save(client_with_groups("a", &["ops"])).await.unwrap();

        let caller = Principal { username: "alice".into(), groups: vec!["dev".into()] };
        assert!(!can_see_client(&fleet, &caller, "a"));

        let caller = Principal { username: "bob".into(), groups: vec!["ops".into()] };
        assert!(can_see_client(&fleet, &caller, "a"));
    }
}
