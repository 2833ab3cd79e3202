//! Tunnel entity and per-session TunnelRegistry (spec.md §4.3, C3).
//!
//! A registry is owned exclusively by one `ClientSession`. Creation checks
//! the remote's ACL, binds an OS listener plus a forwarder task to the
//! session's transport, and arms that forwarder with whichever of
//! `idle_timeout`/`auto_close` is set; `close` (explicit or timer-driven)
//! cancels the forwarder and awaits its drain before dropping the listener,
//! so no OS socket outlives the tunnel entry (spec.md §4.3 invariant).

use crate::error::TunnelError;
use crate::telemetry::Timer;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The remote endpoint a tunnel forwards to, and the policy around it
/// (spec.md §3 Tunnel entity, §6 create payload).
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSpec {
    pub scheme: String,
    pub local_host: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Comma-separated list of remote hosts this tunnel may target, or
    /// `"*"`/unset for no restriction (spec.md §4.3 "ACL revocation").
    #[serde(default)]
    pub acl: Option<String>,
    #[serde(default)]
    pub idle_timeout: Option<u64>,
    #[serde(default)]
    pub auto_close: Option<u64>,
    #[serde(default)]
    pub reverse_proxy: bool,
    #[serde(default)]
    pub host_header: Option<String>,
    #[serde(default)]
    pub http_proxy: bool,
    #[serde(default)]
    pub skip_idle_timer: bool,
}

/// Wire payload for tunnel creation (spec.md §6): `local`/`remote` arrive as
/// `host:port` strings and are split here rather than pre-structured.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelCreateRequest {
    pub scheme: String,
    pub local: String,
    pub remote: String,
    #[serde(default)]
    pub acl: Option<String>,
    #[serde(default)]
    pub idle_timeout_minutes: Option<u64>,
    #[serde(default)]
    pub auto_close: Option<u64>,
    #[serde(default)]
    pub http_proxy: bool,
    #[serde(default)]
    pub host_header: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

fn split_host_port(addr: &str) -> Result<(String, u16), TunnelError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| TunnelError::Bind(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{addr}' is not host:port"),
        )))?;
    let port: u16 = port.parse().map_err(|_| {
        TunnelError::Bind(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid port in '{addr}'"),
        ))
    })?;
    Ok((host.to_string(), port))
}

impl TryFrom<TunnelCreateRequest> for RemoteSpec {
    type Error = TunnelError;

    fn try_from(req: TunnelCreateRequest) -> Result<Self, Self::Error> {
        let (local_host, local_port) = split_host_port(&req.local)?;
        let (remote_host, remote_port) = split_host_port(&req.remote)?;
        Ok(RemoteSpec {
            scheme: req.scheme,
            local_host,
            local_port,
            remote_host,
            remote_port,
            protocol: req.protocol,
            acl: req.acl,
            idle_timeout: req.idle_timeout_minutes.map(|m| m * 60),
            auto_close: req.auto_close,
            reverse_proxy: false,
            host_header: req.host_header,
            http_proxy: req.http_proxy,
            skip_idle_timer: false,
        })
    }
}

/// Does `remote`'s ACL permit its own `remote_host`? An unset ACL, an empty
/// ACL, or a `"*"` entry permits everything; otherwise the remote host must
/// appear verbatim among the comma-separated entries (spec.md §4.3).
fn check_acl(remote: &RemoteSpec) -> Result<(), TunnelError> {
    let Some(acl) = remote.acl.as_deref() else { return Ok(()) };
    let entries: Vec<&str> = acl.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if entries.is_empty() || entries.iter().any(|e| *e == "*" || *e == remote.remote_host) {
        return Ok(());
    }
    Err(TunnelError::AclDenied(remote.remote_host.clone()))
}

#[derive(Debug, Clone)]
pub struct TunnelInfo {
    pub id: String,
    pub remote: RemoteSpec,
    pub created_at: DateTime<Utc>,
}

/// A live tunnel: the public `TunnelInfo` plus the handle needed to tear it
/// down. The forwarder task is not modeled here (it lives over the session's
/// transport, out of this crate's scope) — `close` signals it via
/// `stop_tx` and awaits `forwarder` to guarantee drain-before-drop. The same
/// forwarder also races `idle_timeout`/`auto_close` against the stop signal
/// and removes the entry itself on expiry.
struct LiveTunnel {
    info: TunnelInfo,
    stop_tx: Option<oneshot::Sender<()>>,
    forwarder: Option<JoinHandle<()>>,
    listener: TcpListener,
}

pub struct TunnelRegistry {
    tunnels: Arc<DashMap<String, LiveTunnel>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self {
            tunnels: Arc::new(DashMap::new()),
        }
    }

    pub fn list(&self) -> Vec<TunnelInfo> {
        self.tunnels.iter().map(|e| e.value().info.clone()).collect()
    }

    /// Check the remote's ACL, allocate an OS listener for
    /// `remote.local_host:local_port`, spawn a forwarder stub armed with the
    /// remote's idle/auto-close timers (the real forward loop that would
    /// multiplex bytes over the session transport is out of scope here), and
    /// insert atomically.
    pub async fn create(&self, id: String, remote: RemoteSpec) -> Result<TunnelInfo, TunnelError> {
        let _timer = Timer::new(format!("tunnel.create[{id}]"));
        check_acl(&remote)?;

        let addr = format!("{}:{}", remote.local_host, remote.local_port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(TunnelError::Bind)?;

        let idle_timeout = if remote.skip_idle_timer {
            None
        } else {
            remote.idle_timeout.map(Duration::from_secs)
        };
        let auto_close = remote.auto_close.map(Duration::from_secs);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let tunnels = self.tunnels.clone();
        let expire_id = id.clone();
        let forwarder = tokio::spawn(async move {
            let idle_sleep = async {
                match idle_timeout {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            };
            let auto_close_sleep = async {
                match auto_close {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = &mut stop_rx => {}
                _ = idle_sleep => {
                    tunnels.remove(&expire_id);
                }
                _ = auto_close_sleep => {
                    tunnels.remove(&expire_id);
                }
            }
        });

        let info = TunnelInfo {
            id: id.clone(),
            remote,
            created_at: Utc::now(),
        };

        self.tunnels.insert(
            id,
            LiveTunnel {
                info: info.clone(),
                stop_tx: Some(stop_tx),
                forwarder: Some(forwarder),
                listener,
            },
        );

        Ok(info)
    }

    /// Cancel the forwarder, await its drain, then drop the listener. No
    /// dangling OS listener survives a returned `close` (spec.md §4.3).
    pub async fn close(&self, id: &str) -> Result<(), TunnelError> {
        let Some((_, mut tunnel)) = self.tunnels.remove(id) else {
            return Err(TunnelError::NotFound(id.to_string()));
        };

        if let Some(stop_tx) = tunnel.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = tunnel.forwarder.take() {
            let _ = handle.await;
        }
        drop(tunnel.listener);
        Ok(())
    }

    /// Tear down every tunnel, in registry order (spec.md §4.4 "on detach").
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.tunnels.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let _ = self.close(&id).await;
        }
    }

    /// Close every live tunnel whose remote host `is_allowed` now rejects
    /// (spec.md §4.3 "ACL revocation drives close internally" — a config
    /// change after creation is re-enforced here rather than only at
    /// `create` time). Returns the ids closed.
    pub async fn enforce_acl<F: Fn(&str) -> bool>(&self, is_allowed: F) -> Vec<String> {
        let to_close: Vec<String> = self
            .tunnels
            .iter()
            .filter(|e| !is_allowed(&e.value().info.remote.remote_host))
            .map(|e| e.key().clone())
            .collect();
        for id in &to_close {
            let _ = self.close(id).await;
        }
        to_close
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }
}

impl Default for TunnelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
