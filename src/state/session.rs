//! ClientSession (C4): binds a live transport to a registry entry.
//!
//! Providing the transport itself is out of scope (spec.md §1 Non-goals); a
//! session is generic over anything implementing [`Transport`] — "a reliable
//! request/response channel plus arbitrary stream multiplexing" in spec
//! terms. This module owns the session's `TunnelRegistry` and the command
//! channel's local timeout/cancellation enforcement; attach/supersede
//! coordination lives in [`crate::state::fleet`], which is the only place
//! that sees both a session and the `ClientStore` entry it binds to.

use crate::error::SessionError;
use crate::jobs::JobSpec;
use crate::state::client::ClientId;
use crate::state::tunnel::TunnelRegistry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// The result of running a command on the peer, as reported back over the
/// transport (spec.md §4.4 command channel).
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over "a reliable request/response channel plus arbitrary
/// stream multiplexing" bound to one connected client (spec.md §4.4).
/// Real transports (the wire protocol, TLS, multiplexing) are out of scope
/// here per spec.md §1.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one command on the peer and wait for its result. Implementations
    /// should be cancel-safe: dropping the future must not leave the peer in
    /// an inconsistent state.
    async fn run_job(&self, spec: &JobSpec) -> Result<JobOutcome, SessionError>;

    /// Ask the peer to cancel whatever job is currently running, best-effort
    /// (spec.md §4.4 "on timeout the handler signals the peer to cancel").
    async fn cancel_job(&self);

    /// Tear down the transport itself (spec.md §4.4 "on detach").
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A live binding between a connected client and its transport (spec.md
/// §4.4, C4). Owns the per-client `TunnelRegistry` exclusively.
///
/// `superseded` tracks whether `teardown` has actually run — it is *not* set
/// by `begin_supersede`, since that would let `wait_superseded` short-circuit
/// on the flag the very call that just set it tripped. Instead
/// `begin_supersede` cancels `supersede_signal` (aborting any in-flight
/// `execute`) and the caller awaits `wait_superseded`, which is driven by
/// `in_flight`/`idle`: a real "has the command channel gone quiet" signal.
pub struct ClientSession {
    pub client_id: ClientId,
    transport: Arc<dyn Transport>,
    pub tunnels: TunnelRegistry,
    superseded: AtomicBool,
    in_flight: AtomicBool,
    idle: Notify,
    supersede_signal: CancellationToken,
}

impl ClientSession {
    pub fn new(client_id: ClientId, transport: Arc<dyn Transport>) -> Self {
        Self {
            client_id,
            transport,
            tunnels: TunnelRegistry::new(),
            superseded: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
            supersede_signal: CancellationToken::new(),
        }
    }

    /// `execute(job_spec) → job_result` (spec.md §4.4 command channel).
    /// Enforces `timeout_sec` locally: on expiry the peer is told to cancel
    /// and the caller sees status **unknown**, never a hang. `cancel`
    /// propagates a cancellation originating from the request that triggered
    /// this command (spec.md §5); the session's own supersession signal is
    /// raced in alongside it so a superseding attach tears down in-flight
    /// work instead of waiting it out.
    pub async fn execute(&self, spec: JobSpec, cancel: CancellationToken) -> Result<JobOutcome, SessionError> {
        if self.transport.is_closed() {
            return Err(SessionError::TransportClosed);
        }

        self.in_flight.store(true, Ordering::SeqCst);
        let result = self.run_with_cancel(spec, cancel).await;
        self.in_flight.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
        result
    }

    async fn run_with_cancel(&self, spec: JobSpec, cancel: CancellationToken) -> Result<JobOutcome, SessionError> {
        let timeout = Duration::from_secs(spec.timeout_sec);
        tokio::select! {
            result = tokio::time::timeout(timeout, self.transport.run_job(&spec)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        self.transport.cancel_job().await;
                        Err(SessionError::Timeout)
                    }
                }
            }
            _ = cancel.cancelled() => {
                self.transport.cancel_job().await;
                Err(SessionError::Canceled)
            }
            _ = self.supersede_signal.cancelled() => {
                self.transport.cancel_job().await;
                Err(SessionError::Canceled)
            }
        }
    }

    /// Signal this session to shut down (spec.md §4.4 step 1, supersession).
    /// Idempotent; aborts any in-flight `execute` via `supersede_signal`.
    pub fn begin_supersede(&self) {
        self.supersede_signal.cancel();
    }

    /// Has `teardown` run? (Not "has supersession been requested" — see the
    /// struct doc for why those are distinct.)
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    /// Wait for the command channel to go idle, bounded by `grace` (spec.md
    /// §5/§6 "bounded grace wait"). Returns immediately if nothing is
    /// in-flight. Uses `Notify::notified().enable()` before the recheck so a
    /// completion that races the initial check isn't missed.
    pub async fn wait_superseded(&self, grace: Duration) -> Result<(), SessionError> {
        if !self.in_flight.load(Ordering::SeqCst) {
            return Ok(());
        }

        let notified = self.idle.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.in_flight.load(Ordering::SeqCst) {
            return Ok(());
        }

        tokio::time::timeout(grace, notified)
            .await
            .map(|_| ())
            .map_err(|_elapsed| SessionError::SupersedeTimeout(self.client_id.clone()))
    }

    /// Tear down: close every tunnel, then the transport itself (spec.md
    /// §4.4 "on detach" / §4.3 "close all tunnels"). Marks the session
    /// superseded once teardown has actually completed.
    pub async fn teardown(&self) {
        self.tunnels.close_all().await;
        self.transport.close().await;
        self.superseded.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeTransport {
        closed: AtomicBool,
        cancel_calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                closed: AtomicBool::new(false),
                cancel_calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                closed: AtomicBool::new(false),
                cancel_calls: AtomicUsize::new(0),
                delay: Some(delay),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn run_job(&self, _spec: &JobSpec) -> Result<JobOutcome, SessionError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(JobOutcome {
                exit_code: Some(0),
                stdout: "ok".into(),
                stderr: String::new(),
            })
        }

        async fn cancel_job(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn spec(timeout_sec: u64) -> JobSpec {
        JobSpec {
            command: "uptime".into(),
            interpreter: None,
            cwd: None,
            is_sudo: false,
            timeout_sec,
        }
    }

    #[tokio::test]
    async fn execute_returns_outcome_on_success() {
        let session = ClientSession::new("c1".into(), Arc::new(FakeTransport::new()));
        let outcome = session.execute(spec(5), CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn execute_times_out_and_signals_cancel() {
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_millis(50)));
        let session = ClientSession::new("c1".into(), transport.clone());
        let err = session.execute(spec(0), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        assert_eq!(transport.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_on_closed_transport_errors_immediately() {
        let transport = Arc::new(FakeTransport::new());
        transport.closed.store(true, Ordering::SeqCst);
        let session = ClientSession::new("c1".into(), transport);
        let err = session.execute(spec(5), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn execute_honors_caller_cancellation_token() {
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_secs(5)));
        let session = ClientSession::new("c1".into(), transport.clone());
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();

        let run = tokio::spawn(async move { session.execute(spec(30), cancel_for_task).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Canceled));
        assert_eq!(transport.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_superseded_returns_immediately_when_idle() {
        let session = ClientSession::new("c1".into(), Arc::new(FakeTransport::new()));
        session.begin_supersede();
        assert!(session.wait_superseded(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn wait_superseded_waits_for_in_flight_execute_to_finish() {
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_millis(30)));
        let session = Arc::new(ClientSession::new("c1".into(), transport));

        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.execute(spec(5), CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        session.begin_supersede();
        assert!(session.wait_superseded(Duration::from_secs(1)).await.is_ok());
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_superseded_times_out_when_in_flight_exceeds_grace() {
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_millis(200)));
        let session = Arc::new(ClientSession::new("c1".into(), transport));

        let _runner = {
            let session = session.clone();
            tokio::spawn(async move { session.execute(spec(5), CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        session.begin_supersede();
        let err = session
            .wait_superseded(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SupersedeTimeout(_)));
    }

    #[tokio::test]
    async fn teardown_closes_transport_and_marks_superseded() {
        let transport = Arc::new(FakeTransport::new());
        let session = ClientSession::new("c1".into(), transport.clone());
        assert!(!session.is_superseded());
        session.teardown().await;
        assert!(transport.is_closed());
        assert!(session.is_superseded());
    }
}
