//! State management module.
//!
//! Holds the client-fleet control plane's in-memory state: the `Client`
//! entity and its derived lifecycle, the `ClientStore` index (C2), the
//! per-session `TunnelRegistry` (C3), `ClientSession` (C4), and the `Fleet`
//! DI container that ties them to the durable layer.

mod client;
mod dashmap_ext;
mod fleet;
mod session;
mod store;
mod tunnel;

pub use client::{Client, ClientId, Lifecycle};
pub use fleet::{Fleet, SessionRegistry};
pub use session::{ClientSession, JobOutcome, Transport};
pub use store::ClientStore;
pub use tunnel::{RemoteSpec, TunnelCreateRequest, TunnelInfo, TunnelRegistry};
