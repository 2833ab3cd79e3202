//! rportd-fleet - the rport client-fleet control plane, as a library.
//!
//! This crate is the control-plane core described in spec.md §1: the
//! registry of connected clients (`state`), their persisted state (`db`),
//! their live tunnels (`state::tunnel`), and the multi-client job dispatcher
//! (`dispatch`). The transport, the HTTP/JSON API surface, and OS-service
//! integration are out of scope — they are expected to embed this crate and
//! drive it through `state::Fleet`, `authz`, `dispatch`, and `identity`.
//!
//! `src/main.rs` is a thin binary that wires these modules to a TOML config
//! file, a SQLite handle, and process lifecycle (signals); it carries no
//! control-plane logic of its own.

pub mod authz;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod reaper;
pub mod state;
pub mod telemetry;
