//! # Relaydesk
//!
//! A single-binary bridge between a browser-driven messaging-platform
//! automation client and a persistent credential store plus ticketing
//! backend. The heart of the service is session lifecycle and recovery:
//! owning the automation-client handle, persisting and restoring its
//! authentication session, self-healing connectivity drift, and shutting
//! down with a guaranteed final session flush.
//!
//! ## Architecture Overview
//!
//! - **[`store`]**: Pluggable document store holding the session record
//! - **[`session`]**: Bounded event logs and the session state summary
//! - **[`client`]**: Lifecycle state machine and exclusive handle ownership
//! - **[`health`]**: Periodic store/client checks and drift recovery
//! - **[`shutdown`]**: Ordered teardown and fault classification
//! - **[`api`]**: Administrative HTTP surface (`/health`, `/status`, …)
//!
//! The intake registry and ticketing probe are thin seams to collaborators
//! that live outside this service.

pub mod api;
pub mod client;
pub mod config;
pub mod health;
pub mod intake;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod ticketing;

pub use client::{ClientController, ClientError, ClientState, ControllerConfig};
pub use config::BridgeConfig;
pub use health::{HealthMonitor, HealthMonitorConfig};
pub use session::{SessionSummary, SessionTracker};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator};
pub use store::{FsDocumentStore, MemoryStore, SessionStore, StoreError};
