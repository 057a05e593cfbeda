//! The state-history service: plugin lifecycle, TCP acceptor, and the
//! single-consumer event loop that owns the logs.
//!
//! # Architecture
//!
//! ```text
//! chain signals ──┐
//!                 ├──► crossbeam channel ──► ServiceLoop (one thread)
//! session reads ──┘                             │ owns logs + sessions
//!                                               ▼
//!                              per-session FIFO send queues (tokio mpsc)
//!                                               │
//!                                        writer tasks ──► sockets
//! ```
//!
//! All log and trace-buffer mutation happens on the loop thread, so no
//! locking is needed between ingestion and request handling; a session
//! can never observe a half-written entry. Sockets live on tokio tasks
//! that bridge frames into the loop and drain the per-session queues,
//! one in-flight write at a time, preserving response order.

mod acceptor;
mod config;
mod error;
mod events;
mod service_loop;
mod session;
mod plugin;

pub use config::{ConfigError, ServiceConfig};
pub use error::ServiceError;
pub use events::SessionId;
pub use plugin::StateHistoryPlugin;
