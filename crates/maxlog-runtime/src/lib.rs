//! Local container runtime backend for maxlog
//!
//! Talks to a Docker-compatible engine API (Docker or podman) over a unix
//! socket, resolves containers by name, and opens framed log streams.

mod client;

pub use client::{ContainerSummary, DEFAULT_SOCKET, RuntimeClient, logs_path, socket_from_env};

// Re-export types that are used in our public API
pub use maxlog_types::{ContainerInfo, LogOptions};
