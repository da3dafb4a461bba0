//! Kubernetes backend for maxlog
//!
//! This crate selects pods by label in a namespace and opens one
//! newline-delimited log stream per pod.

mod client;

pub use client::{DEFAULT_LABEL_KEY, KubeClient, label_selector, log_params};

// Re-export types that are used in our public API
pub use maxlog_types::{ContainerInfo, LogOptions, PodInfo, PodStatus};
