//! Shared types for maxlog
//!
//! This crate contains data structures used across multiple maxlog crates.

use std::fmt;
use std::str::FromStr;

// ============================================================================
// Configuration Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid tail value '{0}': expected a non-negative number or 'all'")]
    InvalidTail(String),

    #[error("invalid switch value '{0}': expected yes/no, true/false or 1/0")]
    InvalidSwitch(String),

    #[error("unknown mode '{0}': expected 'k8s' or 'pod'")]
    UnknownMode(String),
}

// ============================================================================
// Log Request Types
// ============================================================================

/// Number of most recent lines requested from a backend when a stream opens
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailLines {
    /// Whole backlog
    All,
    /// Last N lines
    Last(u32),
}

impl TailLines {
    /// Value for APIs that take an optional line count (None = everything)
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::Last(n) => Some(i64::from(*n)),
        }
    }
}

impl Default for TailLines {
    fn default() -> Self {
        Self::Last(40)
    }
}

impl FromStr for TailLines {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        trimmed
            .parse::<u32>()
            .map(Self::Last)
            .map_err(|_| ConfigError::InvalidTail(s.to_string()))
    }
}

impl fmt::Display for TailLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Last(n) => write!(f, "{}", n),
        }
    }
}

/// Options handed to a backend when it opens a log stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    /// Backlog depth requested server-side
    pub tail: TailLines,

    /// Keep the stream open and receive new lines as they arrive
    pub follow: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail: TailLines::default(),
            follow: true,
        }
    }
}

/// Parse an on/off switch the way the CLI accepts it
pub fn parse_switch(s: &str) -> Result<bool, ConfigError> {
    match s.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" | "" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidSwitch(s.to_string())),
    }
}

/// Which backend log sources come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Pods in a Kubernetes namespace
    K8s,
    /// A single container on the local runtime
    Pod,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "k8s" => Ok(Self::K8s),
            "pod" => Ok(Self::Pod),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

// ============================================================================
// Stream Types
// ============================================================================

/// Wire shape of a log byte stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// 8-byte header + payload records, timestamp-prefixed (local runtime)
    Multiplexed,
    /// Plain newline-delimited text (cluster)
    Lines,
}

/// Stream type tag carried in byte 0 of a multiplexed frame header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    Unknown(u8),
}

impl From<u8> for StreamKind {
    fn from(b: u8) -> Self {
        match b {
            0 => Self::Stdin,
            1 => Self::Stdout,
            2 => Self::Stderr,
            other => Self::Unknown(other),
        }
    }
}

// ============================================================================
// Backend Resource Types
// ============================================================================

/// Pod information
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub containers: Vec<ContainerInfo>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            status: PodStatus::Unknown,
            containers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Container information (a pod container or a local runtime container)
#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub name: String,
    pub id: Option<String>,
    pub state: Option<String>,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            id: None,
            state: None,
        }
    }
}
