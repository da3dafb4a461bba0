//! Container runtime client for maxlog

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, header};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;
use tokio_util::io::StreamReader;
use tracing::debug;

use maxlog_logs::LogSource;
use maxlog_types::{ContainerInfo, LogOptions};

/// Engine socket used when no host is configured
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Resolve the engine socket from `DOCKER_HOST` / `CONTAINER_HOST` values
pub fn socket_from_env(docker_host: Option<&str>, container_host: Option<&str>) -> Result<PathBuf> {
    let host = docker_host
        .into_iter()
        .chain(container_host)
        .map(str::trim)
        .find(|h| !h.is_empty());

    match host {
        None => Ok(PathBuf::from(DEFAULT_SOCKET)),
        Some(host) => match host.strip_prefix("unix://") {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => bail!("Only unix:// container runtime hosts are supported, got '{}'", host),
        },
    }
}

/// Request path for a container's log stream; the tail is enforced by the engine
pub fn logs_path(container_id: &str, opts: &LogOptions) -> String {
    format!(
        "/containers/{}/logs?stdout=1&stderr=1&timestamps=1&follow={}&tail={}",
        container_id,
        u8::from(opts.follow),
        opts.tail
    )
}

/// Entry of the engine's container list
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,

    /// Names as reported by the engine, each with a leading slash
    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub state: Option<String>,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.strip_prefix('/') == Some(name))
    }

    pub fn to_info(&self, name: &str) -> ContainerInfo {
        let mut info = ContainerInfo::new(name.to_string());
        info.id = Some(self.id.clone());
        info.state = self.state.clone();
        info
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Engine API client over a unix socket
#[derive(Clone, Debug)]
pub struct RuntimeClient {
    socket: PathBuf,
}

impl RuntimeClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Client for the socket named by `DOCKER_HOST` or `CONTAINER_HOST`
    pub fn from_env() -> Result<Self> {
        let docker_host = std::env::var("DOCKER_HOST").ok();
        let container_host = std::env::var("CONTAINER_HOST").ok();
        let socket = socket_from_env(docker_host.as_deref(), container_host.as_deref())?;
        Ok(Self::new(socket))
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Issue a GET on a fresh connection; non-success statuses become errors
    async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        let stream = UnixStream::connect(&self.socket).await.context(format!(
            "Failed to connect to container runtime at {}",
            self.socket.display()
        ))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .context("Failed to start HTTP session with container runtime")?;

        // Drives the connection until the response body is fully read
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!(error = %err, "container runtime connection closed");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .context("Failed to build container runtime request")?;

        let response = sender
            .send_request(request)
            .await
            .context(format!("Container runtime request failed: {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            bail!("Container runtime returned {}: {}", status, message);
        }

        Ok(response)
    }

    /// List running containers
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let response = self.get("/containers/json").await?;
        let body = response
            .into_body()
            .collect()
            .await
            .context("Failed to read container list")?
            .to_bytes();

        serde_json::from_slice(&body).context("Failed to parse container list")
    }

    /// Find a running container by name
    pub async fn find_container(&self, name: &str) -> Result<ContainerSummary> {
        self.list_containers()
            .await?
            .into_iter()
            .find(|c| c.has_name(name))
            .ok_or_else(|| anyhow!("The search for container '{}' has not yielded any results", name))
    }

    /// Open the framed log stream of a container
    pub async fn open_log_source(
        &self,
        container_id: &str,
        name: &str,
        opts: &LogOptions,
    ) -> Result<LogSource> {
        let response = self
            .get(&logs_path(container_id, opts))
            .await
            .context(format!("Failed to get logs for container {}", name))?;

        debug!(container = name, id = container_id, "opened container log stream");
        let body = response.into_body().into_data_stream().map_err(io::Error::other);
        Ok(LogSource::multiplexed(name, StreamReader::new(Box::pin(body))))
    }
}
