//! Kubernetes client for maxlog

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{ListParams, LogParams};
use kube::config::KubeConfigOptions;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::debug;

use maxlog_logs::LogSource;
use maxlog_types::{ContainerInfo, LogOptions, PodInfo, PodStatus};

/// Label selecting pods by application type
pub const DEFAULT_LABEL_KEY: &str = "mas.ibm.com/appTypeName";

/// Build a `key=value` label selector
pub fn label_selector(label_key: &str, app_type: &str) -> String {
    format!("{}={}", label_key, app_type)
}

/// Log request for one pod; the tail is enforced server-side
pub fn log_params(container: Option<&str>, opts: &LogOptions) -> LogParams {
    LogParams {
        follow: opts.follow,
        container: container.map(str::to_string),
        tail_lines: opts.tail.as_count(),
        ..Default::default()
    }
}

/// Kubernetes client wrapper
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Connect using the given kubeconfig context, or infer the config when None
    pub async fn new(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(context_name) => kube::Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            })
            .await
            .context(format!(
                "Failed to create config for context: {}",
                context_name
            ))?,
            None => kube::Config::infer()
                .await
                .context("Failed to load Kubernetes config. Is kubectl configured?")?,
        };

        let client =
            kube::Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self { client })
    }

    /// Fetch pods in a namespace matching a label selector
    pub async fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodInfo>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let list = pods
            .list(&ListParams::default().labels(selector))
            .await
            .context(format!(
                "Failed to list pods in {} matching {}",
                namespace, selector
            ))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| Self::pod_to_info(pod, namespace))
            .collect())
    }

    /// Convert a k8s Pod to PodInfo
    fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
        let name = pod.metadata.name.unwrap_or_default();
        let mut info = PodInfo::new(name, namespace.to_string());

        if let Some(status) = pod.status {
            info.status = status
                .phase
                .as_deref()
                .map(PodStatus::from)
                .unwrap_or(PodStatus::Unknown);

            if let Some(container_statuses) = status.container_statuses {
                info.containers = container_statuses
                    .into_iter()
                    .map(|cs| {
                        let mut container = ContainerInfo::new(cs.name);
                        container.id = cs.container_id;
                        container.state = Some(if cs.ready { "ready" } else { "not ready" }.to_string());
                        container
                    })
                    .collect();
            }
        }

        info
    }

    /// Open the log stream of one pod
    pub async fn open_log_source(
        &self,
        namespace: &str,
        pod_name: &str,
        container: Option<&str>,
        opts: &LogOptions,
    ) -> Result<LogSource> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = log_params(container, opts);

        let stream = pods
            .log_stream(pod_name, &params)
            .await
            .context(format!("Failed to get logs for pod {}", pod_name))?;

        debug!(pod = pod_name, ?container, "opened pod log stream");
        Ok(LogSource::lines(pod_name, Box::pin(stream).compat()))
    }

    /// Open one log stream per pod; any failure aborts before streaming starts
    pub async fn open_log_sources(
        &self,
        pods: &[PodInfo],
        container: Option<&str>,
        opts: &LogOptions,
    ) -> Result<Vec<LogSource>> {
        let mut sources = Vec::with_capacity(pods.len());
        for pod in pods {
            sources.push(
                self.open_log_source(&pod.namespace, &pod.name, container, opts)
                    .await?,
            );
        }
        Ok(sources)
    }
}
