//! The `logs` and `inspect` actions

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use maxlog_k8s::{KubeClient, label_selector};
use maxlog_logs::{Annotator, FanIn, FocusFilter, LogSource, SourceStatus, Symbol};
use maxlog_runtime::RuntimeClient;
use maxlog_types::{Mode, PodInfo};

use crate::config::{DEFAULT_APP_TYPES, Settings};

fn require_mode(settings: &Settings) -> Result<Mode> {
    match settings.mode {
        Some(mode) => Ok(mode),
        None => bail!("Please set MAXLOG_MODE to either 'k8s' or 'pod'."),
    }
}

/// Namespace and app type, both required in k8s mode
fn k8s_target(settings: &Settings) -> Result<(&str, &str)> {
    match (settings.namespace.as_deref(), settings.apptype.as_deref()) {
        (Some(namespace), Some(apptype)) => Ok((namespace, apptype)),
        _ => bail!("Please set MAXLOG_K8S_NAMESPACE and MAXLOG_K8S_APPTYPE environment variables."),
    }
}

/// App type shown by `inspect`; the known app types when none is set
fn app_type_label(settings: &Settings) -> &str {
    settings.apptype.as_deref().unwrap_or(DEFAULT_APP_TYPES)
}

fn container_summary(pod: &PodInfo) -> String {
    let containers: Vec<String> = pod
        .containers
        .iter()
        .map(|c| match c.state.as_deref() {
            Some(state) => format!("{} {}", c.name, state),
            None => c.name.clone(),
        })
        .collect();
    format!("[{}]", containers.join(", "))
}

fn require_container(settings: &Settings) -> Result<&str> {
    match settings.container.as_deref() {
        Some(container) => Ok(container),
        None => bail!("Container name is not set. Please set MAXLOG_CONTAINER environment variable."),
    }
}

async fn select_pods(settings: &Settings) -> Result<(KubeClient, Vec<PodInfo>)> {
    let (namespace, apptype) = k8s_target(settings)?;
    let client = KubeClient::new(settings.context.as_deref()).await?;
    let selector = label_selector(&settings.label_key, apptype);
    let pods = client.get_pods(namespace, &selector).await?;
    debug!(namespace, %selector, count = pods.len(), "selected pods");
    Ok((client, pods))
}

/// Open every log source; all of them are open before the first line is written
async fn open_sources(settings: &Settings) -> Result<Vec<LogSource>> {
    match require_mode(settings)? {
        Mode::K8s => {
            let (client, pods) = select_pods(settings).await?;
            // The app type doubles as the container name inside each pod
            let container = settings.apptype.as_deref();
            client.open_log_sources(&pods, container, &settings.log).await
        }
        Mode::Pod => {
            let name = require_container(settings)?;
            let client = RuntimeClient::from_env()?;
            let container = client.find_container(name).await?;
            let source = client
                .open_log_source(&container.id, name, &settings.log)
                .await?;
            Ok(vec![source])
        }
    }
}

/// Stream annotated logs of every selected source to stdout
pub async fn logs(settings: &Settings) -> Result<ExitCode> {
    let focus = match settings.focus.as_deref() {
        Some(word) => FocusFilter::new(word).context("Invalid focus word")?,
        None => None,
    };
    if let Some(focus) = &focus {
        debug!(word = focus.word(), "focus filter enabled");
    }

    let sources = open_sources(settings).await?;
    if sources.is_empty() {
        eprintln!("{} No pods or containers matched", Symbol::Warn);
        return Ok(ExitCode::SUCCESS);
    }
    info!(sources = sources.len(), tail = %settings.log.tail, follow = settings.log.follow, "streaming logs");

    let fan_in = FanIn::new(Annotator::new(settings.caps), settings.tag.clone())
        .with_focus(focus)
        .with_policy(settings.policy);

    let cancel = fan_in.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted, stopping log streams");
            cancel.cancel();
        }
    });

    let (_, outcomes) = fan_in.run(sources, tokio::io::stdout()).await?;

    for outcome in &outcomes {
        if let SourceStatus::Failed(err) = &outcome.status {
            eprintln!("{} {}: {}", Symbol::Error, outcome.name, err);
        }
    }

    Ok(if outcomes.iter().any(|o| o.is_failed()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Print what `logs` would stream without streaming it
pub async fn inspect(settings: &Settings) -> Result<ExitCode> {
    match require_mode(settings)? {
        Mode::K8s => {
            println!(
                "Namespace    : {}",
                settings.namespace.as_deref().unwrap_or_default()
            );
            println!("AppType      : {}", app_type_label(settings));
            println!("Tail         : {}", settings.log.tail);

            let (_, pods) = select_pods(settings).await?;
            println!("Selected Pods: {}", pods.len());
            for pod in &pods {
                println!("  {} ({:?}) {}", pod.name, pod.status, container_summary(pod));
            }
        }
        Mode::Pod => {
            let name = require_container(settings)?;
            let client = RuntimeClient::from_env()?;
            let container = client.find_container(name).await?;
            let info = container.to_info(name);

            println!("Socket       : {}", client.socket().display());
            println!("Container    : {}", info.name);
            println!("CID          : {}", info.id.as_deref().unwrap_or_default());
            println!("State        : {}", info.state.as_deref().unwrap_or("unknown"));
            println!("Tail         : {}", settings.log.tail);
        }
    }

    Ok(ExitCode::SUCCESS)
}
