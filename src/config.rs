//! Command line, environment and config file handling
//!
//! Precedence for every setting: command line flag, then `MAXLOG_*`
//! environment variable (both handled by clap), then the TOML config file,
//! then the built-in default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use maxlog_k8s::DEFAULT_LABEL_KEY;
use maxlog_logs::{CapStyle, FailurePolicy};
use maxlog_types::{ConfigError, LogOptions, Mode, TailLines, parse_switch};

/// App types shown by `inspect` when none is configured
pub const DEFAULT_APP_TYPES: &str = "all, ui, cron, mea, rpt, jms";

/// Options that may also be written as bare `key=value` arguments
const LEGACY_KEYS: &[&str] = &[
    "tag",
    "focus",
    "tail",
    "follow",
    "namespace",
    "apptype",
    "mode",
    "container",
    "context",
];

/// Long flags that always take a value as the next argument
const VALUE_FLAGS: &[&str] = &[
    "tag",
    "focus",
    "tail",
    "namespace",
    "apptype",
    "mode",
    "container",
    "context",
    "label-key",
    "nerd-font",
    "config",
];

/// maxlog - colorized log tailing for Kubernetes pods and local containers
#[derive(Parser, Debug)]
#[command(name = "maxlog")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub options: Options,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show logs of containers (default)
    Logs,
    /// Inspect the pods or container that would be selected
    Inspect,
    /// Show version information
    Version,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct Options {
    /// Backend: 'k8s' for Kubernetes or 'pod' for a local container
    #[arg(long, env = "MAXLOG_MODE", global = true)]
    pub mode: Option<String>,

    /// Number of log lines to fetch per source, or 'all'
    #[arg(long, env = "MAXLOG_TAIL", global = true)]
    pub tail: Option<String>,

    /// Keep streaming new lines (yes/no)
    #[arg(
        long,
        env = "MAXLOG_FOLLOW",
        global = true,
        num_args = 0..=1,
        default_missing_value = "yes"
    )]
    pub follow: Option<String>,

    /// Highlight lines containing this tag
    #[arg(long, env = "MAXLOG_TAG", global = true)]
    pub tag: Option<String>,

    /// Hide lines that do not contain this word (case-insensitive)
    #[arg(long, env = "MAXLOG_FOCUS", global = true)]
    pub focus: Option<String>,

    /// Kubernetes namespace
    #[arg(long, env = "MAXLOG_K8S_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Application type used as pod selector and container name, e.g. ui
    #[arg(long, env = "MAXLOG_K8S_APPTYPE", global = true)]
    pub apptype: Option<String>,

    /// Label key the application type is matched against
    #[arg(long, env = "MAXLOG_K8S_LABEL", global = true)]
    pub label_key: Option<String>,

    /// Kubeconfig context (defaults to the current context)
    #[arg(long, env = "MAXLOG_K8S_CONTEXT", global = true)]
    pub context: Option<String>,

    /// Container name on the local runtime
    #[arg(long, env = "MAXLOG_CONTAINER", global = true)]
    pub container: Option<String>,

    /// Use Nerd Font glyphs for labels (yes/no)
    #[arg(long, env = "MAXLOG_USE_NERDFONT", global = true)]
    pub nerd_font: Option<String>,

    /// Stop every source as soon as one fails
    #[arg(long, env = "MAXLOG_ABORT_ON_ERROR", global = true)]
    pub abort_on_error: bool,

    /// Config file (defaults to <config dir>/maxlog/config.toml)
    #[arg(long, env = "MAXLOG_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Tail as written in the config file: a number or "all"
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TailValue {
    Count(u32),
    Text(String),
}

/// Settings read from the TOML config file
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub mode: Option<String>,
    pub tail: Option<TailValue>,
    pub follow: Option<bool>,
    pub tag: Option<String>,
    pub focus: Option<String>,
    pub namespace: Option<String>,
    pub apptype: Option<String>,
    pub label_key: Option<String>,
    pub context: Option<String>,
    pub container: Option<String>,
    pub nerd_font: Option<bool>,
    pub abort_on_error: Option<bool>,
}

impl FileConfig {
    /// Load the config file. An explicit path must exist; the default one may not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).context(format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("maxlog").join("config.toml"))
    }
}

/// Fully resolved settings
#[derive(Clone, Debug)]
pub struct Settings {
    pub mode: Option<Mode>,
    pub log: LogOptions,
    pub tag: String,
    pub focus: Option<String>,
    pub namespace: Option<String>,
    pub apptype: Option<String>,
    pub label_key: String,
    pub context: Option<String>,
    pub container: Option<String>,
    pub caps: CapStyle,
    pub policy: FailurePolicy,
}

/// Treat empty strings as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Merge command line / environment options over the config file
    pub fn resolve(options: Options, file: FileConfig) -> Result<Self, ConfigError> {
        let mode = non_empty(options.mode.or(file.mode))
            .map(|m| m.parse::<Mode>())
            .transpose()?;

        let tail = match non_empty(options.tail) {
            Some(tail) => tail.parse()?,
            None => match file.tail {
                Some(TailValue::Count(n)) => TailLines::Last(n),
                Some(TailValue::Text(text)) => text.parse()?,
                None => TailLines::default(),
            },
        };

        let follow = match options.follow {
            Some(follow) => parse_switch(&follow)?,
            None => file.follow.unwrap_or(true),
        };

        let nerd_font = match non_empty(options.nerd_font) {
            Some(value) => parse_switch(&value)?,
            None => file.nerd_font.unwrap_or(true),
        };

        let abort = options.abort_on_error || file.abort_on_error.unwrap_or(false);

        Ok(Self {
            mode,
            log: LogOptions { tail, follow },
            tag: options.tag.or(file.tag).unwrap_or_default(),
            focus: non_empty(options.focus.or(file.focus)),
            namespace: non_empty(options.namespace.or(file.namespace)),
            apptype: non_empty(options.apptype.or(file.apptype)),
            label_key: non_empty(options.label_key.or(file.label_key))
                .unwrap_or_else(|| DEFAULT_LABEL_KEY.to_string()),
            context: non_empty(options.context.or(file.context)),
            container: non_empty(options.container.or(file.container)),
            caps: if nerd_font {
                CapStyle::NerdFont
            } else {
                CapStyle::Plain
            },
            policy: if abort {
                FailurePolicy::AbortAll
            } else {
                FailurePolicy::Isolate
            },
        })
    }
}

/// Rewrite the legacy argument forms (`tag=x`, `-tag=x`, `tag x`) into long flags
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut normalized: Vec<String> = args.next().into_iter().collect();
    let rest: Vec<String> = args.collect();

    let mut i = 0;
    while i < rest.len() {
        let arg = &rest[i];
        let bare = if arg.starts_with("--") {
            None
        } else {
            Some(arg.strip_prefix('-').unwrap_or(arg))
        };

        match bare {
            Some(bare) => {
                let key = bare.split_once('=').map_or(bare, |(k, _)| k);
                if LEGACY_KEYS.contains(&key) {
                    normalized.push(format!("--{}", bare));
                    // `tag value` pairs: the value travels with its key
                    if !bare.contains('=') && key != "follow" && i + 1 < rest.len() {
                        normalized.push(rest[i + 1].clone());
                        i += 1;
                    }
                } else {
                    normalized.push(arg.clone());
                }
            }
            None => {
                normalized.push(arg.clone());
                // `--tag value`: the value is passed through even if it looks like a key
                let flag = &arg[2..];
                if VALUE_FLAGS.contains(&flag) && i + 1 < rest.len() {
                    normalized.push(rest[i + 1].clone());
                    i += 1;
                }
            }
        }
        i += 1;
    }

    normalized
}
