use std::{fmt, path::PathBuf};

use anyhow::Context;
use kube::{
    Config,
    config::{KubeConfigOptions, Kubeconfig},
};
use tracing::{debug, info};

use crate::error::{CredentialAttempt, Error};

/// A strategy for obtaining connection parameters for the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service account token and CA mounted into a pod running inside the cluster.
    InCluster,
    /// A kubeconfig, optionally pinned to one of its contexts.
    ///
    /// Without a `path`, the files listed in `KUBECONFIG` are merged, falling back to
    /// `~/.kube/config`.
    Kubeconfig {
        path: Option<PathBuf>,
        context: Option<String>,
    },
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::InCluster => f.write_str("in-cluster service account"),
            CredentialSource::Kubeconfig { path, context } => {
                match path {
                    Some(path) => write!(f, "kubeconfig {}", path.display())?,
                    None => f.write_str("kubeconfig from KUBECONFIG or ~/.kube/config")?,
                }
                match context {
                    Some(context) => write!(f, " (context {context})"),
                    None => Ok(()),
                }
            }
        }
    }
}

impl CredentialSource {
    async fn load(&self) -> anyhow::Result<Config> {
        match self {
            CredentialSource::InCluster => {
                Config::incluster().context("not running inside a cluster")
            }
            CredentialSource::Kubeconfig { path, context } => {
                let kubeconfig = match path {
                    Some(path) => Kubeconfig::read_from(path)
                        .with_context(|| format!("failed to read kubeconfig at {path:?}"))?,
                    None => Kubeconfig::read().context("failed to read kubeconfig")?,
                };
                let options = KubeConfigOptions {
                    context: context.clone(),
                    ..Default::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .context("failed to load kubeconfig")
            }
        }
    }
}

/// The fallback order used by the CLI: in-cluster first, then the kubeconfig.
///
/// When `path` is `None` the kubeconfig is located through `KUBECONFIG`, then
/// `~/.kube/config`.
pub fn default_sources(path: Option<PathBuf>, context: Option<String>) -> Vec<CredentialSource> {
    vec![
        CredentialSource::InCluster,
        CredentialSource::Kubeconfig { path, context },
    ]
}

/// Tries each source in order and returns the first connection parameters found.
///
/// # Errors
/// Returns [`Error::Configuration`] listing every attempted source when none succeeds.
pub async fn resolve_config(sources: &[CredentialSource]) -> Result<Config, Error> {
    let mut attempts = Vec::with_capacity(sources.len());

    for source in sources {
        match source.load().await {
            Ok(config) => {
                info!(%source, cluster_url = %config.cluster_url, "resolved cluster credentials");
                return Ok(config);
            }
            Err(err) => {
                debug!(%source, error = %format!("{err:#}"), "credential source unavailable");
                attempts.push(CredentialAttempt {
                    source: source.clone(),
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    Err(Error::Configuration { attempts })
}
