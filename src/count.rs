use std::{fmt, future::Future};

use kube::Error as KubeError;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    discover::DiscoveredResource,
    error::CountError,
    retry::{RetryPolicy, retry_with_policy},
};

/// Splits a group/version label into its group and version.
///
/// A label without `/` belongs to the core group, whose name is empty.
pub fn parse_group_version(label: &str) -> (&str, &str) {
    match label.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", label),
    }
}

/// Addresses one resource kind: group, version and plural name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceDescriptor {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `deployments`.
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    #[serde(skip)]
    pub listable: bool,
}

impl ResourceDescriptor {
    pub fn new(group_version: &str, resource: &DiscoveredResource) -> Self {
        let (group, version) = parse_group_version(group_version);
        Self {
            group: group.to_string(),
            version: version.to_string(),
            name: resource.name.clone(),
            kind: resource.kind.clone(),
            namespaced: resource.namespaced,
            listable: resource.supports_list(),
        }
    }

    /// `v1` for the core group, `group/version` otherwise.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.name)
    }
}

/// Lists instances of arbitrary resource kinds.
pub trait ResourceLister {
    /// Number of items returned by one listing call for `resource`.
    ///
    /// `namespace` of `None` lists across all namespaces, or cluster-wide for
    /// cluster-scoped resources.
    fn list(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<usize, KubeError>>;
}

/// Outcome of counting one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountResult {
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CountError>,
}

impl CountResult {
    pub fn counted(descriptor: ResourceDescriptor, count: usize) -> Self {
        Self {
            descriptor,
            count,
            error: None,
        }
    }

    pub fn failed(descriptor: ResourceDescriptor, error: CountError) -> Self {
        Self {
            descriptor,
            count: 0,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counts the live instances of one resource kind.
///
/// Namespaced resources are listed in `namespace` (all namespaces when `None` or empty);
/// cluster-scoped resources are always listed cluster-wide. Transient failures are retried
/// according to `retry`; whatever error remains is recorded in the result.
///
/// The count covers a single listing call. If the server truncates the response,
/// only the first page is counted.
pub async fn count<L: ResourceLister>(
    lister: &L,
    descriptor: ResourceDescriptor,
    namespace: Option<&str>,
    retry: &RetryPolicy,
) -> CountResult {
    if !descriptor.listable {
        debug!(resource = %descriptor, "skipping resource without list verb");
        return CountResult::failed(descriptor, CountError::ListNotSupported);
    }

    let namespace = if descriptor.namespaced {
        namespace.filter(|namespace| !namespace.is_empty())
    } else {
        None
    };

    let listed = retry_with_policy(retry, || lister.list(&descriptor, namespace)).await;
    match listed {
        Ok(items) => CountResult::counted(descriptor, items),
        Err(err) => {
            warn!(resource = %descriptor, error = %err, "failed to count resource");
            CountResult::failed(descriptor, err.into())
        }
    }
}
