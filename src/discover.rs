use std::future::Future;

use futures::future::{join, join_all};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::Error as KubeError;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{count::ResourceDescriptor, error::Error};

pub mod client;

/// Read access to the control plane's discovery endpoints.
pub trait ApiCatalog {
    /// Versions served by the legacy core group (`/api`), e.g. `["v1"]`.
    fn core_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>>;

    /// Every `group/version` served under `/apis`, in server order.
    fn group_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>>;

    /// Resources served by one group/version label (`v1` or `apps/v1`).
    fn resources(
        &self,
        group_version: &str,
    ) -> impl Future<Output = Result<APIResourceList, KubeError>>;
}

/// A resource kind as advertised by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredResource {
    /// Plural resource name, e.g. `pods`.
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl DiscoveredResource {
    /// Subresources such as `pods/log` are addressed through their parent and cannot be listed.
    fn is_subresource(api_resource: &APIResource) -> bool {
        api_resource.name.contains('/')
    }

    pub fn supports_list(&self) -> bool {
        self.verbs.iter().any(|verb| verb == "list")
    }
}

impl From<APIResource> for DiscoveredResource {
    fn from(api_resource: APIResource) -> Self {
        Self {
            name: api_resource.name,
            kind: api_resource.kind,
            namespaced: api_resource.namespaced,
            verbs: api_resource.verbs,
        }
    }
}

/// Resources served under a single group/version label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupVersionResources {
    pub group_version: String,
    pub resources: Vec<DiscoveredResource>,
}

/// A discovery call that failed while the rest of discovery went on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDiscoveryFailure {
    /// The group/version label, or the discovery root (`/api`, `/apis`) that failed.
    pub group_version: String,
    pub reason: String,
}

impl GroupDiscoveryFailure {
    fn new(group_version: impl Into<String>, error: KubeError) -> Self {
        Self {
            group_version: group_version.into(),
            reason: error.to_string(),
        }
    }
}

/// The resource catalog of the control plane, in the order the server returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub groups: Vec<GroupVersionResources>,
    /// Non-empty when discovery is incomplete.
    pub failures: Vec<GroupDiscoveryFailure>,
}

impl DiscoveryReport {
    /// Number of resource kinds across all group/versions.
    pub fn resource_count(&self) -> usize {
        self.groups.iter().map(|group| group.resources.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterates `(group/version, resource)` pairs in discovery order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &DiscoveredResource)> {
        self.groups.iter().flat_map(|group| {
            group
                .resources
                .iter()
                .map(move |resource| (group.group_version.as_str(), resource))
        })
    }

    /// Descriptors for every resource kind, in discovery order.
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.resources()
            .map(|(group_version, resource)| ResourceDescriptor::new(group_version, resource))
            .collect()
    }
}

/// Queries the catalog for every group/version and the resources each one serves.
///
/// Failures of individual group/versions (an aggregated API being down, for example) are
/// collected into [`DiscoveryReport::failures`] and do not stop discovery.
///
/// # Errors
/// Returns [`Error::Discovery`] only when nothing at all was discovered and some call failed.
pub async fn enumerate<C: ApiCatalog>(catalog: &C) -> Result<DiscoveryReport, Error> {
    let mut failures = Vec::new();
    let mut labels = Vec::new();

    let (core, groups) = join(catalog.core_versions(), catalog.group_versions()).await;
    match core {
        Ok(versions) => labels.extend(versions),
        Err(err) => failures.push(GroupDiscoveryFailure::new("/api", err)),
    }
    match groups {
        Ok(group_versions) => labels.extend(group_versions),
        Err(err) => failures.push(GroupDiscoveryFailure::new("/apis", err)),
    }

    let lists = join_all(labels.iter().map(|label| catalog.resources(label))).await;

    let mut groups = Vec::with_capacity(labels.len());
    for (group_version, list) in labels.into_iter().zip(lists) {
        match list {
            Ok(list) => {
                let resources: Vec<DiscoveredResource> = list
                    .resources
                    .into_iter()
                    .filter(|api_resource| !DiscoveredResource::is_subresource(api_resource))
                    .map(DiscoveredResource::from)
                    .collect();
                debug!(%group_version, resources = resources.len(), "discovered group version");
                groups.push(GroupVersionResources {
                    group_version,
                    resources,
                });
            }
            Err(err) => failures.push(GroupDiscoveryFailure::new(group_version, err)),
        }
    }

    let report = DiscoveryReport { groups, failures };
    if report.resource_count() == 0 && !report.is_complete() {
        return Err(Error::Discovery {
            failures: report.failures,
        });
    }
    for failure in &report.failures {
        warn!(
            group_version = %failure.group_version,
            reason = %failure.reason,
            "discovery incomplete"
        );
    }
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        future::{Future, ready},
    };

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
    use kube::{Error as KubeError, core::Status};

    use super::{ApiCatalog, enumerate};
    use crate::error::Error;

    pub(crate) fn api_error(code: u16) -> KubeError {
        KubeError::Api(
            Status::failure(&format!("status={code}"), "Test")
                .with_code(code)
                .boxed(),
        )
    }

    pub(crate) fn api_resource(name: &str, kind: &str, namespaced: bool) -> APIResource {
        APIResource {
            name: name.into(),
            kind: kind.into(),
            namespaced,
            verbs: vec!["get".into(), "list".into(), "watch".into()],
            ..Default::default()
        }
    }

    /// In-memory catalog. A group/version mapped to `Err(code)` fails with that status.
    pub(crate) struct StubCatalog {
        pub(crate) core: Result<Vec<String>, u16>,
        pub(crate) groups: Result<Vec<String>, u16>,
        pub(crate) resources: HashMap<String, Result<Vec<APIResource>, u16>>,
    }

    impl StubCatalog {
        pub(crate) fn new() -> Self {
            Self {
                core: Ok(Vec::new()),
                groups: Ok(Vec::new()),
                resources: HashMap::new(),
            }
        }

        pub(crate) fn with_group(
            mut self,
            group_version: &str,
            resources: Vec<APIResource>,
        ) -> Self {
            if group_version.contains('/') {
                self.groups.as_mut().unwrap().push(group_version.into());
            } else {
                self.core.as_mut().unwrap().push(group_version.into());
            }
            self.resources.insert(group_version.into(), Ok(resources));
            self
        }

        pub(crate) fn with_failing_group(mut self, group_version: &str, code: u16) -> Self {
            self.groups.as_mut().unwrap().push(group_version.into());
            self.resources.insert(group_version.into(), Err(code));
            self
        }
    }

    impl ApiCatalog for StubCatalog {
        fn core_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>> {
            ready(self.core.clone().map_err(api_error))
        }

        fn group_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>> {
            ready(self.groups.clone().map_err(api_error))
        }

        fn resources(
            &self,
            group_version: &str,
        ) -> impl Future<Output = Result<APIResourceList, KubeError>> {
            let result = match self.resources.get(group_version) {
                Some(Ok(resources)) => Ok(APIResourceList {
                    group_version: group_version.into(),
                    resources: resources.clone(),
                }),
                Some(Err(code)) => Err(api_error(*code)),
                None => Err(api_error(404)),
            };
            ready(result)
        }
    }

    #[tokio::test]
    async fn keeps_server_order() {
        let catalog = StubCatalog::new()
            .with_group("v1", vec![api_resource("pods", "Pod", true)])
            .with_group("batch/v1", vec![api_resource("jobs", "Job", true)])
            .with_group("apps/v1", vec![api_resource("deployments", "Deployment", true)]);

        let report = enumerate(&catalog).await.unwrap();
        let labels: Vec<_> = report.groups.iter().map(|g| g.group_version.as_str()).collect();
        assert_eq!(labels, ["v1", "batch/v1", "apps/v1"]);
        assert!(report.is_complete());
        assert_eq!(report.resource_count(), 3);
    }

    #[tokio::test]
    async fn drops_subresources() {
        let catalog = StubCatalog::new().with_group(
            "v1",
            vec![
                api_resource("pods", "Pod", true),
                api_resource("pods/log", "Pod", true),
                api_resource("pods/status", "Pod", true),
            ],
        );

        let report = enumerate(&catalog).await.unwrap();
        let names: Vec<_> = report.resources().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, ["pods"]);
    }

    #[tokio::test]
    async fn partial_discovery_is_usable() {
        let catalog = StubCatalog::new()
            .with_group("v1", vec![api_resource("pods", "Pod", true)])
            .with_failing_group("metrics.k8s.io/v1beta1", 503);

        let report = enumerate(&catalog).await.unwrap();
        assert_eq!(report.resource_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].group_version, "metrics.k8s.io/v1beta1");
    }

    #[tokio::test]
    async fn failed_group_listing_keeps_core() {
        let mut catalog =
            StubCatalog::new().with_group("v1", vec![api_resource("nodes", "Node", false)]);
        catalog.groups = Err(500);

        let report = enumerate(&catalog).await.unwrap();
        assert_eq!(report.resource_count(), 1);
        assert_eq!(report.failures[0].group_version, "/apis");
    }

    #[tokio::test]
    async fn empty_and_failed_discovery_is_fatal() {
        let mut catalog = StubCatalog::new();
        catalog.core = Err(401);
        catalog.groups = Err(401);

        match enumerate(&catalog).await {
            Err(Error::Discovery { failures }) => assert_eq!(failures.len(), 2),
            other => panic!("expected discovery error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_discovery_without_failures_is_not_an_error() {
        let report = enumerate(&StubCatalog::new()).await.unwrap();
        assert_eq!(report.resource_count(), 0);
        assert!(report.is_complete());
    }
}
