use std::future::Future;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::{Client, Error as KubeError};

use super::ApiCatalog;

/// Discovery handle backed by the API server's `/api` and `/apis` endpoints.
#[derive(Clone)]
pub struct DiscoverClient {
    client: Client,
}

impl DiscoverClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ApiCatalog for DiscoverClient {
    fn core_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>> {
        async move { Ok(self.client.list_core_api_versions().await?.versions) }
    }

    fn group_versions(&self) -> impl Future<Output = Result<Vec<String>, KubeError>> {
        async move {
            let groups = self.client.list_api_groups().await?;
            // Every served version is counted, not only the preferred one.
            Ok(groups
                .groups
                .into_iter()
                .flat_map(|group| group.versions.into_iter().map(|v| v.group_version))
                .collect())
        }
    }

    fn resources(
        &self,
        group_version: &str,
    ) -> impl Future<Output = Result<APIResourceList, KubeError>> {
        async move {
            if group_version.contains('/') {
                self.client.list_api_group_resources(group_version).await
            } else {
                self.client.list_core_api_resources(group_version).await
            }
        }
    }
}
