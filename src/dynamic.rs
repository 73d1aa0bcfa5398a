use std::{borrow::Cow, future::Future};

use kube::{
    Api, Client, Error as KubeError, Resource,
    api::{ListParams, ObjectMeta, TypeMeta},
    core::DynamicResourceScope,
};
use tracing::debug;

use crate::count::{ResourceDescriptor, ResourceLister};

/// Note about own `DynamicObject` instead of `kube::api::DynamicObject`.
/// The original `kube::api::DynamicObject` is addressed through `kube::api::ApiResource`,
/// which carries no scope information.
///
/// Discovery already tells whether a resource is namespaced, so objects here are addressed
/// through [`ResourceDescriptor`] directly and no intermediate `ApiResource` is built per call.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct DynamicObject {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl Resource for DynamicObject {
    type DynamicType = ResourceDescriptor;
    type Scope = DynamicResourceScope;

    fn group(dt: &ResourceDescriptor) -> Cow<'_, str> {
        dt.group.as_str().into()
    }

    fn version(dt: &ResourceDescriptor) -> Cow<'_, str> {
        dt.version.as_str().into()
    }

    fn kind(dt: &ResourceDescriptor) -> Cow<'_, str> {
        dt.kind.as_str().into()
    }

    fn api_version(dt: &ResourceDescriptor) -> Cow<'_, str> {
        dt.api_version().into()
    }

    fn plural(dt: &ResourceDescriptor) -> Cow<'_, str> {
        dt.name.as_str().into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Data handle listing arbitrary resources by group, version and plural name.
#[derive(Clone)]
pub struct DynamicClient {
    client: Client,
}

impl DynamicClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// An `Api` scoped to `namespace`, or to the whole cluster when `namespace` is `None`.
    pub fn api(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

impl ResourceLister for DynamicClient {
    fn list(
        &self,
        resource: &ResourceDescriptor,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<usize, KubeError>> {
        let api = self.api(resource, namespace);
        async move {
            // Only metadata is requested; a single page, since no limit is set.
            let list = api.list_metadata(&ListParams::default()).await?;
            debug!(
                resource = %api.resource_url(),
                items = list.items.len(),
                "listed resource"
            );
            Ok(list.items.len())
        }
    }
}
