use std::{ffi::OsStr, path::PathBuf};

use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use kube::config::Kubeconfig;
use tokio::{runtime::Handle, task};

use crate::{
    client::ClientHandles,
    count::ResourceDescriptor,
    credentials::{default_sources, resolve_config},
    discover::DiscoveredResource,
};

/// Create an `ArgValueCompleter` that lists contexts from the default kubeconfig
/// (`KUBECONFIG`, then `~/.kube/config`).
pub fn context_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let Ok(kubeconfig) = Kubeconfig::read() else {
            return Vec::new();
        };

        let input = input.to_string_lossy();
        let input = input.trim();

        kubeconfig
            .contexts
            .iter()
            .filter(|named_context| named_context.name.starts_with(input))
            .map(|named_context| CompletionCandidate::new(named_context.name.as_str()))
            .collect()
    })
}

fn namespaces() -> ResourceDescriptor {
    ResourceDescriptor::new(
        "v1",
        &DiscoveredResource {
            name: "namespaces".into(),
            kind: "Namespace".into(),
            namespaced: false,
            verbs: vec!["list".into()],
        },
    )
}

/// Create an `ArgValueCompleter` that lists the cluster's namespaces.
///
/// Credentials are resolved the same way a census resolves them, from the default sources.
/// This makes a network call, so it may be slow or return nothing on network, authentication
/// or permission failures.
///
/// Limitation: `--kubeconfig` and `--context` given on the same command line are not considered.
/// See https://github.com/clap-rs/clap/issues/1910 for more details.
pub fn namespace_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let input = input.to_string_lossy().trim().to_string();

        let namespaces_future = async move {
            let sources = default_sources(None::<PathBuf>, None);
            let Ok(config) = resolve_config(&sources).await else {
                return Vec::new();
            };
            let Ok(handles) = ClientHandles::try_from_config(config) else {
                return Vec::new();
            };

            let Ok(list) = handles
                .data
                .api(&namespaces(), None)
                .list_metadata(&Default::default())
                .await
            else {
                return Vec::new();
            };

            list.items
                .iter()
                .filter_map(|namespace| namespace.metadata.name.as_ref())
                .filter(|name| name.starts_with(&input))
                .map(CompletionCandidate::new)
                .collect()
        };

        // If called on an existing Tokio runtime, `Runtime::block_on` will panic.
        // Therefore, if a runtime exists, we use `block_in_place` to escape to a blocking thread,
        // and from there we call `block_on` with the current handle.
        match Handle::try_current() {
            Ok(handle) => task::block_in_place(move || handle.block_on(namespaces_future)),
            Err(_) => tokio::runtime::Runtime::new()
                .map(|rt| rt.block_on(namespaces_future))
                .unwrap_or_default(),
        }
    })
}
