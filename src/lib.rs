#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use clap_complete;
pub use k8s_openapi;
pub use kube;

pub mod census;
pub use census::{CensusOptions, CensusReport, aggregate, run_census};
pub mod claputil;
pub use claputil::{context_value_completer, namespace_value_completer};
pub mod client;
pub use client::ClientHandles;
pub mod count;
pub use count::{CountResult, ResourceDescriptor, ResourceLister, count, parse_group_version};
pub mod credentials;
pub use credentials::{CredentialSource, default_sources, resolve_config};
pub mod discover;
pub use discover::{ApiCatalog, DiscoveryReport, enumerate};
pub mod dynamic;
mod error;
pub use error::{CountError, CredentialAttempt, Error};
pub mod retry;
pub use retry::RetryPolicy;
