use std::{future::Future, num::NonZeroUsize, pin::pin};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    count::{CountResult, ResourceLister, count},
    discover::{ApiCatalog, DiscoveryReport, GroupDiscoveryFailure, enumerate},
    error::{CountError, Error},
    retry::RetryPolicy,
};

const DEFAULT_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(16).unwrap();
const MAX_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// Settings for one census run.
#[derive(Debug, Clone)]
pub struct CensusOptions {
    /// Restricts namespaced resources to one namespace; `None` counts all namespaces.
    pub namespace: Option<String>,
    /// Maximum number of listing calls in flight.
    pub concurrency: NonZeroUsize,
    pub retry: RetryPolicy,
}

impl Default for CensusOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl CensusOptions {
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|namespace| !namespace.is_empty());
        self
    }

    /// Values above 64 are clamped.
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency.min(MAX_CONCURRENCY);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Instance counts for every discovered resource kind, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CensusReport {
    pub results: Vec<CountResult>,
    /// Group/versions that discovery could not read; their resources are absent.
    pub discovery_failures: Vec<GroupDiscoveryFailure>,
    /// Set when the run was cancelled before every resource was counted.
    pub cancelled: bool,
}

impl CensusReport {
    /// Sum of the counts of every entry.
    ///
    /// This is not a number of distinct objects: a resource served under several versions
    /// (`autoscaling/v1` and `autoscaling/v2`, or core and `events.k8s.io` events) has one entry
    /// per version, and its objects are added once for each.
    pub fn summed_counts(&self) -> usize {
        self.results.iter().map(|result| result.count).sum()
    }

    /// Entries that carry an error, cancelled ones included.
    pub fn failed(&self) -> impl Iterator<Item = &CountResult> {
        self.results.iter().filter(|result| !result.is_ok())
    }

    /// Whether discovery and every count succeeded.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.discovery_failures.is_empty() && self.failed().next().is_none()
    }
}

/// Counts every resource of `report` through `lister`.
///
/// At most `options.concurrency` listing calls run at once. Each result is stored at the
/// position of its resource in `report`, so the output order never depends on which call
/// finishes first.
///
/// When `cancel` resolves, calls in flight are dropped. Results already stored are kept and
/// every other entry is recorded as [`CountError::Cancelled`].
pub async fn aggregate<L, C>(
    report: &DiscoveryReport,
    lister: &L,
    options: &CensusOptions,
    cancel: C,
) -> CensusReport
where
    L: ResourceLister,
    C: Future<Output = ()>,
{
    let descriptors = report.descriptors();
    let mut slots: Vec<Option<CountResult>> = vec![None; descriptors.len()];
    let namespace = options.namespace.as_deref();
    let mut cancel = pin!(cancel);

    {
        let mut counts = pin!(
            stream::iter(descriptors.clone().into_iter().enumerate())
                .map(|(index, descriptor)| async move {
                    (index, count(lister, descriptor, namespace, &options.retry).await)
                })
                .buffer_unordered(options.concurrency.get())
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break,
                next = counts.next() => match next {
                    Some((index, result)) => slots[index] = Some(result),
                    None => break,
                },
            }
        }
    }

    // A cancel that fires after the last slot was filled leaves nothing unfinished.
    let pending = slots.iter().filter(|slot| slot.is_none()).count();
    let cancelled = pending > 0;
    if cancelled {
        warn!(pending, "census cancelled");
    }

    let results = slots
        .into_iter()
        .zip(descriptors)
        .map(|(slot, descriptor)| {
            slot.unwrap_or_else(|| CountResult::failed(descriptor, CountError::Cancelled))
        })
        .collect();

    CensusReport {
        results,
        discovery_failures: report.failures.clone(),
        cancelled,
    }
}

/// Discovers every resource kind of the cluster and counts its instances.
///
/// # Errors
/// Returns [`Error::Discovery`] when discovery yields nothing, or [`Error::Cancelled`] when
/// `cancel` resolves before discovery finished. Once counting starts the run always
/// produces a report.
pub async fn run_census<D, L, C>(
    catalog: &D,
    lister: &L,
    options: &CensusOptions,
    cancel: C,
) -> Result<CensusReport, Error>
where
    D: ApiCatalog,
    L: ResourceLister,
    C: Future<Output = ()>,
{
    let mut cancel = pin!(cancel);

    let report = tokio::select! {
        biased;
        _ = &mut cancel => return Err(Error::Cancelled),
        report = enumerate(catalog) => report?,
    };
    info!(
        group_versions = report.groups.len(),
        resources = report.resource_count(),
        "discovered api resources"
    );

    let census = aggregate(&report, lister, options, cancel).await;
    info!(
        resources = census.results.len(),
        failed = census.failed().count(),
        summed_counts = census.summed_counts(),
        "census finished"
    );
    Ok(census)
}
