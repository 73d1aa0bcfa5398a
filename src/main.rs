use std::{
    io::{self, Write},
    num::NonZeroUsize,
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::{CommandFactory, Parser, ValueEnum};
use kubecensus::{
    CensusOptions, CensusReport, ClientHandles, RetryPolicy, clap_complete::CompleteEnv,
    default_sources, resolve_config, run_census,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "kubecensus",
    version,
    about = "Count every resource kind served by a Kubernetes cluster"
)]
struct Cli {
    /// Kubeconfig file used when not running inside a cluster
    /// [default: files in KUBECONFIG, then ~/.kube/config]
    #[arg(long, value_name = "PATH", env = "KUBECENSUS_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one.
    #[arg(long, add = kubecensus::context_value_completer())]
    context: Option<String>,

    /// Count namespaced resources in this namespace only. Cluster-scoped resources are
    /// always counted cluster-wide.
    #[arg(short, long, add = kubecensus::namespace_value_completer())]
    namespace: Option<String>,

    /// Stop the census after this many seconds and report what was counted so far.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Maximum number of listing calls in flight (at most 64).
    #[arg(long, default_value = "16")]
    concurrency: NonZeroUsize,

    /// Attempts per resource, including the first, for transient failures.
    #[arg(long, default_value = "3")]
    retries: NonZeroUsize,

    #[arg(short, long, value_enum, default_value_t = Output::Table)]
    output: Output,

    /// Omit resources that have no instances from the table.
    #[arg(long)]
    hide_zero: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kubecensus=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kubecensus=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Resolves on Ctrl-C or once `timeout` has elapsed, whichever comes first.
async fn cancellation(timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = deadline => warn!("timeout reached, cancelling census"),
        _ = interrupt => warn!("interrupted, cancelling census"),
    }
}

fn write_table(report: &CensusReport, hide_zero: bool, out: &mut impl Write) -> io::Result<()> {
    let rows: Vec<_> = report
        .results
        .iter()
        .filter(|result| !(hide_zero && result.is_ok() && result.count == 0))
        .collect();

    let group_width = rows
        .iter()
        .map(|r| r.descriptor.group.len())
        .chain([5])
        .max()
        .unwrap_or_default();
    let version_width = rows
        .iter()
        .map(|r| r.descriptor.version.len())
        .chain([7])
        .max()
        .unwrap_or_default();
    let name_width = rows
        .iter()
        .map(|r| r.descriptor.name.len())
        .chain([8])
        .max()
        .unwrap_or_default();

    writeln!(
        out,
        "{:group_width$}  {:version_width$}  {:name_width$}  {:>7}",
        "GROUP", "VERSION", "RESOURCE", "COUNT"
    )?;
    for result in rows {
        let descriptor = &result.descriptor;
        match &result.error {
            None => writeln!(
                out,
                "{:group_width$}  {:version_width$}  {:name_width$}  {:>7}",
                descriptor.group, descriptor.version, descriptor.name, result.count
            )?,
            Some(error) => writeln!(
                out,
                "{:group_width$}  {:version_width$}  {:name_width$}  {:>7}  {error}",
                descriptor.group, descriptor.version, descriptor.name, "-"
            )?,
        }
    }

    for failure in &report.discovery_failures {
        writeln!(
            out,
            "discovery failed for {}: {}",
            failure.group_version, failure.reason
        )?;
    }
    writeln!(
        out,
        "{} resource kinds, {} items summed over all versions, {} not counted",
        report.results.len(),
        report.summed_counts(),
        report.failed().count()
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let sources = default_sources(cli.kubeconfig, cli.context);
    let config = resolve_config(&sources).await?;
    let handles = ClientHandles::try_from_config(config)?;

    let options = CensusOptions::default()
        .with_namespace(cli.namespace)
        .with_concurrency(cli.concurrency)
        .with_retry(RetryPolicy::default().with_max_attempts(cli.retries));

    let report = run_census(
        &handles.discovery,
        &handles.data,
        &options,
        cancellation(cli.timeout.map(Duration::from_secs)),
    )
    .await?;

    let mut stdout = io::stdout().lock();
    let written = match cli.output {
        Output::Table => write_table(&report, cli.hide_zero, &mut stdout),
        Output::Json => serde_json::to_writer_pretty(&mut stdout, &report)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(stdout)),
    };
    written.context("failed to write census report")?;

    if report.cancelled {
        anyhow::bail!("census cancelled before every resource was counted");
    }
    Ok(())
}
