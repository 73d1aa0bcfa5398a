use std::fmt;

use kube::Error as KubeError;
use serde::Serialize;

use crate::{credentials::CredentialSource, discover::GroupDiscoveryFailure};

/// Fatal errors that stop the census before any count is reported.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// None of the credential sources produced connection parameters.
    #[error("no usable cluster credentials: {}", join_attempts(.attempts))]
    Configuration { attempts: Vec<CredentialAttempt> },

    /// Connection parameters were found but the client could not be built from them.
    #[error("failed to build kubernetes client: {0}")]
    Construction(#[source] KubeError),

    /// Discovery returned no resources at all and reported failures.
    #[error("api discovery failed: {}", join_failures(.failures))]
    Discovery { failures: Vec<GroupDiscoveryFailure> },

    /// The cancellation signal fired before discovery finished.
    #[error("census cancelled before discovery completed")]
    Cancelled,
}

/// One failed credential strategy and why it failed.
#[derive(Debug)]
pub struct CredentialAttempt {
    pub source: CredentialSource,
    pub reason: String,
}

impl fmt::Display for CredentialAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

fn join_attempts(attempts: &[CredentialAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_failures(failures: &[GroupDiscoveryFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.group_version, failure.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why a single resource kind could not be counted.
///
/// Recorded in the census entry instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountError {
    /// The API server answered with a failure status.
    #[error("{reason} ({code}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },
    /// The request never produced a status, e.g. transport or decoding failure.
    #[error("request failed: {message}")]
    Request { message: String },
    /// Discovery does not advertise the `list` verb for this resource.
    #[error("list is not supported")]
    ListNotSupported,
    /// The census was cancelled before this resource was counted.
    #[error("cancelled")]
    Cancelled,
}

impl From<KubeError> for CountError {
    fn from(error: KubeError) -> Self {
        match error {
            KubeError::Api(status) => CountError::Api {
                code: status.code,
                reason: status.reason.clone(),
                message: status.message.clone(),
            },
            other => CountError::Request {
                message: other.to_string(),
            },
        }
    }
}
