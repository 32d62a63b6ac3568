use std::fmt;

use http::StatusCode;
use serde::Serialize;

/// Lifecycle of a repository mirror as seen by the manager.
///
/// `Pending --trigger--> Cloning --ok--> Ready`, `Cloning --fail--> Error`.
/// `Ready` and `Error` only move again on the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Cloning,
    Ready,
    Error,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request handler should answer after consulting the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The repository was unknown; a clone was just started.
    Started,
    /// A clone or refresh is in flight.
    StillCloning,
    /// The last clone failed; a new trigger is required.
    Failed,
    /// The mirror can be read through `access_repo`.
    Ready,
}

impl Availability {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Started | Self::StillCloning => StatusCode::ACCEPTED,
            Self::Failed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ready => StatusCode::OK,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Started => "cloning started",
            Self::StillCloning => "still cloning",
            Self::Failed => "clone failed",
            Self::Ready => "ready",
        }
    }
}
