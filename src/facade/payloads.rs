//! Payload shapes cached on behalf of the hosting-API handlers.
//!
//! GraphQL responses keep their `data` envelope as an untyped JSON value; the
//! cache only needs them to round-trip.

use serde::{Deserialize, Serialize};

/// A stored configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
}

/// A GraphQL response body, `{"data": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlData {
    #[serde(default)]
    pub data: serde_json::Value,
}

pub type RepositoriesOfViewer = GraphQlData;
pub type RepositoryNodeWithAttributes = GraphQlData;
pub type RepositoryBranchCommit = GraphQlData;
pub type RepositoryBranchInfo = GraphQlData;

/// Tree listing with the latest commit per entry.  `partial` is set when
/// some entries are still missing their commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryTreeCommit {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContributor {
    pub total_count: u32,
    pub nodes: Vec<ContributorNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorNode {
    pub login: String,
    pub contributions: u32,
    pub avatar_url: String,
    pub html_url: String,
}

/// A file's contents as served to the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub content: String,
    pub mime: String,
}
