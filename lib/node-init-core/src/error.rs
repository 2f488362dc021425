use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeInitError>;

#[derive(Error, Debug)]
pub enum NodeInitError {
    #[error("Node identity missing: {0} is not set")]
    ConfigMissing(&'static str),

    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("Failed to look up node {node}: {source}")]
    ClusterLookup {
        node: String,
        #[source]
        source: kube::Error,
    },

    #[error("Invalid pod CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("Link {link} not found: {source}")]
    LinkNotFound {
        link: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list routes on link {link}: {source}")]
    RouteList {
        link: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to add route {destination} on link {link}: {source}")]
    RouteAdd {
        destination: String,
        link: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown daemon {0}")]
    UnknownDaemon(String),

    #[error("Failed to connect to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Control socket protocol error on {}: {reason}", .path.display())]
    Protocol { path: PathBuf, reason: String },

    #[error("Failed to decode BGP summary: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Error executing {action:?} (exit code {code:?}) output:{output:?}")]
    RepairAction {
        action: String,
        /// Exit code, absent when the tool could not be started or was killed
        code: Option<i32>,
        output: String,
    },
}
