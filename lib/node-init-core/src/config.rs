//! Daemon configuration

use crate::bgp::PeerFailurePolicy;
use crate::vtysh::VtyConfig;
use crate::{NodeInitError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const NODE_NAME_ENV: &str = "KUBE_NODE_NAME";
pub const RECONCILE_INTERVAL_ENV: &str = "NODE_INIT_RECONCILE_INTERVAL_SECS";
pub const POD_LINK_ENV: &str = "NODE_INIT_POD_LINK";
pub const INTERFACE_FILTER_ENV: &str = "NODE_INIT_INTERFACE_FILTER";
pub const PEER_FAILURE_POLICY_ENV: &str = "NODE_INIT_PEER_FAILURE_POLICY";
pub const VTY_DIR_ENV: &str = "NODE_INIT_VTY_DIR";
pub const VTY_TIMEOUT_ENV: &str = "NODE_INIT_VTY_TIMEOUT_SECS";

/// Default time between two reconciliation cycles
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(120);

/// Everything a reconciliation cycle needs to know about its environment
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Name of the node object this daemon acts for
    pub node_name: String,
    /// Wait between two cycles
    pub reconcile_interval: Duration,
    /// Link the pod CIDR route is installed on
    pub pod_link: String,
    /// Only peers whose name starts with this prefix are repaired
    pub interface_filter: String,
    /// Which peer states count as a broken session
    pub peer_failure_policy: PeerFailurePolicy,
    /// Routing daemon control sockets
    pub vty: VtyConfig,
}

impl DaemonConfig {
    /// Create a configuration with defaults for everything but the node name
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            pod_link: "lo".to_string(),
            interface_filter: "lan".to_string(),
            peer_failure_policy: PeerFailurePolicy::default(),
            vty: VtyConfig::default(),
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated like unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let node_name = get(NODE_NAME_ENV).ok_or(NodeInitError::ConfigMissing(NODE_NAME_ENV))?;
        let mut config = Self::new(node_name.trim());

        if let Some(value) = get(RECONCILE_INTERVAL_ENV) {
            let secs = parse_secs(RECONCILE_INTERVAL_ENV, &value)?;
            if secs == 0 {
                return Err(NodeInitError::InvalidConfig {
                    key: RECONCILE_INTERVAL_ENV,
                    reason: "interval must be greater than zero".to_string(),
                });
            }
            config.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(value) = get(POD_LINK_ENV) {
            config.pod_link = value;
        }
        if let Some(value) = lookup(INTERFACE_FILTER_ENV) {
            // an empty filter is meaningful: it matches every peer
            config.interface_filter = value;
        }
        if let Some(value) = get(PEER_FAILURE_POLICY_ENV) {
            config.peer_failure_policy = value.parse::<PeerFailurePolicy>().map_err(|reason| {
                NodeInitError::InvalidConfig {
                    key: PEER_FAILURE_POLICY_ENV,
                    reason,
                }
            })?;
        }
        if let Some(value) = get(VTY_DIR_ENV) {
            config.vty.run_dir = PathBuf::from(value);
        }
        if let Some(value) = get(VTY_TIMEOUT_ENV) {
            config.vty.timeout = Duration::from_secs(parse_secs(VTY_TIMEOUT_ENV, &value)?);
        }

        Ok(config)
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| NodeInitError::InvalidConfig {
            key,
            reason: format!("{:?} is not a number of seconds: {}", value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_lookup(lookup(&[(NODE_NAME_ENV, "node-1")])).unwrap();
        assert_eq!(config.node_name, "node-1");
        assert_eq!(config.reconcile_interval, Duration::from_secs(120));
        assert_eq!(config.pod_link, "lo");
        assert_eq!(config.interface_filter, "lan");
        assert_eq!(config.peer_failure_policy, PeerFailurePolicy::IdleOrWaiting);
        assert_eq!(config.vty.run_dir, PathBuf::from("/var/run/frr"));
    }

    #[test]
    fn test_missing_node_name() {
        let err = DaemonConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, NodeInitError::ConfigMissing(NODE_NAME_ENV)));

        let err = DaemonConfig::from_lookup(lookup(&[(NODE_NAME_ENV, "  ")])).unwrap_err();
        assert!(matches!(err, NodeInitError::ConfigMissing(_)));
    }

    #[test]
    fn test_overrides() {
        let config = DaemonConfig::from_lookup(lookup(&[
            (NODE_NAME_ENV, "node-2"),
            (RECONCILE_INTERVAL_ENV, "30"),
            (POD_LINK_ENV, "dummy0"),
            (INTERFACE_FILTER_ENV, ""),
            (PEER_FAILURE_POLICY_ENV, "not-established"),
            (VTY_DIR_ENV, "/run/frr"),
            (VTY_TIMEOUT_ENV, "5"),
        ]))
        .unwrap();

        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.pod_link, "dummy0");
        assert_eq!(config.interface_filter, "");
        assert_eq!(config.peer_failure_policy, PeerFailurePolicy::NotEstablished);
        assert_eq!(config.vty.run_dir, PathBuf::from("/run/frr"));
        assert_eq!(config.vty.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values() {
        let err = DaemonConfig::from_lookup(lookup(&[
            (NODE_NAME_ENV, "node-1"),
            (RECONCILE_INTERVAL_ENV, "two minutes"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            NodeInitError::InvalidConfig { key: RECONCILE_INTERVAL_ENV, .. }
        ));

        let err = DaemonConfig::from_lookup(lookup(&[
            (NODE_NAME_ENV, "node-1"),
            (RECONCILE_INTERVAL_ENV, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, NodeInitError::InvalidConfig { .. }));

        let err = DaemonConfig::from_lookup(lookup(&[
            (NODE_NAME_ENV, "node-1"),
            (PEER_FAILURE_POLICY_ENV, "sometimes"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            NodeInitError::InvalidConfig { key: PEER_FAILURE_POLICY_ENV, .. }
        ));
    }
}
