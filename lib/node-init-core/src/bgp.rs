//! BGP session health
//!
//! Parses the JSON answer of `show bgp ipv4 summary json` and picks the peers
//! whose sessions are considered broken.

use crate::vtysh::VtyshClient;
use crate::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const BGP_DAEMON: &str = "bgpd";
pub const BGP_SUMMARY_COMMAND: &str = "show bgp ipv4 summary json";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BgpSummary {
    pub ipv4_unicast: Ipv4Unicast,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ipv4Unicast {
    pub router_id: String,
    pub peers: BTreeMap<String, Peer>,
    pub failed_peers: u32,
    pub total_peers: u32,
}

/// A single BGP neighbor as reported by bgpd
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Peer {
    pub hostname: String,
    pub remote_as: i64,
    pub local_as: i64,
    pub version: i64,
    pub msg_rcvd: u64,
    pub msg_sent: u64,
    pub table_version: u64,
    pub outq: u64,
    pub inq: u64,
    pub peer_uptime: String,
    pub peer_uptime_msec: u64,
    pub peer_uptime_established_epoch: u64,
    pub pfx_rcd: u64,
    pub pfx_snt: u64,
    /// Session FSM state, e.g. `Idle` or `Established`
    pub state: String,
    /// Administrative state, e.g. `OK` or `Admin. shutdown`
    pub peer_state: String,
    pub connections_established: u64,
    pub connections_dropped: u64,
    pub id_type: String,
}

/// Which peer states count as a broken session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeerFailurePolicy {
    /// Only `idle` and `waiting` are broken; transitional states are left alone
    #[default]
    IdleOrWaiting,
    /// Everything that is not `established` is broken
    NotEstablished,
}

impl PeerFailurePolicy {
    /// Whether a peer in `state` needs repair. Comparison ignores case.
    pub fn is_failed(&self, state: &str) -> bool {
        let state = state.to_lowercase();
        match self {
            // states from bgpd's FSM lookup table, plus its startup "waiting"
            PeerFailurePolicy::IdleOrWaiting => state == "idle" || state == "waiting",
            PeerFailurePolicy::NotEstablished => state != "established",
        }
    }
}

impl FromStr for PeerFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle-or-waiting" => Ok(PeerFailurePolicy::IdleOrWaiting),
            "not-established" => Ok(PeerFailurePolicy::NotEstablished),
            other => Err(format!(
                "unknown peer failure policy {:?}, expected idle-or-waiting or not-established",
                other
            )),
        }
    }
}

impl fmt::Display for PeerFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerFailurePolicy::IdleOrWaiting => write!(f, "idle-or-waiting"),
            PeerFailurePolicy::NotEstablished => write!(f, "not-established"),
        }
    }
}

impl BgpSummary {
    /// Names of failed peers starting with `interface_filter`, in name order
    pub fn failed_interfaces(&self, interface_filter: &str, policy: PeerFailurePolicy) -> Vec<String> {
        let summary = &self.ipv4_unicast;
        if summary.failed_peers == 0 {
            return Vec::new();
        }

        summary
            .peers
            .iter()
            .filter(|(name, _)| name.starts_with(interface_filter))
            .filter(|(_, peer)| policy.is_failed(&peer.state))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Decode a summary payload and return the peers that need repair
pub fn classify(payload: &[u8], interface_filter: &str, policy: PeerFailurePolicy) -> Result<Vec<String>> {
    let summary: BgpSummary = serde_json::from_slice(payload)?;
    debug!(
        router_id = %summary.ipv4_unicast.router_id,
        failed = summary.ipv4_unicast.failed_peers,
        total = summary.ipv4_unicast.total_peers,
        "Decoded BGP summary"
    );
    Ok(summary.failed_interfaces(interface_filter, policy))
}

/// Queries bgpd and classifies its peers
pub struct SessionChecker {
    client: VtyshClient,
    interface_filter: String,
    policy: PeerFailurePolicy,
}

impl SessionChecker {
    pub fn new(client: VtyshClient, interface_filter: impl Into<String>, policy: PeerFailurePolicy) -> Self {
        Self {
            client,
            interface_filter: interface_filter.into(),
            policy,
        }
    }

    /// Interfaces whose BGP session is broken right now
    pub async fn failed_interfaces(&self) -> Result<Vec<String>> {
        let payload = self.client.send(BGP_DAEMON, BGP_SUMMARY_COMMAND).await?;
        classify(&payload, &self.interface_filter, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeInitError;

    fn summary_json(failed_peers: u32, peers: &[(&str, &str)]) -> Vec<u8> {
        let peers: serde_json::Map<String, serde_json::Value> = peers
            .iter()
            .map(|(name, state)| {
                (
                    name.to_string(),
                    serde_json::json!({
                        "hostname": format!("{}-peer", name),
                        "remoteAs": 4210000001u64,
                        "localAs": 4200000001u64,
                        "state": state,
                        "peerState": "OK",
                        "pfxRcd": 3,
                    }),
                )
            })
            .collect();
        let total_peers = peers.len();

        serde_json::to_vec(&serde_json::json!({
            "ipv4Unicast": {
                "routerId": "10.0.0.1",
                "as": 4200000001u64,
                "peers": peers,
                "failedPeers": failed_peers,
                "totalPeers": total_peers,
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_summary() {
        let payload = summary_json(1, &[("lan0", "Idle"), ("lan1", "Established")]);
        let summary: BgpSummary = serde_json::from_slice(&payload).unwrap();

        assert_eq!(summary.ipv4_unicast.router_id, "10.0.0.1");
        assert_eq!(summary.ipv4_unicast.total_peers, 2);
        let peer = &summary.ipv4_unicast.peers["lan0"];
        assert_eq!(peer.hostname, "lan0-peer");
        assert_eq!(peer.remote_as, 4210000001);
        assert_eq!(peer.state, "Idle");
        assert_eq!(peer.pfx_rcd, 3);
    }

    #[test]
    fn test_idle_peer_matches_filter() {
        let payload = summary_json(1, &[("lan0", "Idle")]);
        let policy = PeerFailurePolicy::IdleOrWaiting;

        assert_eq!(classify(&payload, "lan", policy).unwrap(), vec!["lan0".to_string()]);
        assert!(classify(&payload, "wan", policy).unwrap().is_empty());
    }

    #[test]
    fn test_no_failed_peers_short_circuits() {
        let payload = summary_json(0, &[("lan0", "Idle"), ("lan1", "waiting")]);
        for policy in [PeerFailurePolicy::IdleOrWaiting, PeerFailurePolicy::NotEstablished] {
            assert!(classify(&payload, "lan", policy).unwrap().is_empty());
        }
    }

    #[test]
    fn test_established_peer_is_healthy() {
        let payload = summary_json(2, &[("lan0", "Established"), ("lan1", "Idle")]);
        for filter in ["", "lan", "lan0"] {
            for policy in [PeerFailurePolicy::IdleOrWaiting, PeerFailurePolicy::NotEstablished] {
                let failed = classify(&payload, filter, policy).unwrap();
                assert!(!failed.contains(&"lan0".to_string()));
            }
        }
    }

    #[test]
    fn test_state_is_case_insensitive() {
        let payload = summary_json(3, &[("lan0", "IDLE"), ("lan1", "Waiting"), ("lan2", "idle")]);
        let failed = classify(&payload, "lan", PeerFailurePolicy::IdleOrWaiting).unwrap();
        assert_eq!(failed, vec!["lan0", "lan1", "lan2"]);
    }

    #[test]
    fn test_policies_differ_on_transitional_states() {
        let payload = summary_json(2, &[("lan0", "Connect"), ("lan1", "Active")]);

        assert!(classify(&payload, "lan", PeerFailurePolicy::IdleOrWaiting)
            .unwrap()
            .is_empty());
        assert_eq!(
            classify(&payload, "lan", PeerFailurePolicy::NotEstablished).unwrap(),
            vec!["lan0", "lan1"]
        );
    }

    #[test]
    fn test_missing_address_family() {
        // bgpd answers with an empty object when no ipv4 unicast peers exist
        assert!(classify(b"{}", "lan", PeerFailurePolicy::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_payload() {
        let err = classify(b"% Unknown command", "lan", PeerFailurePolicy::default()).unwrap_err();
        assert!(matches!(err, NodeInitError::Decode(_)));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "idle-or-waiting".parse::<PeerFailurePolicy>().unwrap(),
            PeerFailurePolicy::IdleOrWaiting
        );
        assert_eq!(
            "Not-Established".parse::<PeerFailurePolicy>().unwrap(),
            PeerFailurePolicy::NotEstablished
        );
        assert!("whatever".parse::<PeerFailurePolicy>().is_err());
        assert_eq!(PeerFailurePolicy::NotEstablished.to_string(), "not-established");
    }
}
