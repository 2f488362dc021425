//! Node network initialization
//!
//! This library provides:
//! - Pod CIDR route installation on the node's loopback link
//! - BGP session health checks over the FRR control sockets
//! - Link level repair of broken sessions
//! - The periodic reconciliation loop driving all of the above

pub mod bgp;
pub mod config;
pub mod error;
pub mod netlink;
pub mod node;
pub mod reconciler;
pub mod repair;
pub mod route;
pub mod scheduler;
pub mod vtysh;

pub use bgp::{BgpSummary, PeerFailurePolicy, SessionChecker};
pub use config::DaemonConfig;
pub use error::{NodeInitError, Result};
pub use netlink::NetlinkRouteTable;
pub use node::{KubeNodeSource, NodeDescriptor, NodeSource};
pub use reconciler::{CycleReport, NodeReconciler, Reconcile};
pub use repair::{CommandRunner, SessionRepairer, SystemCommandRunner};
pub use route::{RouteOutcome, RouteReconciler, RouteTable};
pub use scheduler::Scheduler;
pub use vtysh::{VtyConfig, VtyshClient};
