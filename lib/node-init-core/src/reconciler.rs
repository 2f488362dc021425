//! One reconciliation cycle for the local node

use crate::bgp::SessionChecker;
use crate::config::DaemonConfig;
use crate::node::NodeSource;
use crate::repair::{CommandRunner, SessionRepairer};
use crate::route::{RouteOutcome, RouteReconciler, RouteTable};
use crate::vtysh::VtyshClient;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// What a successful cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub node: String,
    pub route: RouteOutcome,
    /// Interfaces that went through a repair
    pub repaired: Vec<String>,
}

/// A unit of work the scheduler drives periodically
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self) -> Result<CycleReport>;
}

/// Route and BGP session reconciliation for one node
pub struct NodeReconciler {
    node_name: String,
    nodes: Arc<dyn NodeSource>,
    routes: RouteReconciler,
    sessions: SessionChecker,
    repairer: SessionRepairer,
}

impl NodeReconciler {
    pub fn new(
        config: &DaemonConfig,
        nodes: Arc<dyn NodeSource>,
        table: Box<dyn RouteTable>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            node_name: config.node_name.clone(),
            nodes,
            routes: RouteReconciler::new(table, config.pod_link.clone()),
            sessions: SessionChecker::new(
                VtyshClient::new(config.vty.clone()),
                config.interface_filter.clone(),
                config.peer_failure_policy,
            ),
            repairer: SessionRepairer::new(runner),
        }
    }
}

#[async_trait]
impl Reconcile for NodeReconciler {
    async fn reconcile(&self) -> Result<CycleReport> {
        let node = self.nodes.fetch(&self.node_name).await?;
        debug!("Reconciling node {} with pod CIDR {}", node.name, node.pod_cidr);

        let route = self.routes.reconcile(&node.pod_cidr)?;

        let failed = self.sessions.failed_interfaces().await?;
        if failed.is_empty() {
            debug!("No broken BGP sessions");
        }
        for interface in &failed {
            self.repairer.repair(interface).await?;
        }

        info!(
            node = %self.node_name,
            route = ?route,
            repaired = failed.len(),
            "Reconciliation finished"
        );

        Ok(CycleReport {
            node: self.node_name.clone(),
            route,
            repaired: failed,
        })
    }
}
