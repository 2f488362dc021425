//! Pod CIDR route reconciliation
//!
//! Makes sure the kernel holds a link-scoped route for the node's pod CIDR
//! on the pod link (usually `lo`), so the routing daemon can announce it.

use crate::{NodeInitError, Result};
use ipnetwork::Ipv4Network;
use std::io;
use std::str::FromStr;
use tracing::{debug, info};

/// Kernel route scope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteScope {
    Global,
    Link,
    Host,
    Other(u8),
}

/// One IPv4 route bound to a local interface
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Network,
    pub link_index: u32,
    pub scope: RouteScope,
}

/// Result of a successful reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Unchanged,
    Added,
}

/// Access to the kernel IPv4 routing table
pub trait RouteTable: Send + Sync {
    /// Resolve an interface name to its index
    fn link_index(&self, name: &str) -> io::Result<u32>;

    /// List the main table IPv4 routes leaving through the given link
    fn list_routes(&self, link_index: u32) -> io::Result<Vec<Route>>;

    /// Install a route, failing if the kernel rejects it
    fn add_route(&self, route: &Route) -> io::Result<()>;
}

/// Parse a pod CIDR as handed out by the cluster.
///
/// A prefix length is mandatory and only IPv4 is accepted. Host bits are
/// cleared in the returned network.
pub fn parse_pod_cidr(cidr: &str) -> Result<Ipv4Network> {
    let invalid = |reason: String| NodeInitError::InvalidCidr {
        cidr: cidr.to_string(),
        reason,
    };

    if !cidr.contains('/') {
        return Err(invalid("missing prefix length".to_string()));
    }
    let network = Ipv4Network::from_str(cidr).map_err(|e| invalid(e.to_string()))?;
    Ipv4Network::new(network.network(), network.prefix()).map_err(|e| invalid(e.to_string()))
}

/// Installs the pod CIDR route on the pod link
pub struct RouteReconciler {
    table: Box<dyn RouteTable>,
    link: String,
}

impl RouteReconciler {
    pub fn new(table: Box<dyn RouteTable>, link: impl Into<String>) -> Self {
        Self {
            table,
            link: link.into(),
        }
    }

    /// Add the route for `pod_cidr` unless one is already present.
    ///
    /// Existing routes match by their textual `addr/prefix` form only, so a
    /// CIDR with host bits set never matches the route installed for it.
    pub fn reconcile(&self, pod_cidr: &str) -> Result<RouteOutcome> {
        let destination = parse_pod_cidr(pod_cidr)?;

        let link_index =
            self.table
                .link_index(&self.link)
                .map_err(|source| NodeInitError::LinkNotFound {
                    link: self.link.clone(),
                    source,
                })?;

        let routes = self
            .table
            .list_routes(link_index)
            .map_err(|source| NodeInitError::RouteList {
                link: self.link.clone(),
                source,
            })?;
        debug!("Found {} routes on {}", routes.len(), self.link);

        if routes
            .iter()
            .any(|route| route.destination.to_string() == pod_cidr)
        {
            info!("Route for {} already exists", pod_cidr);
            return Ok(RouteOutcome::Unchanged);
        }

        let route = Route {
            destination,
            link_index,
            scope: RouteScope::Link,
        };
        self.table
            .add_route(&route)
            .map_err(|source| NodeInitError::RouteAdd {
                destination: destination.to_string(),
                link: self.link.clone(),
                source,
            })?;

        info!("Route for {} successfully added", pod_cidr);
        Ok(RouteOutcome::Added)
    }
}
