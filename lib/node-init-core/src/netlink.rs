//! Kernel routing table over rtnetlink

use crate::route::{Route, RouteScope, RouteTable};
use ipnetwork::Ipv4Network;
use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP,
    NLM_F_EXCL, NLM_F_REQUEST,
};
use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope as KernelScope,
    RouteType,
};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace};

const RT_TABLE_MAIN: u8 = 254;

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// RouteTable talking to the kernel through a NETLINK_ROUTE socket.
///
/// A fresh socket is opened per request; requests are strictly sequential.
#[derive(Default)]
pub struct NetlinkRouteTable {
    sequence: AtomicU32,
}

impl NetlinkRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> io::Result<Socket> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;
        Ok(socket)
    }

    /// Send one request and collect every reply message up to the final
    /// `NLMSG_DONE` or acknowledgement.
    fn request(
        &self,
        flags: u16,
        message: RouteNetlinkMessage,
    ) -> io::Result<Vec<RouteNetlinkMessage>> {
        let socket = self.open()?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let mut header = NetlinkHeader::default();
        header.flags = flags;
        header.sequence_number = sequence;

        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
        packet.finalize();
        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf);
        socket.send(&buf, 0)?;

        let mut replies = Vec::new();
        let mut buf = Vec::with_capacity(RECV_BUFFER_SIZE);
        loop {
            buf.clear();
            let len = socket.recv(&mut buf, 0)?;
            let mut offset = 0;

            while offset < len {
                let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buf[offset..])
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                let msg_len = msg.header.length as usize;
                if msg_len == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "zero length netlink message",
                    ));
                }
                offset += msg_len;
                // netlink messages are 4 byte aligned
                offset = (offset + 3) & !3;

                if msg.header.sequence_number != sequence {
                    trace!(sequence = msg.header.sequence_number, "Skipping unrelated netlink message");
                    continue;
                }

                match msg.payload {
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::Error(err) => {
                        return match err.code {
                            Some(code) => Err(io::Error::from_raw_os_error(-code.get())),
                            // acknowledgement
                            None => Ok(replies),
                        };
                    }
                    NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                    _ => {}
                }
            }
        }
    }
}

impl RouteTable for NetlinkRouteTable {
    fn link_index(&self, name: &str) -> io::Result<u32> {
        let index = nix::net::if_::if_nametoindex(name)?;
        Ok(index)
    }

    fn list_routes(&self, link_index: u32) -> io::Result<Vec<Route>> {
        let mut message = RouteMessage::default();
        message.header.address_family = AddressFamily::Inet;

        let replies = self.request(
            NLM_F_REQUEST | NLM_F_DUMP,
            RouteNetlinkMessage::GetRoute(message),
        )?;

        let routes: Vec<Route> = replies
            .into_iter()
            .filter_map(|reply| match reply {
                RouteNetlinkMessage::NewRoute(route) => route_from_message(&route),
                _ => None,
            })
            .filter(|route| route.link_index == link_index)
            .collect();

        debug!(link_index, count = routes.len(), "Listed IPv4 routes");
        Ok(routes)
    }

    fn add_route(&self, route: &Route) -> io::Result<()> {
        self.request(
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            RouteNetlinkMessage::NewRoute(route_message(route)),
        )?;

        debug!(destination = %route.destination, link_index = route.link_index, "Added route");
        Ok(())
    }
}

/// Build the RTM_NEWROUTE payload for a main table unicast route
fn route_message(route: &Route) -> RouteMessage {
    let mut message = RouteMessage::default();
    message.header.address_family = AddressFamily::Inet;
    message.header.destination_prefix_length = route.destination.prefix();
    message.header.table = RT_TABLE_MAIN;
    message.header.protocol = RouteProtocol::Boot;
    message.header.scope = kernel_scope(route.scope);
    message.header.kind = RouteType::Unicast;
    message
        .attributes
        .push(RouteAttribute::Destination(RouteAddress::Inet(route.destination.network())));
    message.attributes.push(RouteAttribute::Oif(route.link_index));
    message
}

fn kernel_scope(scope: RouteScope) -> KernelScope {
    match scope {
        RouteScope::Global => KernelScope::Universe,
        RouteScope::Link => KernelScope::Link,
        RouteScope::Host => KernelScope::Host,
        RouteScope::Other(value) => KernelScope::from(value),
    }
}

fn route_scope(scope: KernelScope) -> RouteScope {
    match scope {
        KernelScope::Universe => RouteScope::Global,
        KernelScope::Link => RouteScope::Link,
        KernelScope::Host => RouteScope::Host,
        other => RouteScope::Other(u8::from(other)),
    }
}

/// Convert a main table IPv4 route dump entry, skipping everything else
fn route_from_message(message: &RouteMessage) -> Option<Route> {
    if message.header.address_family != AddressFamily::Inet {
        return None;
    }

    let mut table = u32::from(message.header.table);
    let mut destination = None;
    let mut link_index = None;
    for attribute in &message.attributes {
        match attribute {
            RouteAttribute::Table(id) => table = *id,
            RouteAttribute::Destination(RouteAddress::Inet(addr)) => destination = Some(*addr),
            RouteAttribute::Oif(index) => link_index = Some(*index),
            _ => {}
        }
    }

    if table != u32::from(RT_TABLE_MAIN) {
        return None;
    }

    // the default route carries no destination attribute
    let address = destination.unwrap_or(std::net::Ipv4Addr::UNSPECIFIED);
    let destination = Ipv4Network::new(address, message.header.destination_prefix_length).ok()?;

    Some(Route {
        destination,
        link_index: link_index?,
        scope: route_scope(message.header.scope),
    })
}
