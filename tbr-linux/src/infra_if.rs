//! Infrastructure interface: raw ICMPv6 socket bound to one interface,
//! plus the interface's index, MAC and IPv6 addresses from /sys and /proc.

use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tbr_core::infra::{InfraIf, SendError};
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

/// ND messages must be sent and received with hop limit 255.
const ND_HOP_LIMIT: u32 = 255;
const MAX_PACKET_SIZE: usize = 1500;
const IF_INET6_PATH: &str = "/proc/net/if_inet6";

pub type RawSocket = Arc<AsyncFd<Socket>>;

pub struct LinuxInfraIf {
    name: String,
    index: u32,
    link_layer_address: Option<Vec<u8>>,
    addresses: Vec<Ipv6Addr>,
    socket: RawSocket,
}

impl LinuxInfraIf {
    /// Opens the ICMPv6 socket on `name`. Needs CAP_NET_RAW.
    pub fn open(name: &str) -> io::Result<Self> {
        let index = read_sys_attr(name, "ifindex")?
            .trim()
            .parse::<u32>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let link_layer_address = read_sys_attr(name, "address").ok().and_then(|s| parse_mac(&s));

        let socket = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))?;
        socket.bind_device(Some(name.as_bytes()))?;
        socket.set_multicast_if_v6(index)?;
        socket.set_multicast_hops_v6(ND_HOP_LIMIT)?;
        socket.set_unicast_hops_v6(ND_HOP_LIMIT)?;
        socket.set_multicast_loop_v6(false)?;
        // Non-blocking so the tokio reactor can poll it
        socket.set_nonblocking(true)?;

        let mut infra_if = Self {
            name: name.to_string(),
            index,
            link_layer_address,
            addresses: Vec::new(),
            socket: Arc::new(AsyncFd::new(socket)?),
        };
        infra_if.refresh_addresses();
        debug!(
            "infra if {} (index {}) has {} addresses",
            infra_if.name,
            infra_if.index,
            infra_if.addresses.len()
        );
        Ok(infra_if)
    }

    pub fn socket(&self) -> RawSocket {
        self.socket.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh_addresses(&mut self) {
        match std::fs::read_to_string(IF_INET6_PATH) {
            Ok(contents) => self.addresses = parse_if_inet6(&contents, &self.name),
            Err(e) => warn!("failed to read {}: {}", IF_INET6_PATH, e),
        }
    }
}

impl InfraIf for LinuxInfraIf {
    fn send(&mut self, packet: &[u8], dest: &Ipv6Addr) -> Result<(), SendError> {
        let scope_id = if dest.is_multicast() || tbr_core::ip6::is_link_local(dest) {
            self.index
        } else {
            0
        };
        let addr = SockAddr::from(SocketAddrV6::new(*dest, 0, 0, scope_id));
        self.socket.get_ref().send_to(packet, &addr)?;
        Ok(())
    }

    fn link_layer_address(&self) -> Option<Vec<u8>> {
        self.link_layer_address.clone()
    }

    fn has_address(&self, addr: &Ipv6Addr) -> bool {
        self.addresses.contains(addr)
    }
}

/// Waits for the next ICMPv6 packet. Returns the packet (starting at the
/// ICMPv6 header) and its source address.
pub async fn recv(socket: &AsyncFd<Socket>) -> io::Result<(Vec<u8>, Ipv6Addr)> {
    loop {
        let mut guard = socket.readable().await?;
        match guard.try_io(|inner| recv_packet(inner.get_ref())) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

fn recv_packet(socket: &Socket) -> io::Result<(Vec<u8>, Ipv6Addr)> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let uninit = unsafe {
        // socket2 wants a MaybeUninit slice; ours is zeroed.
        &mut *(buf.as_mut_slice() as *mut [u8] as *mut [MaybeUninit<u8>])
    };
    let (len, from) = socket.recv_from(uninit)?;
    buf.truncate(len);
    let src = from
        .as_socket_ipv6()
        .map(|a| *a.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IPv6 source address"))?;
    Ok((buf, src))
}

fn read_sys_attr(name: &str, attr: &str) -> io::Result<String> {
    std::fs::read_to_string(format!("/sys/class/net/{}/{}", name, attr))
}

/// `aa:bb:cc:dd:ee:ff` to bytes.
fn parse_mac(s: &str) -> Option<Vec<u8>> {
    let bytes = hex::decode(s.trim().replace(':', "")).ok()?;
    (!bytes.is_empty() && bytes.iter().any(|&b| b != 0)).then_some(bytes)
}

/// Addresses of `ifname` from /proc/net/if_inet6 lines:
/// `<32 hex digits> <index> <prefix len> <scope> <flags> <name>`.
fn parse_if_inet6(contents: &str, ifname: &str) -> Vec<Ipv6Addr> {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 6 || fields[5] != ifname {
                return None;
            }
            let bytes: [u8; 16] = hex::decode(fields[0]).ok()?.try_into().ok()?;
            Some(Ipv6Addr::from(bytes))
        })
        .collect()
}
