//! Network derived from a lookup: the queried address plus the prefix
//! length of the record that matched it.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

/// Address + prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    ip: IpAddr,
    prefix_len: u8,
}

impl Network {
    /// Create a network; the prefix is clamped to the address width
    pub fn new(ip: IpAddr, prefix_len: u8) -> Self {
        let max = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            ip,
            prefix_len: prefix_len.min(max),
        }
    }

    /// The address the network was built from (not masked)
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Number of leading bits that define the network
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// First address of the network (the address with host bits cleared)
    pub fn network_address(&self) -> IpAddr {
        self.to_ipnet().network()
    }

    /// The network as an `ipnet` value, host bits cleared
    pub fn to_ipnet(&self) -> IpNet {
        // prefix_len is clamped in new(), so construction cannot fail
        match self.ip {
            IpAddr::V4(v4) => Ipv4Net::new(v4, self.prefix_len)
                .map(|n| IpNet::V4(n.trunc()))
                .unwrap_or_else(|_| IpNet::V4(Ipv4Net::from(v4))),
            IpAddr::V6(v6) => Ipv6Net::new(v6, self.prefix_len)
                .map(|n| IpNet::V6(n.trunc()))
                .unwrap_or_else(|_| IpNet::V6(Ipv6Net::from(v6))),
        }
    }

    /// True if `ip` falls inside this network
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.to_ipnet().contains(ip)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_address(), self.prefix_len)
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<IpNet> for Network {
    fn from(net: IpNet) -> Self {
        Self::new(net.addr(), net.prefix_len())
    }
}
