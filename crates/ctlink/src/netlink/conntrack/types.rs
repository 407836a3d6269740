//! Connection tracking data model.

use std::fmt;
use std::net::IpAddr;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Address family of a dump or tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum AddressFamily {
    /// IPv4 (AF_INET), 4-byte addresses.
    Inet,
    /// IPv6 (AF_INET6), 16-byte addresses.
    Inet6,
}

impl AddressFamily {
    /// The `AF_*` value used in `nfgenmsg`.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Inet => libc::AF_INET as u8,
            Self::Inet6 => libc::AF_INET6 as u8,
        }
    }

    /// Map an `AF_*` value.
    pub fn from_u8(val: u8) -> Option<Self> {
        match i32::from(val) {
            libc::AF_INET => Some(Self::Inet),
            libc::AF_INET6 => Some(Self::Inet6),
            _ => None,
        }
    }

    /// Lowercase name (`ipv4` / `ipv6`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Inet => "ipv4",
            Self::Inet6 => "ipv6",
        }
    }
}

/// IP protocol numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum IpProtocol {
    /// ICMP (1)
    Icmp,
    /// TCP (6)
    Tcp,
    /// UDP (17)
    Udp,
    /// DCCP (33)
    Dccp,
    /// GRE (47)
    Gre,
    /// ICMPv6 (58)
    Icmpv6,
    /// SCTP (132)
    Sctp,
    /// UDP-Lite (136)
    UdpLite,
    /// Other protocol
    Other(u8),
}

impl IpProtocol {
    /// Map a protocol number.
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            33 => Self::Dccp,
            47 => Self::Gre,
            58 => Self::Icmpv6,
            132 => Self::Sctp,
            136 => Self::UdpLite,
            other => Self::Other(other),
        }
    }

    /// Get the protocol number.
    pub fn number(&self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Dccp => 33,
            Self::Gre => 47,
            Self::Icmpv6 => 58,
            Self::Sctp => 132,
            Self::UdpLite => 136,
            Self::Other(n) => *n,
        }
    }

    /// Lowercase protocol name, `unknown` for unnamed numbers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Dccp => "dccp",
            Self::Gre => "gre",
            Self::Icmpv6 => "icmpv6",
            Self::Sctp => "sctp",
            Self::UdpLite => "udplite",
            Self::Other(_) => "unknown",
        }
    }

    /// Whether conntrack keeps per-connection protocol state for it.
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::Tcp | Self::Sctp | Self::Dccp)
    }

    /// Whether the tuple carries an ICMP id/type/code instead of ports.
    pub fn is_icmp(&self) -> bool {
        matches!(self, Self::Icmp | Self::Icmpv6)
    }
}

/// TCP connection tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TcpState {
    None,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
    Close,
    Listen,
    SynSent2,
    /// A state byte this library does not know.
    Unknown(u8),
}

impl TcpState {
    /// Map the raw `CTA_PROTOINFO_TCP_STATE` byte.
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::None,
            1 => Self::SynSent,
            2 => Self::SynRecv,
            3 => Self::Established,
            4 => Self::FinWait,
            5 => Self::CloseWait,
            6 => Self::LastAck,
            7 => Self::TimeWait,
            8 => Self::Close,
            9 => Self::Listen,
            10 => Self::SynSent2,
            other => Self::Unknown(other),
        }
    }

    /// Uppercase label as printed by conntrack tools.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::Listen => "LISTEN",
            Self::SynSent2 => "SYN_SENT2",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// SCTP connection tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SctpState {
    None,
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownSent,
    ShutdownRecd,
    ShutdownAckSent,
    HeartbeatSent,
    HeartbeatAcked,
    Unknown(u8),
}

impl SctpState {
    /// Map the raw `CTA_PROTOINFO_SCTP_STATE` byte.
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::None,
            1 => Self::Closed,
            2 => Self::CookieWait,
            3 => Self::CookieEchoed,
            4 => Self::Established,
            5 => Self::ShutdownSent,
            6 => Self::ShutdownRecd,
            7 => Self::ShutdownAckSent,
            8 => Self::HeartbeatSent,
            9 => Self::HeartbeatAcked,
            other => Self::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Closed => "CLOSED",
            Self::CookieWait => "COOKIE_WAIT",
            Self::CookieEchoed => "COOKIE_ECHOED",
            Self::Established => "ESTABLISHED",
            Self::ShutdownSent => "SHUTDOWN_SENT",
            Self::ShutdownRecd => "SHUTDOWN_RECD",
            Self::ShutdownAckSent => "SHUTDOWN_ACK_SENT",
            Self::HeartbeatSent => "HEARTBEAT_SENT",
            Self::HeartbeatAcked => "HEARTBEAT_ACKED",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// DCCP connection tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum DccpState {
    None,
    Request,
    Respond,
    PartOpen,
    Open,
    CloseReq,
    Closing,
    TimeWait,
    Ignore,
    Invalid,
    Unknown(u8),
}

impl DccpState {
    /// Map the raw `CTA_PROTOINFO_DCCP_STATE` byte.
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::None,
            1 => Self::Request,
            2 => Self::Respond,
            3 => Self::PartOpen,
            4 => Self::Open,
            5 => Self::CloseReq,
            6 => Self::Closing,
            7 => Self::TimeWait,
            8 => Self::Ignore,
            9 => Self::Invalid,
            other => Self::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Request => "REQUEST",
            Self::Respond => "RESPOND",
            Self::PartOpen => "PARTOPEN",
            Self::Open => "OPEN",
            Self::CloseReq => "CLOSEREQ",
            Self::Closing => "CLOSING",
            Self::TimeWait => "TIMEWAIT",
            Self::Ignore => "IGNORE",
            Self::Invalid => "INVALID",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Per-protocol connection state, present only for stateful protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ProtocolState {
    Tcp(TcpState),
    Sctp(SctpState),
    Dccp(DccpState),
}

impl ProtocolState {
    /// Uppercase state label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tcp(s) => s.label(),
            Self::Sctp(s) => s.label(),
            Self::Dccp(s) => s.label(),
        }
    }

    /// Whether the kernel sent a state byte outside the known table.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            Self::Tcp(TcpState::Unknown(_))
                | Self::Sctp(SctpState::Unknown(_))
                | Self::Dccp(DccpState::Unknown(_))
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// ICMP type and code of an ICMP/ICMPv6 tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct IcmpInfo {
    pub kind: u8,
    pub code: u8,
}

/// One direction of a tracked connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConnectionTuple {
    /// Address family of both addresses.
    pub family: AddressFamily,
    /// Layer 4 protocol.
    pub protocol: IpProtocol,
    /// Source address.
    pub src: IpAddr,
    /// Destination address.
    pub dst: IpAddr,
    /// Source port, or the ICMP identifier.
    pub src_port: u16,
    /// Destination port, 0 for ICMP.
    pub dst_port: u16,
    /// ICMP type and code, for ICMP tuples.
    pub icmp: Option<IcmpInfo>,
}

/// Packet and byte counters of both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Counters {
    pub orig_packets: u64,
    pub orig_bytes: u64,
    pub reply_packets: u64,
    pub reply_bytes: u64,
}

bitflags::bitflags! {
    /// Conntrack status bits (`IPS_*`).
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize))]
    pub struct ConnectionStatus: u32 {
        const EXPECTED = 1 << 0;
        const SEEN_REPLY = 1 << 1;
        const ASSURED = 1 << 2;
        const CONFIRMED = 1 << 3;
        const SRC_NAT = 1 << 4;
        const DST_NAT = 1 << 5;
        const SEQ_ADJUST = 1 << 6;
        const SRC_NAT_DONE = 1 << 7;
        const DST_NAT_DONE = 1 << 8;
        const DYING = 1 << 9;
        const FIXED_TIMEOUT = 1 << 10;
        const TEMPLATE = 1 << 11;
        const UNTRACKED = 1 << 12;
        const HELPER = 1 << 13;
        const OFFLOAD = 1 << 14;
        const HW_OFFLOAD = 1 << 15;

        // Kernels add bits; keep whatever arrives.
        const _ = !0;
    }
}

/// A connection tracking entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConnectionEntry {
    /// Original direction tuple.
    pub original: ConnectionTuple,
    /// Reply direction tuple.
    pub reply: ConnectionTuple,
    /// Protocol state; `None` for stateless protocols.
    pub protocol_state: Option<ProtocolState>,
    /// Packet/byte counters.
    pub counters: Counters,
    /// Seconds until the kernel expires the entry.
    pub timeout: Option<u32>,
    /// Status bits.
    pub status: ConnectionStatus,
    /// Connection mark.
    pub mark: Option<u32>,
    /// Kernel entry ID.
    pub id: Option<u32>,
    /// Conntrack zone.
    pub zone: Option<u16>,
    /// Reference count.
    pub use_count: Option<u32>,
}

impl ConnectionEntry {
    /// Layer 4 protocol, taken from the original tuple.
    pub fn protocol(&self) -> IpProtocol {
        self.original.protocol
    }

    /// Address family, taken from the original tuple.
    pub fn family(&self) -> AddressFamily {
        self.original.family
    }

    pub fn is_assured(&self) -> bool {
        self.status.contains(ConnectionStatus::ASSURED)
    }

    /// No packet has been seen in the reply direction yet.
    pub fn is_unreplied(&self) -> bool {
        !self.status.contains(ConnectionStatus::SEEN_REPLY)
    }
}

/// Result of one table dump, in kernel dump order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConnectionTable {
    entries: Vec<ConnectionEntry>,
    skipped: usize,
}

impl ConnectionTable {
    pub(crate) fn new(entries: Vec<ConnectionEntry>, skipped: usize) -> Self {
        Self { entries, skipped }
    }

    /// Entries in arrival order.
    pub fn entries(&self) -> &[ConnectionEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records dropped because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConnectionEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<ConnectionEntry> {
        self.entries
    }
}

impl From<Vec<ConnectionEntry>> for ConnectionTable {
    fn from(entries: Vec<ConnectionEntry>) -> Self {
        Self::new(entries, 0)
    }
}

impl IntoIterator for ConnectionTable {
    type Item = ConnectionEntry;
    type IntoIter = std::vec::IntoIter<ConnectionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConnectionTable {
    type Item = &'a ConnectionEntry;
    type IntoIter = std::slice::Iter<'a, ConnectionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
