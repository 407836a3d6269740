//! Connection tracking over `NETLINK_NETFILTER` (ctnetlink).
//!
//! # Example
//!
//! ```ignore
//! use ctlink::netlink::conntrack::{AddressFamily, Conntrack};
//!
//! let ct = Conntrack::new();
//! let table = ct.dump(AddressFamily::Inet).await?;
//! for entry in &table {
//!     println!("{:?} {} -> {}", entry.protocol(), entry.original.src, entry.original.dst);
//! }
//! ```

mod dump;
mod record;
mod types;

pub use dump::{Conntrack, DumpOptions, RetryBudget, TableCollector};
pub use record::{NfGenMsg, RecordOptions, parse_entry};
pub use types::{
    AddressFamily, ConnectionEntry, ConnectionStatus, ConnectionTable, ConnectionTuple, Counters,
    DccpState, IcmpInfo, IpProtocol, ProtocolState, SctpState, TcpState,
};

/// Netfilter netlink subsystem ID for conntrack.
pub const NFNL_SUBSYS_CTNETLINK: u16 = 1;

/// Conntrack message types (low byte of `nlmsg_type`).
pub const IPCTNL_MSG_CT_NEW: u16 = 0;
pub const IPCTNL_MSG_CT_GET: u16 = 1;

/// `nfgenmsg.version`.
pub const NFNETLINK_V0: u8 = 0;

// Top-level conntrack attributes
pub const CTA_TUPLE_ORIG: u16 = 1;
pub const CTA_TUPLE_REPLY: u16 = 2;
pub const CTA_STATUS: u16 = 3;
pub const CTA_PROTOINFO: u16 = 4;
pub const CTA_TIMEOUT: u16 = 7;
pub const CTA_MARK: u16 = 8;
pub const CTA_COUNTERS_ORIG: u16 = 9;
pub const CTA_COUNTERS_REPLY: u16 = 10;
pub const CTA_USE: u16 = 11;
pub const CTA_ID: u16 = 12;
pub const CTA_ZONE: u16 = 18;

// Tuple attributes
pub const CTA_TUPLE_IP: u16 = 1;
pub const CTA_TUPLE_PROTO: u16 = 2;

// IP attributes
pub const CTA_IP_V4_SRC: u16 = 1;
pub const CTA_IP_V4_DST: u16 = 2;
pub const CTA_IP_V6_SRC: u16 = 3;
pub const CTA_IP_V6_DST: u16 = 4;

// Protocol attributes
pub const CTA_PROTO_NUM: u16 = 1;
pub const CTA_PROTO_SRC_PORT: u16 = 2;
pub const CTA_PROTO_DST_PORT: u16 = 3;
pub const CTA_PROTO_ICMP_ID: u16 = 4;
pub const CTA_PROTO_ICMP_TYPE: u16 = 5;
pub const CTA_PROTO_ICMP_CODE: u16 = 6;
pub const CTA_PROTO_ICMPV6_ID: u16 = 7;
pub const CTA_PROTO_ICMPV6_TYPE: u16 = 8;
pub const CTA_PROTO_ICMPV6_CODE: u16 = 9;

// Protocol info attributes
pub const CTA_PROTOINFO_TCP: u16 = 1;
pub const CTA_PROTOINFO_DCCP: u16 = 2;
pub const CTA_PROTOINFO_SCTP: u16 = 3;

/// `CTA_PROTOINFO_{TCP,DCCP,SCTP}_STATE`, first attribute of each group.
pub const CTA_PROTOINFO_STATE: u16 = 1;

// Counter attributes
pub const CTA_COUNTERS_PACKETS: u16 = 1;
pub const CTA_COUNTERS_BYTES: u16 = 2;
pub const CTA_COUNTERS32_PACKETS: u16 = 3;
pub const CTA_COUNTERS32_BYTES: u16 = 4;

/// `nlmsg_type` of a conntrack dump request.
pub const fn ct_get_type() -> u16 {
    (NFNL_SUBSYS_CTNETLINK << 8) | IPCTNL_MSG_CT_GET
}
