//! Building [`ConnectionEntry`] values from ctnetlink message payloads.

use std::net::IpAddr;

use winnow::binary::{be_u16, le_u8};
use winnow::error::ContextError;
use winnow::prelude::*;

use super::types::{
    AddressFamily, ConnectionEntry, ConnectionStatus, ConnectionTuple, Counters, DccpState,
    IcmpInfo, IpProtocol, ProtocolState, SctpState, TcpState,
};
use super::*;
use crate::netlink::attr::{AttrIter, RawAttr, get};
use crate::netlink::error::{Error, Result};

type PResult<T> = core::result::Result<T, winnow::error::ErrMode<ContextError>>;

/// nfgenmsg header (4 bytes) preceding every ctnetlink attribute set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NfGenMsg {
    pub family: u8,
    pub version: u8,
    pub res_id: u16,
}

impl NfGenMsg {
    /// Size on the wire.
    pub const LEN: usize = 4;

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let family = le_u8.parse_next(input)?;
        let version = le_u8.parse_next(input)?;
        let res_id = be_u16.parse_next(input)?;
        Ok(Self {
            family,
            version,
            res_id,
        })
    }

    /// Split a message payload into its header and attribute bytes.
    pub fn split(payload: &[u8]) -> Result<(Self, &[u8])> {
        let mut input = payload;
        let header = Self::parse(&mut input).map_err(|_| {
            Error::MalformedMessage(format!(
                "nfgenmsg needs {} bytes, got {}",
                Self::LEN,
                payload.len()
            ))
        })?;
        Ok((header, input))
    }

    /// Encode for a request.
    pub fn to_bytes(&self) -> [u8; 4] {
        let res = self.res_id.to_be_bytes();
        [self.family, self.version, res[0], res[1]]
    }
}

/// Knobs for record building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOptions {
    require_counters: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            require_counters: true,
        }
    }
}

impl RecordOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry without counter groups is an
    /// [`Error::IncompleteRecord`].
    ///
    /// The kernel only emits counters while `nf_conntrack_acct` is enabled.
    /// With this off, missing counters read as zero.
    pub fn require_counters(mut self, require: bool) -> Self {
        self.require_counters = require;
        self
    }

    pub fn requires_counters(&self) -> bool {
        self.require_counters
    }
}

impl ConnectionEntry {
    /// Build an entry from one ctnetlink message payload (nfgenmsg plus
    /// attributes) using the default options.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        parse_entry(payload, RecordOptions::default())
    }
}

/// Build an entry from one ctnetlink message payload.
///
/// Unknown attributes are skipped at every level.
pub fn parse_entry(payload: &[u8], options: RecordOptions) -> Result<ConnectionEntry> {
    let (_nfmsg, attrs) = NfGenMsg::split(payload)?;

    let mut original = None;
    let mut reply = None;
    let mut protoinfo = None;
    let mut counters_orig = None;
    let mut counters_reply = None;
    let mut status = ConnectionStatus::empty();
    let mut timeout = None;
    let mut mark = None;
    let mut id = None;
    let mut zone = None;
    let mut use_count = None;

    for attr in AttrIter::new(attrs) {
        let attr = attr?;
        match attr.kind() {
            CTA_TUPLE_ORIG => original = Some(parse_tuple(&attr)?),
            CTA_TUPLE_REPLY => reply = Some(parse_tuple(&attr)?),
            CTA_STATUS => {
                status = ConnectionStatus::from_bits_retain(get::u32_be(attr.payload())?)
            }
            CTA_PROTOINFO => protoinfo = Some(attr),
            CTA_TIMEOUT => timeout = Some(get::u32_be(attr.payload())?),
            CTA_MARK => mark = Some(get::u32_be(attr.payload())?),
            CTA_COUNTERS_ORIG => counters_orig = Some(parse_counters(&attr)?),
            CTA_COUNTERS_REPLY => counters_reply = Some(parse_counters(&attr)?),
            CTA_USE => use_count = Some(get::u32_be(attr.payload())?),
            CTA_ID => id = Some(get::u32_be(attr.payload())?),
            CTA_ZONE => zone = Some(get::u16_be(attr.payload())?),
            _ => {}
        }
    }

    let original = original.ok_or(Error::IncompleteRecord("original tuple"))?;
    let reply = reply.ok_or(Error::IncompleteRecord("reply tuple"))?;

    let counters = match (counters_orig, counters_reply) {
        (Some((orig_packets, orig_bytes)), Some((reply_packets, reply_bytes))) => Counters {
            orig_packets,
            orig_bytes,
            reply_packets,
            reply_bytes,
        },
        (orig, reply) if !options.requires_counters() => {
            let (orig_packets, orig_bytes) = orig.unwrap_or_default();
            let (reply_packets, reply_bytes) = reply.unwrap_or_default();
            Counters {
                orig_packets,
                orig_bytes,
                reply_packets,
                reply_bytes,
            }
        }
        (None, _) => return Err(Error::IncompleteRecord("original counters")),
        (_, None) => return Err(Error::IncompleteRecord("reply counters")),
    };

    let protocol = original.protocol;
    let protocol_state = if protocol.is_stateful() {
        let attr = protoinfo.ok_or(Error::IncompleteRecord("protocol info"))?;
        Some(parse_protoinfo(&attr, protocol)?)
    } else {
        None
    };

    Ok(ConnectionEntry {
        original,
        reply,
        protocol_state,
        counters,
        timeout,
        status,
        mark,
        id,
        zone,
        use_count,
    })
}

fn parse_tuple(attr: &RawAttr<'_>) -> Result<ConnectionTuple> {
    let mut addrs = None;
    let mut proto = None;

    for nested in attr.nested() {
        let nested = nested?;
        match nested.kind() {
            CTA_TUPLE_IP => addrs = Some(parse_tuple_ip(&nested)?),
            CTA_TUPLE_PROTO => proto = Some(parse_tuple_proto(&nested)?),
            _ => {}
        }
    }

    let (family, src, dst) = addrs.ok_or(Error::IncompleteRecord("tuple addresses"))?;
    let proto = proto.ok_or(Error::IncompleteRecord("tuple protocol"))?;

    Ok(ConnectionTuple {
        family,
        protocol: proto.protocol,
        src,
        dst,
        src_port: proto.src_port,
        dst_port: proto.dst_port,
        icmp: proto.icmp,
    })
}

fn parse_tuple_ip(attr: &RawAttr<'_>) -> Result<(AddressFamily, IpAddr, IpAddr)> {
    let mut v4 = (None, None);
    let mut v6 = (None, None);

    for nested in attr.nested() {
        let nested = nested?;
        let data = nested.payload();
        match nested.kind() {
            CTA_IP_V4_SRC => v4.0 = Some(get::ipv4(data)?),
            CTA_IP_V4_DST => v4.1 = Some(get::ipv4(data)?),
            CTA_IP_V6_SRC => v6.0 = Some(get::ipv6(data)?),
            CTA_IP_V6_DST => v6.1 = Some(get::ipv6(data)?),
            _ => {}
        }
    }

    match (v4, v6) {
        ((Some(src), Some(dst)), _) => Ok((AddressFamily::Inet, src.into(), dst.into())),
        (_, (Some(src), Some(dst))) => Ok((AddressFamily::Inet6, src.into(), dst.into())),
        _ => Err(Error::IncompleteRecord("tuple addresses")),
    }
}

struct TupleProto {
    protocol: IpProtocol,
    src_port: u16,
    dst_port: u16,
    icmp: Option<IcmpInfo>,
}

fn parse_tuple_proto(attr: &RawAttr<'_>) -> Result<TupleProto> {
    let mut number = None;
    let mut src_port = 0;
    let mut dst_port = 0;
    let mut icmp_id = None;
    let mut icmp_type = None;
    let mut icmp_code = None;

    for nested in attr.nested() {
        let nested = nested?;
        let data = nested.payload();
        match nested.kind() {
            CTA_PROTO_NUM => number = Some(get::u8(data)?),
            CTA_PROTO_SRC_PORT => src_port = get::u16_be(data)?,
            CTA_PROTO_DST_PORT => dst_port = get::u16_be(data)?,
            CTA_PROTO_ICMP_ID | CTA_PROTO_ICMPV6_ID => icmp_id = Some(get::u16_be(data)?),
            CTA_PROTO_ICMP_TYPE | CTA_PROTO_ICMPV6_TYPE => icmp_type = Some(get::u8(data)?),
            CTA_PROTO_ICMP_CODE | CTA_PROTO_ICMPV6_CODE => icmp_code = Some(get::u8(data)?),
            _ => {}
        }
    }

    let protocol = IpProtocol::from_u8(number.ok_or(Error::IncompleteRecord("protocol number"))?);

    if protocol.is_icmp() {
        return Ok(TupleProto {
            protocol,
            src_port: icmp_id.unwrap_or(0),
            dst_port: 0,
            icmp: Some(IcmpInfo {
                kind: icmp_type.unwrap_or(0),
                code: icmp_code.unwrap_or(0),
            }),
        });
    }

    Ok(TupleProto {
        protocol,
        src_port,
        dst_port,
        icmp: None,
    })
}

fn parse_protoinfo(attr: &RawAttr<'_>, protocol: IpProtocol) -> Result<ProtocolState> {
    let group = match protocol {
        IpProtocol::Tcp => CTA_PROTOINFO_TCP,
        IpProtocol::Sctp => CTA_PROTOINFO_SCTP,
        _ => CTA_PROTOINFO_DCCP,
    };

    for nested in attr.nested() {
        let nested = nested?;
        if nested.kind() != group {
            continue;
        }
        for inner in nested.nested() {
            let inner = inner?;
            if inner.kind() == CTA_PROTOINFO_STATE {
                let raw = get::u8(inner.payload())?;
                return Ok(match protocol {
                    IpProtocol::Tcp => ProtocolState::Tcp(TcpState::from_u8(raw)),
                    IpProtocol::Sctp => ProtocolState::Sctp(SctpState::from_u8(raw)),
                    _ => ProtocolState::Dccp(DccpState::from_u8(raw)),
                });
            }
        }
    }

    Err(Error::IncompleteRecord("protocol state"))
}

/// Returns (packets, bytes).
fn parse_counters(attr: &RawAttr<'_>) -> Result<(u64, u64)> {
    let mut packets = 0;
    let mut bytes = 0;

    for nested in attr.nested() {
        let nested = nested?;
        let data = nested.payload();
        match nested.kind() {
            CTA_COUNTERS_PACKETS => packets = get::u64_be(data)?,
            CTA_COUNTERS_BYTES => bytes = get::u64_be(data)?,
            CTA_COUNTERS32_PACKETS => packets = u64::from(get::u32_be(data)?),
            CTA_COUNTERS32_BYTES => bytes = u64::from(get::u32_be(data)?),
            _ => {}
        }
    }

    Ok((packets, bytes))
}
