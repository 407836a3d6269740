//! Netlink message fixtures for testing.
//!
//! Conntrack payloads are hand-assembled in the layout ctnetlink emits, so
//! parsing can be tested without CAP_NET_ADMIN. Length and type fields are
//! native endian (little endian hosts); conntrack values are big endian.

use super::message::{NLM_F_MULTI, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, nlmsg_align};

/// `(NFNL_SUBSYS_CTNETLINK << 8) | IPCTNL_MSG_CT_NEW`, the type of every
/// dump reply.
pub const CT_NEW: u16 = 0x0100;

/// Frame `payload` as one netlink message.
pub fn message(msg_type: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut hdr = NlMsgHdr::new(msg_type, NLM_F_MULTI);
    hdr.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
    hdr.nlmsg_seq = seq;
    let mut buf = hdr.as_bytes().to_vec();
    buf.extend_from_slice(payload);
    buf.resize(nlmsg_align(buf.len()), 0);
    buf
}

/// `NLMSG_DONE` terminating a dump.
pub fn done(seq: u32) -> Vec<u8> {
    message(NlMsgType::DONE, seq, &0i32.to_ne_bytes())
}

/// `NLMSG_ERROR` carrying `code` (negative errno, or 0 for an ACK).
pub fn error(seq: u32, code: i32) -> Vec<u8> {
    let mut payload = code.to_ne_bytes().to_vec();
    payload.extend_from_slice(NlMsgHdr::new(0x0101, 0).as_bytes());
    message(NlMsgType::ERROR, seq, &payload)
}

/// Conntrack entry for a TCP handshake in SYN_RECV.
///
/// 10.0.0.1:51000 -> 10.0.0.2:443, 2 packets / 120 bytes original,
/// nothing in reply, timeout 60s, mark 0, use 1.
pub fn conntrack_tcp_syn_recv() -> Vec<u8> {
    vec![
        // nfgenmsg: family=AF_INET, version=NFNETLINK_V0, res_id=0
        0x02, 0x00, 0x00, 0x00,
        // CTA_TUPLE_ORIG (nested)
        0x34, 0x00, 0x01, 0x80, // len = 52, type = 1 | NLA_F_NESTED
        0x14, 0x00, 0x01, 0x80, // CTA_TUPLE_IP, len = 20
        0x08, 0x00, 0x01, 0x00, // CTA_IP_V4_SRC
        0x0a, 0x00, 0x00, 0x01, // 10.0.0.1
        0x08, 0x00, 0x02, 0x00, // CTA_IP_V4_DST
        0x0a, 0x00, 0x00, 0x02, // 10.0.0.2
        0x1c, 0x00, 0x02, 0x80, // CTA_TUPLE_PROTO, len = 28
        0x05, 0x00, 0x01, 0x00, // CTA_PROTO_NUM
        0x06, 0x00, 0x00, 0x00, // IPPROTO_TCP + padding
        0x06, 0x00, 0x02, 0x00, // CTA_PROTO_SRC_PORT
        0xc7, 0x38, 0x00, 0x00, // 51000 + padding
        0x06, 0x00, 0x03, 0x00, // CTA_PROTO_DST_PORT
        0x01, 0xbb, 0x00, 0x00, // 443 + padding
        // CTA_TUPLE_REPLY (nested)
        0x34, 0x00, 0x02, 0x80, // len = 52, type = 2 | NLA_F_NESTED
        0x14, 0x00, 0x01, 0x80, // CTA_TUPLE_IP, len = 20
        0x08, 0x00, 0x01, 0x00, // CTA_IP_V4_SRC
        0x0a, 0x00, 0x00, 0x02, // 10.0.0.2
        0x08, 0x00, 0x02, 0x00, // CTA_IP_V4_DST
        0x0a, 0x00, 0x00, 0x01, // 10.0.0.1
        0x1c, 0x00, 0x02, 0x80, // CTA_TUPLE_PROTO, len = 28
        0x05, 0x00, 0x01, 0x00, // CTA_PROTO_NUM
        0x06, 0x00, 0x00, 0x00, // IPPROTO_TCP + padding
        0x06, 0x00, 0x02, 0x00, // CTA_PROTO_SRC_PORT
        0x01, 0xbb, 0x00, 0x00, // 443 + padding
        0x06, 0x00, 0x03, 0x00, // CTA_PROTO_DST_PORT
        0xc7, 0x38, 0x00, 0x00, // 51000 + padding
        // CTA_STATUS = IPS_SEEN_REPLY | IPS_CONFIRMED
        0x08, 0x00, 0x03, 0x00,
        0x00, 0x00, 0x00, 0x0a,
        // CTA_PROTOINFO (nested)
        0x10, 0x00, 0x04, 0x80, // len = 16
        0x0c, 0x00, 0x01, 0x80, // CTA_PROTOINFO_TCP, len = 12
        0x05, 0x00, 0x01, 0x00, // CTA_PROTOINFO_TCP_STATE
        0x02, 0x00, 0x00, 0x00, // TCP_CONNTRACK_SYN_RECV + padding
        // CTA_TIMEOUT = 60
        0x08, 0x00, 0x07, 0x00,
        0x00, 0x00, 0x00, 0x3c,
        // CTA_MARK = 0
        0x08, 0x00, 0x08, 0x00,
        0x00, 0x00, 0x00, 0x00,
        // CTA_COUNTERS_ORIG (nested)
        0x1c, 0x00, 0x09, 0x80, // len = 28
        0x0c, 0x00, 0x01, 0x00, // CTA_COUNTERS_PACKETS
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
        0x0c, 0x00, 0x02, 0x00, // CTA_COUNTERS_BYTES
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x78,
        // CTA_COUNTERS_REPLY (nested)
        0x1c, 0x00, 0x0a, 0x80, // len = 28
        0x0c, 0x00, 0x01, 0x00, // CTA_COUNTERS_PACKETS
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x0c, 0x00, 0x02, 0x00, // CTA_COUNTERS_BYTES
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        // CTA_USE = 1
        0x08, 0x00, 0x0b, 0x00,
        0x00, 0x00, 0x00, 0x01,
        // CTA_ID
        0x08, 0x00, 0x0c, 0x00,
        0x12, 0x34, 0xab, 0xcd,
    ]
}

/// Conntrack entry for a UDP DNS query over IPv6, without counters.
///
/// [2001:db8::1]:53000 -> [2001:db8::53]:53, no protocol info.
pub fn conntrack_udp6_no_counters() -> Vec<u8> {
    vec![
        // nfgenmsg: family=AF_INET6
        0x0a, 0x00, 0x00, 0x00,
        // CTA_TUPLE_ORIG (nested)
        0x4c, 0x00, 0x01, 0x80, // len = 76
        0x2c, 0x00, 0x01, 0x80, // CTA_TUPLE_IP, len = 44
        0x14, 0x00, 0x03, 0x00, // CTA_IP_V6_SRC
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        0x14, 0x00, 0x04, 0x00, // CTA_IP_V6_DST
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x53,
        0x1c, 0x00, 0x02, 0x80, // CTA_TUPLE_PROTO, len = 28
        0x05, 0x00, 0x01, 0x00, // CTA_PROTO_NUM
        0x11, 0x00, 0x00, 0x00, // IPPROTO_UDP + padding
        0x06, 0x00, 0x02, 0x00, // CTA_PROTO_SRC_PORT
        0xcf, 0x08, 0x00, 0x00, // 53000 + padding
        0x06, 0x00, 0x03, 0x00, // CTA_PROTO_DST_PORT
        0x00, 0x35, 0x00, 0x00, // 53 + padding
        // CTA_TUPLE_REPLY (nested)
        0x4c, 0x00, 0x02, 0x80, // len = 76
        0x2c, 0x00, 0x01, 0x80, // CTA_TUPLE_IP, len = 44
        0x14, 0x00, 0x03, 0x00, // CTA_IP_V6_SRC
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x53,
        0x14, 0x00, 0x04, 0x00, // CTA_IP_V6_DST
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        0x1c, 0x00, 0x02, 0x80, // CTA_TUPLE_PROTO, len = 28
        0x05, 0x00, 0x01, 0x00, // CTA_PROTO_NUM
        0x11, 0x00, 0x00, 0x00, // IPPROTO_UDP + padding
        0x06, 0x00, 0x02, 0x00, // CTA_PROTO_SRC_PORT
        0x00, 0x35, 0x00, 0x00, // 53 + padding
        0x06, 0x00, 0x03, 0x00, // CTA_PROTO_DST_PORT
        0xcf, 0x08, 0x00, 0x00, // 53000 + padding
        // CTA_TIMEOUT = 30
        0x08, 0x00, 0x07, 0x00,
        0x00, 0x00, 0x00, 0x1e,
    ]
}
