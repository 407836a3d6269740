//! Netlink attribute (nlattr) decoding.
//!
//! Attributes are TLVs: a 4-byte header (`nla_len`, `nla_type`, native
//! endian) followed by the payload, padded to a 4-byte boundary. The
//! conntrack subsystem nests them two levels deep (tuple -> ip/proto,
//! protoinfo -> tcp), so a payload can itself be walked with
//! [`RawAttr::nested`].

use std::net::{Ipv4Addr, Ipv6Addr};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Read a header from the front of `data`.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| {
                Error::MalformedMessage(format!(
                    "attribute header needs {} bytes, {} remaining",
                    NLA_HDRLEN,
                    data.len()
                ))
            })
    }
}

/// One decoded attribute, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttr<'a> {
    nla_type: u16,
    payload: &'a [u8],
}

impl<'a> RawAttr<'a> {
    /// Attribute type tag with the nested/byte-order flags masked off.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Whether the sender flagged this attribute as nested.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Whether the sender flagged the payload as network byte order.
    pub fn is_net_byteorder(&self) -> bool {
        self.nla_type & NLA_F_NET_BYTEORDER != 0
    }

    /// Payload without header or trailing padding.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Walk the payload as a nested attribute set.
    ///
    /// Conntrack does not always set `NLA_F_NESTED`, so this does not
    /// check the flag.
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::new(self.payload)
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Yields an error for a header or length that does not fit the buffer and
/// then stops; unknown type tags are yielded like any other attribute.
pub struct AttrIter<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.failed || self.data.is_empty()
    }

    fn fail(&mut self, err: Error) -> Option<Result<RawAttr<'a>>> {
        self.failed = true;
        self.data = &[];
        Some(Err(err))
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<RawAttr<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            return None;
        }

        let attr = match NlAttr::read_from(self.data) {
            Ok(a) => a,
            Err(e) => return self.fail(e),
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN {
            return self.fail(Error::MalformedMessage(format!(
                "attribute type {} has length {} shorter than its header",
                attr.kind(),
                len
            )));
        }
        if len > self.data.len() {
            return self.fail(Error::TruncatedAttribute {
                kind: attr.kind(),
                declared: len,
                remaining: self.data.len(),
            });
        }

        let payload = &self.data[NLA_HDRLEN..len];

        // The final attribute may come without its padding.
        let aligned_len = nla_align(len);
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok(RawAttr {
            nla_type: attr.nla_type,
            payload,
        }))
    }
}

/// Decode a whole attribute set, failing on the first bad attribute.
pub fn decode_attrs(data: &[u8]) -> Result<Vec<RawAttr<'_>>> {
    AttrIter::new(data).collect()
}

/// Helper functions for extracting typed values from attribute payloads.
///
/// Every accessor requires the exact width; conntrack numbers are big
/// endian on the wire.
pub mod get {
    use super::*;

    fn fixed<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        <[u8; N]>::try_from(data).map_err(|_| {
            Error::MalformedMessage(format!(
                "{} attribute must be {} bytes, got {}",
                what,
                N,
                data.len()
            ))
        })
    }

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        Ok(fixed::<1>(data, "u8")?[0])
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        fixed(data, "u16").map(u16::from_ne_bytes)
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        fixed(data, "u32").map(u32::from_ne_bytes)
    }

    /// Extract a u16 value (big endian / network order).
    pub fn u16_be(data: &[u8]) -> Result<u16> {
        fixed(data, "u16").map(u16::from_be_bytes)
    }

    /// Extract a u32 value (big endian / network order).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        fixed(data, "u32").map(u32::from_be_bytes)
    }

    /// Extract a u64 value (big endian / network order).
    pub fn u64_be(data: &[u8]) -> Result<u64> {
        fixed(data, "u64").map(u64::from_be_bytes)
    }

    /// Extract an IPv4 address.
    pub fn ipv4(data: &[u8]) -> Result<Ipv4Addr> {
        fixed::<4>(data, "IPv4 address").map(Ipv4Addr::from)
    }

    /// Extract an IPv6 address.
    pub fn ipv6(data: &[u8]) -> Result<Ipv6Addr> {
        fixed::<16>(data, "IPv6 address").map(Ipv6Addr::from)
    }
}
