//! Netlink request encoding.
//!
//! Builds one `nlmsghdr`-framed message. The header is kept apart from the
//! body and only serialized by [`MessageBuilder::finish`], once the total
//! length is known. Tests use the same builder to assemble synthetic
//! kernel replies.

use bytes::{BufMut, BytesMut};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, nla_align};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Open nested attribute, closed by [`MessageBuilder::nest_end`].
#[derive(Debug, Clone, Copy)]
#[must_use = "a nested attribute must be closed with nest_end"]
pub struct NestToken {
    /// Body offset of the nest's attribute header.
    offset: usize,
}

/// Builder for one netlink message.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    header: NlMsgHdr,
    body: BytesMut,
}

impl MessageBuilder {
    /// Start a message with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            header: NlMsgHdr::new(msg_type, flags),
            body: BytesMut::new(),
        }
    }

    /// Total message length so far, header included.
    pub fn len(&self) -> usize {
        NLMSG_HDRLEN + self.body.len()
    }

    /// True while nothing follows the header.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Append a family header such as `nfgenmsg`, padded to 4 bytes.
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.body.put_slice(data);
        self.pad(nlmsg_align(self.body.len()));
    }

    /// Append an attribute.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        self.put_attr_header(attr_type, NLA_HDRLEN + data.len());
        self.body.put_slice(data);
        self.pad(nla_align(self.body.len()));
    }

    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) {
        self.append_attr(attr_type, &[value]);
    }

    /// Append a u16 attribute in network byte order.
    pub fn append_attr_u16_be(&mut self, attr_type: u16, value: u16) {
        self.append_attr(attr_type, &value.to_be_bytes());
    }

    /// Append a u32 attribute in network byte order.
    pub fn append_attr_u32_be(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_be_bytes());
    }

    /// Append a u64 attribute in network byte order.
    pub fn append_attr_u64_be(&mut self, attr_type: u16, value: u64) {
        self.append_attr(attr_type, &value.to_be_bytes());
    }

    /// Open a nested attribute; everything appended until the matching
    /// [`nest_end`](Self::nest_end) becomes its payload.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.body.len();
        self.put_attr_header(attr_type | NLA_F_NESTED, NLA_HDRLEN);
        NestToken { offset }
    }

    /// Close a nested attribute and patch its length.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = (self.body.len() - token.offset) as u16;
        self.body[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes());
        self.pad(nla_align(self.body.len()));
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.header.nlmsg_seq = seq;
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.header.nlmsg_pid = pid;
    }

    /// Serialize header and body.
    pub fn finish(mut self) -> Vec<u8> {
        self.header.nlmsg_len = self.len() as u32;
        let mut msg = Vec::with_capacity(self.len());
        msg.extend_from_slice(self.header.as_bytes());
        msg.resize(NLMSG_HDRLEN, 0);
        msg.extend_from_slice(&self.body);
        msg
    }

    fn put_attr_header(&mut self, attr_type: u16, len: usize) {
        self.body.put_u16_ne(len as u16);
        self.body.put_u16_ne(attr_type);
    }

    fn pad(&mut self, to: usize) {
        self.body.resize(to, 0);
    }
}
