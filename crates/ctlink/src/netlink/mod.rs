//! Async ctnetlink implementation for Linux.
//!
//! Everything below speaks the raw `NETLINK_NETFILTER` wire format; there is
//! no external conntrack binding.
//!
//! # Quick Start
//!
//! ```ignore
//! use ctlink::netlink::conntrack::{AddressFamily, Conntrack};
//!
//! let ct = Conntrack::new();
//! let table = ct.dump(AddressFamily::Inet).await?;
//! println!("{} tracked connections", table.count());
//! ```
//!
//! # Layers
//!
//! - [`attr`] decodes netlink attribute TLVs.
//! - [`message`] frames `nlmsghdr` messages and error payloads.
//! - [`builder`] encodes requests.
//! - [`socket`] and [`connection`] drive a dump over the kernel channel.
//! - [`conntrack`] turns dump messages into connection records.

pub mod attr;
pub mod builder;
pub mod connection;
pub mod conntrack;
pub mod error;
pub mod message;
pub mod socket;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::MessageBuilder;
pub use connection::Connection;
pub use error::{Error, Result};
pub use message::{MessageIter, NlMsgHdr};
pub use socket::NetlinkSocket;
