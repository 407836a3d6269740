//! Async reader for the Linux connection tracking table.
//!
//! This crate dumps the kernel conntrack table over `NETLINK_NETFILTER`,
//! decodes each record into a typed [`ConnectionEntry`], and renders
//! entries as plain text lines or XML.
//!
//! # Features
//!
//! - `serde` - `Serialize` for the connection data model
//! - `integration` - tests that talk to a live kernel
//!
//! # Example
//!
//! ```ignore
//! use ctlink::{AddressFamily, Conntrack, OutputFormat, output};
//!
//! #[tokio::main]
//! async fn main() -> ctlink::Result<()> {
//!     let ct = Conntrack::new();
//!     let table = ct.dump(AddressFamily::Inet).await?;
//!     print!("{}", output::render_table(&table, OutputFormat::Xml));
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod output;

// Re-export common types at crate root for convenience
pub use netlink::conntrack::{
    AddressFamily, ConnectionEntry, ConnectionTable, Conntrack, DumpOptions, IpProtocol,
    ProtocolState, RecordOptions,
};
pub use netlink::{Error, Result};
pub use output::OutputFormat;
