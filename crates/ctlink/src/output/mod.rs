//! Rendering of connection entries (plain lines or XML).
//!
//! Rendering is pure: it never fails and never performs I/O. Use
//! [`write_table`] to stream a rendered table into a writer.
//!
//! # Example
//!
//! ```ignore
//! use ctlink::output::{self, OutputFormat};
//!
//! let line = output::render(&entry, OutputFormat::Line);
//! // "SYN_RECV 10.0.0.1 51000 443 120 0"
//! ```

mod line;
mod xml;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::netlink::conntrack::{ConnectionEntry, ConnectionTable};

pub use xml::{XML_DECLARATION, escape};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// One space separated line per entry.
    #[default]
    Line,
    /// One `<flow>` element per entry inside a `<flows>` document.
    Xml,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" | "list" => Ok(Self::Line),
            "xml" => Ok(Self::Xml),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Render one entry without a trailing newline.
pub fn render(entry: &ConnectionEntry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Line => line::render(entry),
        OutputFormat::Xml => xml::render(entry),
    }
}

/// Render a whole table, one entry per line.
///
/// XML output is a complete document, so an empty table still yields the
/// declaration and an empty `<flows>` element.
pub fn render_table(table: &ConnectionTable, format: OutputFormat) -> String {
    let mut out = String::new();
    if format == OutputFormat::Xml {
        out.push_str(XML_DECLARATION);
        out.push('\n');
        out.push_str("<flows>\n");
    }
    for entry in table {
        out.push_str(&render(entry, format));
        out.push('\n');
    }
    if format == OutputFormat::Xml {
        out.push_str("</flows>\n");
    }
    out
}

/// Write a rendered table.
pub fn write_table<W: Write>(
    w: &mut W,
    table: &ConnectionTable,
    format: OutputFormat,
) -> std::io::Result<()> {
    w.write_all(render_table(table, format).as_bytes())?;
    w.flush()
}
