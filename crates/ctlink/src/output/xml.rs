//! XML rendering in the libnetfilter_conntrack `<flow>` layout.

use crate::netlink::conntrack::{ConnectionEntry, ConnectionTuple, Counters};

/// Declaration opening every XML table document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#;

/// Escape text or attribute content.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn element(out: &mut String, name: &str, value: impl ToString) {
    out.push_str(&format!("<{name}>{}</{name}>", escape(&value.to_string())));
}

fn meta(out: &mut String, direction: &str, tuple: &ConnectionTuple, packets: u64, bytes: u64) {
    out.push_str(&format!(r#"<meta direction="{}">"#, escape(direction)));

    out.push_str(&format!(
        r#"<layer3 protonum="{}" protoname="{}">"#,
        tuple.family.as_u8(),
        escape(tuple.family.name())
    ));
    element(out, "src", tuple.src);
    element(out, "dst", tuple.dst);
    out.push_str("</layer3>");

    out.push_str(&format!(
        r#"<layer4 protonum="{}" protoname="{}">"#,
        tuple.protocol.number(),
        escape(tuple.protocol.name())
    ));
    match tuple.icmp {
        Some(icmp) => {
            element(out, "type", icmp.kind);
            element(out, "code", icmp.code);
            element(out, "id", tuple.src_port);
        }
        None => {
            element(out, "sport", tuple.src_port);
            element(out, "dport", tuple.dst_port);
        }
    }
    out.push_str("</layer4>");

    out.push_str("<counters>");
    element(out, "packets", packets);
    element(out, "bytes", bytes);
    out.push_str("</counters>");

    out.push_str("</meta>");
}

/// Render one `<flow>` element on a single line.
pub(super) fn render(entry: &ConnectionEntry) -> String {
    let mut out = String::from("<flow>");
    let Counters {
        orig_packets,
        orig_bytes,
        reply_packets,
        reply_bytes,
    } = entry.counters;

    meta(&mut out, "original", &entry.original, orig_packets, orig_bytes);
    meta(&mut out, "reply", &entry.reply, reply_packets, reply_bytes);

    out.push_str(r#"<meta direction="independent">"#);
    if let Some(state) = entry.protocol_state {
        element(&mut out, "state", state.label());
    }
    if let Some(timeout) = entry.timeout {
        element(&mut out, "timeout", timeout);
    }
    if let Some(mark) = entry.mark {
        element(&mut out, "mark", mark);
    }
    if let Some(use_count) = entry.use_count {
        element(&mut out, "use", use_count);
    }
    if let Some(id) = entry.id {
        element(&mut out, "id", id);
    }
    if let Some(zone) = entry.zone {
        element(&mut out, "zone", zone);
    }
    if entry.is_assured() {
        out.push_str("<assured/>");
    }
    if entry.is_unreplied() {
        out.push_str("<unreplied/>");
    }
    out.push_str("</meta>");

    out.push_str("</flow>");
    out
}
