use crate::netlink::conntrack::ConnectionEntry;

/// `<state> <src> <sport> <dport> <orig bytes> <reply bytes>`, taken from
/// the original direction. Entries without protocol state print `-`.
pub(super) fn render(entry: &ConnectionEntry) -> String {
    let state = entry.protocol_state.map_or("-", |s| s.label());
    let orig = &entry.original;
    format!(
        "{} {} {} {} {} {}",
        state,
        orig.src,
        orig.src_port,
        orig.dst_port,
        entry.counters.orig_bytes,
        entry.counters.reply_bytes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_entries;

    #[test]
    fn test_syn_recv_scenario() {
        let line = render(&test_entries::tcp_syn_recv());
        assert_eq!(line, "SYN_RECV 10.0.0.1 51000 443 120 0");
        let fields: Vec<_> = line.split(' ').collect();
        assert_eq!(fields, ["SYN_RECV", "10.0.0.1", "51000", "443", "120", "0"]);
    }

    #[test]
    fn test_absent_state() {
        assert_eq!(render(&test_entries::udp6()), "- 2001:db8::1 53000 53 0 0");
    }
}
