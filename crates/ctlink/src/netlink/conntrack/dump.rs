//! Conntrack table enumeration.

use std::future::Future;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::record::{NfGenMsg, RecordOptions, parse_entry};
use super::types::{AddressFamily, ConnectionEntry, ConnectionTable};
use super::{NFNETLINK_V0, NFNL_SUBSYS_CTNETLINK, ct_get_type};
use crate::netlink::connection::{Connection, dump_request};
use crate::netlink::error::{Error, Result};
use crate::netlink::message::NlMsgHdr;
use crate::netlink::socket::DEFAULT_RECV_BUFFER;

/// Configuration for [`Conntrack`].
///
/// # Example
///
/// ```ignore
/// let options = DumpOptions::new()
///     .retries(3)
///     .require_counters(false);
/// let ct = Conntrack::with_options(options);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    retries: u32,
    recv_buffer_size: usize,
    record: RecordOptions,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            retries: 1,
            recv_buffer_size: DEFAULT_RECV_BUFFER,
            record: RecordOptions::default(),
        }
    }
}

impl DumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra attempts after [`Error::TransportUnavailable`], whether the
    /// channel failed to open or the kernel refused the request.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Receive buffer size per datagram, at least [`DEFAULT_RECV_BUFFER`].
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(DEFAULT_RECV_BUFFER);
        self
    }

    /// See [`RecordOptions::require_counters`].
    pub fn require_counters(mut self, require: bool) -> Self {
        self.record = self.record.require_counters(require);
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retries
    }

    pub fn buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn record_options(&self) -> RecordOptions {
        self.record
    }
}

/// Attempts left for retrying [`Error::TransportUnavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    retries: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self { retries, used: 0 }
    }

    /// Whether `error` may be retried, consuming one attempt if so.
    pub fn allow(&mut self, error: &Error) -> bool {
        if !matches!(error, Error::TransportUnavailable(_)) || self.used >= self.retries {
            return false;
        }
        self.used += 1;
        true
    }

    /// Retries consumed so far.
    pub fn used(&self) -> u32 {
        self.used
    }
}

/// Accumulates decoded entries of one dump.
///
/// Records that fail to decode are skipped with a warning and counted, as
/// are messages lost to an unframeable datagram.
#[derive(Debug)]
pub struct TableCollector {
    options: RecordOptions,
    entries: Vec<ConnectionEntry>,
    skipped: usize,
}

impl TableCollector {
    pub fn new(options: RecordOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            skipped: 0,
        }
    }

    /// Feed one data message of the dump.
    pub fn push(&mut self, header: &NlMsgHdr, payload: &[u8]) {
        if header.nlmsg_type >> 8 != NFNL_SUBSYS_CTNETLINK {
            debug!(kind = header.nlmsg_type, "ignoring non-conntrack message");
            return;
        }

        match parse_entry(payload, self.options) {
            Ok(entry) => self.entries.push(entry),
            Err(e) => {
                warn!(error = %e, seq = header.nlmsg_seq, "skipping undecodable conntrack record");
                self.skipped += 1;
            }
        }
    }

    /// Count messages the framer dropped before they reached [`push`](Self::push).
    pub fn dropped(&mut self, count: usize) {
        if count > 0 {
            warn!(count, "conntrack messages lost to unframeable datagrams");
            self.skipped += count;
        }
    }

    /// Entries collected so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> ConnectionTable {
        ConnectionTable::new(self.entries, self.skipped)
    }
}

/// Reader for the kernel connection tracking table.
///
/// The netlink channel is opened on first use and kept for later dumps.
/// Concurrent dumps on one `Conntrack` run one after another; use separate
/// values for parallel dumps.
#[derive(Debug, Default)]
pub struct Conntrack {
    options: DumpOptions,
    conn: Mutex<Option<Connection>>,
}

impl Conntrack {
    /// Create a reader with default options. No channel is opened yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DumpOptions) -> Self {
        Self {
            options,
            conn: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// Dump the conntrack table of one address family.
    ///
    /// Entries come back in kernel dump order. A record that fails to
    /// decode is skipped (see [`ConnectionTable::skipped`]); a kernel error
    /// fails the whole call and discards what was collected.
    ///
    /// [`Error::TransportUnavailable`] is retried on a fresh channel up to
    /// [`DumpOptions::retries`] times. Dropping the returned future closes
    /// the channel; the next call opens a new one.
    pub async fn dump(&self, family: AddressFamily) -> Result<ConnectionTable> {
        let mut slot = self.conn.lock().await;
        let mut budget = RetryBudget::new(self.options.retries);
        loop {
            match self.attempt(&mut slot, family).await {
                Err(e) if budget.allow(&e) => {
                    debug!(attempt = budget.used(), error = %e, "netlink transport unavailable, retrying");
                }
                result => return result,
            }
        }
    }

    /// Dump the IPv4 table.
    pub async fn dump_v4(&self) -> Result<ConnectionTable> {
        self.dump(AddressFamily::Inet).await
    }

    /// Dump the IPv6 table.
    pub async fn dump_v6(&self) -> Result<ConnectionTable> {
        self.dump(AddressFamily::Inet6).await
    }

    /// Dump the table unless `shutdown` resolves first.
    ///
    /// On shutdown the dump is abandoned, its channel closed, and
    /// [`Error::Cancelled`] returned.
    pub async fn dump_until<S>(&self, family: AddressFamily, shutdown: S) -> Result<ConnectionTable>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => {
                debug!("conntrack dump cancelled");
                Err(Error::Cancelled)
            }
            result = self.dump(family) => result,
        }
    }

    /// Close the cached channel, if any.
    pub async fn close(&self) {
        self.conn.lock().await.take();
    }

    /// Whether a channel is currently cached.
    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// One open-and-dump attempt. The channel goes back into `slot` only
    /// when the kernel finished answering the request.
    async fn attempt(&self, slot: &mut Option<Connection>, family: AddressFamily) -> Result<ConnectionTable> {
        // Owned by this attempt until the kernel finishes it.
        let conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!("opening netfilter netlink channel");
                Connection::with_recv_buffer(self.options.recv_buffer_size)?
            }
        };

        let result = self.dump_on(&conn, family).await;
        match &result {
            Ok(_) | Err(Error::Kernel { .. }) => *slot = Some(conn),
            Err(e) => debug!(error = %e, "closing netlink channel after failed dump"),
        }
        result
    }

    async fn dump_on(&self, conn: &Connection, family: AddressFamily) -> Result<ConnectionTable> {
        let mut builder = dump_request(ct_get_type());
        builder.append_bytes(
            &NfGenMsg {
                family: family.as_u8(),
                version: NFNETLINK_V0,
                res_id: 0,
            }
            .to_bytes(),
        );

        let mut collector = TableCollector::new(self.options.record);
        let state = conn
            .dump(builder, |header, payload| collector.push(header, payload))
            .await?;
        collector.dropped(state.dropped());

        let table = collector.finish();
        debug!(
            family = family.name(),
            entries = table.count(),
            skipped = table.skipped(),
            "conntrack dump complete"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use std::task::Poll;

    use crate::netlink::connection::{DumpProgress, DumpState, dispatch};
    use crate::netlink::fixtures;
    use crate::netlink::message::NLM_F_MULTI;

    /// Feed datagrams through the dump state machine like
    /// [`Conntrack::dump`] does with the socket.
    fn run_dump(datagrams: &[Vec<u8>], seq: u32, options: RecordOptions) -> Result<ConnectionTable> {
        let mut collector = TableCollector::new(options);
        let mut state = DumpState::new(seq);
        for data in datagrams {
            let progress = dispatch(data, &mut state, &mut |h: &NlMsgHdr, p: &[u8]| collector.push(h, p))?;
            if progress == DumpProgress::Done {
                collector.dropped(state.dropped());
                return Ok(collector.finish());
            }
        }
        Err(Error::MalformedMessage("dump ended without NLMSG_DONE".into()))
    }

    fn unavailable() -> Error {
        Error::TransportUnavailable(io::Error::from_raw_os_error(libc::EPROTONOSUPPORT))
    }

    /// Channel policy after a dump: kept only when the kernel answered.
    async fn assert_channel_policy(ct: &Conntrack, result: &Result<ConnectionTable>) {
        let kept = matches!(result, Ok(_) | Err(Error::Kernel { .. }));
        assert_eq!(ct.is_open().await, kept, "after {:?}", result.as_ref().err());
    }

    #[test]
    fn test_malformed_record_skipped() {
        let good = fixtures::conntrack_tcp_syn_recv();
        let mut bad = good.clone();
        bad.truncate(40);

        let mut first = fixtures::message(fixtures::CT_NEW, 7, &good);
        first.extend(fixtures::message(fixtures::CT_NEW, 7, &bad));
        let mut second = fixtures::message(fixtures::CT_NEW, 7, &good);
        second.extend(fixtures::message(fixtures::CT_NEW, 7, &good));
        second.extend(fixtures::done(7));

        let table = run_dump(&[first, second], 7, RecordOptions::default()).unwrap();
        assert_eq!(table.count(), 3);
        assert_eq!(table.entries().len(), 3);
        assert_eq!(table.skipped(), 1);
    }

    #[test]
    fn test_kernel_error_discards_partial_table() {
        let good = fixtures::conntrack_tcp_syn_recv();
        let mut first = fixtures::message(fixtures::CT_NEW, 3, &good);
        first.extend(fixtures::message(fixtures::CT_NEW, 3, &good));
        let mut second = fixtures::error(3, -libc::EBUSY);
        second.extend(fixtures::done(3));

        let err = run_dump(&[first, second], 3, RecordOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Kernel { errno, .. } if errno == libc::EBUSY));
    }

    #[test]
    fn test_arrival_order_preserved() {
        let v4 = fixtures::conntrack_tcp_syn_recv();
        let v6 = fixtures::conntrack_udp6_no_counters();
        let mut data = fixtures::message(fixtures::CT_NEW, 1, &v6);
        data.extend(fixtures::message(fixtures::CT_NEW, 1, &v4));
        data.extend(fixtures::done(1));

        let options = RecordOptions::new().require_counters(false);
        let table = run_dump(&[data], 1, options).unwrap();
        let families: Vec<_> = table.iter().map(|e| e.family()).collect();
        assert_eq!(families, vec![AddressFamily::Inet6, AddressFamily::Inet]);
    }

    #[test]
    fn test_empty_dump() {
        let table = run_dump(&[fixtures::done(9)], 9, RecordOptions::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.skipped(), 0);
    }

    #[test]
    fn test_collector_ignores_other_subsystems() {
        let mut collector = TableCollector::new(RecordOptions::default());
        let header = NlMsgHdr::new(0x0200, NLM_F_MULTI);
        collector.push(&header, &fixtures::conntrack_tcp_syn_recv());
        assert!(collector.is_empty());
        assert_eq!(collector.finish().skipped(), 0);
    }

    #[test]
    fn test_refused_first_reply_is_unavailable() {
        let mut data = fixtures::error(4, -libc::EPERM);
        data.extend(fixtures::done(4));

        let err = run_dump(&[data], 4, RecordOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert!(err.is_permission_denied());
        assert!(RetryBudget::new(1).allow(&err));
    }

    #[test]
    fn test_missing_subsystem_is_unavailable() {
        let err = run_dump(&[fixtures::error(4, -libc::EOPNOTSUPP)], 4, RecordOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
    }

    #[test]
    fn test_unframeable_messages_counted_as_skipped() {
        let good = fixtures::conntrack_tcp_syn_recv();
        let mut first = fixtures::message(fixtures::CT_NEW, 2, &good);
        let mut cut = fixtures::message(fixtures::CT_NEW, 2, &good);
        cut.truncate(64);
        first.extend(cut);

        let table = run_dump(&[first, fixtures::done(2)], 2, RecordOptions::default()).unwrap();
        assert_eq!(table.count(), 1);
        assert_eq!(table.skipped(), 1);
    }

    #[test]
    fn test_retry_only_transport_errors() {
        let mut budget = RetryBudget::new(3);
        assert!(!budget.allow(&Error::from_errno(-libc::EBUSY)));
        assert!(!budget.allow(&Error::Cancelled));
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_retry_bounded() {
        let mut budget = RetryBudget::new(2);
        let mut attempts = 1;
        while budget.allow(&unavailable()) {
            attempts += 1;
        }
        assert_eq!(attempts, 3);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn test_zero_retries() {
        let mut budget = RetryBudget::new(0);
        assert!(!budget.allow(&unavailable()));
    }

    #[test]
    fn test_options_builder() {
        let options = DumpOptions::new()
            .retries(4)
            .recv_buffer_size(65536)
            .require_counters(false);
        assert_eq!(options.retry_limit(), 4);
        assert_eq!(options.buffer_size(), 65536);
        assert!(!options.record_options().requires_counters());

        let small = DumpOptions::new().recv_buffer_size(128);
        assert_eq!(small.buffer_size(), DEFAULT_RECV_BUFFER);

        let defaults = DumpOptions::default();
        assert_eq!(defaults.retry_limit(), 1);
        assert_eq!(defaults.buffer_size(), 32768);
        assert!(defaults.record_options().requires_counters());
    }

    #[tokio::test]
    async fn test_dump_until_cancelled() {
        let ct = Conntrack::new();
        let err = ct
            .dump_until(AddressFamily::Inet, std::future::ready(()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!ct.is_open().await);
    }

    #[tokio::test]
    async fn test_live_dump_channel_lifecycle() {
        let ct = Conntrack::with_options(DumpOptions::new().retries(0).require_counters(false));

        let first = ct.dump_v4().await;
        assert_channel_policy(&ct, &first).await;

        let second = ct.dump_v4().await;
        assert_channel_policy(&ct, &second).await;

        ct.close().await;
        assert!(!ct.is_open().await);
    }

    #[tokio::test]
    async fn test_cancel_during_dump_closes_channel() {
        let ct = Conntrack::with_options(DumpOptions::new().retries(0).require_counters(false));

        // Pending on the first poll, so the dump starts before shutdown wins.
        let mut polled = false;
        let shutdown = std::future::poll_fn(move |cx| {
            if polled {
                Poll::Ready(())
            } else {
                polled = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        });

        let result = ct.dump_until(AddressFamily::Inet, shutdown).await;
        if matches!(result, Err(Error::Cancelled)) {
            assert!(!ct.is_open().await);
        }
        assert_channel_policy(&ct, &result).await;
    }

    #[test]
    fn test_conntrack_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Conntrack>();
    }
}
