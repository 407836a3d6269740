//! Netlink connection with dump request/response handling.

use tracing::{debug, warn};

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError, NlMsgHdr, NlMsgType,
};
use super::socket::NetlinkSocket;

/// Netlink connection owning one socket.
///
/// Requests on one connection must not overlap: framing relies on strict
/// request/response ordering. Callers sharing a connection serialize access
/// themselves (see [`Conntrack`](super::conntrack::Conntrack)).
#[derive(Debug)]
pub struct Connection {
    socket: NetlinkSocket,
}

/// Whether a dump is still expecting datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpProgress {
    /// More datagrams follow.
    Continue,
    /// `NLMSG_DONE` was seen.
    Done,
}

/// Bookkeeping for one dump request across its datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpState {
    seq: u32,
    messages: usize,
    dropped: usize,
}

impl DumpState {
    pub fn new(seq: u32) -> Self {
        Self {
            seq,
            messages: 0,
            dropped: 0,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Data messages handed out so far.
    pub fn messages(&self) -> usize {
        self.messages
    }

    /// Datagram remainders that could not be framed. Each one lost at
    /// least one message.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Connection {
    /// Open a new connection with a custom receive buffer size.
    pub fn with_recv_buffer(recv_buffer: usize) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::with_recv_buffer(recv_buffer)?,
        })
    }

    /// Send a dump request and hand every response message to `on_message`.
    ///
    /// `on_message` receives the header and payload of each data message in
    /// arrival order. Returns once the kernel sends `NLMSG_DONE`; a kernel
    /// error message fails the whole dump.
    pub async fn dump<F>(&self, mut builder: MessageBuilder, mut on_message: F) -> Result<DumpState>
    where
        F: FnMut(&NlMsgHdr, &[u8]),
    {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;
        debug!(seq, len = msg.len(), "sent dump request");

        let mut state = DumpState::new(seq);
        loop {
            let data = self.socket.recv_msg().await?;
            if dispatch(&data, &mut state, &mut on_message)? == DumpProgress::Done {
                return Ok(state);
            }
        }
    }
}

/// Process one received datagram of a dump.
///
/// Messages carrying another sequence number are ignored. A header that
/// cannot be framed drops the rest of the datagram with a warning and is
/// counted in [`DumpState::dropped`]; the next datagram starts on a fresh
/// boundary. An error reply before any data message is classified with
/// [`Error::refused`].
pub fn dispatch<F>(data: &[u8], state: &mut DumpState, on_message: &mut F) -> Result<DumpProgress>
where
    F: FnMut(&NlMsgHdr, &[u8]),
{
    for result in MessageIter::new(data) {
        let (header, payload) = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping unframeable remainder of netlink datagram");
                state.dropped += 1;
                break;
            }
        };

        if header.nlmsg_seq != state.seq {
            debug!(
                expected = state.seq,
                actual = header.nlmsg_seq,
                "ignoring message for another request"
            );
            continue;
        }

        match header.nlmsg_type {
            NlMsgType::ERROR => {
                let err = NlMsgError::read_from(payload)?;
                if !err.is_ack() {
                    if state.messages == 0 && state.dropped == 0 {
                        return Err(Error::refused(err.error));
                    }
                    return Err(Error::from_errno(err.error));
                }
            }
            NlMsgType::DONE => {
                // The kernel reports a dump that failed after it started in
                // the DONE payload.
                if let Some(code) = payload
                    .get(..4)
                    .and_then(|b| <[u8; 4]>::try_from(b).ok())
                    .map(i32::from_ne_bytes)
                {
                    if code < 0 {
                        return Err(Error::from_errno(code));
                    }
                }
                return Ok(DumpProgress::Done);
            }
            NlMsgType::NOOP | NlMsgType::OVERRUN => {
                debug!(kind = header.nlmsg_type, "skipping control message");
            }
            _ => {
                if header.is_dump_interrupted() {
                    debug!("kernel flagged the dump as interrupted");
                }
                state.messages += 1;
                on_message(&header, payload);
            }
        }
    }

    Ok(DumpProgress::Continue)
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}
