//! Async `NETLINK_NETFILTER` socket.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Bytes, BytesMut};
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::{Error, Result};

/// Default and minimum receive buffer size. The kernel fills dump skbs up
/// to 32 KiB, so this holds any single datagram.
pub const DEFAULT_RECV_BUFFER: usize = 32768;

/// Netfilter netlink socket registered with the tokio reactor.
///
/// Dropping the socket closes the channel.
pub struct NetlinkSocket {
    fd: AsyncFd<Socket>,
    seq: AtomicU32,
    /// Port ID the kernel assigned on bind.
    pid: u32,
    recv_buffer: usize,
}

impl NetlinkSocket {
    /// Open a socket receiving into `recv_buffer` bytes, raised to
    /// [`DEFAULT_RECV_BUFFER`] if smaller.
    ///
    /// Every failure here is reported as [`Error::TransportUnavailable`].
    pub fn with_recv_buffer(recv_buffer: usize) -> Result<Self> {
        Self::open(recv_buffer.max(DEFAULT_RECV_BUFFER)).map_err(Error::TransportUnavailable)
    }

    fn open(recv_buffer: usize) -> io::Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_NETFILTER)?;
        socket.set_non_blocking(true)?;

        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;

        Ok(Self {
            pid: addr.port_number(),
            fd: AsyncFd::new(socket)?,
            seq: AtomicU32::new(1),
            recv_buffer,
        })
    }

    /// Sequence number for the next request.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send one request.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        self.fd
            .async_io(Interest::WRITABLE, |socket| socket.send(msg, 0))
            .await?;
        Ok(())
    }

    /// Receive one datagram.
    ///
    /// A datagram larger than the receive buffer fails with
    /// [`Error::MalformedMessage`] instead of being cut short.
    pub async fn recv_msg(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.recv_buffer);
        // MSG_TRUNC makes recv report the full datagram length.
        let n = self
            .fd
            .async_io(Interest::READABLE, |socket| {
                buf.clear();
                socket.recv(&mut buf, libc::MSG_TRUNC)
            })
            .await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "netlink socket returned an empty datagram",
            )));
        }
        check_datagram_len(n, buf.len())?;
        Ok(buf.freeze())
    }
}

fn check_datagram_len(datagram: usize, received: usize) -> Result<()> {
    if datagram > received {
        return Err(Error::MalformedMessage(format!(
            "datagram of {datagram} bytes truncated to {received}"
        )));
    }
    Ok(())
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

impl std::fmt::Debug for NetlinkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkSocket")
            .field("fd", &self.as_raw_fd())
            .field("pid", &self.pid)
            .field("recv_buffer", &self.recv_buffer)
            .finish()
    }
}
