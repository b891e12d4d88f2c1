//! Low-level async netlink socket operations.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::error::Result;

/// Receive buffer size; the kernel's customary per-message limit.
const RECV_BUF_SIZE: usize = 32768;

/// Not wrapped by netlink-sys.
const NETLINK_GET_STRICT_CHK: libc::c_int = 12;

/// Async NETLINK_ROUTE socket.
///
/// Wraps the raw socket in an `AsyncFd`; the socket itself is always
/// non-blocking, so [`recv_batch`](Self::recv_batch) can drain coalesced
/// event batches until `EAGAIN` while request/response callers await
/// readiness.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl NetlinkSocket {
    /// Create a new NETLINK_ROUTE socket.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        let fd = AsyncFd::new(socket)?;

        Ok(Self {
            fd,
            seq: AtomicU32::new(1),
            pid,
        })
    }

    /// Enable strict attribute checking so malformed requests fail fast
    /// instead of being silently ignored by older dump paths.
    pub fn set_strict_checking(&self, on: bool) -> Result<()> {
        let value: libc::c_int = if on { 1 } else { 0 };
        // SAFETY: the fd is owned by self and stays open for the call;
        // the value buffer is a live c_int.
        let rc = unsafe {
            libc::setsockopt(
                self.fd.get_ref().as_raw_fd(),
                libc::SOL_NETLINK,
                NETLINK_GET_STRICT_CHK,
                (&value as *const libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Subscribe to a multicast group.
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        self.fd.get_mut().add_membership(group)?;
        Ok(())
    }

    /// Send a message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram, waiting for readiness.
    pub async fn recv(&self) -> Result<Vec<u8>> {
        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Wait until readable, then drain every pending datagram.
    ///
    /// A single readiness notification may cover an arbitrary number of
    /// coalesced events, so the drain keeps reading until the socket
    /// reports `EAGAIN`; only then is readiness rearmed.
    pub async fn recv_batch(&self) -> Result<Vec<Vec<u8>>> {
        let mut guard = self.fd.ready(Interest::READABLE).await?;
        let mut batch = Vec::new();

        loop {
            let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    result?;
                    batch.push(buf.to_vec());
                }
                Err(_would_block) => {
                    if batch.is_empty() {
                        // Spurious wakeup; wait again.
                        guard = self.fd.ready(Interest::READABLE).await?;
                        continue;
                    }
                    return Ok(batch);
                }
            }
        }
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

/// Multicast groups for NETLINK_ROUTE.
pub mod rtnetlink_groups {
    pub const RTNLGRP_LINK: u32 = 1;
}
