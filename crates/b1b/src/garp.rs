//! Gratuitous ARP construction and transmission.
//!
//! One ARP reply is sent per destination, broadcast on the bond so
//! every upstream switch relearns the MAC on the now-active slave. The
//! frame's Ethernet source and ARP sender hardware address are the
//! announced MAC itself; both protocol addresses are 0.0.0.0, which is
//! enough to refresh layer-2 learning without touching ARP caches.

use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, error};

use crate::bond::BondSession;
use crate::dest::{Dest, DestSet};
use crate::error::Result;

const ETH_P_ARP: u16 = 0x0806;
const ETH_P_8021Q: u16 = 0x8100;
const BROADCAST: [u8; 6] = [0xff; 6];

/// Untagged frame length.
pub const FRAME_LEN: usize = 42;
/// Frame length with an 802.1Q header.
pub const FRAME_LEN_TAGGED: usize = 46;

/// Build the gratuitous ARP reply announcing `dest`.
///
/// For VLAN 0 the frame is untagged (42 bytes); otherwise an 802.1Q
/// header with priority 0 and DEI 0 is inserted after the source
/// address (46 bytes). All multi-byte fields are big-endian.
pub fn build_frame(dest: Dest) -> Vec<u8> {
    let mac = dest.mac();
    let vlan = dest.vlan();

    let mut frame = Vec::with_capacity(FRAME_LEN_TAGGED);
    frame.extend_from_slice(&BROADCAST);
    frame.extend_from_slice(&mac);
    if vlan != 0 {
        frame.extend_from_slice(&ETH_P_8021Q.to_be_bytes());
        frame.extend_from_slice(&vlan.to_be_bytes());
    }
    frame.extend_from_slice(&ETH_P_ARP.to_be_bytes());

    frame.extend_from_slice(&1u16.to_be_bytes()); // hardware type: Ethernet
    frame.extend_from_slice(&0x0800u16.to_be_bytes()); // protocol type: IPv4
    frame.push(6); // hardware length
    frame.push(4); // protocol length
    frame.extend_from_slice(&2u16.to_be_bytes()); // opcode: reply
    frame.extend_from_slice(&mac); // sender hardware address
    frame.extend_from_slice(&[0u8; 4]); // sender protocol address
    frame.extend_from_slice(&[0u8; 6]); // target hardware address
    frame.extend_from_slice(&[0u8; 4]); // target protocol address

    frame
}

/// Raw AF_PACKET socket for outbound ARP.
///
/// Bound nowhere; every send names the destination interface in the
/// socket address, so one socket serves every monitored bond.
pub struct PacketSocket {
    fd: AsyncFd<OwnedFd>,
}

impl PacketSocket {
    /// Open the raw socket. Requires CAP_NET_RAW.
    pub fn new() -> Result<Self> {
        // SAFETY: socket() returns a fresh descriptor we immediately
        // take ownership of.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        // SAFETY: fd is valid and owned by nobody else.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            fd: AsyncFd::new(owned)?,
        })
    }

    /// Send one frame out of the given interface.
    pub async fn send_to(&self, ifindex: u32, frame: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| send_raw(inner.get_ref().as_raw_fd(), ifindex, frame)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

fn send_raw(fd: RawFd, ifindex: u32, frame: &[u8]) -> std::io::Result<usize> {
    // SAFETY: addr is a fully initialized sockaddr_ll and frame points
    // at frame.len() live bytes.
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = ETH_P_ARP.to_be();
    addr.sll_ifindex = ifindex as libc::c_int;
    addr.sll_halen = 6;
    addr.sll_addr[..6].copy_from_slice(&BROADCAST);

    let rc = unsafe {
        libc::sendto(
            fd,
            frame.as_ptr().cast(),
            frame.len(),
            0,
            (&addr as *const libc::sockaddr_ll).cast(),
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(rc as usize)
}

/// Announce every destination in the set, in key order.
///
/// Individual send failures are transient (they happen during link
/// bring-up) and never abort the run.
pub async fn announce(socket: &PacketSocket, session: &BondSession, dests: &DestSet) {
    for dest in dests.iter() {
        let frame = build_frame(dest);
        match socket.send_to(session.ifindex, &frame).await {
            Ok(()) => debug!("{}: announced {}", session.ifname, dest),
            Err(e) => error!(
                "{}: failed to send gratuitous ARP for {}: {}",
                session.ifname, dest, e
            ),
        }
    }
}
