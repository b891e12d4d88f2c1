//! Bridge FDB neighbor message types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use crate::error::{Error, Result};

/// AF_BRIDGE address family; selects the FDB on RTM_GETNEIGH.
pub const AF_BRIDGE: u8 = 7;

/// Neighbor message (struct ndmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NdMsg {
    /// Address family.
    pub ndm_family: u8,
    /// Padding.
    pub ndm_pad1: u8,
    /// Padding.
    pub ndm_pad2: u16,
    /// Interface index.
    pub ndm_ifindex: i32,
    /// Neighbor state (NUD_*).
    pub ndm_state: u16,
    /// Neighbor flags (NTF_*).
    pub ndm_flags: u8,
    /// Neighbor type.
    pub ndm_type: u8,
}

impl NdMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new neighbor message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.ndm_family = family;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}

/// Neighbor state bits (NUD_*).
pub mod nud {
    pub const REACHABLE: u16 = 0x02;
    pub const STALE: u16 = 0x04;
    pub const NOARP: u16 = 0x40;
    pub const PERMANENT: u16 = 0x80;
}

/// Neighbor attributes (NDA_*) used on the bridge FDB dump.
pub mod nda {
    pub const LLADDR: u16 = 2;
    pub const VLAN: u16 = 5;
    pub const MASTER: u16 = 9;
}

/// One NEWNEIGH reply from an AF_BRIDGE dump.
#[derive(Debug, Clone, Default)]
pub struct NeighborMessage {
    /// Fixed-size header.
    pub header: NdMsg,
    /// Link-layer address (NDA_LLADDR).
    pub lladdr: Option<Vec<u8>>,
    /// VLAN id (NDA_VLAN); absent means untagged.
    pub vlan: Option<u16>,
    /// Master bridge index (NDA_MASTER).
    pub master: Option<u32>,
}

impl NeighborMessage {
    /// The interface (bridge port) this entry was learned on.
    pub fn ifindex(&self) -> u32 {
        self.header.ndm_ifindex as u32
    }

    /// Statically configured entry, not produced by learning.
    pub fn is_permanent(&self) -> bool {
        self.header.ndm_state & nud::PERMANENT != 0
    }

    /// The entry's MAC, when the link-layer address is Ethernet-sized.
    pub fn mac(&self) -> Option<[u8; 6]> {
        let lladdr = self.lladdr.as_deref()?;
        lladdr.try_into().ok()
    }

    /// Parse from a message payload (the bytes after the nlmsghdr).
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let header = *NdMsg::from_bytes(payload)?;

        let mut msg = NeighborMessage {
            header,
            ..Default::default()
        };

        for (attr_type, data) in AttrIter::new(&payload[NdMsg::SIZE..]) {
            match attr_type {
                nda::LLADDR => msg.lladdr = Some(data.to_vec()),
                nda::VLAN => msg.vlan = Some(get::u16_ne(data)?),
                nda::MASTER => msg.master = Some(get::u32_ne(data)?),
                _ => {}
            }
        }

        Ok(msg)
    }
}
