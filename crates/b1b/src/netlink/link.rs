//! Strongly-typed link message.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use crate::error::{Error, Result};

/// Attribute IDs for IFLA_* constants.
pub mod attr_ids {
    pub const IFLA_IFNAME: u16 = 3;
    pub const IFLA_MASTER: u16 = 10;
    pub const IFLA_LINKINFO: u16 = 18;
    pub const IFLA_EVENT: u16 = 44;
}

/// Nested IFLA_INFO_* attribute IDs.
mod info_ids {
    pub const IFLA_INFO_KIND: u16 = 1;
    pub const IFLA_INFO_DATA: u16 = 2;
}

/// Nested IFLA_BOND_* attribute IDs.
mod bond_ids {
    pub const IFLA_BOND_MODE: u16 = 1;
}

/// Bonding driver mode 1 (active-backup).
pub const BOND_MODE_ACTIVE_BACKUP: u8 = 1;

/// IFLA_EVENT code for a bonding failover notification.
pub const IFLA_EVENT_BONDING_FAILOVER: u32 = 3;

/// Link kinds this daemon cares about.
pub const KIND_BOND: &str = "bond";
pub const KIND_BRIDGE: &str = "bridge";
pub const KIND_OPENVSWITCH: &str = "openvswitch";

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (AF_UNSPEC for link messages).
    pub ifi_family: u8,
    /// Padding.
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new zeroed message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
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

/// A NEWLINK message with the attributes discovery and event
/// demultiplexing need.
#[derive(Debug, Clone, Default)]
pub struct LinkMessage {
    /// Fixed-size header.
    pub header: IfInfoMsg,
    /// Interface name (IFLA_IFNAME).
    pub name: Option<String>,
    /// Master device index (IFLA_MASTER).
    pub master: Option<u32>,
    /// Link type kind, e.g. "bond" or "bridge" (IFLA_LINKINFO).
    pub kind: Option<String>,
    /// Bonding mode, when the kind is "bond".
    pub bond_mode: Option<u8>,
    /// Event code (IFLA_EVENT), present on notification messages.
    pub event: Option<u32>,
}

impl LinkMessage {
    /// Get the interface index.
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    /// Get the interface name, or a placeholder.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }

    /// Check whether this link is a mode-1 bond.
    pub fn is_active_backup_bond(&self) -> bool {
        self.kind.as_deref() == Some(KIND_BOND)
            && self.bond_mode == Some(BOND_MODE_ACTIVE_BACKUP)
    }

    /// Parse from a message payload (the bytes after the nlmsghdr).
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let header = *IfInfoMsg::from_bytes(payload)?;

        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        for (attr_type, data) in AttrIter::new(&payload[IfInfoMsg::SIZE..]) {
            match attr_type {
                attr_ids::IFLA_IFNAME => {
                    msg.name = Some(get::string(data)?.to_string());
                }
                attr_ids::IFLA_MASTER => {
                    msg.master = Some(get::u32_ne(data)?);
                }
                attr_ids::IFLA_LINKINFO => {
                    let (kind, bond_mode) = parse_link_info(data);
                    msg.kind = kind;
                    msg.bond_mode = bond_mode;
                }
                attr_ids::IFLA_EVENT => {
                    msg.event = Some(get::u32_ne(data)?);
                }
                _ => {} // Ignore unknown attributes
            }
        }

        Ok(msg)
    }
}

/// Walk IFLA_LINKINFO, returning the link kind and (for bonds) the
/// bonding mode.
///
/// The kernel serializes IFLA_INFO_KIND before IFLA_INFO_DATA, but the
/// container is collected in full before either attribute is
/// interpreted, so nothing here depends on that ordering. A container
/// with data but no kind yields `(None, None)`.
fn parse_link_info(data: &[u8]) -> (Option<String>, Option<u8>) {
    let mut kind = None;
    let mut info_data: Option<&[u8]> = None;

    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            info_ids::IFLA_INFO_KIND => {
                kind = get::string(payload).ok().map(str::to_string);
            }
            info_ids::IFLA_INFO_DATA => {
                info_data = Some(payload);
            }
            _ => {}
        }
    }

    let bond_mode = match (kind.as_deref(), info_data) {
        (Some(KIND_BOND), Some(data)) => AttrIter::new(data)
            .find(|(t, _)| *t == bond_ids::IFLA_BOND_MODE)
            .and_then(|(_, payload)| get::u8(payload).ok()),
        _ => None,
    };

    (kind, bond_mode)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::netlink::attr::{NlAttr, nla_align};

    pub(crate) fn push_attr(buf: &mut Vec<u8>, attr_type: u16, payload: &[u8]) {
        buf.extend_from_slice(NlAttr::new(attr_type, payload.len()).as_bytes());
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
    }

    fn nested(attr_type: u16, inner: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        push_attr(&mut buf, attr_type, inner);
        buf
    }

    /// Synthesize a NEWLINK payload the way the kernel would emit it.
    pub(crate) fn link_payload(
        ifindex: i32,
        name: &str,
        kind: Option<&str>,
        bond_mode: Option<u8>,
        master: Option<u32>,
        event: Option<u32>,
    ) -> Vec<u8> {
        let mut payload = IfInfoMsg::new().with_index(ifindex).as_bytes().to_vec();
        let mut namez = name.as_bytes().to_vec();
        namez.push(0);
        push_attr(&mut payload, attr_ids::IFLA_IFNAME, &namez);
        if let Some(master) = master {
            push_attr(&mut payload, attr_ids::IFLA_MASTER, &master.to_ne_bytes());
        }
        if let Some(kind) = kind {
            let mut info = Vec::new();
            let mut kindz = kind.as_bytes().to_vec();
            kindz.push(0);
            push_attr(&mut info, info_ids::IFLA_INFO_KIND, &kindz);
            if let Some(mode) = bond_mode {
                let data = nested(bond_ids::IFLA_BOND_MODE, &[mode]);
                push_attr(&mut info, info_ids::IFLA_INFO_DATA, &data);
            }
            push_attr(&mut payload, attr_ids::IFLA_LINKINFO, &info);
        }
        if let Some(event) = event {
            push_attr(&mut payload, attr_ids::IFLA_EVENT, &event.to_ne_bytes());
        }
        payload
    }

    #[test]
    fn test_parse_bond_link() {
        let payload = link_payload(5, "bond0", Some("bond"), Some(1), Some(7), None);
        let msg = LinkMessage::from_payload(&payload).unwrap();
        assert_eq!(msg.ifindex(), 5);
        assert_eq!(msg.name.as_deref(), Some("bond0"));
        assert_eq!(msg.master, Some(7));
        assert_eq!(msg.kind.as_deref(), Some("bond"));
        assert_eq!(msg.bond_mode, Some(BOND_MODE_ACTIVE_BACKUP));
        assert!(msg.is_active_backup_bond());
    }

    #[test]
    fn test_parse_non_bond_link() {
        let payload = link_payload(2, "eth0", None, None, None, None);
        let msg = LinkMessage::from_payload(&payload).unwrap();
        assert_eq!(msg.kind, None);
        assert!(!msg.is_active_backup_bond());
    }

    #[test]
    fn test_parse_failover_event() {
        let payload = link_payload(
            5,
            "bond0",
            Some("bond"),
            Some(1),
            Some(7),
            Some(IFLA_EVENT_BONDING_FAILOVER),
        );
        let msg = LinkMessage::from_payload(&payload).unwrap();
        assert_eq!(msg.event, Some(IFLA_EVENT_BONDING_FAILOVER));
    }

    #[test]
    fn test_info_data_before_info_kind() {
        // The kernel emits INFO_KIND first; tolerate the reverse order.
        let mut info = Vec::new();
        let data = nested(bond_ids::IFLA_BOND_MODE, &[1]);
        push_attr(&mut info, info_ids::IFLA_INFO_DATA, &data);
        push_attr(&mut info, info_ids::IFLA_INFO_KIND, b"bond\0");

        let mut payload = IfInfoMsg::new().with_index(3).as_bytes().to_vec();
        push_attr(&mut payload, attr_ids::IFLA_LINKINFO, &info);

        let msg = LinkMessage::from_payload(&payload).unwrap();
        assert_eq!(msg.kind.as_deref(), Some("bond"));
        assert_eq!(msg.bond_mode, Some(1));
    }

    #[test]
    fn test_info_data_without_kind() {
        let mut info = Vec::new();
        let data = nested(bond_ids::IFLA_BOND_MODE, &[1]);
        push_attr(&mut info, info_ids::IFLA_INFO_DATA, &data);

        let mut payload = IfInfoMsg::new().with_index(3).as_bytes().to_vec();
        push_attr(&mut payload, attr_ids::IFLA_LINKINFO, &info);

        let msg = LinkMessage::from_payload(&payload).unwrap();
        assert_eq!(msg.kind, None);
        assert_eq!(msg.bond_mode, None);
    }

    #[test]
    fn test_truncated_header() {
        assert!(LinkMessage::from_payload(&[0u8; 4]).is_err());
    }
}
