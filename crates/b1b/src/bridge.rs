//! Linux-bridge FDB reader.
//!
//! Dumps the AF_BRIDGE neighbor table restricted to the bond's bridge
//! and collects the learned entries into the recovery's destination
//! set. The point is to refresh upstream learning for MACs *behind* the
//! bridge: the bond's own MAC is re-announced by the kernel itself on
//! failover, and statically configured entries were never learned.

use tracing::debug;

use crate::bond::BondSession;
use crate::dest::{Dest, DestSet};
use crate::error::Result;
use crate::netlink::Connection;
use crate::netlink::neigh::NeighborMessage;

/// Dump the bridge FDB for `session` and insert every announceable
/// entry into `dests`.
pub async fn collect(conn: &Connection, session: &BondSession, dests: &mut DestSet) -> Result<()> {
    let entries = conn.bridge_fdb(session.brindex).await?;

    for entry in &entries {
        let Some(dest) = announceable(session.ifindex, entry) else {
            continue;
        };
        if !dests.insert(dest) {
            debug!("{}: duplicate FDB entry {}", session.brname, dest);
        }
    }

    Ok(())
}

/// Decide whether one FDB entry should be announced, and as what.
///
/// Skipped: permanent (static) entries, entries on the bond itself, and
/// all-zero or non-Ethernet addresses. A missing VLAN attribute means
/// untagged.
fn announceable(bond_ifindex: u32, entry: &NeighborMessage) -> Option<Dest> {
    let mac = entry.mac()?;
    if entry.is_permanent() || entry.ifindex() == bond_ifindex || mac == [0u8; 6] {
        return None;
    }
    Some(Dest::new(entry.vlan.unwrap_or(0), mac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::neigh::{NeighborMessage, nud, tests::neigh_payload};

    const BOND_IFINDEX: u32 = 5;
    const MAC: [u8; 6] = [0x02, 0xaa, 0, 0, 0, 1];

    fn entry(ifindex: i32, state: u16, mac: [u8; 6], vlan: Option<u16>) -> NeighborMessage {
        NeighborMessage::from_payload(&neigh_payload(ifindex, state, &mac, vlan, Some(7))).unwrap()
    }

    #[test]
    fn test_learned_entry_is_announceable() {
        let msg = entry(9, nud::REACHABLE, MAC, Some(10));
        assert_eq!(announceable(BOND_IFINDEX, &msg), Some(Dest::new(10, MAC)));
    }

    #[test]
    fn test_missing_vlan_means_untagged() {
        let msg = entry(9, nud::STALE, MAC, None);
        assert_eq!(announceable(BOND_IFINDEX, &msg), Some(Dest::new(0, MAC)));
    }

    #[test]
    fn test_permanent_entry_is_skipped() {
        let msg = entry(9, nud::PERMANENT, MAC, Some(10));
        assert_eq!(announceable(BOND_IFINDEX, &msg), None);
    }

    #[test]
    fn test_bond_own_port_is_skipped() {
        let msg = entry(BOND_IFINDEX as i32, nud::REACHABLE, MAC, Some(10));
        assert_eq!(announceable(BOND_IFINDEX, &msg), None);
    }

    #[test]
    fn test_zero_mac_is_skipped() {
        let msg = entry(9, nud::REACHABLE, [0u8; 6], None);
        assert_eq!(announceable(BOND_IFINDEX, &msg), None);
    }

    #[test]
    fn test_non_ethernet_lladdr_is_skipped() {
        let msg =
            NeighborMessage::from_payload(&neigh_payload(9, nud::REACHABLE, &[0u8; 20], None, None))
                .unwrap();
        assert_eq!(announceable(BOND_IFINDEX, &msg), None);
    }
}
