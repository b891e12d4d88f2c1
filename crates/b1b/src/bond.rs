//! Bond discovery and session records.
//!
//! A bond qualifies for monitoring when it is a mode-1 (active-backup)
//! bond enslaved to a Linux bridge or an Open vSwitch bridge. Discovery
//! runs once at startup, in one of two modes: explicit (the operator
//! named the interfaces; any non-qualifying name is fatal) or
//! auto-detect (a full link dump; non-qualifying interfaces are
//! skipped, finding none is fatal).

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::netlink::Connection;
use crate::netlink::link::{KIND_BOND, KIND_BRIDGE, KIND_OPENVSWITCH, LinkMessage};
use crate::ovs::OvsClient;

/// What kind of bridge a bond is enslaved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    /// In-kernel bridge driver; FDB read over netlink.
    Bridge,
    /// Open vSwitch; FDB read over the control socket.
    Ovs,
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Ovs => write!(f, "openvswitch"),
        }
    }
}

/// One monitored bond.
#[derive(Debug, Clone)]
pub struct BondSession {
    /// Bond interface name.
    pub ifname: String,
    /// Bond interface index.
    pub ifindex: u32,
    /// Bridge name. For OVS this is the logical bridge, not the kernel
    /// datapath device.
    pub brname: String,
    /// Kernel index of the bridge device.
    pub brindex: u32,
    /// Which FDB source serves this bond.
    pub kind: BridgeKind,
    /// OpenFlow port number of the bond within the OVS bridge; entries
    /// learned on this port are the bond's own and are never announced.
    pub ofport: Option<u32>,
    /// Set while a failover notification from the current event batch
    /// is awaiting recovery.
    pub failover: bool,
}

/// Why a candidate interface cannot be monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    /// Link kind is not "bond".
    NotABond(Option<String>),
    /// Bonding mode is not active-backup.
    NotActiveBackup(Option<u8>),
    /// The bond has no bridge master.
    NoMaster,
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotABond(Some(kind)) => write!(f, "link kind is {:?}, not a bond", kind),
            Self::NotABond(None) => write!(f, "not a bond"),
            Self::NotActiveBackup(Some(mode)) => {
                write!(f, "bonding mode {} is not active-backup", mode)
            }
            Self::NotActiveBackup(None) => write!(f, "bonding mode unknown"),
            Self::NoMaster => write!(f, "not enslaved to a bridge"),
        }
    }
}

/// Check the bond-side gate: kind = bond, mode = 1, master present.
/// Returns the master index on success.
pub fn qualify(link: &LinkMessage) -> std::result::Result<u32, Reject> {
    match link.kind.as_deref() {
        Some(KIND_BOND) => {}
        other => return Err(Reject::NotABond(other.map(str::to_string))),
    }
    if !link.is_active_backup_bond() {
        return Err(Reject::NotActiveBackup(link.bond_mode));
    }
    match link.master {
        Some(master) if master != 0 => Ok(master),
        _ => Err(Reject::NoMaster),
    }
}

/// Discover the bonds to monitor.
///
/// `names` selects explicit mode when non-empty. The OVS client slot is
/// populated on the first OVS-attached bond; purely kernel-bridge
/// deployments never touch the OVS run directory. The returned array is
/// sorted by ifindex for the event loop's binary search.
pub async fn discover(
    conn: &Connection,
    ovs: &mut Option<OvsClient>,
    names: &[String],
) -> Result<Vec<BondSession>> {
    let mut sessions = if names.is_empty() {
        discover_auto(conn, ovs).await?
    } else {
        discover_explicit(conn, ovs, names).await?
    };

    sessions.sort_by_key(|s| s.ifindex);
    sessions.dedup_by_key(|s| s.ifindex);
    Ok(sessions)
}

async fn discover_explicit(
    conn: &Connection,
    ovs: &mut Option<OvsClient>,
    names: &[String],
) -> Result<Vec<BondSession>> {
    let mut sessions = Vec::with_capacity(names.len());

    for name in names {
        let link = conn.get_link_by_name(name).await?;
        let master = qualify(&link).map_err(|reject| Error::InvalidInterfaceType {
            name: name.clone(),
            reason: reject.to_string(),
        })?;
        let session = resolve_master(conn, ovs, &link, master)
            .await?
            .ok_or_else(|| Error::InvalidInterfaceType {
                name: name.clone(),
                reason: "master is neither a bridge nor an Open vSwitch datapath".into(),
            })?;
        sessions.push(session);
    }

    Ok(sessions)
}

async fn discover_auto(
    conn: &Connection,
    ovs: &mut Option<OvsClient>,
) -> Result<Vec<BondSession>> {
    let mut sessions = Vec::new();

    for link in conn.get_links().await? {
        let name = link.name_or("?").to_string();
        let master = match qualify(&link) {
            Ok(master) => master,
            Err(reject) => {
                debug!("skipping {}: {}", name, reject);
                continue;
            }
        };
        // Candidates that fail master resolution are skipped, not fatal:
        // an OVS hiccup on one bond must not take down auto-detection.
        match resolve_master(conn, ovs, &link, master).await {
            Ok(Some(session)) => sessions.push(session),
            Ok(None) => debug!("skipping {}: master is not a supported bridge", name),
            Err(e) => debug!("skipping {}: {}", name, e),
        }
    }

    if sessions.is_empty() {
        return Err(Error::NoUsableBonds);
    }

    Ok(sessions)
}

/// Classify the bond's master and build the session record.
///
/// Returns `Ok(None)` when the master exists but is neither a kernel
/// bridge nor an OVS datapath port. For OVS, the kernel-visible master
/// is a "system" device; the session instead records the logical OVS
/// bridge (from `dpif/show`) and the kernel index of that bridge's
/// internal device.
async fn resolve_master(
    conn: &Connection,
    ovs: &mut Option<OvsClient>,
    link: &LinkMessage,
    master: u32,
) -> Result<Option<BondSession>> {
    let ifname = link.name_or("?").to_string();
    let master_link = conn.get_link_by_index(master).await?;

    match master_link.kind.as_deref() {
        Some(KIND_BRIDGE) => Ok(Some(BondSession {
            ifname,
            ifindex: link.ifindex(),
            brname: master_link.name_or("?").to_string(),
            brindex: master,
            kind: BridgeKind::Bridge,
            ofport: None,
            failover: false,
        })),
        Some(KIND_OPENVSWITCH) => {
            let client = match ovs.take() {
                Some(client) => client,
                None => OvsClient::locate()?,
            };
            let client = ovs.insert(client);
            let (brname, ofport) = client.port_identity(&ifname).await?;
            let bridge_link = conn.get_link_by_name(&brname).await?;
            debug!(
                "{}: OVS bridge {} (ofport {}, ifindex {})",
                ifname,
                brname,
                ofport,
                bridge_link.ifindex()
            );
            Ok(Some(BondSession {
                ifname,
                ifindex: link.ifindex(),
                brindex: bridge_link.ifindex(),
                brname,
                kind: BridgeKind::Ovs,
                ofport: Some(ofport),
                failover: false,
            }))
        }
        _ => Ok(None),
    }
}

/// Locate a session by bond ifindex. The array is sorted by ifindex, so
/// this is the event loop's hot-path lookup.
pub fn find_session(sessions: &mut [BondSession], ifindex: u32) -> Option<&mut BondSession> {
    sessions
        .binary_search_by(|s| s.ifindex.cmp(&ifindex))
        .ok()
        .map(|i| &mut sessions[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::link::LinkMessage;

    fn link(kind: Option<&str>, bond_mode: Option<u8>, master: Option<u32>) -> LinkMessage {
        LinkMessage {
            name: Some("bond0".into()),
            kind: kind.map(str::to_string),
            bond_mode,
            master,
            ..Default::default()
        }
    }

    #[test]
    fn test_qualify_accepts_mode1_bond_with_master() {
        assert_eq!(qualify(&link(Some("bond"), Some(1), Some(7))), Ok(7));
    }

    #[test]
    fn test_qualify_rejects_non_bond() {
        assert_eq!(
            qualify(&link(Some("veth"), None, Some(7))),
            Err(Reject::NotABond(Some("veth".into())))
        );
        assert_eq!(qualify(&link(None, None, None)), Err(Reject::NotABond(None)));
    }

    #[test]
    fn test_qualify_rejects_wrong_mode() {
        // balance-rr (0) and 802.3ad (4) bonds do not fail over this way
        assert_eq!(
            qualify(&link(Some("bond"), Some(0), Some(7))),
            Err(Reject::NotActiveBackup(Some(0)))
        );
        assert_eq!(
            qualify(&link(Some("bond"), Some(4), Some(7))),
            Err(Reject::NotActiveBackup(Some(4)))
        );
    }

    #[test]
    fn test_qualify_rejects_masterless_bond() {
        assert_eq!(
            qualify(&link(Some("bond"), Some(1), None)),
            Err(Reject::NoMaster)
        );
        assert_eq!(
            qualify(&link(Some("bond"), Some(1), Some(0))),
            Err(Reject::NoMaster)
        );
    }

    fn session(ifindex: u32) -> BondSession {
        BondSession {
            ifname: format!("bond{}", ifindex),
            ifindex,
            brname: "br0".into(),
            brindex: 1,
            kind: BridgeKind::Bridge,
            ofport: None,
            failover: false,
        }
    }

    #[test]
    fn test_find_session_binary_search() {
        let mut sessions = vec![session(3), session(9), session(17)];
        assert_eq!(find_session(&mut sessions, 9).unwrap().ifindex, 9);
        assert!(find_session(&mut sessions, 4).is_none());
        assert!(find_session(&mut sessions, 18).is_none());
    }
}
