//! Bridge FDB relearning for mode-1 bond failovers.
//!
//! When the kernel bonding driver fails over an active-backup bond, the
//! upstream fabric keeps forwarding traffic for MACs learned behind the
//! bond toward the old physical port. The kernel re-announces the bond's
//! own address, but MACs living behind a bridge the bond is enslaved to
//! (tap devices, OVS ports) are never refreshed. This crate watches the
//! rtnetlink link multicast group for bonding-failover notifications,
//! reads the bridge's forwarding database (kernel bridge via netlink, OVS
//! via its control socket), and sends one gratuitous ARP per learned
//! (VLAN, MAC) pair on the bond so every upstream switch relearns it on
//! the now-active slave.
//!
//! The [`daemon`] module ties everything together; the remaining modules
//! are the individual stages of the event → recovery pipeline:
//!
//! - [`netlink`]: request and event channels to the kernel
//! - [`bond`]: discovery and classification of monitorable bonds
//! - [`bridge`]: kernel-bridge FDB reader
//! - [`ovs`]: `ovs-vswitchd` control-socket client and FDB reader
//! - [`dest`]: the per-recovery (VLAN, MAC) destination set
//! - [`garp`]: gratuitous-ARP frame construction and transmission

pub mod bond;
pub mod bridge;
pub mod daemon;
pub mod dest;
mod error;
pub mod garp;
pub mod netlink;
pub mod ovs;

pub use error::{Error, Result};
