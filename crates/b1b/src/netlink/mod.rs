//! Kernel link/neighbor channel (NETLINK_ROUTE).
//!
//! Two independent channels are used: a request/response channel with
//! strict attribute checking for lookups and dumps, and a multicast
//! event channel subscribed to the link group for failover
//! notifications. [`conn::Connection`] and [`conn::EventChannel`] are
//! the entry points; the remaining modules are the wire plumbing.

pub mod attr;
mod builder;
pub mod conn;
pub mod link;
pub mod message;
pub mod neigh;
mod socket;

pub use attr::{AttrIter, NlAttr};
pub use builder::MessageBuilder;
pub use conn::{Connection, EventChannel};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::{NetlinkSocket, rtnetlink_groups};
