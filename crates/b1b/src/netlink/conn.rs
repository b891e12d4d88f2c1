//! Request and event channels to the kernel's link/neighbor plane.

use tracing::debug;

use super::builder::MessageBuilder;
use super::link::{IfInfoMsg, LinkMessage, attr_ids};
use super::message::{
    MessageIter, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError, NlMsgType,
};
use super::neigh::{AF_BRIDGE, NdMsg, NeighborMessage, nda};
use super::socket::{NetlinkSocket, rtnetlink_groups};
use crate::error::{Error, Result};

/// Synchronous request/response channel.
///
/// One request is in flight at a time; replies are matched on the
/// process-wide sequence number and the socket's bound port id. Strict
/// attribute checking is enabled so malformed requests fail fast.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open the request channel.
    pub fn new() -> Result<Self> {
        let socket = NetlinkSocket::new()?;
        socket.set_strict_checking(true)?;
        Ok(Self { socket })
    }

    /// Send a request and collect every data message belonging to it.
    ///
    /// Works for both single-reply lookups and multi-part dumps: a
    /// multi-part sequence ends on NLMSG_DONE, anything else ends after
    /// the first matching message. Kernel errors surface as
    /// [`Error::Kernel`].
    async fn execute(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        self.socket.send(&builder.finish()).await?;

        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq || header.nlmsg_pid != self.socket.pid() {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    return Ok(responses);
                }

                if header.is_done() {
                    return Ok(responses);
                }

                let multi = header.is_multi();
                responses.push(payload.to_vec());
                if !multi {
                    return Ok(responses);
                }
            }
        }
    }

    /// Look up a single interface by name.
    pub async fn get_link_by_name(&self, name: &str) -> Result<LinkMessage> {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST);
        builder.append(&IfInfoMsg::new());
        builder.append_attr_str(attr_ids::IFLA_IFNAME, name);

        let responses = self.execute(builder).await.map_err(|e| {
            if e.is_not_found() {
                Error::InterfaceNotFound { name: name.into() }
            } else {
                e
            }
        })?;

        match responses.first() {
            Some(payload) => LinkMessage::from_payload(payload),
            None => Err(Error::InterfaceNotFound { name: name.into() }),
        }
    }

    /// Look up a single interface by index.
    pub async fn get_link_by_index(&self, index: u32) -> Result<LinkMessage> {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST);
        builder.append(&IfInfoMsg::new().with_index(index as i32));

        let responses = self.execute(builder).await?;
        match responses.first() {
            Some(payload) => LinkMessage::from_payload(payload),
            None => Err(Error::InterfaceNotFound {
                name: format!("ifindex {}", index),
            }),
        }
    }

    /// Dump every interface.
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        let mut builder =
            MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP);
        builder.append(&IfInfoMsg::new());

        let responses = self.execute(builder).await?;

        let mut links = Vec::with_capacity(responses.len());
        for payload in &responses {
            links.push(LinkMessage::from_payload(payload)?);
        }
        Ok(links)
    }

    /// Dump the bridge FDB restricted to one bridge.
    ///
    /// The master filter is passed to the kernel (honored under strict
    /// checking) and re-applied here for kernels that dump everything.
    pub async fn bridge_fdb(&self, brindex: u32) -> Result<Vec<NeighborMessage>> {
        let mut builder =
            MessageBuilder::new(NlMsgType::RTM_GETNEIGH, NLM_F_REQUEST | NLM_F_DUMP);
        builder.append(&NdMsg::new().with_family(AF_BRIDGE));
        builder.append_attr_u32(nda::MASTER, brindex);

        let responses = self.execute(builder).await?;

        let mut entries = Vec::new();
        for payload in &responses {
            let msg = NeighborMessage::from_payload(payload)?;
            if msg.master == Some(brindex) {
                entries.push(msg);
            }
        }
        Ok(entries)
    }
}

/// Multicast event channel subscribed to the link group.
pub struct EventChannel {
    socket: NetlinkSocket,
}

impl EventChannel {
    /// Open the event channel and join the link multicast group.
    pub fn new() -> Result<Self> {
        let mut socket = NetlinkSocket::new()?;
        socket.add_membership(rtnetlink_groups::RTNLGRP_LINK)?;
        debug!("subscribed to link multicast group");
        Ok(Self { socket })
    }

    /// Wait for link events, then drain everything pending.
    ///
    /// Returns the raw datagrams of one batch; the drain stops on
    /// `EAGAIN`, so an arbitrary number of coalesced notifications is
    /// consumed per readiness wakeup.
    pub async fn next_batch(&self) -> Result<Vec<Vec<u8>>> {
        self.socket.recv_batch().await
    }
}
