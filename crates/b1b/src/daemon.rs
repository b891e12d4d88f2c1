//! Startup sequence and the failover event loop.
//!
//! Steady state is one `select!` over the signal streams and the link
//! event channel. Each readiness wakeup drains a whole batch of
//! coalesced notifications; the batch marks sessions, then every marked
//! session runs one recovery (FDB read, GARP announcements) before the
//! loop waits again. Recoveries therefore never interleave with event
//! demultiplexing or with each other.

use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info};

use crate::bond::{self, BondSession, BridgeKind};
use crate::bridge;
use crate::dest::DestSet;
use crate::error::{Error, Result};
use crate::garp::{self, PacketSocket};
use crate::netlink::link::{IFLA_EVENT_BONDING_FAILOVER, LinkMessage};
use crate::netlink::message::NlMsgType;
use crate::netlink::{Connection, EventChannel, MessageIter};
use crate::ovs::OvsClient;

/// Daemon configuration from the command line.
#[derive(Debug, Default)]
pub struct Config {
    /// Bond interfaces to monitor; empty means auto-detect.
    pub interfaces: Vec<String>,
}

/// Run the daemon until a termination signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let conn = Connection::new()?;
    let events = EventChannel::new()?;
    let packets = PacketSocket::new()?;
    let mut ovs: Option<OvsClient> = None;

    let mut sessions = bond::discover(&conn, &mut ovs, &config.interfaces).await?;

    info!("monitoring {} bond interface(s)", sessions.len());
    for session in &sessions {
        debug!(
            "{} (ifindex {}): {} {} (ifindex {})",
            session.ifname, session.ifindex, session.kind, session.brname, session.brindex
        );
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                return Ok(());
            }
            batch = events.next_batch() => {
                let batch = batch?;
                mark_failovers(&batch, &mut sessions)?;

                for i in 0..sessions.len() {
                    if !sessions[i].failover {
                        continue;
                    }
                    if let Err(e) = recover(&conn, &packets, &mut ovs, &sessions[i]).await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        // Kernel-side hiccups stay local to this bond.
                        error!("recovery failed for {}: {}", sessions[i].ifname, e);
                    }
                }
            }
        }
    }
}

/// Demultiplex one event batch onto the session array.
///
/// Every session's flag is cleared first, so flags never leak across
/// batches; duplicate failover notifications for one bond collapse into
/// a single marked session. Unparseable messages are transient and
/// reported at most once per batch; message types the link group never
/// carries break the channel contract and are fatal.
fn mark_failovers(batch: &[Vec<u8>], sessions: &mut [BondSession]) -> Result<()> {
    for session in sessions.iter_mut() {
        session.failover = false;
    }

    let mut parse_error_logged = false;
    let mut log_parse_error = |what: &str| {
        if !parse_error_logged {
            error!("dropping unparseable link event: {}", what);
            parse_error_logged = true;
        }
    };

    for data in batch {
        for result in MessageIter::new(data) {
            let (header, payload) = match result {
                Ok(msg) => msg,
                Err(e) => {
                    log_parse_error(&e.to_string());
                    break;
                }
            };

            match header.nlmsg_type {
                NlMsgType::RTM_NEWLINK => {
                    let link = match LinkMessage::from_payload(payload) {
                        Ok(link) => link,
                        Err(e) => {
                            log_parse_error(&e.to_string());
                            continue;
                        }
                    };
                    if link.event != Some(IFLA_EVENT_BONDING_FAILOVER) {
                        continue;
                    }
                    match bond::find_session(sessions, link.ifindex()) {
                        Some(session) if session.failover => {
                            debug!("duplicate failover event for {}", session.ifname);
                        }
                        Some(session) => {
                            info!("failover detected on {}", session.ifname);
                            session.failover = true;
                        }
                        None => {
                            debug!("failover event for untracked ifindex {}", link.ifindex());
                        }
                    }
                }
                NlMsgType::RTM_DELLINK | NlMsgType::NOOP | NlMsgType::DONE => {}
                other => return Err(Error::UnexpectedEvent { msg_type: other }),
            }
        }
    }

    Ok(())
}

/// One recovery run: read the bridge's FDB, announce every entry, drop
/// the set.
async fn recover(
    conn: &Connection,
    packets: &PacketSocket,
    ovs: &mut Option<OvsClient>,
    session: &BondSession,
) -> Result<()> {
    let mut dests = DestSet::new();

    match session.kind {
        BridgeKind::Bridge => bridge::collect(conn, session, &mut dests).await?,
        BridgeKind::Ovs => {
            let Some(client) = ovs.as_mut() else {
                return Err(Error::InvalidMessage(
                    "OVS session without a control client".into(),
                ));
            };
            client.collect_fdb(session, &mut dests).await?;
        }
    }

    info!(
        "{}: announcing {} address(es) on {}",
        session.ifname,
        dests.len(),
        session.brname
    );
    garp::announce(packets, session, &dests).await;

    Ok(())
}
