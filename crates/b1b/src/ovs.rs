//! Open vSwitch control client.
//!
//! `ovs-vswitchd` exposes a JSON-RPC 1.0 control socket at
//! `/run/openvswitch/ovs-vswitchd.<pid>.ctl`. The pid is not read from
//! the pid file's contents (which can be stale) but from the advisory
//! write lock the live daemon holds on it. The socket is opened lazily:
//! deployments without OVS bonds never touch the run directory.
//!
//! Two methods are consumed, both read-only: `dpif/show` once per OVS
//! bond at discovery time to resolve the bond's bridge and OpenFlow
//! port, and `fdb/show <bridge>` at every failover.

mod text;

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use crate::bond::BondSession;
use crate::dest::{Dest, DestSet};
use crate::error::{Error, Result};

/// OVS run directory.
const RUN_DIR: &str = "/run/openvswitch";

/// Pid file whose write lock identifies the live daemon.
const PID_FILE: &str = "/run/openvswitch/ovs-vswitchd.pid";

/// Reply size cap; matches the netlink receive buffer.
const REPLY_MAX: usize = 32768;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Vec<&'a str>,
}

#[derive(Deserialize)]
struct Reply {
    id: u64,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: serde_json::Value,
}

/// JSON-RPC client for the `ovs-vswitchd` control socket.
pub struct OvsClient {
    ctl_path: PathBuf,
    stream: Option<UnixStream>,
    next_id: u64,
}

impl OvsClient {
    /// Derive the control socket path from the daemon's pid-file lock.
    /// Fails when no process holds the write lock (OVS not running).
    pub fn locate() -> Result<Self> {
        let pid = lock_holder_pid(PID_FILE)?;
        let ctl_path = PathBuf::from(format!("{}/ovs-vswitchd.{}.ctl", RUN_DIR, pid));
        debug!("ovs-vswitchd control socket: {}", ctl_path.display());
        Ok(Self::with_ctl_path(ctl_path))
    }

    fn with_ctl_path(ctl_path: PathBuf) -> Self {
        Self {
            ctl_path,
            stream: None,
            next_id: 0,
        }
    }

    /// Issue one request and return the textual result.
    ///
    /// Replies must echo the request id and carry exactly one of
    /// `result` (a string) or a non-null `error`. A reply that fills
    /// the buffer cap without parsing completely is fatal.
    ///
    /// The stream is taken out for the duration of the exchange; on any
    /// error it is dropped, so the next request reconnects.
    async fn call(&mut self, method: &str, param: Option<&str>) -> Result<String> {
        let id = self.next_id;
        self.next_id += 1;

        let request = serde_json::to_vec(&Request {
            id,
            method,
            params: param.into_iter().collect(),
        })?;

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => UnixStream::connect(&self.ctl_path).await.map_err(|e| {
                Error::OvsRpc(format!("cannot connect to {}: {}", self.ctl_path.display(), e))
            })?,
        };

        stream.write_all(&request).await?;

        let mut buf = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];
        let reply = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::OvsRpc(format!(
                    "connection closed while waiting for {} reply",
                    method
                )));
            }
            buf.extend_from_slice(&chunk[..n]);

            match serde_json::from_slice::<Reply>(&buf) {
                Ok(reply) => break reply,
                Err(e) if e.is_eof() => {
                    if buf.len() >= REPLY_MAX {
                        return Err(Error::OvsReplyTooLarge { limit: REPLY_MAX });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.stream = Some(stream);
        check_reply(method, id, reply)
    }

    /// Resolve the logical bridge and OpenFlow port of a datapath port,
    /// by kernel interface name.
    pub async fn port_identity(&mut self, ifname: &str) -> Result<(String, u32)> {
        let reply = self.call("dpif/show", None).await?;
        text::scan_dpif(&reply, ifname).ok_or_else(|| {
            Error::OvsParse(format!("dpif/show lists no port named {}", ifname))
        })
    }

    /// Dump the bridge's FDB and insert every announceable entry into
    /// `dests`. Entries learned on the bond's own OpenFlow port and the
    /// bridge-internal `LOCAL` port are excluded.
    pub async fn collect_fdb(&mut self, session: &BondSession, dests: &mut DestSet) -> Result<()> {
        let reply = self.call("fdb/show", Some(&session.brname)).await?;

        // First line is the column header.
        for line in reply.lines().skip(1) {
            let Some(entry) = text::parse_fdb_line(line)? else {
                continue;
            };
            if Some(entry.ofport) == session.ofport {
                continue;
            }
            let dest = Dest::new(entry.vlan, entry.mac);
            if !dests.insert(dest) {
                debug!("{}: duplicate FDB entry {}", session.brname, dest);
            }
        }

        Ok(())
    }
}

fn check_reply(method: &str, id: u64, reply: Reply) -> Result<String> {
    if reply.id != id {
        return Err(Error::OvsRpc(format!(
            "{} reply id {} does not match request id {}",
            method, reply.id, id
        )));
    }
    if !reply.error.is_null() {
        return Err(Error::OvsRpc(format!("{}: {}", method, reply.error)));
    }
    match reply.result.as_str() {
        Some(result) => Ok(result.to_string()),
        None => Err(Error::OvsParse(format!("{} result is not a string", method))),
    }
}

/// Find the pid of the process holding a write lock on `path`.
fn lock_holder_pid(path: &str) -> Result<i32> {
    let file = File::open(path)
        .map_err(|e| Error::OvsRpc(format!("cannot open {}: {}", path, e)))?;

    // SAFETY: fl is a zeroed flock struct queried in place; the fd is
    // live for the duration of the call.
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = libc::F_WRLCK as libc::c_short;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETLK, &mut fl) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    if fl.l_type == libc::F_UNLCK as libc::c_short {
        return Err(Error::OvsNotRunning { path: path.into() });
    }
    Ok(fl.l_pid)
}
