//! Scanners for the textual replies of the OVS control daemon.
//!
//! `dpif/show` lists datapaths, their bridges, and per-bridge port
//! lines; `fdb/show` is a header line followed by one
//! `<port> <vlan> <mac>` entry per line. Both formats are
//! whitespace-tokenized here, with winnow parsers for the tokens that
//! carry structure (MAC addresses, `ofport/odp-port` numbers).

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};

type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

fn hex_octet(input: &mut &str) -> PResult<u8> {
    take_while(1..=2, |c: char| c.is_ascii_hexdigit())
        .try_map(|s: &str| u8::from_str_radix(s, 16))
        .parse_next(input)
}

fn mac(input: &mut &str) -> PResult<[u8; 6]> {
    let mut out = [hex_octet(input)?, 0, 0, 0, 0, 0];
    for octet in &mut out[1..] {
        ':'.parse_next(input)?;
        *octet = hex_octet(input)?;
    }
    Ok(out)
}

/// Parse a complete colon-separated MAC token.
fn parse_mac(token: &str) -> Option<[u8; 6]> {
    mac.parse(token).ok()
}

/// Extract the leading decimal number of a token, if any. Port tokens
/// in `dpif/show` look like `5/2:`; only the ofport part matters.
fn leading_number(token: &str) -> Option<u32> {
    let result: PResult<u32> = take_while(1.., |c: char| c.is_ascii_digit())
        .parse_to::<u32>()
        .parse_next(&mut &*token);
    result.ok()
}

/// Scan a `dpif/show` reply for the named port.
///
/// A line whose second token does not start with a number names a
/// datapath or bridge section; a line shaped `<name> <number>…` names a
/// port. Returns the enclosing section name and the port's ofport for
/// the first matching port line.
pub(crate) fn scan_dpif(reply: &str, port: &str) -> Option<(String, u32)> {
    let mut section: Option<&str> = None;

    for line in reply.lines() {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        match tokens.next().and_then(leading_number) {
            Some(ofport) => {
                if first == port {
                    return section.map(|name| (name.to_string(), ofport));
                }
            }
            None => section = Some(first.trim_end_matches(':')),
        }
    }

    None
}

/// One entry of an `fdb/show` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FdbLine {
    /// OpenFlow port the MAC was learned on.
    pub ofport: u32,
    /// VLAN id (0 = untagged).
    pub vlan: u16,
    /// Learned MAC.
    pub mac: [u8; 6],
}

/// Parse one `fdb/show` entry line.
///
/// Returns `Ok(None)` for blank lines and for entries on the
/// bridge-internal `LOCAL` port; anything else that fails to parse is a
/// malformed reply and therefore an error.
pub(crate) fn parse_fdb_line(line: &str) -> Result<Option<FdbLine>> {
    let mut tokens = line.split_whitespace();
    let Some(port) = tokens.next() else {
        return Ok(None);
    };
    let (Some(vlan), Some(mac)) = (tokens.next(), tokens.next()) else {
        return Err(Error::OvsParse(format!("short fdb/show line {:?}", line)));
    };

    if port == "LOCAL" {
        return Ok(None);
    }
    let ofport = port
        .parse::<u32>()
        .map_err(|_| Error::OvsParse(format!("bad port in fdb/show line {:?}", line)))?;
    let vlan = vlan
        .parse::<u16>()
        .map_err(|_| Error::OvsParse(format!("bad VLAN in fdb/show line {:?}", line)))?;
    let mac = parse_mac(mac)
        .ok_or_else(|| Error::OvsParse(format!("bad MAC in fdb/show line {:?}", line)))?;

    Ok(Some(FdbLine { ofport, vlan, mac }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DPIF_SHOW: &str = "\
system@ovs-system: hit:353485 missed:143
  br-int:
    br-int 65534/1: (internal)
    bond0 3/2: (system)
    vnet7 8/5:
  br-ex:
    br-ex 65534/3: (internal)
    bond1 4/4: (system)
";

    #[test]
    fn test_scan_dpif_finds_port_in_section() {
        assert_eq!(scan_dpif(DPIF_SHOW, "bond0"), Some(("br-int".into(), 3)));
        assert_eq!(scan_dpif(DPIF_SHOW, "bond1"), Some(("br-ex".into(), 4)));
    }

    #[test]
    fn test_scan_dpif_missing_port() {
        assert_eq!(scan_dpif(DPIF_SHOW, "bond9"), None);
    }

    #[test]
    fn test_scan_dpif_stats_line_is_a_section() {
        // "hit:353485" does not start with a digit, so the datapath
        // line opens a section rather than naming a port.
        assert_eq!(
            scan_dpif("netdev@ovs-netdev: hit:0 missed:0\n  tap0 7/1:\n", "tap0"),
            Some(("netdev@ovs-netdev".into(), 7))
        );
    }

    #[test]
    fn test_parse_fdb_entry() {
        let entry = parse_fdb_line("    5     0  02:aa:bb:cc:dd:02    1").unwrap().unwrap();
        assert_eq!(
            entry,
            FdbLine {
                ofport: 5,
                vlan: 0,
                mac: [0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x02],
            }
        );
    }

    #[test]
    fn test_parse_fdb_vlan_entry() {
        let entry = parse_fdb_line("    3    10  52:54:00:12:34:56  112").unwrap().unwrap();
        assert_eq!(entry.vlan, 10);
        assert_eq!(entry.ofport, 3);
    }

    #[test]
    fn test_parse_fdb_local_skipped() {
        assert_eq!(parse_fdb_line("LOCAL     0  aa:bb:cc:dd:ee:ff    0").unwrap(), None);
    }

    #[test]
    fn test_parse_fdb_blank_skipped() {
        assert_eq!(parse_fdb_line("   ").unwrap(), None);
        assert_eq!(parse_fdb_line("").unwrap(), None);
    }

    #[test]
    fn test_parse_fdb_malformed_is_fatal() {
        assert!(parse_fdb_line("3 0").is_err());
        assert!(parse_fdb_line("x 0 aa:bb:cc:dd:ee:ff").is_err());
        assert!(parse_fdb_line("3 fast aa:bb:cc:dd:ee:ff").is_err());
        assert!(parse_fdb_line("3 0 aa:bb:cc:dd:ee").is_err());
        assert!(parse_fdb_line("3 0 aa:bb:cc:dd:ee:gg").is_err());
    }

    #[test]
    fn test_parse_mac_token() {
        assert_eq!(
            parse_mac("02:aa:bb:cc:dd:01"),
            Some([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x01])
        );
        assert_eq!(parse_mac("2:a:b:c:d:1"), Some([2, 0xa, 0xb, 0xc, 0xd, 1]));
        assert_eq!(parse_mac("02:aa:bb:cc:dd"), None);
        assert_eq!(parse_mac("02:aa:bb:cc:dd:01:02"), None);
    }
}
