//! Port topology and the destination-MAC routing table.
//!
//! The table maps the low 16 bits of a destination MAC to a port index. It
//! is runtime configuration: a plain text file of `<mac16-hex> <port>` pairs
//! loaded once at startup. The reserved entry value `downlinks` means "any
//! uplink"; the switch picks one uniformly at random. That is also the
//! default for MACs the file does not list.

use std::path::Path;

use rand::Rng;

use crate::error::{Result, SwitchError};

/// Entries in the MAC table: one per possible low-16-bit MAC value.
pub const MAC_TABLE_SIZE: usize = 1 << 16;

/// Port classification of one switch.
///
/// Ports `0..downlinks` face end hosts; ports
/// `downlinks..downlinks+uplinks` face the topology core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    /// Number of downlink ports.
    pub downlinks: usize,
    /// Number of uplink ports.
    pub uplinks: usize,
}

impl Topology {
    /// Total port count.
    pub const fn num_ports(&self) -> usize {
        self.downlinks + self.uplinks
    }

    /// Ports a broadcast copies to: every downlink plus at most the zeroth
    /// uplink. Restricting broadcast to one uplink keeps broadcasts from
    /// looping through the topology core.
    pub const fn broadcast_targets(&self) -> usize {
        self.downlinks + if self.uplinks > 0 { 1 } else { 0 }
    }
}

/// Dense MAC → port map plus the topology it routes within.
#[derive(Debug, Clone)]
pub struct MacTable {
    map: Vec<u16>,
    topology: Topology,
}

impl MacTable {
    /// Empty table: every MAC routes to "any uplink".
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let any_uplink = topology.downlinks as u16;
        Self {
            map: vec![any_uplink; MAC_TABLE_SIZE],
            topology,
        }
    }

    /// The topology this table routes within.
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Map `mac` to a port index, or to `downlinks` for "any uplink".
    ///
    /// # Errors
    ///
    /// Returns an error if `entry` names a port the topology does not have.
    pub fn insert(&mut self, mac: u16, entry: u16) -> Result<()> {
        if entry as usize > self.topology.num_ports()
            || (entry as usize == self.topology.num_ports()
                && entry as usize != self.topology.downlinks)
        {
            return Err(SwitchError::invalid_config(format!(
                "MAC {mac:#06x} maps to port {entry}, but the switch has ports 0..{}",
                self.topology.num_ports()
            )));
        }
        self.map[mac as usize] = entry;
        Ok(())
    }

    /// Load a table from `<mac16-hex> <port>` lines. Blank lines and `#`
    /// comments are skipped; unlisted MACs keep the "any uplink" default.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable files, malformed lines, or entries
    /// outside the topology.
    pub fn load(path: &Path, topology: Topology) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut table = Self::new(topology);
        let mut entries = 0usize;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let malformed = |reason: String| SwitchError::MacTable {
                line: lineno + 1,
                reason,
            };
            let mut fields = line.split_whitespace();
            let (mac, port) = match (fields.next(), fields.next(), fields.next()) {
                (Some(mac), Some(port), None) => (mac, port),
                _ => return Err(malformed(format!("expected '<mac16-hex> <port>', got {line:?}"))),
            };
            let mac = u16::from_str_radix(mac.trim_start_matches("0x"), 16)
                .map_err(|e| malformed(format!("bad MAC {mac:?}: {e}")))?;
            let port: u16 = port
                .parse()
                .map_err(|e| malformed(format!("bad port {port:?}: {e}")))?;
            table.insert(mac, port)?;
            entries += 1;
        }
        tracing::info!(
            "loaded {entries} MAC table entries from {}",
            path.display()
        );
        Ok(table)
    }

    /// Resolve `mac` to a concrete egress port, picking a random uplink for
    /// "any uplink" entries.
    ///
    /// # Errors
    ///
    /// Returns an error if `mac` routes to an uplink on a switch without
    /// uplinks.
    pub fn route(&self, mac: u16, rng: &mut impl Rng) -> Result<usize> {
        let entry = self.map[mac as usize] as usize;
        if entry != self.topology.downlinks {
            return Ok(entry);
        }
        if self.topology.uplinks == 0 {
            return Err(SwitchError::UnroutableMac { mac });
        }
        Ok(rng.gen_range(self.topology.downlinks..self.topology.num_ports()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: Topology = Topology {
        downlinks: 3,
        uplinks: 2,
    };

    #[test]
    fn explicit_entries_route_directly() {
        let mut table = MacTable::new(TOPOLOGY);
        table.insert(0x0002, 1).unwrap();
        let mut rng = rand::thread_rng();
        assert_eq!(table.route(0x0002, &mut rng).unwrap(), 1);
    }

    #[test]
    fn unlisted_macs_pick_a_random_uplink() {
        let table = MacTable::new(TOPOLOGY);
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let port = table.route(0xBEEF, &mut rng).unwrap();
            assert!((3..5).contains(&port), "picked {port}");
        }
    }

    #[test]
    fn any_uplink_without_uplinks_is_fatal() {
        let table = MacTable::new(Topology {
            downlinks: 2,
            uplinks: 0,
        });
        let mut rng = rand::thread_rng();
        assert!(matches!(
            table.route(0x0009, &mut rng),
            Err(SwitchError::UnroutableMac { mac: 0x0009 })
        ));
    }

    #[test]
    fn out_of_range_entries_are_rejected() {
        let mut table = MacTable::new(TOPOLOGY);
        assert!(table.insert(0x0001, 6).is_err());
        // the "any uplink" sentinel itself is a valid entry
        assert!(table.insert(0x0001, 3).is_ok());
    }

    #[test]
    fn parses_the_text_format() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("flitnet_mac_table_{}.txt", std::process::id()));
        std::fs::write(
            &path,
            "# host MACs\n0x0002 0\n0003 1   # second host\n\nbeef 3\n",
        )
        .unwrap();
        let table = MacTable::load(&path, TOPOLOGY).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut rng = rand::thread_rng();
        assert_eq!(table.route(0x0002, &mut rng).unwrap(), 0);
        assert_eq!(table.route(0x0003, &mut rng).unwrap(), 1);
        // explicit "any uplink" entry falls through to the random pick
        assert!((3..5).contains(&table.route(0xBEEF, &mut rng).unwrap()));
    }

    #[test]
    fn rejects_malformed_lines() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("flitnet_mac_table_bad_{}.txt", std::process::id()));
        std::fs::write(&path, "0x0002\n").unwrap();
        let err = MacTable::load(&path, TOPOLOGY).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, SwitchError::MacTable { line: 1, .. }));
    }
}
