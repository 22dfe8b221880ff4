//! The per-epoch switching engine.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread;

use flitnet_wire::{mac, TokenGeometry};

use crate::error::{Result, SwitchError};
use crate::packet::SwitchPacket;
use crate::port::{Port, Throttle};
use crate::table::MacTable;

/// Reorder-heap entry: min by `(timestamp, seq)`, where `seq` is the
/// drain-order tie-break so packets with equal arrival cycles keep their
/// insertion order.
struct HeapEntry {
    timestamp: u64,
    seq: u64,
    packet: SwitchPacket,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.timestamp, self.seq) == (other.timestamp, other.seq)
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// The switch: all ports, the routing table, and the epoch clock.
///
/// One call to [`run_epoch`](Self::run_epoch) moves one link-latency window
/// end to end; [`run`](Self::run) loops forever. Per-port phases fork one
/// scoped worker per port and join at the phase boundary; the reorder/route
/// phase is serial by construction, as the fabric's linearization point.
pub struct SwitchEngine {
    geom: TokenGeometry,
    link_latency: u64,
    switch_latency: u64,
    throttle: Throttle,
    output_limit: Option<u64>,
    table: MacTable,
    ports: Vec<Port>,
    epoch_start: u64,
}

impl std::fmt::Debug for SwitchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchEngine")
            .field("geom", &self.geom)
            .field("link_latency", &self.link_latency)
            .field("switch_latency", &self.switch_latency)
            .field("throttle", &self.throttle)
            .field("output_limit", &self.output_limit)
            .field("table", &self.table)
            .field("num_ports", &self.ports.len())
            .field("epoch_start", &self.epoch_start)
            .finish()
    }
}

impl SwitchEngine {
    /// Assemble an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the link latency is not a whole number of
    /// big-tokens, the bandwidth does not reduce to a throttle, or the port
    /// list does not match the table's topology.
    pub fn new(
        geom: TokenGeometry,
        link_latency: u64,
        switch_latency: u64,
        bandwidth_gbps: u32,
        table: MacTable,
        ports: Vec<Port>,
    ) -> Result<Self> {
        geom.validate_latency(link_latency)?;
        let throttle = Throttle::derive(bandwidth_gbps)?;
        if ports.len() != table.topology().num_ports() {
            return Err(SwitchError::invalid_config(format!(
                "{} ports configured, but the topology has {} (downlinks {} + uplinks {})",
                ports.len(),
                table.topology().num_ports(),
                table.topology().downlinks,
                table.topology().uplinks,
            )));
        }
        tracing::info!(
            "switch: {} ports, link latency {link_latency}, switching latency {switch_latency}, throttle {}/{}",
            ports.len(),
            throttle.numer,
            throttle.denom,
        );
        Ok(Self {
            geom,
            link_latency,
            switch_latency,
            throttle,
            output_limit: None,
            table,
            ports,
            epoch_start: 0,
        })
    }

    /// Cap each port's modeled egress buffer at `flits`; packets that would
    /// have overflowed it are dropped.
    #[must_use]
    pub fn with_output_limit(mut self, flits: u64) -> Self {
        self.output_limit = Some(flits);
        self
    }

    /// First cycle of the current epoch.
    pub const fn epoch_start(&self) -> u64 {
        self.epoch_start
    }

    /// Borrow port `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn port(&self, index: usize) -> &Port {
        &self.ports[index]
    }

    /// Fork one worker per port, join all, and surface the first failure.
    fn for_each_port<F>(&mut self, phase: &'static str, f: F) -> Result<()>
    where
        F: Fn(&mut Port) -> Result<()> + Sync,
    {
        let f = &f;
        thread::scope(|scope| {
            let workers: Vec<_> = self
                .ports
                .iter_mut()
                .map(|port| scope.spawn(move || f(port)))
                .collect();
            for worker in workers {
                worker.join().map_err(|_| SwitchError::Worker { phase })??;
            }
            Ok(())
        })
    }

    /// Run one full epoch: receive, clear, decode, reorder/route, encode,
    /// send, tick, advance time.
    ///
    /// # Errors
    ///
    /// Returns the first port or routing failure; all are fatal.
    pub fn run_epoch(&mut self) -> Result<()> {
        // Phase A: every backend blocks until its inbound epoch is here
        self.for_each_port("recv", Port::recv)?;

        // Phase B: epoch-boundary hooks, then invalidate outbound slots
        let geom = self.geom;
        self.for_each_port("pre-tick", move |port| {
            port.tick_pre();
            port.setup_send_buf(&geom);
            Ok(())
        })?;

        // Phase C: decode inbound flits into timestamped packets
        let (epoch_start, switch_latency, link_latency) =
            (self.epoch_start, self.switch_latency, self.link_latency);
        self.for_each_port("ingress", move |port| {
            port.absorb_input(&geom, epoch_start, switch_latency, link_latency);
            Ok(())
        })?;

        // Phase D (serial): global reorder and routing
        self.reorder_and_route()?;

        // Phase E: place flits honoring timestamps, throttle, and buffer cap
        let (throttle, output_limit) = (self.throttle, self.output_limit);
        self.for_each_port("egress", move |port| {
            port.write_flits_to_output(&geom, epoch_start, link_latency, throttle, output_limit);
            Ok(())
        })?;

        // Phase F: flush outbound epochs
        self.for_each_port("send", Port::send)?;

        self.for_each_port("tick", |port| {
            port.tick();
            Ok(())
        })?;
        self.epoch_start += self.link_latency;
        Ok(())
    }

    /// Drain every input queue into the global min-heap, then pop in
    /// timestamp order and hand each packet to its destination port.
    fn reorder_and_route(&mut self) -> Result<()> {
        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
        let mut seq = 0u64;
        for port in &mut self.ports {
            while let Some(packet) = port.inputqueue.pop_front() {
                heap.push(Reverse(HeapEntry {
                    timestamp: packet.timestamp,
                    seq,
                    packet,
                }));
                seq += 1;
            }
        }

        let mut rng = rand::thread_rng();
        let topology = self.table.topology();
        while let Some(Reverse(entry)) = heap.pop() {
            let packet = entry.packet;
            let route = mac::route_field(mac::first_word(packet.flit(0)));
            if route == mac::BROADCAST {
                // deep-copy to every downlink plus the zeroth uplink; never
                // back to the sender
                for target in 0..topology.broadcast_targets() {
                    if target == packet.sender {
                        continue;
                    }
                    tracing::trace!(
                        "broadcast from port {} to port {target} at cycle {}",
                        packet.sender,
                        packet.timestamp
                    );
                    self.ports[target].outputqueue.push_back(packet.clone());
                }
            } else {
                let dest = self.table.route(route, &mut rng)?;
                tracing::trace!(
                    "packet from port {} to port {dest} at cycle {}",
                    packet.sender,
                    packet.timestamp
                );
                self.ports[dest].outputqueue.push_back(packet);
            }
        }
        Ok(())
    }

    /// Run epochs until a fatal error. Never returns otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first fatal epoch failure.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.run_epoch()?;
        }
    }
}
