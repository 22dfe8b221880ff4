//! End-to-end fabric test: a NIC endpoint and a one-port switch exchanging
//! a real epoch through shared-memory rings and their handshake bytes.
//!
//! The NIC's FPGA side is mocked; everything between the DMA boundary and
//! the switch (ring creation, flag protocol, ingress decode, routing,
//! egress encode) is the production path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

use flitnet_nic::fpga::{FpgaDma, NicMmio};
use flitnet_nic::{NicConfig, NicEndpoint};
use flitnet_shmem::{ring_name, Direction, TokenRing};
use flitnet_switch::backends::ShmemBackend;
use flitnet_switch::{MacTable, Port, SwitchEngine, Topology};
use flitnet_wire::{regs, TokenGeometry};

const GEOM: TokenGeometry = TokenGeometry::switch_link();
const LINK: u64 = 70;
const SWITCH_LATENCY: u64 = 35;

#[derive(Default)]
struct MockMmio {
    reads: HashMap<usize, VecDeque<u32>>,
}

impl MockMmio {
    fn script_read(&mut self, reg: usize, value: u32) {
        self.reads.entry(reg).or_default().push_back(value);
    }
}

impl NicMmio for MockMmio {
    fn read(&mut self, reg: usize) -> flitnet_nic::Result<u32> {
        Ok(self
            .reads
            .get_mut(&reg)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0))
    }

    fn write(&mut self, _reg: usize, _value: u32) -> flitnet_nic::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MockDma {
    fill: VecDeque<Vec<u8>>,
    pushed: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FpgaDma for MockDma {
    fn push(&mut self, _addr: u64, src: &[u8]) -> flitnet_nic::Result<usize> {
        self.pushed.lock().unwrap().push(src.to_vec());
        Ok(src.len())
    }

    fn pull(&mut self, _addr: u64, dst: &mut [u8]) -> flitnet_nic::Result<usize> {
        if let Some(data) = self.fill.pop_front() {
            dst[..data.len()].copy_from_slice(&data);
        }
        Ok(dst.len())
    }
}

#[test]
fn nic_epoch_round_trips_through_the_switch() {
    let epoch_bytes = GEOM.epoch_bytes(LINK);
    let port_name = format!("fabric{}", std::process::id());

    // switch side first: the downlink owns (creates and zeroes) the regions
    let backend = ShmemBackend::downlink(&port_name, epoch_bytes).expect("create rings");
    let topology = Topology {
        downlinks: 1,
        uplinks: 0,
    };
    let mut table = MacTable::new(topology);
    table.insert(0x0000, 0).unwrap();
    let mut engine = SwitchEngine::new(
        GEOM,
        LINK,
        SWITCH_LATENCY,
        200,
        table,
        vec![Port::new(0, true, Box::new(backend))],
    )
    .unwrap();

    // one epoch from the simulated NIC: a 3-flit packet to MAC 0 at slot 0
    let mut epoch = vec![0u8; epoch_bytes];
    let flits = [[0u8; 8], [0x11; 8], [0x22; 8]];
    for (slot, flit) in flits.iter().enumerate() {
        GEOM.write_flit(&mut epoch, slot, flit);
        GEOM.set_valid(&mut epoch, slot);
    }
    GEOM.set_last(&mut epoch, 2, true);

    let mut mmio = MockMmio::default();
    mmio.script_read(regs::OUTGOING_COUNT, 0); // boot
    mmio.script_read(regs::OUTGOING_COUNT, u32::try_from(GEOM.epoch_bigtokens(LINK)).unwrap());

    let mut dma = MockDma::default();
    dma.fill.push_back(epoch);
    let pushed = Arc::clone(&dma.pushed);

    let cfg = NicConfig::from_plusargs(
        0,
        &[
            "+linklatency0=70".to_string(),
            format!("+shmemportname0={port_name}"),
            "+macaddr0=00:00:00:00:00:00".to_string(),
        ],
    )
    .unwrap();

    let nic = thread::spawn(move || {
        let mut nic = NicEndpoint::new(mmio, dma, 0x2000, GEOM, cfg).expect("endpoint");
        nic.init().expect("init");
        // one full epoch both ways, then the widget reads idle
        nic.tick().expect("tick");
    });

    engine.run_epoch().expect("switch epoch");
    nic.join().expect("nic thread");

    let pushed = pushed.lock().unwrap();
    // [0] is the prime, [1] is the switch's response epoch
    assert_eq!(pushed.len(), 2);
    let response = &pushed[1];
    let valid: Vec<usize> = (0..LINK as usize)
        .filter(|&s| GEOM.is_valid(response, s))
        .collect();
    assert_eq!(valid, vec![35, 36, 37], "switched packet lands at the switching latency");
    for (k, flit) in flits.iter().enumerate() {
        assert_eq!(GEOM.flit(response, 35 + k), flit);
    }
    assert!(GEOM.is_last(response, 37));

    for j in 0..2 {
        let _ = TokenRing::unlink(&ring_name(Direction::NicToSwitch, &port_name, j));
        let _ = TokenRing::unlink(&ring_name(Direction::SwitchToNic, &port_name, j));
    }
}
