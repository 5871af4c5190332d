use lid_alloc::{Guid, InMemoryGuidLidStore, Lid, PortAllocator, PortSnapshot, SweepInitializer, SweepInputs};

fn port(guid: u64, observed: u16, num_lids: u8) -> PortSnapshot {
    PortSnapshot {
        guid: Guid(guid),
        observed_base_lid: Lid(observed),
        num_lids,
        is_new: observed == 0,
    }
}

fn main() {
    let lmc = 2u8;
    let max_unicast_lid = 0x40u16;
    let block = 1u8 << lmc;

    let mut store = InMemoryGuidLidStore::seed([(Guid(0x1111), Lid(4), Lid(7))]);

    let ports = [
        port(0x1111, 4, block), // already persisted, re-observed unchanged
        port(0x2222, 0, block), // new port, needs a fresh block
        port(0x3333, 0, block),
    ];

    let inputs = SweepInputs {
        max_unicast_lid,
        lmc,
        honor_guid2lid_file: true,
        reassign_all_this_sweep: false,
        just_became_active: true,
        ports: &ports,
    };

    let mut state = SweepInitializer::run(&mut store, &inputs, true).expect("sweep init");

    for p in &ports {
        let decision = PortAllocator::assign(&mut state, &mut store, lmc, max_unicast_lid, false, p)
            .expect("lid space exhausted");
        println!(
            "{} -> [{}, {}] (changed: {})",
            p.guid, decision.min, decision.max, decision.changed
        );
    }
}
