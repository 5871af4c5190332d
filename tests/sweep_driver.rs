use parking_lot::RwLock;

use sm_lid_mgr::{
    process_sm, process_subnet, ChannelTransport, Guid, InMemoryGuidLidStore, Lid, NodeType,
    PortAttributes, PortInfoPayload, SetRequest, Signal, SubnetContext, SubnetOptions,
};

fn blank_payload() -> PortInfoPayload {
    PortInfoPayload {
        base_lid: 0,
        master_sm_base_lid: 0,
        m_key: 0,
        subnet_prefix: 0,
        m_key_lease_period: 0,
        local_phy_error_threshold: 0,
        overrun_error_threshold: 0,
        subnet_timeout: 0,
        port_state: 0,
        link_down_default_state: 0,
        lmc: 0,
        link_width_enabled: 0,
        link_width_supported: 3,
        link_width_active: 2,
        neighbor_mtu: 4,
        mtu_cap: 4,
        op_vls: 3,
        client_reregister: false,
    }
}

fn channel_adapter(guid: u64) -> PortAttributes {
    PortAttributes {
        guid: Guid(guid),
        node_type: NodeType::ChannelAdapter { port_number: 1 },
        sp0_lmc_capable: false,
        link_width_supported: 3,
        mtu_cap: 4,
        op_vl_cap: 3,
        client_rereg_supported: false,
        neighbor_guid: None,
        is_new: true,
        observed: blank_payload(),
    }
}

fn sm_port(guid: u64) -> PortAttributes {
    PortAttributes {
        node_type: NodeType::Switch { port_number: 0 },
        sp0_lmc_capable: true,
        ..channel_adapter(guid)
    }
}

fn new_context(lmc: u8) -> RwLock<SubnetContext> {
    let store = Box::new(InMemoryGuidLidStore::new());
    let transport = Box::new(ChannelTransport::new(|_req: SetRequest| {}));
    RwLock::new(SubnetContext::new(
        store,
        transport,
        SubnetOptions {
            lmc,
            ..Default::default()
        },
        0x40,
    ))
}

#[test]
fn first_sweep_assigns_sm_port_then_the_rest() {
    let ctx = new_context(2);
    let sm = sm_port(1);
    let ports = vec![sm.clone(), channel_adapter(2), channel_adapter(3)];

    let sm_signal = process_sm(&ctx, &ports, sm.guid).unwrap();
    assert_eq!(sm_signal, Signal::DonePending);

    let subnet_signal = process_subnet(&ctx, &ports, sm.guid).unwrap();
    assert_eq!(subnet_signal, Signal::DonePending);

    let guard = ctx.read();
    assert_eq!(guard.sm_base_lid, Lid(4));
}

#[test]
fn missing_sm_port_is_an_error_and_emits_nothing() {
    let ctx = new_context(2);
    let ports = vec![channel_adapter(2), channel_adapter(3)];

    let err = process_sm(&ctx, &ports, Guid(999)).unwrap_err();
    assert!(matches!(err, sm_lid_mgr::ProcessError::MissingSmPort));
}

#[test]
fn forced_down_link_tracks_neighbor_as_init() {
    let ctx = new_context(2);
    let sm = sm_port(1);
    let mut port_a = channel_adapter(2);
    port_a.neighbor_guid = Some(Guid(3));
    port_a.observed.neighbor_mtu = 2; // stale, below mtu_cap(4): forces a Down transition
    let ports = vec![sm.clone(), port_a, channel_adapter(3)];

    process_sm(&ctx, &ports, sm.guid).unwrap();
    process_subnet(&ctx, &ports, sm.guid).unwrap();

    let guard = ctx.read();
    assert!(guard.tracked_init().any(|g| g == Guid(3)));
}

#[test]
fn second_identical_sweep_is_a_no_op() {
    let ctx = new_context(2);
    let sm = sm_port(1);
    let mut ports = vec![sm.clone(), channel_adapter(2), channel_adapter(3)];

    process_sm(&ctx, &ports, sm.guid).unwrap();
    process_subnet(&ctx, &ports, sm.guid).unwrap();

    // Reflect what the fabric would now report after that first sweep's set
    // requests land: base_lid assigned, no longer new, every option-driven
    // field already at the value build_desired would choose.
    let options = ctx.read().options.clone();
    let expected_base_lid = [4u16, 8, 12];
    for (port, base_lid) in ports.iter_mut().zip(expected_base_lid) {
        port.is_new = false;
        port.observed.base_lid = base_lid;
        port.observed.master_sm_base_lid = 4;
        port.observed.lmc = options.lmc;
        port.observed.link_width_enabled = port.link_width_supported;
        port.observed.link_down_default_state = 2; // Polling
        port.observed.m_key = options.m_key;
        port.observed.subnet_prefix = options.subnet_prefix;
        port.observed.m_key_lease_period = options.m_key_lease_period;
        port.observed.subnet_timeout = options.subnet_timeout;
        port.observed.local_phy_error_threshold = options.local_phy_errors_threshold;
        port.observed.overrun_error_threshold = options.overrun_errors_threshold;
    }

    let sm_signal = process_sm(&ctx, &ports, sm.guid).unwrap();
    let subnet_signal = process_subnet(&ctx, &ports, sm.guid).unwrap();

    assert_eq!(sm_signal, Signal::Done);
    assert_eq!(subnet_signal, Signal::Done);
}
