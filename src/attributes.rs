use lid_alloc::{Guid, Lid};

use crate::options::SubnetOptions;
use crate::port::{LinkDownDefaultState, NodeType, PortAttributes, PortInfoPayload, PortState};

/// Outcome of diffing one port's desired attribute image against what was
/// last observed on the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDecision {
    pub desired: PortInfoPayload,
    /// Whether `desired` differs from the observed image, or this is the
    /// first sweep since becoming active (unconditional emit).
    pub changed: bool,
    /// Set when the link was forced down by an MTU/op_vls mismatch; the
    /// sweep driver uses this to mark the link partner's tracked state as
    /// `Init` so the controller's view matches what the hardware will do.
    pub neighbor_to_reinit: Option<Guid>,
}

/// Switch ports other than port 0 are configured by a separate link manager
/// in a later phase; the attribute builder never touches them.
pub fn should_configure(port: &PortAttributes) -> bool {
    !matches!(port.node_type, NodeType::Switch { port_number } if port_number > 0)
}

/// Builds the desired `PortInfo` image for `port` and decides whether a set
/// request is needed. See §4.6.
pub fn build_desired(
    port: &PortAttributes,
    block_min: Lid,
    sm_base_lid: Lid,
    options: &SubnetOptions,
    first_sweep_since_active: bool,
) -> AttributeDecision {
    let observed = port.observed;
    let mut desired = observed;

    desired.base_lid = block_min.get();
    desired.master_sm_base_lid = sm_base_lid.get();

    desired.m_key = options.m_key;
    desired.subnet_prefix = options.subnet_prefix;
    desired.m_key_lease_period = options.m_key_lease_period;
    desired.subnet_timeout = options.subnet_timeout;
    desired.local_phy_error_threshold = options.local_phy_errors_threshold;
    desired.overrun_error_threshold = options.overrun_errors_threshold;

    desired.port_state = PortState::NoChange as u8;
    desired.link_down_default_state = LinkDownDefaultState::Polling as u8;

    let mut neighbor_to_reinit = None;

    if port.is_switch_port_zero() {
        desired.neighbor_mtu = port.mtu_cap;
        if port.sp0_lmc_capable {
            desired.lmc = options.lmc;
        }
    } else {
        desired.link_width_enabled = port.link_width_supported;
        desired.lmc = options.lmc;
        desired.neighbor_mtu = port.mtu_cap;
        desired.op_vls = port.op_vl_cap;

        if desired.neighbor_mtu != observed.neighbor_mtu || desired.op_vls != observed.op_vls {
            desired.port_state = PortState::Down as u8;
            neighbor_to_reinit = port.neighbor_guid;
        }
    }

    let wants_rereg = (first_sweep_since_active || port.is_new)
        && !options.no_clients_rereg
        && port.client_rereg_supported;
    desired.client_reregister = wants_rereg;

    let changed = first_sweep_since_active || desired != observed;

    AttributeDecision {
        desired,
        changed,
        neighbor_to_reinit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortInfoPayload;

    fn base_payload() -> PortInfoPayload {
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

    fn channel_adapter_port() -> PortAttributes {
        PortAttributes {
            guid: Guid(1),
            node_type: NodeType::ChannelAdapter { port_number: 1 },
            sp0_lmc_capable: false,
            link_width_supported: 3,
            mtu_cap: 4,
            op_vl_cap: 3,
            client_rereg_supported: true,
            neighbor_guid: Some(Guid(2)),
            is_new: false,
            observed: base_payload(),
        }
    }

    #[test]
    fn unconditional_emit_on_first_sweep_since_active() {
        let port = channel_adapter_port();
        let decision = build_desired(&port, Lid(4), Lid(1), &SubnetOptions::default(), true);
        assert!(decision.changed);
    }

    #[test]
    fn no_emit_when_nothing_changed_and_not_first_sweep() {
        let mut port = channel_adapter_port();
        // Steady state: not the first sweep, not a newly-seen port, so
        // client_reregister stays low both times and the image settles.
        let first = build_desired(&port, Lid(4), Lid(1), &SubnetOptions::default(), false);
        port.observed = first.desired;

        let second = build_desired(&port, Lid(4), Lid(1), &SubnetOptions::default(), false);
        assert!(!second.changed);
        assert_eq!(second.desired, first.desired);
    }

    #[test]
    fn mtu_mismatch_forces_port_down_and_flags_neighbor() {
        let mut port = channel_adapter_port();
        port.observed.neighbor_mtu = 2; // stale, lower than mtu_cap
        let decision = build_desired(&port, Lid(4), Lid(1), &SubnetOptions::default(), false);
        assert_eq!(decision.desired.port_state, PortState::Down as u8);
        assert_eq!(decision.neighbor_to_reinit, Some(Guid(2)));
    }

    #[test]
    fn switch_port_zero_skips_link_width_and_vls() {
        let mut port = channel_adapter_port();
        port.node_type = NodeType::Switch { port_number: 0 };
        port.sp0_lmc_capable = false;
        port.observed.neighbor_mtu = 4;

        let decision = build_desired(&port, Lid(1), Lid(1), &SubnetOptions { lmc: 3, ..Default::default() }, false);
        assert_eq!(decision.desired.neighbor_mtu, port.mtu_cap);
        // not LMC-capable: lmc field must be left untouched
        assert_eq!(decision.desired.lmc, 0);
    }

    #[test]
    fn no_clients_rereg_suppresses_client_reregister() {
        let port = channel_adapter_port();
        let opts = SubnetOptions {
            no_clients_rereg: true,
            ..Default::default()
        };
        let decision = build_desired(&port, Lid(4), Lid(1), &opts, true);
        assert!(!decision.desired.client_reregister);
    }
}
