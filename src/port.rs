use scroll::{Pread, Pwrite, BE};

use lid_alloc::{Guid, Lid};

/// Whether a port belongs to a switch or a channel adapter. Only a switch's
/// port 0 gets the special base-only LMC exception (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Switch { port_number: u8 },
    ChannelAdapter { port_number: u8 },
}

impl NodeType {
    pub fn port_number(self) -> u8 {
        match self {
            Self::Switch { port_number } | Self::ChannelAdapter { port_number } => port_number,
        }
    }

    pub fn is_switch_port_zero(self) -> bool {
        matches!(self, Self::Switch { port_number: 0 })
    }
}

/// Port state values relevant to the attribute builder. Other PortInfo
/// `PortState` values (Down, Init, Armed) are only ever read, never written
/// by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PortState {
    NoChange = 0,
    Down = 1,
    Init = 2,
    Armed = 3,
    Active = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkDownDefaultState {
    NoChange = 0,
    Sleep = 1,
    Polling = 2,
}

/// A snapshot of everything about a port the attribute builder (C6) and the
/// port allocator need: discovery-owned, `Clone`, valid for one sweep.
#[derive(Debug, Clone)]
pub struct PortAttributes {
    pub guid: Guid,
    pub node_type: NodeType,
    /// Switch port 0's LMC capability; meaningless for any other port.
    pub sp0_lmc_capable: bool,
    pub link_width_supported: u8,
    pub mtu_cap: u8,
    pub op_vl_cap: u8,
    pub client_rereg_supported: bool,
    /// GUID of the port on the other end of this link, if known. Used only
    /// to flag the peer for a local `Init` state reset when this port's
    /// link is forced down by an MTU/op_vls mismatch.
    pub neighbor_guid: Option<Guid>,
    pub is_new: bool,
    pub observed: PortInfoPayload,
}

impl PortAttributes {
    pub fn is_switch_port_zero(&self) -> bool {
        self.node_type.is_switch_port_zero()
    }

    /// Block size this port needs under `lmc`: the base-only exception for
    /// a non-LMC-capable switch port 0, `1 << lmc` otherwise.
    pub fn num_lids(&self, lmc: u8) -> u8 {
        if self.is_switch_port_zero() && !self.sp0_lmc_capable {
            1
        } else {
            1u8 << lmc
        }
    }

    pub fn to_snapshot(&self, lmc: u8) -> lid_alloc::PortSnapshot {
        lid_alloc::PortSnapshot {
            guid: self.guid,
            observed_base_lid: Lid(self.observed.base_lid),
            num_lids: self.num_lids(lmc),
            is_new: self.is_new,
        }
    }
}

/// The 64-byte PortInfo-shaped attribute block, encoded big-endian to match
/// IBTA field order. Only the fields this crate actually reads or writes are
/// modeled; every other byte of the real 64-byte PortInfo layout is
/// zero-filled on encode and simply discarded on decode, so a round trip only
/// preserves the fields listed below, not the full wire attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfoPayload {
    pub base_lid: u16,
    pub master_sm_base_lid: u16,
    pub m_key: u64,
    pub subnet_prefix: u64,
    pub m_key_lease_period: u16,
    pub local_phy_error_threshold: u8,
    pub overrun_error_threshold: u8,
    pub subnet_timeout: u8,
    pub port_state: u8,
    pub link_down_default_state: u8,
    pub lmc: u8,
    pub link_width_enabled: u8,
    pub link_width_supported: u8,
    pub link_width_active: u8,
    pub neighbor_mtu: u8,
    pub mtu_cap: u8,
    pub op_vls: u8,
    pub client_reregister: bool,
}

pub const PORT_INFO_PAYLOAD_LEN: usize = 64;

impl PortInfoPayload {
    pub fn to_bytes(&self) -> [u8; PORT_INFO_PAYLOAD_LEN] {
        let mut buf = [0u8; PORT_INFO_PAYLOAD_LEN];
        let mut offset = 0usize;
        buf.gwrite_with(self.base_lid, &mut offset, BE).unwrap();
        buf.gwrite_with(self.master_sm_base_lid, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.m_key, &mut offset, BE).unwrap();
        buf.gwrite_with(self.subnet_prefix, &mut offset, BE).unwrap();
        buf.gwrite_with(self.m_key_lease_period, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.local_phy_error_threshold, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.overrun_error_threshold, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.subnet_timeout, &mut offset, BE).unwrap();
        buf.gwrite_with(self.port_state, &mut offset, BE).unwrap();
        buf.gwrite_with(self.link_down_default_state, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.lmc, &mut offset, BE).unwrap();
        buf.gwrite_with(self.link_width_enabled, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.link_width_supported, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.link_width_active, &mut offset, BE)
            .unwrap();
        buf.gwrite_with(self.neighbor_mtu, &mut offset, BE).unwrap();
        buf.gwrite_with(self.mtu_cap, &mut offset, BE).unwrap();
        buf.gwrite_with(self.op_vls, &mut offset, BE).unwrap();
        buf.gwrite_with(self.client_reregister as u8, &mut offset, BE)
            .unwrap();
        buf
    }

    pub fn from_bytes(bytes: &[u8; PORT_INFO_PAYLOAD_LEN]) -> Result<Self, scroll::Error> {
        let mut offset = 0usize;
        Ok(Self {
            base_lid: bytes.gread_with(&mut offset, BE)?,
            master_sm_base_lid: bytes.gread_with(&mut offset, BE)?,
            m_key: bytes.gread_with(&mut offset, BE)?,
            subnet_prefix: bytes.gread_with(&mut offset, BE)?,
            m_key_lease_period: bytes.gread_with(&mut offset, BE)?,
            local_phy_error_threshold: bytes.gread_with(&mut offset, BE)?,
            overrun_error_threshold: bytes.gread_with(&mut offset, BE)?,
            subnet_timeout: bytes.gread_with(&mut offset, BE)?,
            port_state: bytes.gread_with(&mut offset, BE)?,
            link_down_default_state: bytes.gread_with(&mut offset, BE)?,
            lmc: bytes.gread_with(&mut offset, BE)?,
            link_width_enabled: bytes.gread_with(&mut offset, BE)?,
            link_width_supported: bytes.gread_with(&mut offset, BE)?,
            link_width_active: bytes.gread_with(&mut offset, BE)?,
            neighbor_mtu: bytes.gread_with(&mut offset, BE)?,
            mtu_cap: bytes.gread_with(&mut offset, BE)?,
            op_vls: bytes.gread_with(&mut offset, BE)?,
            client_reregister: bytes.gread_with::<u8>(&mut offset, BE)? != 0,
        })
    }
}
