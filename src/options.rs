use serde::Deserialize;

/// Subnet-wide tunables consumed by the sweep driver, the allocator, and the
/// attribute builder. Parsing the surrounding config file/CLI format is out
/// of scope for this crate — a host binary deserializes into this struct
/// however it likes (JSON, TOML, env vars via `envy`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct SubnetOptions {
    /// LID Mask Control, in `0..=7`.
    #[serde(default = "default_lmc")]
    pub lmc: u8,
    /// Reassign every LID from scratch on the next sweep, ignoring both
    /// persistence and current port state.
    #[serde(default)]
    pub reassign_lids: bool,
    /// Load the persisted guid→lid map on the standby→active transition
    /// instead of starting from empty.
    #[serde(default = "default_true")]
    pub honor_guid2lid_file: bool,
    /// Treat a strict-mode persistence load failure as fatal (abort the
    /// sweep) rather than logging and continuing with an empty map.
    #[serde(default)]
    pub exit_on_fatal: bool,
    /// Suppress `client_reregister` even when a port's capabilities
    /// advertise support for it.
    #[serde(default)]
    pub no_clients_rereg: bool,
    #[serde(default)]
    pub m_key: u64,
    #[serde(default)]
    pub subnet_prefix: u64,
    #[serde(default)]
    pub m_key_lease_period: u16,
    #[serde(default = "default_subnet_timeout")]
    pub subnet_timeout: u8,
    #[serde(default = "default_phy_error_threshold")]
    pub local_phy_errors_threshold: u8,
    #[serde(default = "default_phy_error_threshold")]
    pub overrun_errors_threshold: u8,
}

fn default_lmc() -> u8 {
    0
}

fn default_true() -> bool {
    true
}

fn default_subnet_timeout() -> u8 {
    18
}

fn default_phy_error_threshold() -> u8 {
    8
}

impl Default for SubnetOptions {
    fn default() -> Self {
        Self {
            lmc: default_lmc(),
            reassign_lids: false,
            honor_guid2lid_file: default_true(),
            exit_on_fatal: false,
            no_clients_rereg: false,
            m_key: 0,
            subnet_prefix: 0,
            m_key_lease_period: 0,
            subnet_timeout: default_subnet_timeout(),
            local_phy_errors_threshold: default_phy_error_threshold(),
            overrun_errors_threshold: default_phy_error_threshold(),
        }
    }
}
