//! Subnet management LID manager.
//!
//! Wraps the [`lid_alloc`] allocator core (persistence, the used-LID table,
//! free-range carving, sweep reconciliation, and per-port decisions) with
//! the production scaffolding a deployed subnet manager needs around it:
//! attribute-image diffing against the wire `PortInfo` shape, the
//! sweep-driver entry points that hold the subnet-wide lock, structured
//! logging, configuration, and a reference transport/persistence pair for
//! integration testing.

mod attributes;
mod context;
mod error;
mod options;
mod port;
mod transport;

pub use attributes::{build_desired, should_configure, AttributeDecision};
pub use context::{process_sm, process_subnet, SubnetContext};
pub use error::{ProcessError, Signal, TransportError};
pub use options::SubnetOptions;
pub use port::{
    LinkDownDefaultState, NodeType, PortAttributes, PortInfoPayload, PortState,
    PORT_INFO_PAYLOAD_LEN,
};
pub use transport::{ChannelTransport, SetRequest, SetRequestTransport};

pub use lid_alloc::{
    AllocError, FileGuidLidStore, Guid, GuidLidStore, InMemoryGuidLidStore, InvalidRecord, Lid,
    PortSnapshot, SweepError, UsedLidSet, MAX_LMC, UCAST_END, UCAST_START,
};
