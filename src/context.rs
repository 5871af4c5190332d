use std::collections::HashSet;

use parking_lot::RwLock;

use lid_alloc::{Guid, GuidLidStore, Lid, PortAllocator, SweepError, SweepInitializer, SweepInputs, SweepState};

use crate::attributes::{build_desired, should_configure};
use crate::error::{ProcessError, Signal};
use crate::options::SubnetOptions;
use crate::port::PortAttributes;
use crate::transport::{SetRequest, SetRequestTransport};

/// State carried from `process_sm` to `process_subnet` within one sweep:
/// the reconciled C2/C3 tables and the flags that were true when the sweep
/// started (so a late-arriving option change mid-sweep can't split a single
/// sweep's decisions across two different "first sweep" answers).
struct ActiveSweep {
    state: SweepState,
    lmc: u8,
    reassign_all: bool,
    first_sweep_since_active: bool,
}

/// The subnet-wide shared state the sweep driver mutates. Every sweep
/// acquires the surrounding `RwLock` for writing; readers (routing,
/// diagnostics) take a shared lock and never observe a partially-applied
/// sweep.
pub struct SubnetContext {
    pub store: Box<dyn GuidLidStore + Send>,
    pub transport: Box<dyn SetRequestTransport + Send>,
    pub options: SubnetOptions,
    pub max_unicast_lid: u16,
    pub sm_base_lid: Lid,
    pub master_sm_base_lid: Lid,
    pub just_became_active: bool,
    sweep_seq: u64,
    active: Option<ActiveSweep>,
    /// Ports whose link was forced down by a neighbor's MTU/op_vls mismatch
    /// this sweep: the controller's local view of their state should read
    /// `Init`, matching what the hardware will do once the partner's link
    /// actually drops. Cleared and rebuilt every sweep.
    tracked_init: HashSet<Guid>,
}

impl SubnetContext {
    pub fn new(
        store: Box<dyn GuidLidStore + Send>,
        transport: Box<dyn SetRequestTransport + Send>,
        options: SubnetOptions,
        max_unicast_lid: u16,
    ) -> Self {
        Self {
            store,
            transport,
            options,
            max_unicast_lid,
            sm_base_lid: Lid::ZERO,
            master_sm_base_lid: Lid::ZERO,
            just_became_active: true,
            sweep_seq: 0,
            active: None,
            tracked_init: HashSet::new(),
        }
    }

    /// Marks `guid` as locally tracked `Init`. Called when a link partner's
    /// `PortInfo` was just forced `Down` by an MTU/op_vls mismatch, so the
    /// controller's view of `guid` doesn't lag the hardware's own reset.
    fn mark_neighbor_init(&mut self, guid: Guid) {
        self.tracked_init.insert(guid);
    }

    /// Ports currently tracked as `Init` due to a link partner's forced-Down
    /// transition this sweep.
    pub fn tracked_init(&self) -> impl Iterator<Item = Guid> + '_ {
        self.tracked_init.iter().copied()
    }
}

/// Runs C4 over the full discovered port set, then decides and emits the
/// subnet management port's own block first so `master_sm_base_lid` can be
/// published to everyone else this sweep. See §4.7.
pub fn process_sm(
    ctx: &RwLock<SubnetContext>,
    all_ports: &[PortAttributes],
    sm_guid: Guid,
) -> Result<Signal, ProcessError> {
    let mut ctx = ctx.write();
    let span = tracing::info_span!("process_sm", sweep = ctx.sweep_seq);
    let _enter = span.enter();

    let Some(sm_port) = all_ports.iter().find(|p| p.guid == sm_guid) else {
        tracing::error!("no subnet management port object for this sweep");
        return Err(ProcessError::MissingSmPort);
    };

    ctx.tracked_init.clear();

    let lmc = ctx.options.lmc;
    let first_sweep = ctx.just_became_active;
    ctx.just_became_active = false;
    let reassign_all = ctx.options.reassign_lids && first_sweep;

    let snapshots: Vec<_> = all_ports.iter().map(|p| p.to_snapshot(lmc)).collect();
    let inputs = SweepInputs {
        max_unicast_lid: ctx.max_unicast_lid,
        lmc,
        honor_guid2lid_file: ctx.options.honor_guid2lid_file,
        reassign_all_this_sweep: reassign_all,
        just_became_active: first_sweep,
        ports: &snapshots,
    };
    let mut state = SweepInitializer::run(ctx.store.as_mut(), &inputs, ctx.options.exit_on_fatal)?;

    let sm_snapshot = sm_port.to_snapshot(lmc);
    let decision = PortAllocator::assign(
        &mut state,
        ctx.store.as_mut(),
        lmc,
        ctx.max_unicast_lid,
        reassign_all,
        &sm_snapshot,
    )
    .map_err(SweepError::from)?;

    tracing::info!(guid = %sm_port.guid, min = %decision.min, max = %decision.max, changed = decision.changed, "sm port decided");

    ctx.sm_base_lid = decision.min;
    ctx.master_sm_base_lid = decision.min;

    let mut emitted = false;
    if should_configure(sm_port) {
        let attrs = build_desired(sm_port, decision.min, ctx.master_sm_base_lid, &ctx.options, first_sweep);
        if attrs.changed {
            let request = SetRequest {
                guid: sm_port.guid,
                port_number: sm_port.node_type.port_number(),
                payload: attrs.desired,
            };
            if let Err(e) = ctx.transport.send(request) {
                tracing::error!(error = %e, guid = %sm_port.guid, "failed to queue sm port set request");
            } else {
                emitted = true;
            }
        }
    }

    ctx.active = Some(ActiveSweep {
        state,
        lmc,
        reassign_all,
        first_sweep_since_active: first_sweep,
    });

    Ok(if emitted { Signal::DonePending } else { Signal::Done })
}

/// Iterates every discovered port except the subnet management port
/// (already decided by `process_sm`), runs C5 then C6 for each, persists
/// C1, and releases the lock. See §4.7.
pub fn process_subnet(
    ctx: &RwLock<SubnetContext>,
    all_ports: &[PortAttributes],
    sm_guid: Guid,
) -> Result<Signal, ProcessError> {
    let mut ctx = ctx.write();
    let span = tracing::info_span!("process_subnet", sweep = ctx.sweep_seq);
    let _enter = span.enter();

    let mut active = match ctx.active.take() {
        Some(active) => active,
        None => {
            tracing::error!("process_subnet called with no sweep state from process_sm; rebuilding");
            let lmc = ctx.options.lmc;
            let snapshots: Vec<_> = all_ports.iter().map(|p| p.to_snapshot(lmc)).collect();
            let inputs = SweepInputs {
                max_unicast_lid: ctx.max_unicast_lid,
                lmc,
                honor_guid2lid_file: ctx.options.honor_guid2lid_file,
                reassign_all_this_sweep: false,
                just_became_active: false,
                ports: &snapshots,
            };
            let state = SweepInitializer::run(ctx.store.as_mut(), &inputs, ctx.options.exit_on_fatal)?;
            ActiveSweep {
                state,
                lmc,
                reassign_all: false,
                first_sweep_since_active: false,
            }
        }
    };

    let sm_base_lid = ctx.sm_base_lid;
    let mut emitted = false;

    for port in all_ports.iter().filter(|p| p.guid != sm_guid && should_configure(p)) {
        let snapshot = port.to_snapshot(active.lmc);
        let decision = PortAllocator::assign(
            &mut active.state,
            ctx.store.as_mut(),
            active.lmc,
            ctx.max_unicast_lid,
            active.reassign_all,
            &snapshot,
        )
        .map_err(SweepError::from)?;

        tracing::debug!(guid = %port.guid, min = %decision.min, max = %decision.max, changed = decision.changed, "port decided");

        let attrs = build_desired(
            port,
            decision.min,
            sm_base_lid,
            &ctx.options,
            active.first_sweep_since_active,
        );

        if let Some(neighbor) = attrs.neighbor_to_reinit {
            tracing::debug!(%neighbor, guid = %port.guid, "link forced down; tracking neighbor as INIT");
            ctx.mark_neighbor_init(neighbor);
        }

        if attrs.changed {
            let request = SetRequest {
                guid: port.guid,
                port_number: port.node_type.port_number(),
                payload: attrs.desired,
            };
            if let Err(e) = ctx.transport.send(request) {
                tracing::error!(error = %e, guid = %port.guid, "failed to queue set request");
            } else {
                emitted = true;
            }
        }
    }

    ctx.store.store().map_err(SweepError::from)?;
    ctx.sweep_seq += 1;

    if !emitted {
        tracing::debug!("sweep produced no set requests");
    }

    Ok(if emitted { Signal::DonePending } else { Signal::Done })
}
