use std::collections::HashMap;

use crate::error::{AllocError, InvalidRecord, SweepError};
use crate::free_ranges::FreeRanges;
use crate::lid::{alignment_mask, is_aligned, Guid, Lid};
use crate::persistence::GuidLidStore;
use crate::used_set::UsedLidSet;

/// Everything the allocator needs to know about one discovered port.
///
/// `num_lids` is computed by the caller from node type / port number / SP0
/// LMC capability (out of scope here): `1 << lmc` for an LMC-capable port,
/// `1` for a base-only switch management port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSnapshot {
    pub guid: Guid,
    /// `Lid(0)` means "never configured".
    pub observed_base_lid: Lid,
    pub num_lids: u8,
    pub is_new: bool,
}

/// Per-sweep inputs to the [`SweepInitializer`].
pub struct SweepInputs<'a> {
    pub max_unicast_lid: u16,
    pub lmc: u8,
    pub honor_guid2lid_file: bool,
    /// True only on the first sweep since the controller became active AND
    /// the `reassign_lids` option is set; short-circuits validation/pruning
    /// to a single `[1, max_unicast_lid - 1]` free range.
    pub reassign_all_this_sweep: bool,
    pub just_became_active: bool,
    pub ports: &'a [PortSnapshot],
}

/// Reconciled state for one sweep: which LIDs are claimed, what's left to
/// hand out, and discovery's view of who's sitting where. Rebuilt from
/// scratch every sweep by [`SweepInitializer::run`].
#[derive(Debug, Default, Clone)]
pub struct SweepState {
    pub used: UsedLidSet,
    pub free: FreeRanges,
    pub discovered_by_lid: HashMap<Lid, Guid>,
}

/// Rebuilds [`SweepState`] from the persistent guid→lid store and the
/// current discovery snapshot. See §4.4 of the design doc for the five-step
/// contract this implements.
pub struct SweepInitializer;

impl SweepInitializer {
    pub fn run(
        store: &mut dyn GuidLidStore,
        inputs: &SweepInputs<'_>,
        strict: bool,
    ) -> Result<SweepState, SweepError> {
        let mut used = UsedLidSet::new();

        // Step 1: standby transition.
        if inputs.just_became_active {
            if !inputs.honor_guid2lid_file {
                store.clear();
                used.clear();
            } else if let Err(e) = store.load() {
                if strict {
                    return Err(SweepError::Store(e));
                }
                tracing::error!(error = %e, "guid2lid load failed; proceeding with an empty map");
                store.clear();
            }
        }

        if inputs.reassign_all_this_sweep {
            let mut free = FreeRanges::new();
            if inputs.max_unicast_lid > 1 {
                free.push(Lid(1), Lid(inputs.max_unicast_lid - 1));
            }
            return Ok(SweepState {
                used,
                free,
                discovered_by_lid: HashMap::new(),
            });
        }

        let mask = alignment_mask(inputs.lmc);

        // Step 2: validate persisted entries under the current LMC.
        let mut max_used_lid: u16 = 0;
        for guid in store.enumerate_guids() {
            let Some((lo, hi)) = store.get(guid) else {
                continue;
            };

            let invalid = if !guid.is_valid() {
                Some(InvalidRecord::ZeroGuid { guid })
            } else if lo.get() == 0 {
                Some(InvalidRecord::ZeroMinLid { guid })
            } else if lo.get() > hi.get() {
                Some(InvalidRecord::Inverted { guid })
            } else if hi.get() > inputs.max_unicast_lid || !lo.is_valid_unicast() || !hi.is_valid_unicast() {
                Some(InvalidRecord::OutOfRange { guid })
            } else if lo != hi && lo.get() & mask != lo.get() {
                Some(InvalidRecord::Misaligned { guid })
            } else if !used.range_is_free(lo, hi) {
                Some(InvalidRecord::Duplicate { guid })
            } else {
                None
            };

            match invalid {
                Some(reason) => {
                    tracing::error!(%guid, %reason, "dropping invalid persisted guid2lid record");
                    store.delete(guid);
                }
                None => {
                    used.mark_range(lo, hi);
                    max_used_lid = max_used_lid.max(hi.get());
                }
            }
        }

        // Step 3: reset DiscoveredByLid.
        let mut discovered_by_lid = HashMap::new();
        let mut max_discovered_lid: u16 = 0;
        let mut base_index: HashMap<u16, &PortSnapshot> = HashMap::new();
        for port in inputs.ports {
            if port.observed_base_lid.get() == 0 {
                continue;
            }
            base_index.insert(port.observed_base_lid.get(), port);
            for lid in discovered_block_lids(port, inputs.max_unicast_lid) {
                discovered_by_lid.insert(lid, port.guid);
                max_discovered_lid = max_discovered_lid.max(lid.get());
            }
        }

        // Step 4: prune stale persistent entries against current block size.
        for port in inputs.ports {
            if let Some((lo, hi)) = store.get(port.guid) {
                let num_lids = port.num_lids;
                if num_lids > 1 {
                    let aligned = lo.get() & mask == lo.get();
                    let wide_enough = hi.get() + 1 >= lo.get() + num_lids as u16;
                    if !aligned || !wide_enough {
                        let reason = InvalidRecord::StaleBlockSize { guid: port.guid };
                        tracing::error!(guid = %port.guid, %reason, "pruning stale guid2lid entry");
                        store.delete(port.guid);
                        used.unmark_range(lo, hi);
                    }
                }
            }
        }

        // Step 5: rebuild FreeRanges.
        let scan_limit = max_used_lid.max(max_discovered_lid);
        let free = rebuild_free_ranges(&used, store, &base_index, inputs.lmc, scan_limit, inputs.max_unicast_lid);

        Ok(SweepState {
            used,
            free,
            discovered_by_lid,
        })
    }
}

/// LIDs in `port`'s observed block, trimmed to `[1, max_unicast_lid]`; any
/// endpoint falling outside that range is dropped rather than clamped.
fn discovered_block_lids(port: &PortSnapshot, max_unicast_lid: u16) -> Vec<Lid> {
    let base = port.observed_base_lid.get();
    let mut out = Vec::with_capacity(port.num_lids as usize);
    for i in 0..port.num_lids as u16 {
        let lid = base.saturating_add(i);
        if lid >= 1 && lid <= max_unicast_lid {
            out.push(Lid(lid));
        }
    }
    out
}

fn rebuild_free_ranges(
    used: &UsedLidSet,
    store: &dyn GuidLidStore,
    base_index: &HashMap<u16, &PortSnapshot>,
    lmc: u8,
    scan_limit: u16,
    max_unicast_lid: u16,
) -> FreeRanges {
    let mut free = FreeRanges::new();
    let mut open_start: Option<u16> = None;
    let mut lid: u16 = 1;

    while lid <= scan_limit {
        if used.is_marked(Lid(lid)) {
            if let Some(start) = open_start.take() {
                free.push(Lid(start), Lid(lid - 1));
            }
            lid += 1;
            continue;
        }

        if let Some(port) = base_index.get(&lid).copied() {
            let block_end = lid.saturating_add(port.num_lids as u16 - 1);
            let preserved = store.get(port.guid).is_none()
                && is_aligned(Lid(lid), lmc, port.num_lids)
                && block_end <= max_unicast_lid
                && used.range_is_free(Lid(lid), Lid(block_end));

            if preserved {
                if let Some(start) = open_start.take() {
                    free.push(Lid(start), Lid(lid - 1));
                }
                lid = block_end.saturating_add(1);
                continue;
            }
        }

        if open_start.is_none() {
            open_start = Some(lid);
        }
        lid += 1;
    }

    let tail_start = open_start.unwrap_or(lid);
    if max_unicast_lid >= 1 {
        let hi = max_unicast_lid - 1;
        if tail_start <= hi {
            free.push(Lid(tail_start), Lid(hi));
        }
    }

    free
}

/// The decided block for one port, and whether its `PortInfo` needs to
/// change to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDecision {
    pub min: Lid,
    pub max: Lid,
    pub changed: bool,
}

/// Decides and commits each port's LID block. See §4.5.
pub struct PortAllocator;

impl PortAllocator {
    #[allow(clippy::too_many_arguments)]
    pub fn assign(
        state: &mut SweepState,
        store: &mut dyn GuidLidStore,
        lmc: u8,
        max_unicast_lid: u16,
        reassign_all_this_sweep: bool,
        port: &PortSnapshot,
    ) -> Result<PortDecision, AllocError> {
        let guid = port.guid;
        let num_lids = port.num_lids;

        let decision = if let Some((lo, _hi)) = store.get(guid) {
            // 1. Persistent match.
            let max = lo.saturating_add(num_lids as u16 - 1);
            let changed = lo != port.observed_base_lid;
            if changed {
                wipe_observed(state, port, max_unicast_lid);
            }
            PortDecision { min: lo, max, changed }
        } else if can_preserve_observed(state, lmc, max_unicast_lid, reassign_all_this_sweep, port) {
            // 2. Preserve observed.
            let base = port.observed_base_lid;
            let max = base.saturating_add(num_lids as u16 - 1);
            PortDecision { min: base, max, changed: false }
        } else {
            // 3. Fresh carve.
            wipe_observed(state, port, max_unicast_lid);
            match state.free.carve(num_lids, num_lids) {
                Some((min, max)) => PortDecision { min, max, changed: true },
                None => {
                    tracing::error!(%guid, needed = num_lids, "lid space exhausted");
                    return Err(AllocError { needed: num_lids, lmc });
                }
            }
        };

        store.set(guid, decision.min, decision.max);
        state.used.mark_range(decision.min, decision.max);
        for raw in decision.min.get()..=decision.max.get() {
            state.discovered_by_lid.insert(Lid(raw), guid);
        }

        Ok(decision)
    }
}

fn can_preserve_observed(
    state: &SweepState,
    lmc: u8,
    max_unicast_lid: u16,
    reassign_all_this_sweep: bool,
    port: &PortSnapshot,
) -> bool {
    let base = port.observed_base_lid;
    if base.get() == 0 || reassign_all_this_sweep {
        return false;
    }
    if base.get() < port.num_lids as u16 {
        // would let LMC masking alias down to lid 0
        return false;
    }
    if !is_aligned(base, lmc, port.num_lids) {
        return false;
    }
    let max = base.get().saturating_add(port.num_lids as u16 - 1);
    if max > max_unicast_lid {
        return false;
    }
    state.used.range_is_free(base, Lid(max))
}

fn wipe_observed(state: &mut SweepState, port: &PortSnapshot, max_unicast_lid: u16) {
    for lid in discovered_block_lids(port, max_unicast_lid) {
        if state.discovered_by_lid.get(&lid) == Some(&port.guid) {
            state.discovered_by_lid.remove(&lid);
        }
    }
}
