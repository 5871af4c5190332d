use crate::lid::Guid;

/// Raised by the [`crate::GuidLidStore`] backend, or by the sweep
/// initializer when a strict-mode load fails.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to load guid2lid records: {0}")]
    Load(#[source] std::io::Error),
    #[error("failed to persist guid2lid records: {0}")]
    Save(#[source] std::io::Error),
    #[error("malformed guid2lid record: {0}")]
    Malformed(String),
}

/// Why a persisted `(guid, min, max)` record was dropped during §4.4
/// validation. Never fatal on its own — the caller logs it and continues.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRecord {
    #[error("record for {guid} has zero guid")]
    ZeroGuid { guid: Guid },
    #[error("record for {guid} has zero min_lid")]
    ZeroMinLid { guid: Guid },
    #[error("record for {guid} has min_lid > max_lid")]
    Inverted { guid: Guid },
    #[error("record for {guid} exceeds max_unicast_lid")]
    OutOfRange { guid: Guid },
    #[error("record for {guid} is not aligned under the current LMC")]
    Misaligned { guid: Guid },
    #[error("record for {guid} duplicates lids already claimed by another record")]
    Duplicate { guid: Guid },
    #[error("record for {guid} no longer matches the required block size")]
    StaleBlockSize { guid: Guid },
}

/// Fatal allocator failure: the free-range list has nothing of the required
/// size left. The sweep aborts; it is never a process abort/panic.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("lid space exhausted: no free range of {needed} lid(s) available (lmc={lmc})")]
pub struct AllocError {
    pub needed: u8,
    pub lmc: u8,
}

/// Top-level error a sweep can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}
