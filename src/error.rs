use std::fmt;

/// Raised by a [`crate::SetRequestTransport`] when it cannot accept or
/// deliver a [`crate::SetRequest`]. Never returned by the allocator itself —
/// C1/C2/C3 are already committed by the time a set request is emitted.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("set request queue is full")]
    QueueFull,
    #[error("transport has been shut down")]
    ShutDown,
}

/// Top-level error `process_sm`/`process_subnet` can fail with. Anything not
/// represented here (invalid persisted records, individual port decisions
/// that could still fall back) is handled internally: logged and the sweep
/// continues.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("sweep aborted: {0}")]
    Sweep(#[from] lid_alloc::SweepError),
    #[error("no subnet management port object for this sweep")]
    MissingSmPort,
}

/// Helper so call sites can match on why a non-fatal condition is a
/// deliberate no-op rather than the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing was emitted this sweep.
    Done,
    /// One or more set requests are outstanding.
    DonePending,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "DONE"),
            Self::DonePending => write!(f, "DONE_PENDING"),
        }
    }
}
