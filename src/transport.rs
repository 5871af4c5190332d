use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::TransportError;
use crate::port::PortInfoPayload;

/// A single `Set(PortInfo)` management datagram, addressed by direct route
/// to the target physical port (attribute modifier carries the port
/// number). The allocator never waits on a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetRequest {
    pub guid: lid_alloc::Guid,
    pub port_number: u8,
    pub payload: PortInfoPayload,
}

/// Fire-and-forget transport for [`SetRequest`]s. The allocator commits its
/// own state (C1/C2/C3) before ever calling `send`, so a transport failure
/// here never leaves the allocator inconsistent for the next sweep.
pub trait SetRequestTransport {
    fn send(&self, request: SetRequest) -> Result<(), TransportError>;
}

/// Reference implementation: a bounded `crossbeam_channel` drained by one
/// background thread, mirrored on the teacher's own disk-backed envelope
/// queue. `flush`/`shutdown` block on a condvar until the in-flight count
/// reaches zero.
pub struct ChannelTransport {
    in_flight: Arc<Mutex<usize>>,
    drained: Arc<Condvar>,
    sender: crossbeam::channel::Sender<Option<SetRequest>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl ChannelTransport {
    pub fn new<F>(mut deliver: F) -> Self
    where
        F: FnMut(SetRequest) + Send + 'static,
    {
        let in_flight = Arc::new(Mutex::new(0usize));
        let drained = Arc::new(Condvar::new());
        let (tx, rx) = crossbeam::channel::bounded::<Option<SetRequest>>(64);

        let worker_in_flight = in_flight.clone();
        let worker_drained = drained.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(Some(request)) = rx.recv() {
                deliver(request);

                let mut count = worker_in_flight.lock();
                *count -= 1;
                if *count == 0 {
                    worker_drained.notify_all();
                }
            }
        });

        Self {
            in_flight,
            drained,
            sender: tx,
            worker: Some(worker),
        }
    }

    /// Blocks until every queued request has been delivered, or `timeout`
    /// elapses. Returns `false` on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let mut guard = self.in_flight.lock();
        if *guard == 0 {
            return true;
        }
        !self.drained.wait_for(&mut guard, timeout).timed_out()
    }
}

impl SetRequestTransport for ChannelTransport {
    fn send(&self, request: SetRequest) -> Result<(), TransportError> {
        use crossbeam::channel::TrySendError;

        match self.sender.try_send(Some(request)) {
            Ok(()) => {
                *self.in_flight.lock() += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::ShutDown),
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        let _ = self.sender.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortInfoPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload() -> PortInfoPayload {
        PortInfoPayload {
            base_lid: 4,
            master_sm_base_lid: 1,
            m_key: 0,
            subnet_prefix: 0,
            m_key_lease_period: 0,
            local_phy_error_threshold: 8,
            overrun_error_threshold: 8,
            subnet_timeout: 18,
            port_state: 0,
            link_down_default_state: 2,
            lmc: 2,
            link_width_enabled: 2,
            link_width_supported: 3,
            link_width_active: 2,
            neighbor_mtu: 4,
            mtu_cap: 4,
            op_vls: 3,
            client_reregister: false,
        }
    }

    #[test]
    fn delivers_and_drains() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        let transport = ChannelTransport::new(move |_req| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..5u8 {
            transport
                .send(SetRequest {
                    guid: lid_alloc::Guid(i as u64 + 1),
                    port_number: 1,
                    payload: payload(),
                })
                .unwrap();
        }

        assert!(transport.flush(Duration::from_secs(1)));
        assert_eq!(delivered.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn queue_full_is_reported_once_the_bounded_channel_saturates() {
        use std::sync::mpsc;

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let transport = ChannelTransport::new(move |_req| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        });

        let req = || SetRequest {
            guid: lid_alloc::Guid(1),
            port_number: 1,
            payload: payload(),
        };

        // The first request is picked up by the worker immediately, which
        // then blocks inside `deliver` until released below. That empties
        // the channel's buffer even though nothing has actually drained.
        transport.send(req()).unwrap();
        started_rx.recv().unwrap();

        // Fill the channel's bounded capacity (64) behind the blocked worker.
        for _ in 0..64 {
            transport.send(req()).unwrap();
        }

        let err = transport.send(req()).unwrap_err();
        assert!(matches!(err, TransportError::QueueFull));

        for _ in 0..65 {
            release_tx.send(()).unwrap();
        }
        assert!(transport.flush(Duration::from_secs(1)));
    }
}
