//! In-process transport: a software ComArea and register file pair.
//!
//! Connects a service task and a peer living in the same process, with
//! the same edge semantics a hardware register file provides: events
//! latch, enables select which edges wake the service, and the gate bit
//! defers wake dispatch while the service is arming. Used by the test
//! suite and the demos; a hardware deployment supplies its own
//! [`SignalRegisters`] implementation instead.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::protocol::{ComArea, FrameHeader};
use crate::signal::{
    a_event, SignalRegisters, A_ENABLE_ADDRESS, A_EVENTS_ADDRESS, CP_FLAGS_ADDRESS, CP_FLAG_GATE,
    R_EVENTS_ADDRESS,
};

#[derive(Debug, Default)]
struct BusState {
    /// Edges latched for the service side; cleared on read.
    a_events: u8,
    /// Which service-side edges fire a wake-up.
    a_enable: u8,
    /// Control nibble; bit 3 gates service-side dispatch.
    flags: u8,
    /// Edges latched for the peer side; cleared on take.
    r_events: u8,
}

/// The shared register file plus both wake sources.
#[derive(Debug)]
struct SignalBus {
    state: Mutex<BusState>,
    service_wake: Arc<Notify>,
    peer_wake: Notify,
}

impl SignalBus {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // An edge reaches the service only when it is enabled and the gate is
    // clear; otherwise it stays latched in a_events.
    fn dispatch_if_armed(&self, st: &BusState) {
        if st.a_events & st.a_enable != 0 && st.flags & CP_FLAG_GATE == 0 {
            self.service_wake.notify_one();
        }
    }
}

/// Service-side view of the register file.
#[derive(Debug, Clone)]
pub struct LocalRegisters {
    bus: Arc<SignalBus>,
}

impl SignalRegisters for LocalRegisters {
    fn read_nibble(&self, addr: u8) -> u8 {
        let mut st = self.bus.lock();
        match addr {
            A_EVENTS_ADDRESS => std::mem::take(&mut st.a_events),
            A_ENABLE_ADDRESS => st.a_enable,
            CP_FLAGS_ADDRESS => st.flags,
            _ => 0,
        }
    }

    fn write_nibble(&self, addr: u8, value: u8) {
        let value = value & 0x0F;
        let mut st = self.bus.lock();
        match addr {
            A_ENABLE_ADDRESS => {
                st.a_enable = value;
                self.bus.dispatch_if_armed(&st);
            }
            R_EVENTS_ADDRESS => {
                st.r_events |= value;
                self.bus.peer_wake.notify_one();
            }
            CP_FLAGS_ADDRESS => {
                let was_gated = st.flags & CP_FLAG_GATE != 0;
                st.flags = value;
                // Edges latched while gated fire on release.
                if was_gated && st.flags & CP_FLAG_GATE == 0 {
                    self.bus.dispatch_if_armed(&st);
                }
            }
            _ => {}
        }
    }
}

/// What a service task needs to run over the in-process transport.
#[derive(Debug)]
pub struct MemoryEndpoint {
    /// The shared mailbox.
    pub com_area: Arc<ComArea>,
    /// Service-side register file view.
    pub registers: LocalRegisters,
    /// Wake source the register file posts to.
    pub wake: Arc<Notify>,
}

/// The remote side of an in-process link.
///
/// Drives the rings the way a real peer would: reads local→remote
/// frames, writes remote→local frames, and raises the matching edges.
#[derive(Debug)]
pub struct Peer {
    com_area: Arc<ComArea>,
    bus: Arc<SignalBus>,
}

impl Peer {
    /// Wait for the service to publish events, returning the mask.
    pub async fn wait(&self) -> u8 {
        self.bus.peer_wake.notified().await;
        self.take_events()
    }

    /// Take (and clear) the events published to this side.
    pub fn take_events(&self) -> u8 {
        std::mem::take(&mut self.bus.lock().r_events)
    }

    /// Drain every complete frame from the local→remote ring.
    ///
    /// Raises the `A2R_HEAD` edge if anything was consumed.
    pub fn recv(&self) -> Vec<(FrameHeader, Bytes)> {
        let mut frames = Vec::new();
        while let Some(header) = self.com_area.a2r.peek_header() {
            let payload = self.com_area.a2r.copy_payload(header.length);
            self.com_area.a2r.consume(header.frame_len());
            frames.push((header, payload));
        }
        if !frames.is_empty() {
            self.raise(a_event::A2R_HEAD);
        }
        frames
    }

    /// Append one frame to the remote→local ring and raise `R2A_TAIL`.
    ///
    /// Returns `false` (writing nothing) if the frame does not fit.
    pub fn send(&self, packet_type: u8, stream_id: u8, payload: &[u8]) -> bool {
        if !self.com_area.r2a.has_room(payload.len()) {
            return false;
        }
        self.com_area.r2a.append(packet_type, stream_id, payload);
        self.raise(a_event::R2A_TAIL);
        true
    }

    /// Latch edges for the service side, waking it if armed.
    pub fn raise(&self, mask: u8) {
        let mut st = self.bus.lock();
        st.a_events |= mask & 0x0F;
        self.bus.dispatch_if_armed(&st);
    }

    /// The shared mailbox, for tests that poke rings directly.
    pub fn com_area(&self) -> &ComArea {
        &self.com_area
    }
}

/// Create a connected in-process link: a service endpoint and its peer.
pub fn memory_link() -> (MemoryEndpoint, Peer) {
    let com_area = Arc::new(ComArea::new());
    let service_wake = Arc::new(Notify::new());
    let bus = Arc::new(SignalBus {
        state: Mutex::new(BusState::default()),
        service_wake: service_wake.clone(),
        peer_wake: Notify::new(),
    });

    (
        MemoryEndpoint {
            com_area: com_area.clone(),
            registers: LocalRegisters { bus: bus.clone() },
            wake: service_wake,
        },
        Peer { com_area, bus },
    )
}
