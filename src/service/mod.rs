//! Protocol core: the service task and its main loop.
//!
//! One cooperative task owns all socket state and the local ends of both
//! ring indices. It suspends in exactly one place, the top-of-loop wait
//! on `{request inbox, peer wake}`, and otherwise runs inbound demux
//! and outbound drain to a fixed point before re-arming the peer-signal
//! enable bits under the register-file gate.
//!
//! The task is spawned by [`Link::start`](crate::handle::Link::start);
//! nothing here is public API.

mod inbound;
mod outbound;
mod requests;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::protocol::ComArea;
use crate::request::IoRequest;
use crate::signal::{
    a_event, r_event, SignalRegisters, A_ENABLE_ADDRESS, A_EVENTS_ADDRESS, CP_FLAGS_ADDRESS,
    CP_FLAG_GATE, R_EVENTS_ADDRESS,
};
use crate::socket::SocketTable;

/// The service task's state.
pub(crate) struct Service<R: SignalRegisters> {
    ca: Arc<ComArea>,
    regs: R,
    peer_wake: Arc<Notify>,
    requests: mpsc::UnboundedReceiver<IoRequest>,
    sockets: SocketTable,
    send_queue: VecDeque<u8>,
}

enum Wake {
    Request(IoRequest),
    Peer,
}

impl<R: SignalRegisters> Service<R> {
    pub(crate) fn new(
        ca: Arc<ComArea>,
        regs: R,
        peer_wake: Arc<Notify>,
        requests: mpsc::UnboundedReceiver<IoRequest>,
    ) -> Self {
        Self {
            ca,
            regs,
            peer_wake,
            requests,
            sockets: SocketTable::new(),
            send_queue: VecDeque::new(),
        }
    }

    /// Run until the request channel closes.
    ///
    /// There is no orderly teardown: when every sender is gone the task
    /// simply returns, abandoning any live sockets.
    pub(crate) async fn run(mut self) {
        // Arm the enable bits once before the first wait so a peer that
        // writes before any client request is never missed.
        self.settle(self.ca.a2r.tail(), self.ca.r2a.head());

        loop {
            let peer_wake = self.peer_wake.clone();
            let wake = tokio::select! {
                req = self.requests.recv() => match req {
                    Some(req) => Wake::Request(req),
                    None => return,
                },
                _ = peer_wake.notified() => Wake::Peer,
            };

            let prev_a2r_tail = self.ca.a2r.tail();
            let prev_r2a_head = self.ca.r2a.head();

            if let Wake::Request(first) = wake {
                // Hold off peer wake-ups while the inbox drains; the
                // settle pass below re-arms.
                self.regs.write_nibble(A_ENABLE_ADDRESS, 0);
                self.handle_request(first);
                while let Ok(req) = self.requests.try_recv() {
                    self.handle_request(req);
                }
            }

            // A peer edge that raced the request branch was swallowed with
            // its permit, but the settle pass drains both rings anyway.
            self.settle(prev_a2r_tail, prev_r2a_head);
        }
    }

    /// Drain inbound and outbound work to a fixed point, then re-arm.
    ///
    /// Exits only once one or more enable bits were accepted, so every
    /// state that is blocked on peer progress has a matching wake source.
    fn settle(&mut self, prev_a2r_tail: u8, prev_r2a_head: u8) {
        let mut armed = 0u8;
        while armed == 0 {
            self.drain_inbound();
            self.drain_outbound();

            let mut r_events = 0u8;
            if self.ca.a2r.tail() != prev_a2r_tail {
                r_events |= r_event::A2R_TAIL;
            }
            if self.ca.r2a.head() != prev_r2a_head {
                r_events |= r_event::R2A_HEAD;
            }

            // Gate the register file so arming is atomic with respect to
            // peer edges; an edge latched in here fires on gate release.
            let prev_flags = self.regs.read_nibble(CP_FLAGS_ADDRESS);
            self.regs
                .write_nibble(CP_FLAGS_ADDRESS, prev_flags | CP_FLAG_GATE);
            self.regs.read_nibble(A_EVENTS_ADDRESS);

            if self.ca.r2a.is_empty() {
                armed = match self.send_queue.front() {
                    None => a_event::R2A_TAIL,
                    Some(&stream_id) => {
                        let required = self
                            .sockets
                            .get(stream_id)
                            .map(|s| s.required_len)
                            .unwrap_or(0);
                        if self.ca.a2r.has_room(required) {
                            // Head frame fits; drain again instead of sleeping.
                            0
                        } else {
                            a_event::R2A_TAIL | a_event::A2R_HEAD
                        }
                    }
                };
                if armed != 0 {
                    self.regs.write_nibble(A_ENABLE_ADDRESS, armed);
                    if r_events != 0 {
                        self.regs.write_nibble(R_EVENTS_ADDRESS, r_events);
                    }
                }
            }

            self.regs.write_nibble(CP_FLAGS_ADDRESS, prev_flags);
        }
    }
}
