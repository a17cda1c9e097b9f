//! Client request handlers and close semantics.
//!
//! Requests arrive from the inbox already owned by the service; every
//! path either completes them immediately or parks them in the socket's
//! pending slot, so each request is answered exactly once.

use bytes::Bytes;

use crate::protocol::{packet_type, HEADER_SIZE, RING_CAPACITY};
use crate::request::{command, IoRequest, ReplyCode};
use crate::signal::SignalRegisters;
use crate::socket::flags;

use super::Service;

impl<R: SignalRegisters> Service<R> {
    /// Dispatch one client request.
    pub(crate) fn handle_request(&mut self, req: IoRequest) {
        match req.command {
            command::CONNECT => self.handle_connect(req),
            command::READ => self.handle_read(req),
            command::WRITE => self.handle_write(req),
            command::EOS => self.handle_eos(req),
            command::RESET => self.handle_reset(req),
            other => {
                tracing::debug!(command = other, "unknown request command");
                req.complete(ReplyCode::NoCmd, Bytes::new());
            }
        }
    }

    fn handle_connect(&mut self, req: IoRequest) {
        if self.sockets.find(req.owner, req.socket_id).is_some() {
            req.complete(ReplyCode::ConnectSocketInUse, Bytes::new());
            return;
        }
        if req.data.len() + HEADER_SIZE > RING_CAPACITY {
            req.complete(ReplyCode::ConnectReset, Bytes::new());
            return;
        }
        let Some(stream_id) = self.sockets.create(req.owner, req.socket_id) else {
            tracing::error!("stream id space exhausted");
            req.complete(ReplyCode::ConnectReset, Bytes::new());
            return;
        };

        let len = req.data.len();
        let data = req.data.clone();
        if let Some(s) = self.sockets.get_mut(stream_id) {
            s.pending_connect = Some(req);
        }
        if self.send_queue.is_empty() && self.ca.a2r.has_room(len) {
            self.ca.a2r.append(packet_type::CONNECT, stream_id, &data);
        } else {
            self.add_to_send_queue(stream_id, len);
        }
    }

    fn handle_read(&mut self, req: IoRequest) {
        let stream_id = match self.live_socket(req.owner, req.socket_id) {
            Some(sid) => sid,
            None => {
                req.complete(ReplyCode::ReadReset, Bytes::new());
                return;
            }
        };
        let Some(s) = self.sockets.get_mut(stream_id) else {
            req.complete(ReplyCode::ReadReset, Bytes::new());
            return;
        };

        if s.pending_connect.is_some() || s.pending_read.is_some() {
            req.complete(ReplyCode::ReadReset, Bytes::new());
            self.close_socket(stream_id, true);
            return;
        }

        if !s.rq.is_empty() {
            let chunk_len = s.rq.front().map(Bytes::len).unwrap_or(0);
            if req.capacity < chunk_len {
                req.complete(ReplyCode::ReadReset, Bytes::new());
                self.close_socket(stream_id, true);
            } else if let Some(chunk) = s.rq.pop_front() {
                req.complete(ReplyCode::ReadOk, chunk);
            }
            return;
        }

        if flags::has(s.flags, flags::RCVD_EOS_FROM_PEER) {
            req.complete(ReplyCode::ReadEos, Bytes::new());
            s.flags |= flags::SENT_EOS_TO_CLIENT;
            if flags::has(s.flags, flags::SENT_EOS_TO_PEER) {
                self.close_socket(stream_id, false);
            }
            return;
        }

        s.pending_read = Some(req);
    }

    fn handle_write(&mut self, req: IoRequest) {
        let stream_id = match self.live_socket(req.owner, req.socket_id) {
            Some(sid) => sid,
            None => {
                req.complete(ReplyCode::WriteReset, Bytes::new());
                return;
            }
        };
        let Some(s) = self.sockets.get_mut(stream_id) else {
            req.complete(ReplyCode::WriteReset, Bytes::new());
            return;
        };

        let len = req.data.len();
        if s.pending_connect.is_some()
            || s.pending_write.is_some()
            || flags::has(s.flags, flags::RCVD_EOS_FROM_CLIENT)
            || len + HEADER_SIZE > RING_CAPACITY
        {
            req.complete(ReplyCode::WriteReset, Bytes::new());
            self.close_socket(stream_id, true);
            return;
        }

        if self.send_queue.is_empty() && self.ca.a2r.has_room(len) {
            self.ca.a2r.append(packet_type::DATA, stream_id, &req.data);
            req.complete(ReplyCode::WriteOk, Bytes::new());
        } else {
            s.pending_write = Some(req);
            self.add_to_send_queue(stream_id, len);
        }
    }

    fn handle_eos(&mut self, req: IoRequest) {
        let stream_id = match self.live_socket(req.owner, req.socket_id) {
            Some(sid) => sid,
            None => {
                req.complete(ReplyCode::EosReset, Bytes::new());
                return;
            }
        };
        let Some(s) = self.sockets.get_mut(stream_id) else {
            req.complete(ReplyCode::EosReset, Bytes::new());
            return;
        };

        if s.pending_connect.is_some()
            || s.pending_write.is_some()
            || flags::has(s.flags, flags::RCVD_EOS_FROM_CLIENT)
        {
            req.complete(ReplyCode::EosReset, Bytes::new());
            self.close_socket(stream_id, true);
            return;
        }

        s.flags |= flags::RCVD_EOS_FROM_CLIENT;

        if self.send_queue.is_empty() && self.ca.a2r.has_room(0) {
            self.ca.a2r.append(packet_type::EOS, stream_id, &[]);
            req.complete(ReplyCode::EosOk, Bytes::new());
            s.flags |= flags::SENT_EOS_TO_PEER;
            if flags::has(s.flags, flags::SENT_EOS_TO_CLIENT) {
                self.close_socket(stream_id, false);
            }
        } else {
            s.pending_write = Some(req);
            self.add_to_send_queue(stream_id, 0);
        }
    }

    fn handle_reset(&mut self, req: IoRequest) {
        let live = self.live_socket(req.owner, req.socket_id);
        req.complete(ReplyCode::ResetOk, Bytes::new());
        if let Some(stream_id) = live {
            self.close_socket(stream_id, true);
        }
    }

    // Stream id of the socket iff it exists and is not CLOSED.
    fn live_socket(&self, owner: crate::request::ClientId, local_id: u8) -> Option<u8> {
        let stream_id = self.sockets.find(owner, local_id)?;
        let s = self.sockets.get(stream_id)?;
        if flags::has(s.flags, flags::CLOSED) {
            None
        } else {
            Some(stream_id)
        }
    }

    /// Tear down a stream, answering any parked requests with resets.
    ///
    /// With `send_reset`, a RESET frame is emitted immediately when it
    /// fits behind an empty send queue; otherwise the socket lingers in
    /// the queue with `SHOULD_SEND_RESET` and is deleted by the drain.
    pub(crate) fn close_socket(&mut self, stream_id: u8, send_reset: bool) {
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };
        tracing::debug!(stream_id, send_reset, "closing socket");

        if let Some(ior) = s.pending_connect.take() {
            ior.complete(ReplyCode::ConnectReset, Bytes::new());
        }
        if let Some(ior) = s.pending_read.take() {
            ior.complete(ReplyCode::ReadReset, Bytes::new());
        }
        if let Some(ior) = s.pending_write.take() {
            let code = if ior.command == command::EOS {
                ReplyCode::EosReset
            } else {
                ReplyCode::WriteReset
            };
            ior.complete(code, Bytes::new());
        }
        s.rq.clear();
        s.flags |= flags::CLOSED;

        self.remove_from_send_queue(stream_id);

        let mut delete = true;
        if send_reset {
            if self.send_queue.is_empty() && self.ca.a2r.has_room(0) {
                self.ca.a2r.append(packet_type::RESET, stream_id, &[]);
            } else if let Some(s) = self.sockets.get_mut(stream_id) {
                s.flags |= flags::SHOULD_SEND_RESET;
                self.add_to_send_queue(stream_id, 0);
                delete = false;
            }
        }
        if delete {
            self.sockets.delete(stream_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::{packet_type, MAX_PAYLOAD_SIZE};
    use crate::request::{command, ReplyCode};
    use crate::service::tests::{connect, harness, request};
    use crate::socket::flags;

    #[test]
    fn test_connect_appends_frame_and_parks_reply() {
        let (mut svc, _tx, peer) = harness();

        let (req, mut rx) = request(1, command::CONNECT, 7, b"svc", 0);
        svc.handle_request(req);

        assert!(rx.try_recv().is_err(), "reply waits for the peer");
        let frames = peer.recv();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.packet_type, packet_type::CONNECT);
        assert_eq!(&frames[0].1[..], b"svc");
        assert_eq!(frames[0].0.stream_id % 2, 1);
    }

    #[test]
    fn test_connect_rejects_socket_in_use() {
        let (mut svc, _tx, peer) = harness();
        connect(&mut svc, &peer, 1, 7);

        let (req, mut rx) = request(1, command::CONNECT, 7, b"svc", 0);
        svc.handle_request(req);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::ConnectSocketInUse);
    }

    #[test]
    fn test_connect_rejects_oversized_service_name() {
        let (mut svc, _tx, _peer) = harness();

        let name = vec![b'x'; MAX_PAYLOAD_SIZE + 1];
        let (req, mut rx) = request(1, command::CONNECT, 7, &name, 0);
        svc.handle_request(req);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::ConnectReset);
        assert!(svc.sockets.find(crate::request::ClientId(1), 7).is_none());
    }

    #[test]
    fn test_read_on_missing_socket_resets() {
        let (mut svc, _tx, _peer) = harness();

        let (req, mut rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(req);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::ReadReset);
    }

    #[test]
    fn test_read_during_pending_connect_resets_stream() {
        let (mut svc, _tx, peer) = harness();

        let (conn, mut conn_rx) = request(1, command::CONNECT, 7, b"svc", 0);
        svc.handle_request(conn);
        let stream_id = peer.recv()[0].0.stream_id;

        let (read, mut read_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(read);

        assert_eq!(read_rx.try_recv().unwrap().code, ReplyCode::ReadReset);
        // The parked connect is torn down with it.
        assert_eq!(conn_rx.try_recv().unwrap().code, ReplyCode::ConnectReset);
        assert!(svc.sockets.get(stream_id).is_none());
        let frames = peer.recv();
        assert_eq!(frames.last().unwrap().0.packet_type, packet_type::RESET);
    }

    #[test]
    fn test_second_read_resets_stream() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (first, mut first_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(first);
        let (second, mut second_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(second);

        assert_eq!(second_rx.try_recv().unwrap().code, ReplyCode::ReadReset);
        assert_eq!(first_rx.try_recv().unwrap().code, ReplyCode::ReadReset);
        assert!(svc.sockets.get(stream_id).is_none());
    }

    #[test]
    fn test_read_drains_receive_queue_in_order() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        peer.send(packet_type::DATA, stream_id, b"one");
        peer.send(packet_type::DATA, stream_id, b"two");
        svc.drain_inbound();

        let (r1, mut rx1) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(r1);
        let reply = rx1.try_recv().unwrap();
        assert_eq!(reply.code, ReplyCode::ReadOk);
        assert_eq!(&reply.data[..], b"one");

        let (r2, mut rx2) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(r2);
        assert_eq!(&rx2.try_recv().unwrap().data[..], b"two");
    }

    #[test]
    fn test_read_with_small_buffer_against_queued_chunk_resets() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        peer.send(packet_type::DATA, stream_id, b"ten bytes!");
        svc.drain_inbound();

        let (read, mut rx) = request(1, command::READ, 7, &[], 4);
        svc.handle_request(read);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::ReadReset);
        assert!(svc.sockets.get(stream_id).is_none());
    }

    #[test]
    fn test_write_direct_and_boundary_sizes() {
        let (mut svc, _tx, peer) = harness();
        connect(&mut svc, &peer, 1, 7);

        // 252 bytes is the largest frame; it fits an empty ring exactly.
        let (max, mut max_rx) = request(1, command::WRITE, 7, &[7; MAX_PAYLOAD_SIZE], 0);
        svc.handle_request(max);
        assert_eq!(max_rx.try_recv().unwrap().code, ReplyCode::WriteOk);
        let frames = peer.recv();
        assert_eq!(frames[0].0.length as usize, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_write_above_max_payload_resets() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (req, mut rx) = request(1, command::WRITE, 7, &[7; MAX_PAYLOAD_SIZE + 1], 0);
        svc.handle_request(req);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::WriteReset);
        assert!(svc.sockets.get(stream_id).is_none());
        let frames = peer.recv();
        assert_eq!(frames.last().unwrap().0.packet_type, packet_type::RESET);
    }

    #[test]
    fn test_write_while_read_pending_is_allowed() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (read, mut read_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(read);

        let (write, mut write_rx) = request(1, command::WRITE, 7, b"full-duplex", 0);
        svc.handle_request(write);
        assert_eq!(write_rx.try_recv().unwrap().code, ReplyCode::WriteOk);

        // The read is still parked and still served.
        peer.send(packet_type::DATA, stream_id, b"reply");
        svc.drain_inbound();
        assert_eq!(&read_rx.try_recv().unwrap().data[..], b"reply");
    }

    #[test]
    fn test_write_after_client_eos_resets() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (eos, mut eos_rx) = request(1, command::EOS, 7, &[], 0);
        svc.handle_request(eos);
        assert_eq!(eos_rx.try_recv().unwrap().code, ReplyCode::EosOk);

        let (write, mut write_rx) = request(1, command::WRITE, 7, b"late", 0);
        svc.handle_request(write);
        assert_eq!(write_rx.try_recv().unwrap().code, ReplyCode::WriteReset);
        assert!(svc.sockets.get(stream_id).is_none());
    }

    #[test]
    fn test_eos_direct_sets_half_close() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (eos, mut rx) = request(1, command::EOS, 7, &[], 0);
        svc.handle_request(eos);

        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::EosOk);
        let frames = peer.recv();
        assert_eq!(frames[0].0.packet_type, packet_type::EOS);
        let s = svc.sockets.get(stream_id).unwrap();
        assert!(flags::has(s.flags, flags::SENT_EOS_TO_PEER));
        assert!(flags::has(s.flags, flags::RCVD_EOS_FROM_CLIENT));
    }

    #[test]
    fn test_second_eos_resets_stream() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (first, _first_rx) = request(1, command::EOS, 7, &[], 0);
        svc.handle_request(first);
        let (second, mut second_rx) = request(1, command::EOS, 7, &[], 0);
        svc.handle_request(second);

        assert_eq!(second_rx.try_recv().unwrap().code, ReplyCode::EosReset);
        assert!(svc.sockets.get(stream_id).is_none());
    }

    #[test]
    fn test_mutual_eos_closes_without_reset() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (eos, _eos_rx) = request(1, command::EOS, 7, &[], 0);
        svc.handle_request(eos);
        peer.recv();

        peer.send(packet_type::EOS, stream_id, &[]);
        svc.drain_inbound();

        // Peer EOS with no reader pending only latches the flag.
        assert!(svc.sockets.get(stream_id).is_some());

        let (read, mut read_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(read);
        assert_eq!(read_rx.try_recv().unwrap().code, ReplyCode::ReadEos);

        // Both EOS delivered and EOS sent: the socket is gone, silently.
        assert!(svc.sockets.get(stream_id).is_none());
        assert!(peer.recv().is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        let (first, mut first_rx) = request(1, command::RESET, 7, &[], 0);
        svc.handle_request(first);
        assert_eq!(first_rx.try_recv().unwrap().code, ReplyCode::ResetOk);
        assert!(svc.sockets.get(stream_id).is_none());

        let (second, mut second_rx) = request(1, command::RESET, 7, &[], 0);
        svc.handle_request(second);
        assert_eq!(second_rx.try_recv().unwrap().code, ReplyCode::ResetOk);

        // Exactly one RESET frame went out.
        let resets = peer
            .recv()
            .iter()
            .filter(|(h, _)| h.packet_type == packet_type::RESET)
            .count();
        assert_eq!(resets, 1);
    }

    #[test]
    fn test_reset_discards_receive_queue() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        peer.send(packet_type::DATA, stream_id, b"stale");
        svc.drain_inbound();
        peer.send(packet_type::RESET, stream_id, &[]);
        svc.drain_inbound();

        assert!(svc.sockets.get(stream_id).is_none());
        let (read, mut rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(read);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::ReadReset);
    }

    #[test]
    fn test_unknown_command_replies_nocmd() {
        let (mut svc, _tx, _peer) = harness();

        let (req, mut rx) = request(1, 99, 7, &[], 0);
        svc.handle_request(req);
        assert_eq!(rx.try_recv().unwrap().code, ReplyCode::NoCmd);
    }

    #[test]
    fn test_closed_socket_has_no_pending_state() {
        let (mut svc, _tx, peer) = harness();
        let stream_id = connect(&mut svc, &peer, 1, 7);

        // Park a read, queue inbound data for a second stream, then reset
        // while the outbound ring is full so the socket lingers CLOSED.
        let (read, mut read_rx) = request(1, command::READ, 7, &[], 16);
        svc.handle_request(read);
        let (fill, _fill_rx) = request(1, command::WRITE, 7, &[1; MAX_PAYLOAD_SIZE], 0);
        svc.handle_request(fill);

        let (reset, _reset_rx) = request(1, command::RESET, 7, &[], 0);
        svc.handle_request(reset);

        assert_eq!(read_rx.try_recv().unwrap().code, ReplyCode::ReadReset);
        let s = svc.sockets.get(stream_id).unwrap();
        assert!(flags::has(s.flags, flags::CLOSED));
        assert!(flags::has(s.flags, flags::SHOULD_SEND_RESET));
        assert!(s.pending_connect.is_none());
        assert!(s.pending_read.is_none());
        assert!(s.pending_write.is_none());
        assert!(s.rq.is_empty());
        assert!(s.in_send_queue);

        // A further reset on the lingering CLOSED socket is a no-op.
        let (again, mut again_rx) = request(1, command::RESET, 7, &[], 0);
        svc.handle_request(again);
        assert_eq!(again_rx.try_recv().unwrap().code, ReplyCode::ResetOk);
        assert!(svc.sockets.get(stream_id).is_some());
    }
}
