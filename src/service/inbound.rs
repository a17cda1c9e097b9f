//! Inbound demux: parse the remote→local ring and dispatch per stream.

use bytes::Bytes;

use crate::protocol::{packet_type, FrameHeader};
use crate::request::ReplyCode;
use crate::signal::SignalRegisters;
use crate::socket::flags;

use super::Service;

impl<R: SignalRegisters> Service<R> {
    /// Consume every complete frame currently in the r2a ring.
    ///
    /// Never suspends; the peer publishes whole frames, so a non-empty
    /// ring always yields one.
    pub(crate) fn drain_inbound(&mut self) {
        while let Some(header) = self.ca.r2a.peek_header() {
            let payload = self.ca.r2a.copy_payload(header.length);
            self.handle_peer_frame(header, payload);
            self.ca.r2a.consume(header.frame_len());
        }
    }

    fn handle_peer_frame(&mut self, header: FrameHeader, payload: Bytes) {
        let stream_id = header.stream_id;

        if header.packet_type == packet_type::RESET {
            if self.sockets.get(stream_id).is_some() {
                tracing::debug!(stream_id, "peer reset stream");
                self.close_socket(stream_id, false);
            }
            return;
        }

        let closed = match self.sockets.get(stream_id) {
            Some(s) => flags::has(s.flags, flags::CLOSED),
            None => true,
        };
        if closed {
            // Only CONNECT could do anything useful on an unknown or
            // closed stream, and inbound CONNECT is not implemented.
            tracing::debug!(
                stream_id,
                packet_type = header.packet_type,
                "ignoring frame for missing or closed stream"
            );
            return;
        }

        match header.packet_type {
            packet_type::CONNECT_RESPONSE => self.handle_connect_response(stream_id, payload),
            packet_type::DATA => self.handle_peer_data(stream_id, payload),
            packet_type::EOS => self.handle_peer_eos(stream_id),
            other => {
                tracing::debug!(stream_id, packet_type = other, "ignoring unknown packet type");
            }
        }
    }

    fn handle_connect_response(&mut self, stream_id: u8, payload: Bytes) {
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };
        if s.pending_connect.is_none() {
            tracing::error!(stream_id, "connect response with no pending connect");
            self.close_socket(stream_id, true);
            return;
        }
        if payload.len() != 1 {
            tracing::error!(
                stream_id,
                len = payload.len(),
                "connect response with bad length"
            );
            self.close_socket(stream_id, true);
            return;
        }

        let result = payload[0];
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };
        let Some(ior) = s.pending_connect.take() else {
            return;
        };
        if result == 0 {
            ior.complete(ReplyCode::ConnectOk, Bytes::new());
        } else {
            ior.complete(ReplyCode::ConnectUnknownService, Bytes::new());
            self.close_socket(stream_id, false);
        }
    }

    fn handle_peer_data(&mut self, stream_id: u8, payload: Bytes) {
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };
        match s.pending_read.take() {
            Some(ior) => {
                if ior.capacity < payload.len() {
                    // The waiting buffer cannot hold the datagram; that is
                    // unrecoverable for a transport without fragmentation.
                    ior.complete(ReplyCode::ReadReset, Bytes::new());
                    self.close_socket(stream_id, true);
                } else {
                    ior.complete(ReplyCode::ReadOk, payload);
                }
            }
            None => s.rq.push_back(payload),
        }
    }

    fn handle_peer_eos(&mut self, stream_id: u8) {
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };
        s.flags |= flags::RCVD_EOS_FROM_PEER;

        if let Some(ior) = s.pending_read.take() {
            ior.complete(ReplyCode::ReadEos, Bytes::new());
            s.flags |= flags::SENT_EOS_TO_CLIENT;
            if flags::has(s.flags, flags::SENT_EOS_TO_PEER) {
                self.close_socket(stream_id, false);
            }
        }
    }
}
