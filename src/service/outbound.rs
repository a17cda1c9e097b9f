//! Outbound drain: emit queued frames as ring room appears.
//!
//! Sockets whose next frame did not fit in the a2r ring wait in a FIFO
//! send queue. The drain is head-of-line blocking: a deeper socket never
//! bypasses a blocked head, which keeps cross-stream ordering aligned
//! with the order requests were accepted.

use bytes::Bytes;

use crate::protocol::packet_type;
use crate::request::{command, ReplyCode};
use crate::signal::SignalRegisters;
use crate::socket::flags;

use super::Service;

impl<R: SignalRegisters> Service<R> {
    /// Emit one frame per queued socket while the head's frame fits.
    pub(crate) fn drain_outbound(&mut self) {
        while let Some(&stream_id) = self.send_queue.front() {
            let Some(s) = self.sockets.get(stream_id) else {
                tracing::error!(stream_id, "send queue references unknown socket");
                self.send_queue.pop_front();
                continue;
            };
            if !self.ca.a2r.has_room(s.required_len) {
                break;
            }

            self.remove_from_send_queue(stream_id);
            self.emit_for_socket(stream_id);
        }
    }

    // Exactly one frame, chosen by socket state in priority order.
    fn emit_for_socket(&mut self, stream_id: u8) {
        let Some(s) = self.sockets.get_mut(stream_id) else {
            return;
        };

        if let Some(connect) = s.pending_connect.as_ref() {
            // The reply waits for the peer's CONNECT_RESPONSE.
            let data = connect.data.clone();
            self.ca.a2r.append(packet_type::CONNECT, stream_id, &data);
        } else if let Some(ior) = s.pending_write.take() {
            if ior.command == command::WRITE {
                self.ca.a2r.append(packet_type::DATA, stream_id, &ior.data);
                ior.complete(ReplyCode::WriteOk, Bytes::new());
            } else {
                self.ca.a2r.append(packet_type::EOS, stream_id, &[]);
                ior.complete(ReplyCode::EosOk, Bytes::new());
                s.flags |= flags::SENT_EOS_TO_PEER;
                if flags::has(s.flags, flags::SENT_EOS_TO_CLIENT) {
                    self.close_socket(stream_id, false);
                }
            }
        } else if flags::has(s.flags, flags::SHOULD_SEND_RESET) {
            self.ca.a2r.append(packet_type::RESET, stream_id, &[]);
            self.sockets.delete(stream_id);
        } else {
            tracing::error!(stream_id, "socket queued for send with nothing to send");
            self.close_socket(stream_id, true);
        }
    }

    pub(crate) fn add_to_send_queue(&mut self, stream_id: u8, required_len: usize) {
        if let Some(s) = self.sockets.get_mut(stream_id) {
            debug_assert!(!s.in_send_queue);
            s.in_send_queue = true;
            s.required_len = required_len;
            self.send_queue.push_back(stream_id);
        }
    }

    pub(crate) fn remove_from_send_queue(&mut self, stream_id: u8) {
        if let Some(s) = self.sockets.get_mut(stream_id) {
            if s.in_send_queue {
                s.in_send_queue = false;
                self.send_queue.retain(|&sid| sid != stream_id);
            }
        }
    }
}
