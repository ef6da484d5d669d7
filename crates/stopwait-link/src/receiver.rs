/// Stop-and-wait receiver: classify each inbound datagram into exactly one
/// verdict and reply accordingly.
///
/// The classification chain runs in a fixed order — duplicate, out of
/// sequence, length mismatch, bad end marker, accept — and the first match
/// wins. After *every* verdict, accepted or not, the expected sequence number
/// advances by one: the receiver never waits for a corrected resend, it
/// always expects the next unit. Session state is keyed by peer identity
/// (address + source ID) so independent senders cannot cross-talk, and it
/// lives for the whole process — duplicate counts are never reset.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::access::AccessTable;
use crate::logging::{WireEvent, WireLog, WireLogger};
use crate::protocol::{
    AccessResponsePacket, AckPacket, DataPacket, Packet, RejectPacket, RejectReason, DATA_LEN,
    END_MARKER,
};

/// Identity of one peer conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub addr: SocketAddr,
    pub source_id: u8,
}

/// Verdict for one classified segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

/// Per-peer sequencing and duplicate-tracking state.
#[derive(Debug)]
pub struct SessionState {
    expected_seq: u32,
    seen: HashMap<u32, u32>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            expected_seq: 1,
            seen: HashMap::new(),
        }
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Run the classification chain over one segment. Mutates the state:
    /// the observation count for this sequence number goes up before the
    /// checks, and the expectation advances afterwards no matter the verdict.
    pub fn classify(&mut self, pkt: &DataPacket) -> Verdict {
        let count = {
            let c = self.seen.entry(pkt.seq).or_insert(0);
            *c += 1;
            *c
        };

        let verdict = if count > 1 {
            Verdict::Reject(RejectReason::Duplicate)
        } else if pkt.seq != self.expected_seq {
            Verdict::Reject(RejectReason::OutOfSequence)
        } else if pkt.actual_len() != pkt.declared_len {
            Verdict::Reject(RejectReason::LengthMismatch)
        } else if pkt.end_marker != END_MARKER {
            Verdict::Reject(RejectReason::BadEndMarker)
        } else {
            Verdict::Accept
        };

        // Always advance, even past a rejected unit.
        self.expected_seq += 1;
        verdict
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer-profile receiver: sessions keyed by peer, one reply per segment.
pub struct TransferReceiver {
    sessions: HashMap<PeerKey, SessionState>,
    logger: Arc<dyn WireLogger>,
}

impl TransferReceiver {
    pub fn new(logger: Arc<dyn WireLogger>) -> Self {
        Self {
            sessions: HashMap::new(),
            logger,
        }
    }

    /// Classify one inbound datagram and produce the reply to send, if any.
    /// Malformed datagrams and non-DATA kinds are logged and dropped — the
    /// sender's timeout path covers recovery.
    pub fn handle_datagram(&mut self, buf: &[u8], from: SocketAddr) -> Option<Packet> {
        let packet = match Packet::decode(buf) {
            Ok(p) => p,
            Err(error) => {
                self.logger.log(WireLog {
                    role: "receiver",
                    event: WireEvent::Malformed { from, error },
                });
                return None;
            }
        };
        self.logger.log(WireLog {
            role: "receiver",
            event: WireEvent::Received {
                from,
                packet: packet.clone(),
            },
        });

        let data = match packet {
            Packet::Data(d) => d,
            other => {
                tracing::debug!(kind = other.kind_code(), %from, "ignoring non-DATA packet");
                return None;
            }
        };

        let key = PeerKey {
            addr: from,
            source_id: data.source_id,
        };
        let session = self.sessions.entry(key).or_insert_with(SessionState::new);
        let expected_seq = session.expected_seq();
        let verdict = session.classify(&data);

        self.logger.log(WireLog {
            role: "receiver",
            event: WireEvent::Verdict {
                seq: data.seq,
                expected_seq,
                rejected: match verdict {
                    Verdict::Accept => None,
                    Verdict::Reject(reason) => Some(reason),
                },
            },
        });

        Some(match verdict {
            Verdict::Accept => Packet::Ack(AckPacket {
                source_id: data.source_id,
                echoed_seq: data.seq,
                end_marker: END_MARKER,
            }),
            Verdict::Reject(reason) => Packet::Reject(RejectPacket {
                source_id: data.source_id,
                reason,
                echoed_seq: data.seq,
                end_marker: END_MARKER,
            }),
        })
    }

    /// Blocking serve loop: one datagram in, at most one reply out, forever.
    pub fn serve(&mut self, socket: &UdpSocket) -> io::Result<()> {
        let mut buf = [0u8; DATA_LEN + 64];
        loop {
            let (len, from) = socket.recv_from(&mut buf)?;
            if let Some(reply) = self.handle_datagram(&buf[..len], from) {
                socket.send_to(&reply.encode(), from)?;
            }
        }
    }
}

/// Access-profile receiver: framing checks plus a table lookup. No
/// sequencing or duplicate state — every request stands alone.
pub struct AccessReceiver {
    table: AccessTable,
    logger: Arc<dyn WireLogger>,
}

impl AccessReceiver {
    pub fn new(table: AccessTable, logger: Arc<dyn WireLogger>) -> Self {
        Self { table, logger }
    }

    pub fn handle_datagram(&self, buf: &[u8], from: SocketAddr) -> Option<Packet> {
        let packet = match Packet::decode(buf) {
            Ok(p) => p,
            Err(error) => {
                self.logger.log(WireLog {
                    role: "receiver",
                    event: WireEvent::Malformed { from, error },
                });
                return None;
            }
        };
        self.logger.log(WireLog {
            role: "receiver",
            event: WireEvent::Received {
                from,
                packet: packet.clone(),
            },
        });

        let req = match packet {
            Packet::AccessRequest(r) => r,
            other => {
                tracing::debug!(kind = other.kind_code(), %from, "ignoring non-request packet");
                return None;
            }
        };

        // Same framing checks as the transfer chain, minus ordering and
        // duplicate detection.
        if req.actual_len() != req.declared_len {
            return Some(reject(req.source_id, RejectReason::LengthMismatch, req.seq));
        }
        if req.end_marker != END_MARKER {
            return Some(reject(req.source_id, RejectReason::BadEndMarker, req.seq));
        }

        let status = self.table.lookup(req.subscriber, req.technology);
        self.logger.log(WireLog {
            role: "receiver",
            event: WireEvent::Lookup {
                subscriber: req.subscriber,
                technology: req.technology,
                status,
            },
        });

        Some(Packet::AccessResponse(AccessResponsePacket {
            source_id: req.source_id,
            seq: req.seq,
            declared_len: req.declared_len,
            technology: req.technology,
            subscriber: req.subscriber,
            status,
            end_marker: END_MARKER,
        }))
    }

    pub fn serve(&self, socket: &UdpSocket) -> io::Result<()> {
        let mut buf = [0u8; DATA_LEN + 64];
        loop {
            let (len, from) = socket.recv_from(&mut buf)?;
            if let Some(reply) = self.handle_datagram(&buf[..len], from) {
                socket.send_to(&reply.encode(), from)?;
            }
        }
    }
}

fn reject(source_id: u8, reason: RejectReason, seq: u32) -> Packet {
    Packet::Reject(RejectPacket {
        source_id,
        reason,
        echoed_seq: seq,
        end_marker: END_MARKER,
    })
}

/// Create the receiver's UDP socket. No read timeout: the serve loop blocks
/// until a datagram arrives.
pub fn create_receiver_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(false)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}
