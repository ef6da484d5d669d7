/// Wire-level diagnostic logging.
///
/// Both roles emit a human-readable trace of every send/receive/classify
/// event. The trace is a diagnostic concern, not part of the protocol
/// contract, so it lives behind a trait: binaries plug in `TracingLogger`,
/// tests that don't care use `NullLogger`.

use std::fmt;
use std::net::SocketAddr;

use crate::protocol::{AccessStatus, Packet, RejectReason, WireError};

/// One structured trace entry.
#[derive(Debug, Clone)]
pub struct WireLog {
    pub role: &'static str,
    pub event: WireEvent,
}

/// Everything worth tracing on either side of the link.
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// Sender: one attempt for one unit went out.
    Sent { attempt: u32, packet: Packet },
    /// Sender: the reply window elapsed with nothing readable.
    Timeout { seq: u32, attempt: u32 },
    /// Sender: a classified reply arrived.
    Reply { packet: Packet },
    /// Sender: all attempts for one unit were silent.
    GaveUp { seq: u32, tries: u32 },
    /// Receiver: an inbound datagram decoded cleanly.
    Received { from: SocketAddr, packet: Packet },
    /// Either side: an inbound datagram could not be decoded. The receiver
    /// drops it without replying; the sender spends one retry on it.
    Malformed { from: SocketAddr, error: WireError },
    /// Receiver: classification chain verdict for one segment.
    Verdict {
        seq: u32,
        expected_seq: u32,
        rejected: Option<RejectReason>,
    },
    /// Receiver: access lookup resolved.
    Lookup {
        subscriber: u32,
        technology: u8,
        status: AccessStatus,
    },
    /// Receiver: subscriber table loaded at startup.
    TableLoaded { records: usize },
}

impl fmt::Display for WireEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { attempt, packet } => {
                write!(f, "sent attempt={attempt} {packet}")
            }
            Self::Timeout { seq, attempt } => {
                write!(f, "timeout seq={seq} attempt={attempt}, retransmitting")
            }
            Self::Reply { packet } => write!(f, "reply {packet}"),
            Self::GaveUp { seq, tries } => {
                write!(f, "receiver not responding seq={seq} tries={tries}")
            }
            Self::Received { from, packet } => write!(f, "received from={from} {packet}"),
            Self::Malformed { from, error } => {
                write!(f, "malformed datagram from={from}: {error}")
            }
            Self::Verdict {
                seq,
                expected_seq,
                rejected,
            } => match rejected {
                Some(reason) => {
                    write!(f, "reject seq={seq} expected={expected_seq} reason={reason}")
                }
                None => write!(f, "accept seq={seq}"),
            },
            Self::Lookup {
                subscriber,
                technology,
                status,
            } => write!(f, "lookup subscriber={subscriber} tech={technology} status={status}"),
            Self::TableLoaded { records } => write!(f, "subscriber table loaded records={records}"),
        }
    }
}

/// Trace sink for wire events.
pub trait WireLogger: Send + Sync {
    fn log(&self, entry: WireLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl WireLogger for TracingLogger {
    fn log(&self, entry: WireLog) {
        // Lifecycle and failure events at info, per-packet spam at debug.
        match &entry.event {
            WireEvent::GaveUp { .. }
            | WireEvent::Malformed { .. }
            | WireEvent::TableLoaded { .. }
            | WireEvent::Timeout { .. } => {
                tracing::info!(role = entry.role, "{}", entry.event);
            }
            _ => {
                tracing::debug!(role = entry.role, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all entries.
pub struct NullLogger;

impl WireLogger for NullLogger {
    fn log(&self, _entry: WireLog) {}
}
