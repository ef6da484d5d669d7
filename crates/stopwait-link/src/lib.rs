/// stopwait-link: a stop-and-wait protocol pair over UDP.
///
/// Two profiles share one architecture:
/// - transfer: numbered payload segments with per-segment validation
///   (ordering, deduplication, length consistency, framing integrity) and
///   ACK/REJECT replies
/// - access: subscriber authorization lookups answered from a flat-file
///   table (GRANTED / NOT_PAID / NOT_FOUND)
///
/// The sender retransmits a unit only on silence, bounded by a retry limit;
/// the receiver classifies every inbound datagram into exactly one verdict
/// and always advances its expectation afterwards.

pub mod access;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod sender;

// Re-export key types for convenience.
pub use access::{AccessTable, Subscriber, TableError};
pub use error::LinkError;
pub use logging::{NullLogger, TracingLogger, WireEvent, WireLog, WireLogger};
pub use protocol::{
    AccessRequestPacket, AccessResponsePacket, AccessStatus, AckPacket, DataPacket, Packet,
    RejectPacket, RejectReason, WireError, DEFAULT_PORT, END_MARKER, MAX_PAYLOAD, MAX_TRIES,
    REPLY_TIMEOUT, START_MARKER,
};
pub use receiver::{
    create_receiver_socket, AccessReceiver, PeerKey, SessionState, TransferReceiver, Verdict,
};
pub use sender::{
    create_sender_socket, exchange, run_access_sender, run_transfer_sender, AccessOutcome,
    FaultPlan, RetryPolicy, SenderConfig, TransferReport,
};
