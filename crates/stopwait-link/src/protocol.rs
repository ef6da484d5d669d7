/// Stop-and-wait wire format — packet layouts and serialization.
///
/// Every packet is a fixed-layout big-endian structure bounded by sentinel
/// markers, one layout per kind. All layouts share a 5-byte prefix:
///
/// ```text
/// [0..2]  Start marker (u16, always 0xFFFF)
/// [2]     Source ID (u8)
/// [3..5]  Packet kind (u16)
/// ```
///
/// Kind-specific tails:
///
/// ```text
/// DATA            [5..9] seq  [9] declared_len  [10..265] payload (255 B, zero padded)  [265..267] end marker
/// ACK             [5..9] echoed seq                                                     [9..11]    end marker
/// REJECT          [5..7] subcode  [7..11] echoed seq                                    [11..13]   end marker
/// ACCESS_REQUEST  [5..9] seq  [9] declared_len  [10] technology  [11..15] subscriber    [15..17]   end marker
/// ACCESS_RESPONSE [5..9] seq  [9] declared_len  [10] technology  [11..15] subscriber  [15..17] status  [17..19] end marker
/// ```
///
/// The payload field is a fixed 255-byte zero-padded region; the *actual*
/// payload length is the byte count up to the first NUL, which is what the
/// receiver compares against `declared_len`. A corrupted end marker is not a
/// decode error — the field is carried in the packet so the receiver's
/// classification chain can observe and reject it.

use std::fmt;

use thiserror::Error;

/// Sentinel bounding every packet, start and end.
pub const START_MARKER: u16 = 0xFFFF;
pub const END_MARKER: u16 = 0xFFFF;

/// Fixed payload field width; also the maximum payload length.
pub const MAX_PAYLOAD: usize = 255;

/// Packet kind codes.
pub const KIND_DATA: u16 = 0xFFF1;
pub const KIND_ACK: u16 = 0xFFF2;
pub const KIND_REJECT: u16 = 0xFFF3;
pub const KIND_ACCESS_REQUEST: u16 = 0xFFF8;
pub const KIND_ACCESS_RESPONSE: u16 = 0xFFFC;

/// Reject subcodes.
pub const REJECT_OUT_OF_SEQUENCE: u16 = 0xFFF4;
pub const REJECT_LENGTH_MISMATCH: u16 = 0xFFF5;
pub const REJECT_BAD_END_MARKER: u16 = 0xFFF6;
pub const REJECT_DUPLICATE: u16 = 0xFFF7;

/// Access lookup statuses.
pub const STATUS_NOT_PAID: u16 = 0xFFF9;
pub const STATUS_NOT_FOUND: u16 = 0xFFFA;
pub const STATUS_GRANTED: u16 = 0xFFFB;

/// How long the sender waits for a reply before counting a retry.
pub const REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// Consecutive silent attempts per unit before the session is abandoned.
pub const MAX_TRIES: u32 = 3;

/// Well-known receiver port.
pub const DEFAULT_PORT: u16 = 8081;

/// Shared 5-byte prefix width.
const PREFIX: usize = 5;

/// Encoded sizes per kind.
pub const DATA_LEN: usize = PREFIX + 4 + 1 + MAX_PAYLOAD + 2;
pub const ACK_LEN: usize = PREFIX + 4 + 2;
pub const REJECT_LEN: usize = PREFIX + 2 + 4 + 2;
pub const ACCESS_REQUEST_LEN: usize = PREFIX + 4 + 1 + 1 + 4 + 2;
pub const ACCESS_RESPONSE_LEN: usize = PREFIX + 4 + 1 + 1 + 4 + 2 + 2;

/// Why a receiver refused a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OutOfSequence,
    LengthMismatch,
    BadEndMarker,
    Duplicate,
}

impl RejectReason {
    pub fn code(self) -> u16 {
        match self {
            Self::OutOfSequence => REJECT_OUT_OF_SEQUENCE,
            Self::LengthMismatch => REJECT_LENGTH_MISMATCH,
            Self::BadEndMarker => REJECT_BAD_END_MARKER,
            Self::Duplicate => REJECT_DUPLICATE,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            REJECT_OUT_OF_SEQUENCE => Some(Self::OutOfSequence),
            REJECT_LENGTH_MISMATCH => Some(Self::LengthMismatch),
            REJECT_BAD_END_MARKER => Some(Self::BadEndMarker),
            REJECT_DUPLICATE => Some(Self::Duplicate),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfSequence => "OUT_OF_SEQUENCE",
            Self::LengthMismatch => "LENGTH_MISMATCH",
            Self::BadEndMarker => "BAD_END_MARKER",
            Self::Duplicate => "DUPLICATE",
        };
        f.write_str(s)
    }
}

/// Outcome of an access lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    NotPaid,
    NotFound,
}

impl AccessStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Granted => STATUS_GRANTED,
            Self::NotPaid => STATUS_NOT_PAID,
            Self::NotFound => STATUS_NOT_FOUND,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            STATUS_GRANTED => Some(Self::Granted),
            STATUS_NOT_PAID => Some(Self::NotPaid),
            STATUS_NOT_FOUND => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Granted => "GRANTED",
            Self::NotPaid => "NOT_PAID",
            Self::NotFound => "NOT_FOUND",
        };
        f.write_str(s)
    }
}

/// Decode failure. Per the protocol a bad *end* marker is not malformed —
/// it decodes and is classified by the receiver. These cover the cases where
/// no coherent packet can be read at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),
    #[error("start marker mismatch: {0:#06x}")]
    BadStartMarker(u16),
    #[error("unknown packet kind: {0:#06x}")]
    UnknownKind(u16),
    #[error("unknown reject subcode: {0:#06x}")]
    UnknownRejectCode(u16),
    #[error("unknown access status: {0:#06x}")]
    UnknownStatusCode(u16),
}

/// A numbered payload segment (transfer profile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub source_id: u8,
    pub seq: u32,
    pub declared_len: u8,
    pub payload: [u8; MAX_PAYLOAD],
    pub end_marker: u16,
}

impl DataPacket {
    /// Build a well-formed segment. `bytes` beyond `MAX_PAYLOAD` are truncated.
    pub fn new(source_id: u8, seq: u32, bytes: &[u8]) -> Self {
        let take = bytes.len().min(MAX_PAYLOAD);
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..take].copy_from_slice(&bytes[..take]);
        Self {
            source_id,
            seq,
            declared_len: take as u8,
            payload,
            end_marker: END_MARKER,
        }
    }

    /// Actual payload length: bytes up to the first NUL in the fixed field.
    pub fn actual_len(&self) -> u8 {
        self.payload.iter().position(|&b| b == 0).unwrap_or(MAX_PAYLOAD) as u8
    }

    /// The live payload bytes (up to the first NUL).
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload[..self.actual_len() as usize]
    }
}

/// Positive acknowledgment for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub source_id: u8,
    pub echoed_seq: u32,
    pub end_marker: u16,
}

/// Classified refusal of one segment or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPacket {
    pub source_id: u8,
    pub reason: RejectReason,
    pub echoed_seq: u32,
    pub end_marker: u16,
}

/// "May subscriber S on technology T access the service?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequestPacket {
    pub source_id: u8,
    pub seq: u32,
    pub declared_len: u8,
    pub technology: u8,
    pub subscriber: u32,
    pub end_marker: u16,
}

impl AccessRequestPacket {
    /// Build a well-formed request. `declared_len` follows the wire
    /// convention: decimal digit count of subscriber plus technology.
    pub fn new(source_id: u8, seq: u32, subscriber: u32, technology: u8) -> Self {
        Self {
            source_id,
            seq,
            declared_len: digit_len(subscriber as u64) + digit_len(technology as u64),
            technology,
            subscriber,
            end_marker: END_MARKER,
        }
    }

    /// Recomputed actual length for the length-mismatch check.
    pub fn actual_len(&self) -> u8 {
        digit_len(self.subscriber as u64) + digit_len(self.technology as u64)
    }
}

/// Lookup answer, echoing the request's header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResponsePacket {
    pub source_id: u8,
    pub seq: u32,
    pub declared_len: u8,
    pub technology: u8,
    pub subscriber: u32,
    pub status: AccessStatus,
    pub end_marker: u16,
}

/// Closed set of everything that can travel on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
    Reject(RejectPacket),
    AccessRequest(AccessRequestPacket),
    AccessResponse(AccessResponsePacket),
}

impl Packet {
    pub fn kind_code(&self) -> u16 {
        match self {
            Self::Data(_) => KIND_DATA,
            Self::Ack(_) => KIND_ACK,
            Self::Reject(_) => KIND_REJECT,
            Self::AccessRequest(_) => KIND_ACCESS_REQUEST,
            Self::AccessResponse(_) => KIND_ACCESS_RESPONSE,
        }
    }

    pub fn source_id(&self) -> u8 {
        match self {
            Self::Data(p) => p.source_id,
            Self::Ack(p) => p.source_id,
            Self::Reject(p) => p.source_id,
            Self::AccessRequest(p) => p.source_id,
            Self::AccessResponse(p) => p.source_id,
        }
    }

    /// Serialize to the exact fixed layout for this kind.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(p) => {
                let mut buf = vec![0u8; DATA_LEN];
                write_prefix(&mut buf, p.source_id, KIND_DATA);
                buf[5..9].copy_from_slice(&p.seq.to_be_bytes());
                buf[9] = p.declared_len;
                buf[10..10 + MAX_PAYLOAD].copy_from_slice(&p.payload);
                buf[265..267].copy_from_slice(&p.end_marker.to_be_bytes());
                buf
            }
            Self::Ack(p) => {
                let mut buf = vec![0u8; ACK_LEN];
                write_prefix(&mut buf, p.source_id, KIND_ACK);
                buf[5..9].copy_from_slice(&p.echoed_seq.to_be_bytes());
                buf[9..11].copy_from_slice(&p.end_marker.to_be_bytes());
                buf
            }
            Self::Reject(p) => {
                let mut buf = vec![0u8; REJECT_LEN];
                write_prefix(&mut buf, p.source_id, KIND_REJECT);
                buf[5..7].copy_from_slice(&p.reason.code().to_be_bytes());
                buf[7..11].copy_from_slice(&p.echoed_seq.to_be_bytes());
                buf[11..13].copy_from_slice(&p.end_marker.to_be_bytes());
                buf
            }
            Self::AccessRequest(p) => {
                let mut buf = vec![0u8; ACCESS_REQUEST_LEN];
                write_prefix(&mut buf, p.source_id, KIND_ACCESS_REQUEST);
                buf[5..9].copy_from_slice(&p.seq.to_be_bytes());
                buf[9] = p.declared_len;
                buf[10] = p.technology;
                buf[11..15].copy_from_slice(&p.subscriber.to_be_bytes());
                buf[15..17].copy_from_slice(&p.end_marker.to_be_bytes());
                buf
            }
            Self::AccessResponse(p) => {
                let mut buf = vec![0u8; ACCESS_RESPONSE_LEN];
                write_prefix(&mut buf, p.source_id, KIND_ACCESS_RESPONSE);
                buf[5..9].copy_from_slice(&p.seq.to_be_bytes());
                buf[9] = p.declared_len;
                buf[10] = p.technology;
                buf[11..15].copy_from_slice(&p.subscriber.to_be_bytes());
                buf[15..17].copy_from_slice(&p.status.code().to_be_bytes());
                buf[17..19].copy_from_slice(&p.end_marker.to_be_bytes());
                buf
            }
        }
    }

    /// Parse a datagram. Start marker and kind must check out; the end marker
    /// is carried through untouched for the classification chain.
    pub fn decode(buf: &[u8]) -> Result<Packet, WireError> {
        if buf.len() < PREFIX {
            return Err(WireError::TooShort(buf.len()));
        }
        let start = u16::from_be_bytes([buf[0], buf[1]]);
        if start != START_MARKER {
            return Err(WireError::BadStartMarker(start));
        }
        let source_id = buf[2];
        let kind = u16::from_be_bytes([buf[3], buf[4]]);

        match kind {
            KIND_DATA => {
                if buf.len() < DATA_LEN {
                    return Err(WireError::TooShort(buf.len()));
                }
                let mut payload = [0u8; MAX_PAYLOAD];
                payload.copy_from_slice(&buf[10..10 + MAX_PAYLOAD]);
                Ok(Packet::Data(DataPacket {
                    source_id,
                    seq: read_u32(buf, 5),
                    declared_len: buf[9],
                    payload,
                    end_marker: u16::from_be_bytes([buf[265], buf[266]]),
                }))
            }
            KIND_ACK => {
                if buf.len() < ACK_LEN {
                    return Err(WireError::TooShort(buf.len()));
                }
                Ok(Packet::Ack(AckPacket {
                    source_id,
                    echoed_seq: read_u32(buf, 5),
                    end_marker: u16::from_be_bytes([buf[9], buf[10]]),
                }))
            }
            KIND_REJECT => {
                if buf.len() < REJECT_LEN {
                    return Err(WireError::TooShort(buf.len()));
                }
                let code = u16::from_be_bytes([buf[5], buf[6]]);
                let reason =
                    RejectReason::from_code(code).ok_or(WireError::UnknownRejectCode(code))?;
                Ok(Packet::Reject(RejectPacket {
                    source_id,
                    reason,
                    echoed_seq: read_u32(buf, 7),
                    end_marker: u16::from_be_bytes([buf[11], buf[12]]),
                }))
            }
            KIND_ACCESS_REQUEST => {
                if buf.len() < ACCESS_REQUEST_LEN {
                    return Err(WireError::TooShort(buf.len()));
                }
                Ok(Packet::AccessRequest(AccessRequestPacket {
                    source_id,
                    seq: read_u32(buf, 5),
                    declared_len: buf[9],
                    technology: buf[10],
                    subscriber: read_u32(buf, 11),
                    end_marker: u16::from_be_bytes([buf[15], buf[16]]),
                }))
            }
            KIND_ACCESS_RESPONSE => {
                if buf.len() < ACCESS_RESPONSE_LEN {
                    return Err(WireError::TooShort(buf.len()));
                }
                let code = u16::from_be_bytes([buf[15], buf[16]]);
                let status =
                    AccessStatus::from_code(code).ok_or(WireError::UnknownStatusCode(code))?;
                Ok(Packet::AccessResponse(AccessResponsePacket {
                    source_id,
                    seq: read_u32(buf, 5),
                    declared_len: buf[9],
                    technology: buf[10],
                    subscriber: read_u32(buf, 11),
                    status,
                    end_marker: u16::from_be_bytes([buf[17], buf[18]]),
                }))
            }
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for Packet {
    /// One-line human-readable dump, the wire-level diagnostic trace.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(p) => write!(
                f,
                "DATA start={START_MARKER:#06x} source={:#04x} seq={} declared_len={} payload={} end={:#06x}",
                p.source_id,
                p.seq,
                p.declared_len,
                render_payload(p.payload_bytes()),
                p.end_marker,
            ),
            Self::Ack(p) => write!(
                f,
                "ACK start={START_MARKER:#06x} source={:#04x} seq={} end={:#06x}",
                p.source_id, p.echoed_seq, p.end_marker,
            ),
            Self::Reject(p) => write!(
                f,
                "REJECT start={START_MARKER:#06x} source={:#04x} reason={} seq={} end={:#06x}",
                p.source_id, p.reason, p.echoed_seq, p.end_marker,
            ),
            Self::AccessRequest(p) => write!(
                f,
                "ACCESS_REQUEST start={START_MARKER:#06x} source={:#04x} seq={} declared_len={} tech={} subscriber={} end={:#06x}",
                p.source_id, p.seq, p.declared_len, p.technology, p.subscriber, p.end_marker,
            ),
            Self::AccessResponse(p) => write!(
                f,
                "ACCESS_RESPONSE start={START_MARKER:#06x} source={:#04x} seq={} tech={} subscriber={} status={} end={:#06x}",
                p.source_id, p.seq, p.technology, p.subscriber, p.status, p.end_marker,
            ),
        }
    }
}

fn write_prefix(buf: &mut [u8], source_id: u8, kind: u16) {
    buf[0..2].copy_from_slice(&START_MARKER.to_be_bytes());
    buf[2] = source_id;
    buf[3..5].copy_from_slice(&kind.to_be_bytes());
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Decimal digit count, the access profile's length unit.
pub(crate) fn digit_len(mut n: u64) -> u8 {
    let mut len = 1u8;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Printable payloads render as quoted text, anything else as hex.
fn render_payload(bytes: &[u8]) -> String {
    if bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
        format!("\"{}\"", String::from_utf8_lossy(bytes))
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_data() {
        let pkt = Packet::Data(DataPacket::new(0xFF, 3, b"hello over udp"));
        let bytes = pkt.encode();
        assert_eq!(bytes.len(), DATA_LEN);
        let parsed = Packet::decode(&bytes).unwrap();
        assert_eq!(parsed, pkt);
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn roundtrip_data_with_corrupt_end_marker() {
        let mut inner = DataPacket::new(0xFF, 9, b"segment nine");
        inner.end_marker = 0;
        let pkt = Packet::Data(inner);
        let bytes = pkt.encode();
        // Not malformed: the bad end marker is the receiver's business.
        let parsed = Packet::decode(&bytes).unwrap();
        assert_eq!(parsed, pkt);
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn roundtrip_ack_and_reject() {
        let ack = Packet::Ack(AckPacket {
            source_id: 0xFF,
            echoed_seq: 42,
            end_marker: END_MARKER,
        });
        assert_eq!(Packet::decode(&ack.encode()).unwrap(), ack);

        for reason in [
            RejectReason::OutOfSequence,
            RejectReason::LengthMismatch,
            RejectReason::BadEndMarker,
            RejectReason::Duplicate,
        ] {
            let rej = Packet::Reject(RejectPacket {
                source_id: 0xFF,
                reason,
                echoed_seq: 7,
                end_marker: END_MARKER,
            });
            let bytes = rej.encode();
            assert_eq!(bytes.len(), REJECT_LEN);
            let parsed = Packet::decode(&bytes).unwrap();
            assert_eq!(parsed, rej);
            assert_eq!(parsed.encode(), bytes);
        }
    }

    #[test]
    fn roundtrip_access_packets() {
        let req = Packet::AccessRequest(AccessRequestPacket::new(0x0A, 1, 1001, 4));
        let bytes = req.encode();
        assert_eq!(bytes.len(), ACCESS_REQUEST_LEN);
        assert_eq!(Packet::decode(&bytes).unwrap(), req);

        let resp = Packet::AccessResponse(AccessResponsePacket {
            source_id: 0x0A,
            seq: 1,
            declared_len: 5,
            technology: 4,
            subscriber: 1001,
            status: AccessStatus::Granted,
            end_marker: END_MARKER,
        });
        let bytes = resp.encode();
        assert_eq!(bytes.len(), ACCESS_RESPONSE_LEN);
        let parsed = Packet::decode(&bytes).unwrap();
        assert_eq!(parsed, resp);
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn reject_bad_start_marker() {
        let mut bytes = Packet::Data(DataPacket::new(0xFF, 1, b"x")).encode();
        bytes[0] = 0;
        assert_eq!(Packet::decode(&bytes), Err(WireError::BadStartMarker(0x00FF)));
    }

    #[test]
    fn reject_truncated_datagram() {
        let bytes = Packet::Data(DataPacket::new(0xFF, 1, b"x")).encode();
        assert_eq!(
            Packet::decode(&bytes[..DATA_LEN - 1]),
            Err(WireError::TooShort(DATA_LEN - 1))
        );
        assert_eq!(Packet::decode(&[0xFF; 3]), Err(WireError::TooShort(3)));
    }

    #[test]
    fn reject_unknown_kind() {
        let mut bytes = Packet::Ack(AckPacket {
            source_id: 1,
            echoed_seq: 1,
            end_marker: END_MARKER,
        })
        .encode();
        bytes[3] = 0x12;
        bytes[4] = 0x34;
        assert_eq!(Packet::decode(&bytes), Err(WireError::UnknownKind(0x1234)));
    }

    #[test]
    fn declared_vs_actual_length() {
        let mut pkt = DataPacket::new(0xFF, 8, b"eight");
        assert_eq!(pkt.actual_len(), 5);
        pkt.declared_len += 6;
        assert_eq!(pkt.actual_len(), 5);
        assert_eq!(pkt.declared_len, 11);
        assert_eq!(pkt.payload_bytes(), b"eight");
    }

    #[test]
    fn access_request_length_convention() {
        let req = AccessRequestPacket::new(0xFF, 1, 1001, 4);
        // "1001" + "4" = 5 characters.
        assert_eq!(req.declared_len, 5);
        assert_eq!(req.actual_len(), 5);
        assert_eq!(digit_len(0), 1);
        assert_eq!(digit_len(9), 1);
        assert_eq!(digit_len(10), 2);
        assert_eq!(digit_len(65000), 5);
    }
}
