/// Sender-side failure taxonomy.
///
/// A bare timeout is not an error — it drives the retry loop inside
/// `exchange`, and an undecodable reply spends a retry the same way. A
/// REJECT reply is a classified outcome the caller logs and moves past.
/// Only the cases below unwind.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Socket creation, bind, or send failure. Fatal to the attempt and, in
    /// the binaries, to the process.
    #[error("transport unavailable: {0}")]
    Transport(#[from] io::Error),

    /// No usable reply within the bound on every allowed attempt. Fatal to
    /// the whole session: remaining units are not attempted.
    #[error("no reply from receiver after {0} attempts")]
    RetriesExhausted(u32),
}
