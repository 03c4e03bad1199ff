use std::io;

use crate::MAX_FRAME_LEN;

/// Session-fatal failures. None of these are retried by the library; the
/// session is torn down and the caller decides what to do next.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot reach relay: {0}")]
    ConnectionRefused(#[source] io::Error),

    #[error("no peer showed up before the relay gave up")]
    PeerTimeout,

    #[error("pairing code must not be empty")]
    EmptyCode,

    #[error("key exchange failed: {0}")]
    Handshake(String),

    #[error("verification failed: wrong code or tampered stream")]
    VerifyFailed,

    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    InvalidFrameSize(u32),

    #[error("refusing unsafe file name {0:?}")]
    UnsafeName(String),

    #[error("source ended after {written} of {expected} bytes")]
    TruncatedSource { written: u64, expected: u64 },

    #[error("malformed meta header: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
