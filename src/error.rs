use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while handling a single request, parcel or
/// scan cycle. None of these are fatal to the daemon; a connection or cycle
/// that hits one is logged and abandoned. The only fatal startup error is
/// failing to bind the listening port, which surfaces as a plain io error
/// from the endpoint constructor.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A declared length (body size or embedded field length) exceeds what
    /// was actually received or what remains in the buffer.
    #[error("truncated parcel: needed {expected} byte(s), {available} available")]
    TruncatedParcel { expected: u64, available: u64 },

    #[error("bad magic number")]
    BadMagic,

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("parcel body of {0} byte(s) exceeds the configured maximum")]
    OversizedParcel(u64),

    /// The body held more bytes than its length prefixes account for.
    #[error("{0} unconsumed byte(s) after the parcel payload")]
    TrailingBytes(u64),

    #[error("read timed out")]
    ReadTimeout,

    #[error("could not connect to host {0}")]
    ConnectFailed(String),

    #[error("sending to host {host} failed: {source}")]
    SendFailed {
        host: String,
        source: std::io::Error,
    },

    #[error("invalid config file at {}", path.display())]
    BadConfig { path: PathBuf },

    #[error("filesystem operation on {} failed: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
