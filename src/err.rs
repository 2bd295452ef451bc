use std::net::SocketAddr;

/// Failures that originate inside the protocol core: a malformed datagram
/// handed to the codec, or a caller asking the window/store for something
/// outside the invariants those structures guarantee. On-the-wire
/// corruption (bad checksum, unknown flag from a peer) is never surfaced
/// this way — it is dropped silently by the session loops, per the
/// propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("datagram too short: got {got} bytes, header needs {need}")]
    Truncated { got: usize, need: usize },

    #[error("unknown flag byte: {0}")]
    UnknownFlag(u8),

    #[error("filename does not fit in {0} bytes")]
    FilenameTooLong(usize),
}

/// Failures that end a transfer: these map to the process exit codes in
/// the CLI contract.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server {0}: file not found")]
    FileNotFound(SocketAddr),

    #[error("no response from {0} after {1} attempts")]
    HandshakeTimedOut(SocketAddr, u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
