//! Reliable single-file transfer over an unreliable datagram substrate:
//! a fixed-size sliding window with selective-reject ARQ, checksummed
//! PDUs, and a bounded-retry filename handshake.

mod checksum;
mod err;
mod handshake;
mod net;
mod receiver;
mod sender;
mod store;
mod window;
mod wire;

pub use err::{ProtocolError, TransferError};
pub use handshake::{decode_request, request_file, respond_not_found, respond_ok};
pub use net::{DatagramIo, LossyIo, UdpIo};
pub use receiver::ReceiverSession;
pub use sender::SenderSession;
pub use wire::{InitPayload, MAX_DATA_SIZE, MAX_PDU_SIZE};
