//! Filename handshake: the client asks for a file by name and the server
//! either re-binds to a fresh ephemeral port and says "OK", or says "file
//! not found" without ever allocating a session.

use std::net::SocketAddr;
use std::time::Duration;

use crate::err::TransferError;
use crate::net::DatagramIo;
use crate::wire::{decode_pdu, encode_pdu, Flag, InitPayload};

/// Server side, step zero: pulls a filename request out of a raw
/// datagram received on the well-known listening socket, before any
/// per-client session exists.
pub fn decode_request(buf: &[u8]) -> Option<InitPayload> {
    let (header, payload) = decode_pdu(buf)?;
    if header.flag != Flag::Filename {
        return None;
    }
    InitPayload::decode(payload).ok()
}

const CLIENT_RETRY_LIMIT: u32 = 10;
const CLIENT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

const NOT_FOUND_RETRIES: u32 = 3;
const OK_RETRY_LIMIT: u32 = 10;
const OK_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Client side of the handshake: sends the FILENAME request up to
/// [`CLIENT_RETRY_LIMIT`] times, returns the server's (possibly rebound)
/// address on "OK", or a terminal error on "file not found" / no
/// response at all.
pub fn request_file(
    io: &mut dyn DatagramIo,
    mut server_addr: SocketAddr,
    filename: &str,
    window_size: u32,
    buffer_size: u32,
) -> Result<SocketAddr, TransferError> {
    let payload = InitPayload {
        filename: filename.to_string(),
        window_size,
        buffer_size,
    }
    .encode()?;
    let request = encode_pdu(0, Flag::Filename, &payload);

    let mut buf = [0u8; 1500];

    for attempt in 1..=CLIENT_RETRY_LIMIT {
        log::debug!("handshake: sending FILENAME request, attempt {attempt}/{CLIENT_RETRY_LIMIT}");
        io.send_to(&request, server_addr)?;

        let Some((n, from)) = io.recv_from(&mut buf, CLIENT_POLL_TIMEOUT)? else {
            continue;
        };

        let Some((header, payload)) = decode_pdu(&buf[..n]) else {
            continue;
        };
        if header.flag != Flag::FilenameResponse {
            continue;
        }

        let message = String::from_utf8_lossy(payload);
        if message.trim_end_matches('\0') == "OK" {
            server_addr = from;
            log::info!("handshake: server {server_addr} accepted transfer");
            return Ok(server_addr);
        }

        log::warn!("handshake: server {from} reports: {message}");
        return Err(TransferError::FileNotFound(from));
    }

    Err(TransferError::HandshakeTimedOut(server_addr, CLIENT_RETRY_LIMIT))
}

/// Server side, failure path: tells the client the file does not exist.
/// Sent a fixed number of times with no wait for acknowledgment — the
/// session never starts, so there is nothing to keep alive for.
pub fn respond_not_found(io: &mut dyn DatagramIo, client_addr: SocketAddr) -> std::io::Result<()> {
    let pdu = encode_pdu(0, Flag::FilenameResponse, b"File not found");
    for _ in 0..NOT_FOUND_RETRIES {
        io.send_to(&pdu, client_addr)?;
    }
    Ok(())
}

/// Server side, success path: announces "OK" and waits up to one second
/// for the client to retry its FILENAME request — that retry is the
/// implicit ACK that ends the wait (the client hasn't seen the "OK" yet,
/// but it has proven it's still there and listening). Silence on a poll
/// means "OK" hasn't been acknowledged yet, so the server resends it,
/// spending one more of its [`OK_RETRY_LIMIT`] attempts.
pub fn respond_ok(io: &mut dyn DatagramIo, client_addr: SocketAddr) -> std::io::Result<bool> {
    let pdu = encode_pdu(0, Flag::FilenameResponse, b"OK");
    let mut buf = [0u8; 1500];

    for attempt in 1..=OK_RETRY_LIMIT {
        io.send_to(&pdu, client_addr)?;

        match io.recv_from(&mut buf, OK_POLL_TIMEOUT)? {
            None => {
                log::debug!("handshake: no FILENAME retry yet, resending OK (attempt {attempt})");
                continue;
            }
            Some((n, from)) if from == client_addr => match decode_pdu(&buf[..n]) {
                Some((header, _)) if header.flag == Flag::Filename => {
                    log::debug!("handshake: client retried FILENAME, treating as implicit ack of OK");
                    return Ok(true);
                }
                _ => continue,
            },
            Some(_) => continue,
        }
    }

    log::warn!("handshake: no FILENAME retry from {client_addr} after {OK_RETRY_LIMIT} OKs, giving up");
    Ok(false)
}
