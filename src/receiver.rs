//! Receiver session: the main receive loop, an out-of-order reorder
//! buffer (the sender's `Window` reused unmodified), and EOF/timeout
//! give-up policy. Mirrors the original's `process_file_transfer`.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use crate::err::TransferError;
use crate::net::DatagramIo;
use crate::wire::{decode_pdu, encode_ack, Flag};
use crate::window::Window;

/// The header comment in the original protocol disagrees with its own
/// constant ("1 second timeout") — the value actually used is ten
/// seconds, and that's what every implementation built against it
/// depends on.
const DATA_TIMEOUT: Duration = Duration::from_millis(10_000);
const CONSECUTIVE_TIMEOUT_LIMIT: u32 = 15;
const FINAL_RR_REPEATS: u32 = 3;

pub struct ReceiverSession<'a> {
    io: &'a mut dyn DatagramIo,
    server_addr: SocketAddr,
    reorder: Window,
    expected_seq: u32,
    highest_received_seq: u32,
    eof_received: bool,
    consecutive_timeouts: u32,
}

impl<'a> ReceiverSession<'a> {
    pub fn new(io: &'a mut dyn DatagramIo, server_addr: SocketAddr, window_size: u32) -> Self {
        ReceiverSession {
            io,
            server_addr,
            reorder: Window::new(window_size),
            expected_seq: 0,
            highest_received_seq: 0,
            eof_received: false,
            consecutive_timeouts: 0,
        }
    }

    pub fn run(&mut self, sink: &mut dyn Write) -> Result<(), TransferError> {
        let mut buf = [0u8; 1500];

        loop {
            let Some((n, from)) = self.io.recv_from(&mut buf, DATA_TIMEOUT)? else {
                if self.eof_received {
                    return Ok(());
                }
                self.on_timeout()?;
                if self.consecutive_timeouts >= CONSECUTIVE_TIMEOUT_LIMIT {
                    return Ok(());
                }
                continue;
            };

            if from != self.server_addr {
                continue;
            }
            self.consecutive_timeouts = 0;

            let Some((header, payload)) = decode_pdu(&buf[..n]) else {
                // Corrupt datagram: ask for the packet we're still
                // waiting on and move on.
                self.send_rr_or_srej(Flag::SelectiveReject, self.expected_seq)?;
                continue;
            };

            if header.seq > self.highest_received_seq {
                self.highest_received_seq = header.seq;
            }

            match header.flag {
                Flag::Data | Flag::ResentSrej | Flag::ResentTimeout => {
                    self.on_data(header.seq, payload, sink)?;
                }
                Flag::Eof => {
                    self.on_eof(payload, sink)?;
                }
                _ => {}
            }

            if self.eof_received && self.expected_seq > self.highest_received_seq {
                // All outstanding data has been drained after EOF.
                return Ok(());
            }
        }
    }

    fn on_data(&mut self, seq: u32, payload: &[u8], sink: &mut dyn Write) -> Result<(), TransferError> {
        if seq == self.expected_seq {
            sink.write_all(payload)?;
            self.send_rr_or_srej(Flag::ReceiverReady, self.expected_seq)?;
            self.expected_seq += 1;

            while let Some(slot) = self.reorder.get(self.expected_seq) {
                sink.write_all(&slot.data.clone())?;
                self.reorder.remove(self.expected_seq);
                self.reorder.retarget_base(self.expected_seq + 1);
                self.send_rr_or_srej(Flag::ReceiverReady, self.expected_seq)?;
                self.expected_seq += 1;
            }
        } else if seq > self.expected_seq {
            self.reorder.retarget_base(self.expected_seq);
            self.reorder.add(seq, Flag::Data, payload.to_vec());
            self.send_rr_or_srej(Flag::SelectiveReject, self.expected_seq)?;
        } else {
            // Duplicate of something already delivered: re-confirm the
            // last packet we accepted.
            self.send_rr_or_srej(Flag::ReceiverReady, self.expected_seq.saturating_sub(1))?;
        }

        Ok(())
    }

    fn on_eof(&mut self, payload: &[u8], sink: &mut dyn Write) -> Result<(), TransferError> {
        if !payload.is_empty() {
            sink.write_all(payload)?;
        }
        self.eof_received = true;
        let last = self.expected_seq.saturating_sub(1);
        for _ in 0..FINAL_RR_REPEATS {
            self.io
                .send_to(&encode_ack(last, Flag::ReceiverReady), self.server_addr)?;
        }
        log::info!("receiver: EOF received, file complete at {} bytes worth of packets", self.expected_seq);
        Ok(())
    }

    fn on_timeout(&mut self) -> Result<(), TransferError> {
        self.consecutive_timeouts += 1;

        if self.consecutive_timeouts == CONSECUTIVE_TIMEOUT_LIMIT {
            log::warn!("receiver: giving up after {CONSECUTIVE_TIMEOUT_LIMIT} consecutive timeouts");
            self.io.send_to(
                &encode_ack(self.highest_received_seq + 1, Flag::SelectiveReject),
                self.server_addr,
            )?;
            return Ok(());
        }

        self.io.send_to(
            &encode_ack(self.highest_received_seq, Flag::ReceiverReady),
            self.server_addr,
        )?;
        Ok(())
    }

    fn send_rr_or_srej(&mut self, flag: Flag, seq: u32) -> Result<(), TransferError> {
        self.io.send_to(&encode_ack(seq, flag), self.server_addr)?;
        Ok(())
    }
}
