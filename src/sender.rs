//! Sender session: fills the window from the source file, dispatches
//! data, answers RR/SREJ as they arrive, and recovers from timeouts by
//! retransmitting from the window or, failing that, reconstructing from
//! the retransmission store. Mirrors the original's
//! `send_data_packets`/`process_ack_packets`/`handle_timeout`/
//! `send_eof_packet` loop, collapsed into one state machine with explicit
//! session fields instead of the original's several independent
//! duplicate-ack counters.

use std::io::Read;
use std::net::SocketAddr;
use std::time::Duration;

use crate::err::TransferError;
use crate::net::DatagramIo;
use crate::store::RetransmitStore;
use crate::wire::{decode_pdu, encode_pdu, Flag};
use crate::window::Window;

const MAX_RETRANSMIT: u32 = 10;
const STALL_ITERATIONS: u32 = 3;
const FULL_WINDOW_POLL: Duration = Duration::from_millis(1000);
const EOF_POLL: Duration = Duration::from_millis(1000);

pub struct SenderSession<'a> {
    io: &'a mut dyn DatagramIo,
    client_addr: SocketAddr,
    window: Window,
    store: RetransmitStore,
    buffer_size: u32,
    eof_reached: bool,
    last_base: u32,
    stalled_iterations: u32,
    timeout_strikes: u32,
}

impl<'a> SenderSession<'a> {
    pub fn new(
        io: &'a mut dyn DatagramIo,
        client_addr: SocketAddr,
        window_size: u32,
        buffer_size: u32,
    ) -> Self {
        SenderSession {
            io,
            client_addr,
            window: Window::new(window_size),
            store: RetransmitStore::new(2 * window_size as usize * buffer_size as usize, buffer_size),
            buffer_size,
            eof_reached: false,
            last_base: 0,
            stalled_iterations: 0,
            timeout_strikes: 0,
        }
    }

    pub fn run(&mut self, source: &mut dyn Read) -> Result<(), TransferError> {
        loop {
            self.fill(source)?;

            if self.eof_reached && self.window.base() == self.window.next_seq() {
                break;
            }

            self.dispatch()?;
        }

        self.send_eof()
    }

    fn fill(&mut self, source: &mut dyn Read) -> Result<(), TransferError> {
        while !self.eof_reached
            && self.window.next_seq() - self.window.base() < self.window.window_size()
        {
            let mut chunk = vec![0u8; self.buffer_size as usize];
            let n = source.read(&mut chunk)?;
            if n == 0 {
                self.eof_reached = true;
                break;
            }
            chunk.truncate(n);

            let seq = self.window.next_seq();
            self.window.add(seq, Flag::Data, chunk.clone());
            self.store.write(&chunk, seq);

            let pdu = encode_pdu(seq, Flag::Data, &chunk);
            self.io.send_to(&pdu, self.client_addr)?;
            self.window.advance_next_seq();

            self.drain_acks()?;
        }

        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), TransferError> {
        let full = self.window.next_seq() - self.window.base() >= self.window.window_size();
        let timeout = if full { FULL_WINDOW_POLL } else { Duration::ZERO };

        let mut buf = [0u8; 1500];
        let mut got_ack = false;
        match self.io.recv_from(&mut buf, timeout)? {
            Some((n, from)) if from == self.client_addr => {
                self.handle_ack(&buf[..n])?;
                got_ack = true;
            }
            Some(_) => {}
            None => {
                if full {
                    self.handle_timeout()?;
                }
            }
        }

        if got_ack {
            self.timeout_strikes = 0;
        }

        if self.window.base() == self.last_base {
            self.stalled_iterations += 1;
        } else {
            self.last_base = self.window.base();
            self.stalled_iterations = 0;
        }

        if full && self.stalled_iterations >= STALL_ITERATIONS {
            self.handle_timeout()?;
            self.stalled_iterations = 0;
        }

        Ok(())
    }

    fn drain_acks(&mut self) -> Result<(), TransferError> {
        let mut buf = [0u8; 1500];
        loop {
            match self.io.recv_from(&mut buf, Duration::ZERO)? {
                Some((n, from)) if from == self.client_addr => self.handle_ack(&buf[..n])?,
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }

    fn handle_ack(&mut self, buf: &[u8]) -> Result<(), TransferError> {
        let Some((header, _)) = decode_pdu(buf) else {
            return Ok(());
        };

        match header.flag {
            Flag::ReceiverReady => {
                self.window.mark_ack(header.seq);
                self.window.slide();
            }
            Flag::SelectiveReject => {
                // Deliberately does not fall back to the retransmission
                // store: a SREJ for a packet no longer in the window is
                // logged and otherwise ignored.
                if let Some(slot) = self.window.get(header.seq) {
                    let data = slot.data.clone();
                    let pdu = encode_pdu(header.seq, Flag::ResentSrej, &data);
                    self.io.send_to(&pdu, self.client_addr)?;
                } else {
                    log::warn!(
                        "sender: SREJ for seq {} has no matching packet in the window",
                        header.seq
                    );
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn handle_timeout(&mut self) -> Result<(), TransferError> {
        let base = self.window.base();

        if let Some(slot) = self.window.get_mut(base) {
            let data = slot.data.clone();
            slot.retransmit_count += 1;
            let count = slot.retransmit_count;

            let pdu = encode_pdu(base, Flag::ResentTimeout, &data);
            self.io.send_to(&pdu, self.client_addr)?;
            self.timeout_strikes = 0;

            if count >= MAX_RETRANSMIT {
                log::warn!("sender: packet {base} retransmitted {count} times, forcing window to advance");
                self.window.force_advance();
            }

            return Ok(());
        }

        if let Some(data) = self.store.read(base) {
            log::debug!("sender: reconstructing packet {base} from retransmission store");
            self.window.add(base, Flag::ResentTimeout, data.clone());
            let pdu = encode_pdu(base, Flag::ResentTimeout, &data);
            self.io.send_to(&pdu, self.client_addr)?;
            self.timeout_strikes = 0;
            return Ok(());
        }

        self.timeout_strikes += 1;
        log::warn!(
            "sender: packet {base} missing from window and store ({} consecutive strikes)",
            self.timeout_strikes
        );
        if self.timeout_strikes > 10 {
            self.window.force_advance();
            self.timeout_strikes = 0;
        }

        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), TransferError> {
        let seq = self.window.next_seq();
        let pdu = encode_pdu(seq, Flag::Eof, &[]);
        let mut buf = [0u8; 1500];

        for attempt in 1..=MAX_RETRANSMIT {
            self.io.send_to(&pdu, self.client_addr)?;

            if let Some((n, from)) = self.io.recv_from(&mut buf, EOF_POLL)? {
                if from != self.client_addr {
                    continue;
                }
                if let Some((header, _)) = decode_pdu(&buf[..n]) {
                    let accepted = match header.flag {
                        Flag::ReceiverReady => header.seq + 1 >= seq || attempt >= 3,
                        Flag::SelectiveReject => header.seq < seq || attempt >= 3,
                        _ => false,
                    };
                    if accepted || attempt >= 5 {
                        log::info!("sender: transfer complete after {attempt} EOF attempts");
                        return Ok(());
                    }
                }
            }

            if attempt >= 5 {
                log::info!("sender: considering transfer complete after {attempt} EOF attempts");
                return Ok(());
            }
        }

        log::warn!("sender: no EOF response after {MAX_RETRANSMIT} attempts, giving up");
        Ok(())
    }
}
