//! End-to-end transfer scenarios driven entirely in-memory: a pair of
//! channel-backed `DatagramIo`s stand in for the real UDP sockets, so the
//! full sender/receiver/handshake state machine can be exercised without
//! a network.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use rcopy::{request_file, respond_not_found, DatagramIo, LossyIo, ReceiverSession, SenderSession, TransferError};

const PEER_A: &str = "127.0.0.1:4000";
const PEER_B: &str = "127.0.0.1:5000";

struct ChannelIo {
    self_addr: SocketAddr,
    peer_addr: SocketAddr,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl DatagramIo for ChannelIo {
    fn send_to(&mut self, buf: &[u8], _addr: SocketAddr) -> std::io::Result<usize> {
        let _ = self.tx.send(buf.to_vec());
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<Option<(usize, SocketAddr)>> {
        match self.rx.recv_timeout(timeout) {
            Ok(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some((n, self.peer_addr)))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        Ok(self.self_addr)
    }
}

fn make_pair() -> (ChannelIo, ChannelIo) {
    let a_addr: SocketAddr = PEER_A.parse().unwrap();
    let b_addr: SocketAddr = PEER_B.parse().unwrap();

    let (a_to_b_tx, a_to_b_rx) = mpsc::channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel();

    let a = ChannelIo {
        self_addr: a_addr,
        peer_addr: b_addr,
        tx: a_to_b_tx,
        rx: b_to_a_rx,
    };
    let b = ChannelIo {
        self_addr: b_addr,
        peer_addr: a_addr,
        tx: b_to_a_tx,
        rx: a_to_b_rx,
    };

    (a, b)
}

fn run_transfer(data: Vec<u8>, window_size: u32, buffer_size: u32, error_rate: f64, seed: u64) -> Vec<u8> {
    let (sender_io, receiver_io) = make_pair();
    let client_addr: SocketAddr = PEER_A.parse().unwrap();

    let mut sender_io: Box<dyn DatagramIo> = if error_rate > 0.0 {
        Box::new(LossyIo::new(sender_io, error_rate, seed))
    } else {
        Box::new(sender_io)
    };

    let sender_thread = thread::spawn(move || {
        let mut source = Cursor::new(data);
        let mut session = SenderSession::new(sender_io.as_mut(), client_addr, window_size, buffer_size);
        session.run(&mut source).unwrap();
    });

    let server_addr: SocketAddr = PEER_B.parse().unwrap();
    let mut receiver_io = receiver_io;
    let mut sink = Vec::new();
    let mut session = ReceiverSession::new(&mut receiver_io, server_addr, window_size);
    session.run(&mut sink).unwrap();

    sender_thread.join().unwrap();
    sink
}

#[test]
fn happy_path_round_trips_exactly() {
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let received = run_transfer(data.clone(), 8, 512, 0.0, 1);
    assert_eq!(received, data);
}

#[test]
fn small_window_and_buffer_still_round_trip() {
    let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
    let received = run_transfer(data.clone(), 2, 16, 0.0, 2);
    assert_eq!(received, data);
}

#[test]
fn lossy_link_still_delivers_the_whole_file() {
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
    let received = run_transfer(data.clone(), 16, 512, 0.05, 99);
    assert_eq!(received, data);
}

#[test]
fn empty_file_round_trips() {
    let received = run_transfer(Vec::new(), 4, 128, 0.0, 3);
    assert!(received.is_empty());
}

/// A datagram's wire-format sequence number and flag byte, read directly
/// off the first 7 bytes without pulling in the crate's private `wire`
/// module — these scenario wrappers only need to recognize DATA packets
/// by sequence, not fully decode them.
fn pdu_seq(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}
const FLAG_DATA: u8 = 16;

/// Drops each sequence in `targets` exactly once on its way out, then lets
/// every later copy (the sender's retransmission) through — models a
/// single lost packet or a burst of consecutive losses.
struct DropOnceIo<T> {
    inner: T,
    targets: Vec<u32>,
    dropped: Vec<u32>,
}

impl<T: DatagramIo> DatagramIo for DropOnceIo<T> {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        if buf.len() >= 7 && buf[6] == FLAG_DATA {
            let seq = pdu_seq(buf);
            if self.targets.contains(&seq) && !self.dropped.contains(&seq) {
                self.dropped.push(seq);
                return Ok(buf.len());
            }
        }
        self.inner.send_to(buf, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Flips one header bit of the first copy of `target`'s sequence, leaving
/// every later (retransmitted) copy untouched.
struct BitFlipOnceIo<T> {
    inner: T,
    target: u32,
    flipped: bool,
}

impl<T: DatagramIo> DatagramIo for BitFlipOnceIo<T> {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        if !self.flipped && buf.len() >= 7 && buf[6] == FLAG_DATA && pdu_seq(buf) == self.target {
            self.flipped = true;
            let mut corrupt = buf.to_vec();
            corrupt[0] ^= 0x01;
            return self.inner.send_to(&corrupt, addr);
        }
        self.inner.send_to(buf, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Holds back the datagram for `first` the first time it's sent until the
/// datagram for `first + 1` is sent, then emits them in swapped order —
/// models two adjacent packets arriving reordered.
struct SwapOnceIo<T> {
    inner: T,
    first: u32,
    held: Option<Vec<u8>>,
    done: bool,
}

impl<T: DatagramIo> DatagramIo for SwapOnceIo<T> {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        if !self.done && buf.len() >= 7 && buf[6] == FLAG_DATA {
            let seq = pdu_seq(buf);
            if seq == self.first && self.held.is_none() {
                self.held = Some(buf.to_vec());
                return Ok(buf.len());
            }
            if seq == self.first + 1 {
                if let Some(held) = self.held.take() {
                    self.done = true;
                    self.inner.send_to(buf, addr)?;
                    return self.inner.send_to(&held, addr);
                }
            }
        }
        self.inner.send_to(buf, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

fn run_transfer_with<F>(data: Vec<u8>, window_size: u32, buffer_size: u32, wrap_sender: F) -> Vec<u8>
where
    F: FnOnce(ChannelIo) -> Box<dyn DatagramIo>,
{
    let (sender_io, receiver_io) = make_pair();
    let client_addr: SocketAddr = PEER_A.parse().unwrap();

    let mut sender_io = wrap_sender(sender_io);

    let sender_thread = thread::spawn(move || {
        let mut source = Cursor::new(data);
        let mut session = SenderSession::new(sender_io.as_mut(), client_addr, window_size, buffer_size);
        session.run(&mut source).unwrap();
    });

    let server_addr: SocketAddr = PEER_B.parse().unwrap();
    let mut receiver_io = receiver_io;
    let mut sink = Vec::new();
    let mut session = ReceiverSession::new(&mut receiver_io, server_addr, window_size);
    session.run(&mut sink).unwrap();

    sender_thread.join().unwrap();
    sink
}

#[test]
fn single_dropped_packet_is_selectively_retransmitted() {
    let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let expected = data.clone();
    let received = run_transfer_with(data, 10, 1000, |io| {
        Box::new(DropOnceIo { inner: io, targets: vec![17], dropped: Vec::new() })
    });
    assert_eq!(received, expected);
}

#[test]
fn burst_loss_of_three_consecutive_packets_recovers() {
    let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let expected = data.clone();
    let received = run_transfer_with(data, 10, 1000, |io| {
        Box::new(DropOnceIo { inner: io, targets: vec![17, 18, 19], dropped: Vec::new() })
    });
    assert_eq!(received, expected);
}

#[test]
fn bit_flipped_header_triggers_srej_retransmit() {
    let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let expected = data.clone();
    let received = run_transfer_with(data, 10, 1000, |io| {
        Box::new(BitFlipOnceIo { inner: io, target: 17, flipped: false })
    });
    assert_eq!(received, expected);
}

#[test]
fn reordered_packets_are_buffered_and_delivered_in_order() {
    let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let expected = data.clone();
    let received = run_transfer_with(data, 10, 1000, |io| {
        Box::new(SwapOnceIo { inner: io, first: 17, held: None, done: false })
    });
    assert_eq!(received, expected);
}

#[test]
fn handshake_on_unknown_file_reports_file_not_found_and_writes_nothing() {
    let (mut client_io, mut server_io) = make_pair();
    let server_addr: SocketAddr = PEER_B.parse().unwrap();

    let server_thread = thread::spawn(move || {
        respond_not_found(&mut server_io, PEER_A.parse().unwrap()).unwrap();
    });

    let result = request_file(&mut client_io, server_addr, "does-not-exist", 8, 512);
    server_thread.join().unwrap();

    assert!(matches!(result, Err(TransferError::FileNotFound(_))));
}
