//! The datagram socket and its polling facility are, per this protocol's
//! scope, external collaborators — the sessions only need *something*
//! that can send/receive datagrams with a timeout. `DatagramIo` is that
//! seam; `UdpIo` is the production adapter over a real UDP socket, and
//! `LossyIo` is the deterministic drop/corrupt shim used to exercise the
//! retransmission paths, standing in for the original's external
//! `sendtoErr`-style error injector.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait DatagramIo: Send {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Blocks for up to `timeout`. `Ok(None)` means the timeout elapsed
    /// with nothing to read, matching the original's `pollCall` returning
    /// zero.
    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

pub struct UdpIo {
    socket: UdpSocket,
}

impl UdpIo {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(UdpIo { socket })
    }

    pub fn into_inner(self) -> UdpSocket {
        self.socket
    }
}

impl DatagramIo for UdpIo {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
        self.socket.set_read_timeout(Some(timeout))?;
        match self.socket.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Wraps any `DatagramIo` and deterministically drops or bit-flips
/// outgoing datagrams at `error_rate`, seeded for reproducible test runs.
pub struct LossyIo<T> {
    inner: T,
    error_rate: f64,
    rng: StdRng,
}

impl<T: DatagramIo> LossyIo<T> {
    pub fn new(inner: T, error_rate: f64, seed: u64) -> Self {
        LossyIo {
            inner,
            error_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<T: DatagramIo> DatagramIo for LossyIo<T> {
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.error_rate <= 0.0 || !self.rng.gen_bool(self.error_rate.min(1.0)) {
            return self.inner.send_to(buf, addr);
        }

        if buf.is_empty() || self.rng.gen_bool(0.5) {
            log::trace!("lossy: dropped outgoing datagram to {addr}");
            return Ok(buf.len());
        }

        let mut corrupt = buf.to_vec();
        let byte = self.rng.gen_range(0..corrupt.len());
        let bit = self.rng.gen_range(0..8u8);
        corrupt[byte] ^= 1 << bit;
        log::trace!("lossy: bit-flipped outgoing datagram to {addr} (byte {byte}, bit {bit})");
        self.inner.send_to(&corrupt, addr)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf, timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
