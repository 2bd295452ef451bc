//! `server error-rate [port] [-d]`
//!
//! Listens for filename requests and serves each accepted client on its
//! own thread and its own ephemeral port, the direct analogue of the
//! original's fork-per-client model.

use std::fs::File;
use std::net::{SocketAddr, UdpSocket};
use std::process::ExitCode;
use std::thread;

use rcopy::{decode_request, respond_not_found, respond_ok, DatagramIo, LossyIo, SenderSession, TransferError, UdpIo};

struct Args {
    error_rate: f64,
    port: u16,
    debug: bool,
}

fn parse_args() -> Result<Args, TransferError> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let debug = raw.iter().any(|a| a == "-d");
    let positional: Vec<&String> = raw.iter().filter(|a| a.as_str() != "-d").collect();

    if positional.is_empty() || positional.len() > 2 {
        return Err(TransferError::InvalidArgument(
            "usage: server error-rate [port] [-d]".to_string(),
        ));
    }

    let error_rate: f64 = positional[0]
        .parse()
        .map_err(|_| TransferError::InvalidArgument("error-rate must be a number".to_string()))?;
    if !(0.0..1.0).contains(&error_rate) {
        return Err(TransferError::InvalidArgument("error-rate must be in [0, 1)".to_string()));
    }

    let port = match positional.get(1) {
        Some(p) => p
            .parse()
            .map_err(|_| TransferError::InvalidArgument("port must be a 16-bit integer".to_string()))?,
        None => 0,
    };

    Ok(Args { error_rate, port, debug })
}

fn handle_client(init: rcopy::InitPayload, client_addr: SocketAddr, error_rate: f64) {
    let outcome: Result<(), TransferError> = (|| {
        let udp = UdpIo::bind("0.0.0.0:0".parse().unwrap())?;
        let seed: u64 = rand::random();
        let mut io: Box<dyn DatagramIo> = if error_rate > 0.0 {
            Box::new(LossyIo::new(udp, error_rate, seed))
        } else {
            Box::new(udp)
        };

        match File::open(&init.filename) {
            Ok(mut file) => {
                log::info!("server: serving {} to {client_addr}", init.filename);
                respond_ok(io.as_mut(), client_addr)?;
                let mut session = SenderSession::new(io.as_mut(), client_addr, init.window_size, init.buffer_size);
                session.run(&mut file)
            }
            Err(_) => {
                log::warn!("server: {} not found, requested by {client_addr}", init.filename);
                respond_not_found(io.as_mut(), client_addr)?;
                Ok(())
            }
        }
    })();

    if let Err(e) = outcome {
        log::error!("server: session with {client_addr} ended: {e}");
    }
}

fn run() -> Result<(), TransferError> {
    let args = parse_args()?;

    let level = if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let listener = UdpSocket::bind(("0.0.0.0", args.port))?;
    log::info!("server: listening on {}", listener.local_addr()?);

    let mut buf = [0u8; 1500];
    loop {
        let (n, from) = match listener.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("server: recv_from failed: {e}");
                continue;
            }
        };

        let Some(init) = decode_request(&buf[..n]) else {
            continue;
        };

        let error_rate = args.error_rate;
        thread::spawn(move || handle_client(init, from, error_rate));
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server: {e}");
            ExitCode::FAILURE
        }
    }
}
