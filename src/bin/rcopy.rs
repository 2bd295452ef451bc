//! `rcopy from-filename to-filename window-size buffer-size error-rate
//!  remote-machine remote-port [-d]`
//!
//! Requests `from-filename` from the server and writes it to
//! `to-filename`, byte for byte, over the sliding-window ARQ protocol.

use std::fs::File;
use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;

use rcopy::{request_file, DatagramIo, LossyIo, ReceiverSession, TransferError, UdpIo, MAX_DATA_SIZE};

struct Args {
    from_filename: String,
    to_filename: String,
    window_size: u32,
    buffer_size: u32,
    error_rate: f64,
    remote_addr: SocketAddr,
    debug: bool,
}

fn parse_args() -> Result<Args, TransferError> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let debug = raw.iter().any(|a| a == "-d");
    let positional: Vec<&String> = raw.iter().filter(|a| a.as_str() != "-d").collect();

    if positional.len() != 7 {
        return Err(TransferError::InvalidArgument(
            "usage: rcopy from-filename to-filename window-size buffer-size error-rate remote-machine remote-port [-d]"
                .to_string(),
        ));
    }

    let from_filename = positional[0].clone();
    let to_filename = positional[1].clone();
    if from_filename.len() > 100 || to_filename.len() > 100 {
        return Err(TransferError::InvalidArgument(
            "filenames must be at most 100 bytes".to_string(),
        ));
    }

    let window_size: u32 = positional[2]
        .parse()
        .map_err(|_| TransferError::InvalidArgument("window-size must be a positive integer".to_string()))?;
    if window_size == 0 || window_size >= (1u32 << 30) {
        return Err(TransferError::InvalidArgument(
            "window-size must satisfy 0 < window-size < 2^30".to_string(),
        ));
    }

    let buffer_size: u32 = positional[3]
        .parse()
        .map_err(|_| TransferError::InvalidArgument("buffer-size must be a positive integer".to_string()))?;
    if buffer_size == 0 || buffer_size as usize > MAX_DATA_SIZE {
        return Err(TransferError::InvalidArgument(format!(
            "buffer-size must be between 1 and {MAX_DATA_SIZE}"
        )));
    }

    let error_rate: f64 = positional[4]
        .parse()
        .map_err(|_| TransferError::InvalidArgument("error-rate must be a number".to_string()))?;
    if !(0.0..1.0).contains(&error_rate) {
        return Err(TransferError::InvalidArgument("error-rate must be in [0, 1)".to_string()));
    }

    let remote_machine = positional[5].clone();
    let remote_port: u16 = positional[6]
        .parse()
        .map_err(|_| TransferError::InvalidArgument("remote-port must be a 16-bit integer".to_string()))?;

    let remote_addr = (remote_machine.as_str(), remote_port)
        .to_socket_addrs()
        .map_err(|e| TransferError::InvalidArgument(format!("cannot resolve {remote_machine}: {e}")))?
        .next()
        .ok_or_else(|| TransferError::InvalidArgument(format!("cannot resolve {remote_machine}")))?;

    Ok(Args {
        from_filename,
        to_filename,
        window_size,
        buffer_size,
        error_rate,
        remote_addr,
        debug,
    })
}

fn run() -> Result<(), TransferError> {
    let args = parse_args()?;

    let level = if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let udp = UdpIo::bind("0.0.0.0:0".parse().unwrap())?;
    let seed = rand::random();
    let mut io: Box<dyn DatagramIo> = if args.error_rate > 0.0 {
        Box::new(LossyIo::new(udp, args.error_rate, seed))
    } else {
        Box::new(udp)
    };

    let server_addr = request_file(
        io.as_mut(),
        args.remote_addr,
        &args.from_filename,
        args.window_size,
        args.buffer_size,
    )?;

    let mut out = File::create(&args.to_filename)?;
    let mut session = ReceiverSession::new(io.as_mut(), server_addr, args.window_size);
    session.run(&mut out)?;

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rcopy: {e}");
            ExitCode::FAILURE
        }
    }
}
