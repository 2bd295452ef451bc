//! Wire format: the 7-byte PDU header, the handshake's init payload, and
//! the tiny helpers each session uses to turn those into checksummed
//! datagrams.

use crate::checksum::checksum;
use crate::err::ProtocolError;

/// Maximum size of a single packet's data payload.
pub const MAX_DATA_SIZE: usize = 1400;
/// `seq_num (4) + checksum (2) + flag (1)`.
pub const HEADER_SIZE: usize = 7;
/// Largest PDU this protocol ever puts on the wire.
pub const MAX_PDU_SIZE: usize = HEADER_SIZE + MAX_DATA_SIZE;
/// Scratch buffer size used while reading the handshake's init payload.
pub const INIT_BUF_SIZE: usize = 1024;
/// `filename[101] + window_size(4) + buffer_size(4)`.
pub const INIT_PAYLOAD_SIZE: usize = 101 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    ReceiverReady = 5,
    SelectiveReject = 6,
    Filename = 8,
    FilenameResponse = 9,
    Eof = 10,
    Data = 16,
    ResentSrej = 17,
    ResentTimeout = 18,
}

impl TryFrom<u8> for Flag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            5 => Flag::ReceiverReady,
            6 => Flag::SelectiveReject,
            8 => Flag::Filename,
            9 => Flag::FilenameResponse,
            10 => Flag::Eof,
            16 => Flag::Data,
            17 => Flag::ResentSrej,
            18 => Flag::ResentTimeout,
            other => return Err(ProtocolError::UnknownFlag(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub seq: u32,
    pub checksum: u16,
    pub flag: Flag,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                got: buf.len(),
                need: HEADER_SIZE,
            });
        }

        let seq = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let checksum = u16::from_be_bytes([buf[4], buf[5]]);
        let flag = Flag::try_from(buf[6])?;

        Ok(Header {
            seq,
            checksum,
            flag,
        })
    }

    fn write_unchecked(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.seq.to_be_bytes());
        buf[4..6].copy_from_slice(&self.checksum.to_be_bytes());
        buf[6] = self.flag as u8;
    }
}

/// Builds a full PDU (header followed by `payload`), computing the
/// checksum over the whole datagram with the checksum field zeroed first.
pub fn encode_pdu(seq: u32, flag: Flag, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE + payload.len()];

    Header {
        seq,
        checksum: 0,
        flag,
    }
    .write_unchecked(&mut buf[..HEADER_SIZE]);
    buf[HEADER_SIZE..].copy_from_slice(payload);

    let sum = checksum(&buf);
    buf[4..6].copy_from_slice(&sum.to_be_bytes());

    buf
}

/// Decodes a PDU's header and validates its checksum. Returns `None` (not
/// an error) when the checksum does not match or the flag byte is
/// unrecognized — both are on-the-wire corruption, handled by dropping the
/// datagram, never by propagating a `Result::Err`.
pub fn decode_pdu(buf: &[u8]) -> Option<(Header, &[u8])> {
    if buf.len() < HEADER_SIZE {
        return None;
    }

    let header = Header::decode(buf).ok()?;

    let mut resummed = buf.to_vec();
    resummed[4..6].copy_from_slice(&[0, 0]);
    if checksum(&resummed) != header.checksum {
        return None;
    }

    Some((header, &buf[HEADER_SIZE..]))
}

/// RR/SREJ packets carry their sequence number a second time, in the
/// payload, duplicating the header field.
pub fn encode_ack(seq: u32, flag: Flag) -> Vec<u8> {
    encode_pdu(seq, flag, &seq.to_be_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPayload {
    pub filename: String,
    pub window_size: u32,
    pub buffer_size: u32,
}

impl InitPayload {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name = self.filename.as_bytes();
        if name.len() > 100 {
            return Err(ProtocolError::FilenameTooLong(100));
        }

        let mut buf = vec![0u8; INIT_PAYLOAD_SIZE];
        buf[..name.len()].copy_from_slice(name);
        buf[101..105].copy_from_slice(&self.window_size.to_be_bytes());
        buf[105..109].copy_from_slice(&self.buffer_size.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < INIT_PAYLOAD_SIZE {
            return Err(ProtocolError::Truncated {
                got: buf.len(),
                need: INIT_PAYLOAD_SIZE,
            });
        }

        let nul = buf[..101].iter().position(|&b| b == 0).unwrap_or(101);
        let filename = String::from_utf8_lossy(&buf[..nul]).into_owned();
        let window_size = u32::from_be_bytes([buf[101], buf[102], buf[103], buf[104]]);
        let buffer_size = u32::from_be_bytes([buf[105], buf[106], buf[107], buf[108]]);

        Ok(InitPayload {
            filename,
            window_size,
            buffer_size,
        })
    }
}
