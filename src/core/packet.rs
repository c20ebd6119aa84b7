use std::fmt;

use crate::core::error::ProtocolError;

/// Payload size of a full DATA block (RFC 1350 §4).
pub const BLOCK_SIZE: usize = 512;

/// A DATA frame at its largest: opcode(2) + block number(2) + payload(512).
pub const MAX_DATA_PACKET_SIZE: usize = BLOCK_SIZE + 4;

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
pub(crate) const OP_DATA: u16 = 3;
pub(crate) const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;

/// TFTP transfer mode carried in RRQ/WRQ packets.
///
/// The "mail" mode of RFC 1350 is obsolete and deliberately not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Text mode, canonical `\r\n` line endings on the wire.
    Netascii,
    /// Binary mode, bytes pass through untouched.
    Octet,
}

impl Mode {
    /// Parse the wire mode string. The comparison is case-insensitive
    /// per RFC 1350 §5.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Some(Self::Netascii),
            "octet" => Some(Self::Octet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Netascii => "netascii",
            Self::Octet => "octet",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One TFTP packet, covering the five RFC 1350 opcodes.
///
/// `parse`/`encode` are pure transforms; all I/O lives in the server
/// module.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Rrq { filename: String, mode: Mode },
    Wrq { filename: String, mode: Mode },
    Data { block: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, message: String },
}

impl Packet {
    /// Decode a datagram into a packet.
    ///
    /// Framing violations come back as `format-error`, an unrecognized
    /// RRQ/WRQ mode string as `unknown-mode`, and an opcode outside 1-5
    /// as `illegal-operation`.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < 2 {
            return Err(ProtocolError::format_error());
        }
        let op = u16::from_be_bytes([buf[0], buf[1]]);
        match op {
            OP_RRQ | OP_WRQ => {
                let (filename, mode) = parse_request_body(&buf[2..])?;
                if op == OP_RRQ {
                    Ok(Self::Rrq { filename, mode })
                } else {
                    Ok(Self::Wrq { filename, mode })
                }
            }
            OP_DATA => {
                if buf.len() < 4 {
                    return Err(ProtocolError::format_error());
                }
                Ok(Self::Data {
                    block: u16::from_be_bytes([buf[2], buf[3]]),
                    data: buf[4..].to_vec(),
                })
            }
            OP_ACK => {
                if buf.len() < 4 {
                    return Err(ProtocolError::format_error());
                }
                Ok(Self::Ack(u16::from_be_bytes([buf[2], buf[3]])))
            }
            OP_ERROR => {
                if buf.len() < 4 {
                    return Err(ProtocolError::format_error());
                }
                let code = u16::from_be_bytes([buf[2], buf[3]]);
                let rest = &buf[4..];
                // Tolerate a missing trailing NUL on the receive path.
                let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
                Ok(Self::Error {
                    code,
                    message: String::from_utf8_lossy(&rest[..end]).into_owned(),
                })
            }
            _ => Err(ProtocolError::illegal_operation()),
        }
    }

    /// Encode a packet into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Rrq { filename, mode } => encode_request(OP_RRQ, filename, *mode),
            Self::Wrq { filename, mode } => encode_request(OP_WRQ, filename, *mode),
            Self::Data { block, data } => encode_data(*block, data),
            Self::Ack(block) => encode_ack(*block),
            Self::Error { code, message } => encode_error(*code, message),
        }
    }
}

fn parse_request_body(body: &[u8]) -> Result<(String, Mode), ProtocolError> {
    let name_end = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(ProtocolError::format_error)?;
    let filename = std::str::from_utf8(&body[..name_end])
        .map_err(|_| ProtocolError::format_error())?
        .to_string();

    let rest = &body[name_end + 1..];
    let mode_end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(ProtocolError::format_error)?;
    let mode_str =
        std::str::from_utf8(&rest[..mode_end]).map_err(|_| ProtocolError::format_error())?;
    let mode = Mode::from_wire(mode_str).ok_or_else(ProtocolError::unknown_mode)?;

    Ok((filename, mode))
}

fn encode_request(op: u16, filename: &str, mode: Mode) -> Vec<u8> {
    let mode_str = mode.as_str();
    let mut v = Vec::with_capacity(4 + filename.len() + mode_str.len());
    v.extend_from_slice(&op.to_be_bytes());
    v.extend_from_slice(filename.as_bytes());
    v.push(0);
    v.extend_from_slice(mode_str.as_bytes());
    v.push(0);
    v
}

/// Encode a DATA packet. `payload` must not exceed [`BLOCK_SIZE`].
pub fn encode_data(block: u16, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= BLOCK_SIZE);
    let mut v = Vec::with_capacity(4 + payload.len());
    v.extend_from_slice(&OP_DATA.to_be_bytes());
    v.extend_from_slice(&block.to_be_bytes());
    v.extend_from_slice(payload);
    v
}

/// Encode an ACK packet.
pub fn encode_ack(block: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(4);
    v.extend_from_slice(&OP_ACK.to_be_bytes());
    v.extend_from_slice(&block.to_be_bytes());
    v
}

/// Encode an ERROR packet. The message is always NUL-terminated, even
/// when empty.
pub fn encode_error(code: u16, message: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(5 + message.len());
    v.extend_from_slice(&OP_ERROR.to_be_bytes());
    v.extend_from_slice(&code.to_be_bytes());
    v.extend_from_slice(message.as_bytes());
    v.push(0);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCode;

    #[test]
    fn parse_rrq() {
        let pkt = Packet::parse(b"\x00\x01boot.img\x00octet\x00").unwrap();
        assert_eq!(
            pkt,
            Packet::Rrq {
                filename: "boot.img".to_string(),
                mode: Mode::Octet,
            }
        );
    }

    #[test]
    fn parse_wrq_mode_is_case_insensitive() {
        let pkt = Packet::parse(b"\x00\x02upload.txt\x00NETASCII\x00").unwrap();
        assert_eq!(
            pkt,
            Packet::Wrq {
                filename: "upload.txt".to_string(),
                mode: Mode::Netascii,
            }
        );
    }

    #[test]
    fn request_missing_terminators_is_format_error() {
        let no_mode_nul = Packet::parse(b"\x00\x01file\x00octet").unwrap_err();
        assert_eq!(no_mode_nul.code(), ErrorCode::FormatError.as_u16());

        let no_name_nul = Packet::parse(b"\x00\x01file").unwrap_err();
        assert_eq!(no_name_nul.code(), ErrorCode::FormatError.as_u16());
    }

    #[test]
    fn request_with_bad_mode_is_unknown_mode() {
        let err = Packet::parse(b"\x00\x01file\x00mail\x00").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownMode.as_u16());
    }

    #[test]
    fn unknown_opcode_is_illegal_operation() {
        let err = Packet::parse(b"\x00\x09whatever").unwrap_err();
        assert_eq!(err.code(), ErrorCode::IllegalOperation.as_u16());

        let short = Packet::parse(b"\x01").unwrap_err();
        assert_eq!(short.code(), ErrorCode::FormatError.as_u16());
    }

    #[test]
    fn data_round_trip() {
        for (block, len) in [(0u16, 0usize), (1, 1), (7, 511), (42, 512), (65535, 100)] {
            let payload = vec![0xa5u8; len];
            let wire = encode_data(block, &payload);
            assert_eq!(wire.len(), 4 + len);
            match Packet::parse(&wire).unwrap() {
                Packet::Data { block: b, data } => {
                    assert_eq!(b, block);
                    assert_eq!(data, payload);
                }
                other => panic!("expected DATA, got {other:?}"),
            }
        }
    }

    #[test]
    fn ack_round_trip() {
        let wire = encode_ack(513);
        assert_eq!(wire, [0, 4, 2, 1]);
        assert_eq!(Packet::parse(&wire).unwrap(), Packet::Ack(513));
    }

    #[test]
    fn error_round_trip_strips_trailing_nul() {
        for (code, msg) in [(0u16, ""), (1, "file not found"), (10, "unknown mode")] {
            let wire = encode_error(code, msg);
            assert_eq!(*wire.last().unwrap(), 0);
            assert_eq!(
                Packet::parse(&wire).unwrap(),
                Packet::Error {
                    code,
                    message: msg.to_string(),
                }
            );
        }
    }

    #[test]
    fn request_encode_round_trip() {
        let rrq = Packet::Rrq {
            filename: "dir/файл.bin".to_string(),
            mode: Mode::Netascii,
        };
        assert_eq!(Packet::parse(&rrq.encode()).unwrap(), rrq);
    }
}
