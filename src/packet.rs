//! Wire codec for TFTP (RFC 1350) packets: parsing raw datagram payloads
//! into [`Packet`] values and serialising them back to bytes.

use std::fmt;

/// The closed opcode registry. Wire encoding is big-endian u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    Oack = 6,
}

impl Opcode {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Error),
            6 => Some(Opcode::Oack),
            _ => None,
        }
    }
}

/// The closed protocol error-code registry. The server only ever
/// emits these; an incoming `ERROR` packet may carry any u16 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Undefined = 0,
    NotFound = 1,
    Permission = 2,
    DiskFull = 3,
    IllegalOp = 4,
    UnknownTid = 5,
    AlreadyExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A fully parsed TFTP packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Request {
        filename: String,
        mode: String,
        is_write: bool,
        opts: Vec<(String, String)>,
    },
    Data {
        block: u16,
        payload: Vec<u8>,
    },
    Ack {
        block: u16,
    },
    Error {
        code: u16,
        message: String,
    },
    /// RFC 2347 Option Acknowledgment. Never produced nor consumed by the
    /// transfer engine; parsing it is permitted so that
    /// adding real OACK negotiation later is a localised change.
    Oack {
        opts: Vec<(String, String)>,
    },
}

/// Errors recognised while parsing a datagram payload.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("tftp: invalid packet: too short")]
    TooShort,
    #[error("tftp: invalid packet: invalid request")]
    InvalidRequest,
    #[error("tftp: invalid packet: invalid error message")]
    InvalidErrorMessage,
    #[error("tftp: invalid packet: unknown op: {0}")]
    UnknownOpcode(u16),
}

impl Packet {
    /// Parse a raw datagram payload into a `Packet`, per the layout table
    /// above
    pub fn parse(buf: &[u8]) -> Result<Packet, ParseError> {
        if buf.len() < 2 {
            return Err(ParseError::TooShort);
        }
        let op = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];

        match Opcode::from_u16(op) {
            Some(Opcode::Rrq) => parse_request(body, false),
            Some(Opcode::Wrq) => parse_request(body, true),
            Some(Opcode::Data) => parse_data(body),
            Some(Opcode::Ack) => parse_ack(body),
            Some(Opcode::Error) => parse_error(body),
            Some(Opcode::Oack) => parse_oack(body),
            None => Err(ParseError::UnknownOpcode(op)),
        }
    }

    /// Serialise a packet back to its wire form. Total: every variant with
    /// legal field values has a well-defined encoding.
    pub fn serialise(&self) -> Vec<u8> {
        match self {
            Packet::Request {
                filename,
                mode,
                is_write,
                opts,
            } => {
                let op: u16 = if *is_write { Opcode::Wrq } else { Opcode::Rrq } as u16;
                let mut buf = Vec::with_capacity(4 + filename.len() + mode.len());
                buf.extend_from_slice(&op.to_be_bytes());
                buf.extend_from_slice(filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(mode.as_bytes());
                buf.push(0);
                write_opts(&mut buf, opts);
                buf
            }
            Packet::Data { block, payload } => {
                let mut buf = Vec::with_capacity(4 + payload.len());
                buf.extend_from_slice(&(Opcode::Data as u16).to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(payload);
                buf
            }
            Packet::Ack { block } => {
                let mut buf = Vec::with_capacity(4);
                buf.extend_from_slice(&(Opcode::Ack as u16).to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
                buf
            }
            Packet::Error { code, message } => {
                let mut buf = Vec::with_capacity(5 + message.len());
                buf.extend_from_slice(&(Opcode::Error as u16).to_be_bytes());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(message.as_bytes());
                buf.push(0);
                buf
            }
            Packet::Oack { opts } => {
                let mut buf = Vec::new();
                buf.extend_from_slice(&(Opcode::Oack as u16).to_be_bytes());
                write_opts(&mut buf, opts);
                buf
            }
        }
    }

    /// Build a closed-enum `ERROR` packet, as the server emits.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Packet {
        Packet::Error {
            code: code.code(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Packet {
    /// Human, direction-agnostic rendering used by the tracing packet
    /// adapters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Request {
                filename,
                mode,
                is_write,
                opts,
            } => {
                let op = if *is_write { "WRQ" } else { "RRQ" };
                write!(f, "{op} <file: {filename}, mode: {mode}")?;
                if !opts.is_empty() {
                    let rendered: Vec<String> =
                        opts.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    write!(f, ", opts: <{}>", rendered.join(", "))?;
                }
                write!(f, ">")
            }
            Packet::Data { block, payload } => {
                write!(f, "DATA <block: {block}, size: {}>", payload.len())
            }
            Packet::Ack { block } => write!(f, "ACK <block: {block}>"),
            Packet::Error { code, message } => {
                write!(f, "ERROR <code: {code}, message: {message}>")
            }
            Packet::Oack { opts } => {
                let rendered: Vec<String> =
                    opts.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "OACK <{}>", rendered.join(", "))
            }
        }
    }
}

fn write_opts(buf: &mut Vec<u8>, opts: &[(String, String)]) {
    for (name, value) in opts {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
}

/// Split a NUL-terminated field off the front of `buf`. Returns the field
/// (without the terminator) and the remaining bytes, or `None` if `buf`
/// contains no zero byte.
fn read_field(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let idx = buf.iter().position(|&b| b == 0)?;
    Some((&buf[..idx], &buf[idx + 1..]))
}

fn parse_request(body: &[u8], is_write: bool) -> Result<Packet, ParseError> {
    let (filename, rest) = read_field(body).ok_or(ParseError::InvalidRequest)?;
    let (mode, mut rest) = read_field(rest).ok_or(ParseError::InvalidRequest)?;

    let filename = std::str::from_utf8(filename)
        .map_err(|_| ParseError::InvalidRequest)?
        .to_owned();
    let mode = std::str::from_utf8(mode)
        .map_err(|_| ParseError::InvalidRequest)?
        .to_ascii_lowercase();

    let mut opts = Vec::new();
    while !rest.is_empty() {
        let (name, after_name) = read_field(rest).ok_or(ParseError::InvalidRequest)?;
        let (value, after_value) = read_field(after_name).ok_or(ParseError::InvalidRequest)?;
        let name = std::str::from_utf8(name)
            .map_err(|_| ParseError::InvalidRequest)?
            .to_owned();
        let value = std::str::from_utf8(value)
            .map_err(|_| ParseError::InvalidRequest)?
            .to_owned();
        opts.push((name, value));
        rest = after_value;
    }

    Ok(Packet::Request {
        filename,
        mode,
        is_write,
        opts,
    })
}

fn parse_data(body: &[u8]) -> Result<Packet, ParseError> {
    if body.len() < 2 {
        return Err(ParseError::TooShort);
    }
    let block = u16::from_be_bytes([body[0], body[1]]);
    Ok(Packet::Data {
        block,
        payload: body[2..].to_vec(),
    })
}

fn parse_ack(body: &[u8]) -> Result<Packet, ParseError> {
    if body.len() < 2 {
        return Err(ParseError::TooShort);
    }
    let block = u16::from_be_bytes([body[0], body[1]]);
    Ok(Packet::Ack { block })
}

fn parse_error(body: &[u8]) -> Result<Packet, ParseError> {
    if body.len() < 2 {
        return Err(ParseError::TooShort);
    }
    let code = u16::from_be_bytes([body[0], body[1]]);
    let (message, _) = read_field(&body[2..]).ok_or(ParseError::InvalidErrorMessage)?;
    let message = String::from_utf8_lossy(message).into_owned();
    Ok(Packet::Error { code, message })
}

fn parse_oack(body: &[u8]) -> Result<Packet, ParseError> {
    let mut rest = body;
    let mut opts = Vec::new();
    while !rest.is_empty() {
        let (name, after_name) = read_field(rest).ok_or(ParseError::InvalidRequest)?;
        let (value, after_value) = read_field(after_name).ok_or(ParseError::InvalidRequest)?;
        let name = String::from_utf8_lossy(name).into_owned();
        let value = String::from_utf8_lossy(value).into_owned();
        opts.push((name, value));
        rest = after_value;
    }
    Ok(Packet::Oack { opts })
}
