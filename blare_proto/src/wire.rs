//! Control channel framing.
//!
//! Every field on the wire is an unsigned 32-bit little-endian integer. A
//! request is a bare command word; responses carry their payload right after
//! the echoed command word. Multi-field responses are encoded into a single
//! buffer so they reach the stream as one write.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Command words of the control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// reserved, never valid on the wire
    None = 0,
    GetFormat = 1,
    StartPlay = 2,
    Heartbeat = 3,
}

impl Command {
    fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Command::None),
            1 => Some(Command::GetFormat),
            2 => Some(Command::StartPlay),
            3 => Some(Command::Heartbeat),
            _ => None,
        }
    }
}

/// Largest format descriptor a client will buffer. Real descriptors are a
/// handful of bytes, anything past this bound is a broken or hostile server.
pub const MAX_FORMAT_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown command word {0:#010x}")]
    UnknownCommand(u32),
    #[error("format descriptor of {0} bytes exceeds the {} byte bound", MAX_FORMAT_LEN)]
    OversizedFormat(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Commands a client sends on its control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    GetFormat,
    StartPlay,
    Heartbeat,
}

impl Request {
    fn command(self) -> Command {
        match self {
            Request::GetFormat => Command::GetFormat,
            Request::StartPlay => Command::StartPlay,
            Request::Heartbeat => Command::Heartbeat,
        }
    }
}

/// Replies the server writes back, plus its liveness probes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// the opaque audio format descriptor, length-prefixed on the wire
    Format(Bytes),
    /// the session id handed out for a start-play request
    StartPlay(u32),
    Heartbeat,
}

/// Server side of the control channel: decodes [`Request`]s, encodes
/// [`Response`]s.
#[derive(Debug, Default)]
pub struct ServerCodec;

impl ServerCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, WireError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let raw = src.get_u32_le();
        match Command::from_u32(raw) {
            Some(Command::GetFormat) => Ok(Some(Request::GetFormat)),
            Some(Command::StartPlay) => Ok(Some(Request::StartPlay)),
            Some(Command::Heartbeat) => Ok(Some(Request::Heartbeat)),
            Some(Command::None) | None => Err(WireError::UnknownCommand(raw)),
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = WireError;

    fn encode(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), WireError> {
        match response {
            Response::Format(format) => {
                let size = u32::try_from(format.len())
                    .map_err(|_| WireError::OversizedFormat(format.len()))?;
                dst.reserve(8 + format.len());
                dst.put_u32_le(Command::GetFormat as u32);
                dst.put_u32_le(size);
                dst.extend_from_slice(&format);
            }
            Response::StartPlay(id) => {
                dst.reserve(8);
                dst.put_u32_le(Command::StartPlay as u32);
                dst.put_u32_le(id);
            }
            Response::Heartbeat => {
                dst.put_u32_le(Command::Heartbeat as u32);
            }
        }
        Ok(())
    }
}

/// Client side of the control channel: encodes [`Request`]s, decodes
/// [`Response`]s.
#[derive(Debug, Default)]
pub struct ClientCodec;

impl ClientCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, WireError> {
        if src.len() < 4 {
            return Ok(None);
        }

        // peek at the command word, the frame is only consumed once complete
        let mut peek = &src[..];
        let raw = peek.get_u32_le();
        let cmd = match Command::from_u32(raw) {
            Some(cmd) => cmd,
            None => return Err(WireError::UnknownCommand(raw)),
        };

        match cmd {
            Command::GetFormat => {
                if src.len() < 8 {
                    return Ok(None);
                }
                let size = peek.get_u32_le() as usize;
                if size > MAX_FORMAT_LEN {
                    return Err(WireError::OversizedFormat(size));
                }
                if src.len() < 8 + size {
                    src.reserve(8 + size - src.len());
                    return Ok(None);
                }
                src.advance(8);
                Ok(Some(Response::Format(src.split_to(size).freeze())))
            }
            Command::StartPlay => {
                if src.len() < 8 {
                    return Ok(None);
                }
                src.advance(4);
                Ok(Some(Response::StartPlay(src.get_u32_le())))
            }
            Command::Heartbeat => {
                src.advance(4);
                Ok(Some(Response::Heartbeat))
            }
            Command::None => Err(WireError::UnknownCommand(raw)),
        }
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = WireError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), WireError> {
        dst.put_u32_le(request.command() as u32);
        Ok(())
    }
}
