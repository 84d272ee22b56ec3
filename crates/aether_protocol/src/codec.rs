//! Wire codecs.
//!
//! Two formats are provided:
//! - [`BinaryCodec`]: `u32` big-endian body length, one opcode byte, CBOR body
//! - [`TextCodec`]: one line per token, `OPCODE_NAME <json body>`
//!
//! Both share the per-token body encoding defined by [`Frame`]; only the
//! body serializer ([`Cbor`] or [`Json`]) and the framing differ.

use crate::error::{ProtocolError, ProtocolResult};
use crate::notify::NotifyToken;
use crate::opcode::{ClientOpcode, ServerOpcode};
use crate::token::{
    Ack, AsyncToken, ClientToken, Deny, DisconnectToken, ErrorReply, JoinToken, LeaveToken,
    ServerToken, SynchToken,
};
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, ErrorKind, Read, Write};

/// Largest body the binary codec accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Serializer for token bodies.
pub trait BodyFormat {
    /// Serializes a body.
    fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>>;

    /// Deserializes a body.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T>;
}

/// CBOR bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cbor;

/// JSON bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl BodyFormat for Cbor {
    fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(out)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))
    }
}

impl BodyFormat for Json {
    fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::codec(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::codec(e.to_string()))
    }
}

/// A token family that can cross the wire.
pub trait Frame: Sized {
    /// Returns the opcode byte, or an error for tokens that never leave
    /// the process.
    fn opcode_byte(&self) -> ProtocolResult<u8>;

    /// Returns the opcode name used by the text codec.
    fn opcode_name(&self) -> &'static str;

    /// Looks up an opcode byte by name.
    fn opcode_for_name(name: &str) -> Option<u8>;

    /// Serializes the body.
    fn encode_body<F: BodyFormat>(&self) -> ProtocolResult<Vec<u8>>;

    /// Rebuilds a token from its opcode and body.
    fn decode_frame<F: BodyFormat>(opcode: u8, body: &[u8]) -> ProtocolResult<Self>;
}

impl Frame for ServerToken {
    fn opcode_byte(&self) -> ProtocolResult<u8> {
        match self {
            ServerToken::Kick(_) => Err(ProtocolError::KickOnWire),
            other => Ok(other.opcode() as u8),
        }
    }

    fn opcode_name(&self) -> &'static str {
        self.opcode().name()
    }

    fn opcode_for_name(name: &str) -> Option<u8> {
        ServerOpcode::from_name(name).map(|op| op as u8)
    }

    fn encode_body<F: BodyFormat>(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            ServerToken::Synch(t) => F::encode(t),
            ServerToken::ClientDisconnect(t) => F::encode(t),
            ServerToken::Join(t) => F::encode(t),
            ServerToken::Leave(t) => F::encode(t),
            ServerToken::Async(t) => F::encode(t),
            ServerToken::Kick(_) => Err(ProtocolError::KickOnWire),
        }
    }

    fn decode_frame<F: BodyFormat>(opcode: u8, body: &[u8]) -> ProtocolResult<Self> {
        let opcode = ServerOpcode::try_from(opcode)?;
        Ok(match opcode {
            ServerOpcode::Synch => ServerToken::Synch(F::decode::<SynchToken>(body)?),
            ServerOpcode::ClientDisconnect => {
                ServerToken::ClientDisconnect(F::decode::<DisconnectToken>(body)?)
            }
            ServerOpcode::Join => ServerToken::Join(F::decode::<JoinToken>(body)?),
            ServerOpcode::Leave => ServerToken::Leave(F::decode::<LeaveToken>(body)?),
            ServerOpcode::Assign | ServerOpcode::Apply | ServerOpcode::Clear => {
                let token = F::decode::<AsyncToken>(body)?;
                if token.op.opcode() != opcode {
                    return Err(ProtocolError::codec(format!(
                        "{} frame carries a {} body",
                        opcode.name(),
                        token.op.opcode().name()
                    )));
                }
                ServerToken::Async(token)
            }
            ServerOpcode::Kick => return Err(ProtocolError::KickOnWire),
        })
    }
}

impl Frame for ClientToken {
    fn opcode_byte(&self) -> ProtocolResult<u8> {
        match self {
            ClientToken::ClientTerminate => Err(ProtocolError::unexpected(
                "CLIENT_TERMINATE is local to the client",
            )),
            other => Ok(other.opcode() as u8),
        }
    }

    fn opcode_name(&self) -> &'static str {
        self.opcode().name()
    }

    fn opcode_for_name(name: &str) -> Option<u8> {
        ClientOpcode::from_name(name).map(|op| op as u8)
    }

    fn encode_body<F: BodyFormat>(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            ClientToken::ClientTerminate => Err(ProtocolError::unexpected(
                "CLIENT_TERMINATE is local to the client",
            )),
            ClientToken::ServerDisconnect => F::encode(&()),
            ClientToken::Notify(t) => F::encode(t),
            ClientToken::Ack(t) => F::encode(t),
            ClientToken::Deny(t) => F::encode(t),
            ClientToken::Error(t) => F::encode(t),
        }
    }

    fn decode_frame<F: BodyFormat>(opcode: u8, body: &[u8]) -> ProtocolResult<Self> {
        Ok(match ClientOpcode::try_from(opcode)? {
            ClientOpcode::ClientTerminate => {
                return Err(ProtocolError::unexpected(
                    "CLIENT_TERMINATE received on the wire",
                ))
            }
            ClientOpcode::ServerDisconnect => ClientToken::ServerDisconnect,
            ClientOpcode::Notify => ClientToken::Notify(F::decode::<NotifyToken>(body)?),
            ClientOpcode::Ack => ClientToken::Ack(F::decode::<Ack>(body)?),
            ClientOpcode::Deny => ClientToken::Deny(F::decode::<Deny>(body)?),
            ClientOpcode::Error => ClientToken::Error(F::decode::<ErrorReply>(body)?),
        })
    }
}

/// Frames tokens onto a byte stream.
pub trait Codec: Send + Sync + 'static {
    /// Writes one token.
    fn write_frame<T: Frame>(&self, out: &mut dyn Write, token: &T) -> ProtocolResult<()>;

    /// Reads one token. Returns `None` on a clean end of stream.
    fn read_frame<T: Frame>(&self, input: &mut dyn BufRead) -> ProtocolResult<Option<T>>;
}

/// Length-prefixed CBOR frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Encodes one token into a complete frame.
    pub fn encode<T: Frame>(token: &T) -> ProtocolResult<BytesMut> {
        let opcode = token.opcode_byte()?;
        let body = token.encode_body::<Cbor>()?;
        if body.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::codec(format!(
                "frame of {} bytes exceeds limit",
                body.len()
            )));
        }
        let len = u32::try_from(body.len())
            .map_err(|_| ProtocolError::codec("frame length overflow"))?;
        let mut frame = BytesMut::with_capacity(5 + body.len());
        frame.put_u32(len);
        frame.put_u8(opcode);
        frame.put_slice(&body);
        Ok(frame)
    }
}

impl Codec for BinaryCodec {
    fn write_frame<T: Frame>(&self, out: &mut dyn Write, token: &T) -> ProtocolResult<()> {
        let frame = Self::encode(token)?;
        out.write_all(&frame)?;
        out.flush()?;
        Ok(())
    }

    fn read_frame<T: Frame>(&self, input: &mut dyn BufRead) -> ProtocolResult<Option<T>> {
        let mut header = [0u8; 5];
        if !read_exact_or_eof(input, &mut header)? {
            return Ok(None);
        }
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::codec(format!(
                "frame of {len} bytes exceeds limit"
            )));
        }
        let mut body = vec![0u8; len];
        input.read_exact(&mut body)?;
        T::decode_frame::<Cbor>(header[4], &body).map(Some)
    }
}

/// Reads exactly `buf.len()` bytes, or nothing at a clean end of stream.
fn read_exact_or_eof<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> ProtocolResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(ProtocolError::codec("stream ended inside a frame header"));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Line-oriented text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    /// Encodes one token into a single line, without the newline.
    pub fn encode<T: Frame>(token: &T) -> ProtocolResult<String> {
        token.opcode_byte()?;
        let body = token.encode_body::<Json>()?;
        let body = String::from_utf8(body).map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(format!("{} {}", token.opcode_name(), body))
    }

    /// Decodes one line.
    pub fn decode<T: Frame>(line: &str) -> ProtocolResult<T> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (name, body) = line.split_once(' ').unwrap_or((line, "null"));
        let opcode = T::opcode_for_name(name)
            .ok_or_else(|| ProtocolError::unexpected(format!("unknown opcode name {name:?}")))?;
        T::decode_frame::<Json>(opcode, body.as_bytes())
    }
}

impl Codec for TextCodec {
    fn write_frame<T: Frame>(&self, out: &mut dyn Write, token: &T) -> ProtocolResult<()> {
        let line = Self::encode(token)?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    fn read_frame<T: Frame>(&self, input: &mut dyn BufRead) -> ProtocolResult<Option<T>> {
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Self::decode(&line).map(Some);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Target;
    use crate::token::{AsyncOp, Flags, KickToken};
    use aether_tree::{Delta, Dimension, Value};
    use std::io::Cursor;

    fn sample_async() -> ServerToken {
        ServerToken::Async(AsyncToken {
            sequence: 3,
            participant: 5,
            dimension: "a:b".parse().unwrap(),
            flags: Flags::FENCED,
            op: AsyncOp::Apply(Delta::set(1).with_child("c", Delta::clear())),
        })
    }

    fn sample_notify() -> ClientToken {
        let mut notify = NotifyToken::new(8);
        let node = notify.add_node(&Dimension::root(), || Value::leaf("x"));
        notify.add_target(Target::Assign {
            participant: 5,
            node,
            dimension: None,
        });
        notify.add_target(Target::Kick { participant: 6 });
        ClientToken::Notify(notify)
    }

    #[test]
    fn binary_stream_carries_several_frames() {
        let mut wire = Vec::new();
        let codec = BinaryCodec;
        codec.write_frame(&mut wire, &sample_async()).unwrap();
        codec
            .write_frame(&mut wire, &ServerToken::Synch(SynchToken { sequence: 4 }))
            .unwrap();

        let mut input = Cursor::new(wire);
        let first: ServerToken = codec.read_frame(&mut input).unwrap().unwrap();
        let second: ServerToken = codec.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(first, sample_async());
        assert_eq!(second, ServerToken::Synch(SynchToken { sequence: 4 }));
        assert!(codec.read_frame::<ServerToken>(&mut input).unwrap().is_none());
    }

    #[test]
    fn binary_header_layout() {
        let frame = BinaryCodec::encode(&ClientToken::ServerDisconnect).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(frame[4], ClientOpcode::ServerDisconnect as u8);
        assert_eq!(frame.len(), 5 + len);
    }

    #[test]
    fn text_lines_are_readable() {
        let line = TextCodec::encode(&ServerToken::Leave(LeaveToken {
            sequence: 2,
            participant: 7,
        }))
        .unwrap();
        assert!(line.starts_with("LEAVE {"));
        assert!(!line.contains('\n'));

        let decoded: ClientToken = TextCodec::decode("SERVER_DISCONNECT").unwrap();
        assert_eq!(decoded, ClientToken::ServerDisconnect);
    }

    #[test]
    fn text_stream_skips_blank_lines() {
        let mut wire = Vec::new();
        TextCodec.write_frame(&mut wire, &sample_notify()).unwrap();
        wire.extend_from_slice(b"\n\n");
        TextCodec
            .write_frame(&mut wire, &ClientToken::Ack(Ack {
                sequence: 1,
                global_sequence: 2,
                participant: Some(9),
            }))
            .unwrap();

        let mut input = Cursor::new(wire);
        let first: ClientToken = TextCodec.read_frame(&mut input).unwrap().unwrap();
        let second: ClientToken = TextCodec.read_frame(&mut input).unwrap().unwrap();
        assert_eq!(first, sample_notify());
        assert!(matches!(second, ClientToken::Ack(Ack { participant: Some(9), .. })));
        assert!(TextCodec.read_frame::<ClientToken>(&mut input).unwrap().is_none());
    }

    #[test]
    fn local_tokens_are_not_encodable() {
        let kick = ServerToken::Kick(KickToken { participant: 1 });
        assert!(matches!(BinaryCodec::encode(&kick), Err(ProtocolError::KickOnWire)));
        assert!(TextCodec::encode(&ClientToken::ClientTerminate).is_err());
        assert!(ServerToken::decode_frame::<Cbor>(ServerOpcode::Kick as u8, &[]).is_err());
        assert!(ClientToken::decode_frame::<Json>(0, b"null").is_err());
    }

    #[test]
    fn mismatched_async_body_is_rejected() {
        let body = sample_async().encode_body::<Cbor>().unwrap();
        let err = ServerToken::decode_frame::<Cbor>(ServerOpcode::Assign as u8, &body).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let wire = vec![0, 0, 0, 0, 42];
        let err = BinaryCodec
            .read_frame::<ServerToken>(&mut Cursor::new(wire))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOpcode { code: 42, .. }));
        assert!(TextCodec::decode::<ClientToken>("BOGUS {}").unwrap_err().is_fatal());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let frame = BinaryCodec::encode(&sample_async()).unwrap();
        let cut = frame[..frame.len() - 1].to_vec();
        assert!(BinaryCodec
            .read_frame::<ServerToken>(&mut Cursor::new(cut))
            .is_err());
    }
}
