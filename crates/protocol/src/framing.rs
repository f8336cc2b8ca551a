//! Framing for strings, 64-bit integers and raw byte runs.
//!
//! # Wire Format
//!
//! The protocol carries no type tags: each side knows from the session state
//! which unit comes next.
//!
//! - string: 2 bytes big-endian unsigned length, then that many bytes of
//!   modified UTF-8 (NUL as `C0 80`, characters above U+FFFF as two 3-byte
//!   surrogates). Plain UTF-8 is accepted on read as well.
//! - int64: 8 bytes big-endian two's complement
//! - raw run: exactly as many bytes as a preceding int64 announced
//!
//! [`FrameCodec`] works on byte buffers. [`FramedStream`] applies the same
//! rules to a live connection and is what sessions and clients use.

use std::borrow::Cow;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::error::{ProtocolError, Result};

/// Maximum encoded length of a string frame.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Size of the string length prefix.
pub const STRING_PREFIX_SIZE: usize = 2;

/// Size of an encoded int64.
pub const INT64_SIZE: usize = 8;

/// Working buffer size for raw byte runs.
pub const TRANSFER_CHUNK_SIZE: usize = 4096;

/// Encoder and decoder for frames held in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }

    /// Encode a string frame.
    pub fn encode_string(&self, s: &str) -> Result<Vec<u8>> {
        let payload = encode_modified_utf8(s);
        if payload.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong {
                size: payload.len(),
                max: MAX_STRING_LEN,
            });
        }

        let mut output = Vec::with_capacity(STRING_PREFIX_SIZE + payload.len());
        output.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Decode a string frame from the front of `data`.
    ///
    /// Returns the string and the number of bytes consumed.
    pub fn decode_string(&self, data: &[u8]) -> Result<(String, usize)> {
        if data.len() < STRING_PREFIX_SIZE {
            return Err(ProtocolError::Incomplete {
                need: STRING_PREFIX_SIZE,
                have: data.len(),
            });
        }

        let len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let total = STRING_PREFIX_SIZE + len;
        if data.len() < total {
            return Err(ProtocolError::Incomplete {
                need: total,
                have: data.len(),
            });
        }

        let text = decode_modified_utf8(data[STRING_PREFIX_SIZE..total].to_vec())?;
        Ok((text, total))
    }

    /// Try to decode a string frame, returning None if there isn't enough data.
    ///
    /// This is useful when frames arrive in pieces.
    pub fn try_decode_string(&self, data: &[u8]) -> Result<Option<(String, usize)>> {
        match self.decode_string(data) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(ProtocolError::Incomplete { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encode an int64 frame.
    pub fn encode_i64(&self, value: i64) -> [u8; INT64_SIZE] {
        value.to_be_bytes()
    }

    /// Decode an int64 frame from the front of `data`.
    pub fn decode_i64(&self, data: &[u8]) -> Result<(i64, usize)> {
        let bytes: [u8; INT64_SIZE] = data
            .get(..INT64_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::Incomplete {
                need: INT64_SIZE,
                have: data.len(),
            })?;
        Ok((i64::from_be_bytes(bytes), INT64_SIZE))
    }
}

fn encode_modified_utf8(s: &str) -> Cow<'_, [u8]> {
    if !s.chars().any(|c| c == '\0' || c > '\u{FFFF}') {
        return Cow::Borrowed(s.as_bytes());
    }

    let mut out = Vec::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c == '\0' {
            out.extend_from_slice(&[0xc0, 0x80]);
        } else if c > '\u{FFFF}' {
            let mut units = [0u16; 2];
            for &unit in c.encode_utf16(&mut units).iter() {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    Cow::Owned(out)
}

fn decode_modified_utf8(bytes: Vec<u8>) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            let message = e.to_string();
            decode_utf16_units(e.as_bytes()).ok_or(ProtocolError::InvalidUtf8(message))
        }
    }
}

/// Decode 1- to 3-byte sequences into UTF-16 units, pairing surrogates.
fn decode_utf16_units(bytes: &[u8]) -> Option<String> {
    fn continuation(byte: Option<&u8>) -> Option<u16> {
        byte.filter(|b| *b & 0xc0 == 0x80).map(|b| (b & 0x3f) as u16)
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let (unit, width) = match lead {
            0x00..=0x7f => (lead as u16, 1),
            0xc0..=0xdf => {
                let b1 = continuation(bytes.get(i + 1))?;
                ((((lead & 0x1f) as u16) << 6) | b1, 2)
            }
            0xe0..=0xef => {
                let b1 = continuation(bytes.get(i + 1))?;
                let b2 = continuation(bytes.get(i + 2))?;
                ((((lead & 0x0f) as u16) << 12) | (b1 << 6) | b2, 3)
            }
            _ => return None,
        };
        units.push(unit);
        i += width;
    }
    String::from_utf16(&units).ok()
}

/// Validate a length field announcing a raw byte run.
pub fn validate_length(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| ProtocolError::InvalidLength(value))
}

/// A connection speaking the frame protocol.
///
/// Reads and writes are buffered. Writers must call [`FramedStream::flush`]
/// once a complete reply has been written.
#[derive(Debug)]
pub struct FramedStream<S> {
    inner: BufStream<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connection.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufStream::new(stream),
        }
    }

    /// Read one string frame.
    pub async fn read_string(&mut self) -> Result<String> {
        let len = self.inner.read_u16().await? as usize;
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;
        decode_modified_utf8(payload)
    }

    /// Write one string frame.
    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        let frame = FrameCodec.encode_string(s)?;
        self.inner.write_all(&frame).await?;
        Ok(())
    }

    /// Read one int64 frame.
    pub async fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64().await?)
    }

    /// Write one int64 frame.
    pub async fn write_i64(&mut self, value: i64) -> Result<()> {
        self.inner.write_i64(value).await?;
        Ok(())
    }

    /// Read an int64 that announces a raw byte run.
    ///
    /// Negative values are rejected.
    pub async fn read_length(&mut self) -> Result<u64> {
        let value = self.read_i64().await?;
        validate_length(value)
    }

    /// Write an int64 that announces a raw byte run.
    pub async fn write_length(&mut self, len: u64) -> Result<()> {
        let value = i64::try_from(len).map_err(|_| ProtocolError::InvalidLength(i64::MAX))?;
        self.write_i64(value).await
    }

    /// Read exactly `n` raw bytes.
    ///
    /// Closure of the stream before `n` bytes arrive is an error, never a
    /// short result.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Write all of `buf` as a raw run.
    pub async fn write_exactly(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf).await?;
        Ok(())
    }

    /// Push buffered output to the peer.
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Access the buffered stream for raw runs driven by the caller.
    pub fn get_mut(&mut self) -> &mut BufStream<S> {
        &mut self.inner
    }

    /// Access the underlying connection.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Unwrap the connection. Buffered data is discarded.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}
