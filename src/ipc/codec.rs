//! Wire codec for fixed-width binary messages.
//!
//! Messages are a sequence of fixed-width fields with no padding and no
//! length prefix. Variable-length arrays are preceded by an explicit count
//! field. Numeric fields use the host's byte order unless a `ByteOrder` is
//! chosen explicitly on both ends.
//!
//! Outgoing messages are built in a `BytesMut` and sent in one write.
//! Incoming fields are received as a whole block with `recv_exact` and then
//! decoded from a `WireFrame`.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};

/// Byte order for numeric fields.
///
/// `Native` only interoperates between peers of the same architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

/// Width in bytes of a `usize` field (the platform `size_t`).
pub const USIZE_WIDTH: usize = std::mem::size_of::<usize>();

/// Builds one outgoing message in memory so it can be sent with a single
/// `send_exact`.
#[derive(Debug, Clone)]
pub struct WireEncoder {
    buf: BytesMut,
    order: ByteOrder,
}

impl WireEncoder {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            order,
        }
    }

    pub fn with_capacity(order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    fn put_uint(&mut self, value: u64, width: usize) -> &mut Self {
        match self.order {
            ByteOrder::Native => self.buf.put_uint_ne(value, width),
            ByteOrder::Little => self.buf.put_uint_le(value, width),
            ByteOrder::Big => self.buf.put_uint(value, width),
        }
        self
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.put_uint(u64::from(value), 4)
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.put_uint(u64::from(value as u32), 4)
    }

    pub fn put_usize(&mut self, value: usize) -> &mut Self {
        self.put_uint(value as u64, USIZE_WIDTH)
    }

    /// Write `value` into a NUL-padded field of exactly `width` bytes.
    ///
    /// The value must leave room for at least one terminating NUL.
    pub fn put_fixed_str(&mut self, value: &str, width: usize) -> Result<&mut Self> {
        let bytes = value.as_bytes();
        if bytes.len() >= width {
            return Err(EmsError::EndpointName(format!(
                "'{}' is {} bytes, limit is {}",
                value,
                bytes.len(),
                width - 1
            )));
        }
        if bytes.contains(&0) {
            return Err(EmsError::EndpointName(format!("'{}' contains NUL", value.escape_debug())));
        }
        self.buf.put_slice(bytes);
        self.buf.put_bytes(0, width - bytes.len());
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Write every byte of `data` or fail.
///
/// Short writes are retried; a zero-length write is treated as a closed peer.
pub fn send_exact<W: Write + ?Sized>(writer: &mut W, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(EmsError::Transport("peer closed during write".into())),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(EmsError::Transport(format!("write failed: {}", e))),
        }
    }
    writer
        .flush()
        .map_err(|e| EmsError::Transport(format!("flush failed: {}", e)))
}

/// Read exactly `buf.len()` bytes or fail.
///
/// Short reads are retried; a zero-length read (peer closed) is a failure.
pub fn recv_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(EmsError::Transport(format!(
                    "peer closed after {} of {} bytes",
                    filled,
                    buf.len()
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(EmsError::Transport(format!("read failed: {}", e))),
        }
    }
    Ok(())
}

/// A fully received block of fields, consumed front to back.
#[derive(Debug, Clone)]
pub struct WireFrame {
    buf: Bytes,
    order: ByteOrder,
}

impl WireFrame {
    pub fn new(buf: impl Into<Bytes>, order: ByteOrder) -> Self {
        Self {
            buf: buf.into(),
            order,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, width: usize) -> Result<()> {
        if self.buf.remaining() < width {
            return Err(EmsError::Protocol(format!(
                "frame has {} bytes left, field needs {}",
                self.buf.remaining(),
                width
            )));
        }
        Ok(())
    }

    fn get_uint(&mut self, width: usize) -> Result<u64> {
        self.need(width)?;
        Ok(match self.order {
            ByteOrder::Native => self.buf.get_uint_ne(width),
            ByteOrder::Little => self.buf.get_uint_le(width),
            ByteOrder::Big => self.buf.get_uint(width),
        })
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(self.get_uint(4)? as u32)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_uint(4)? as u32 as i32)
    }

    pub fn get_usize(&mut self) -> Result<usize> {
        Ok(self.get_uint(USIZE_WIDTH)? as usize)
    }

    /// Take a NUL-padded string field of exactly `width` bytes.
    pub fn get_fixed_str(&mut self, width: usize) -> Result<String> {
        self.need(width)?;
        let raw = self.buf.split_to(width);
        let end = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| EmsError::Protocol(format!("string field of {} bytes is not terminated", width)))?;
        String::from_utf8(raw[..end].to_vec())
            .map_err(|e| EmsError::Protocol(format!("string field is not UTF-8: {}", e)))
    }
}

/// Frame-level reader over a byte stream.
#[derive(Debug)]
pub struct WireReader<R> {
    inner: R,
    order: ByteOrder,
}

impl<R: Read> WireReader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the next opcode byte. `Ok(None)` means the peer closed cleanly
    /// on a message boundary.
    pub fn read_opcode(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(EmsError::Transport(format!("read failed: {}", e))),
            }
        }
    }

    /// Receive exactly `len` bytes as one frame.
    pub fn read_frame(&mut self, len: usize) -> Result<WireFrame> {
        let mut raw = Vec::new();
        raw.try_reserve_exact(len)
            .map_err(|e| EmsError::Allocation(format!("frame of {} bytes: {}", len, e)))?;
        raw.resize(len, 0);
        recv_exact(&mut self.inner, &mut raw)?;
        Ok(WireFrame::new(raw, self.order))
    }

    /// Discard exactly `count` bytes.
    pub fn skip(&mut self, mut count: usize) -> Result<()> {
        let mut scratch = [0u8; 512];
        while count > 0 {
            let chunk = count.min(scratch.len());
            recv_exact(&mut self.inner, &mut scratch[..chunk])?;
            count -= chunk;
        }
        Ok(())
    }
}
