//! IPC message types for client ↔ server communication.
//!
//! Every request starts with a one-byte opcode followed by its fixed-width
//! fields. Responses carry no opcode: the client knows which response to
//! expect because a session is strictly request/response.
//!
//! | Opcode | Request fields | Response fields |
//! |---|---|---|
//! | SETUP | request path, response path (`[u8; 40]` each) | session id (`i32`) |
//! | CREATE | event id (`u32`), rows, cols (`usize`) | result (`i32`) |
//! | RESERVE | event id, count (`usize`), xs\[count\], ys\[count\] | result |
//! | SHOW | event id | result; if 0: rows, cols, seats\[rows×cols\] (`u32`) |
//! | LIST | - | result; if 0: count (`usize`), ids\[count\] (`u32`) |
//! | QUIT | - | - |

use std::fmt;
use std::io::Read;

use bytes::Bytes;

use crate::error::{EmsError, Result};
use crate::ipc::codec::{ByteOrder, USIZE_WIDTH, WireEncoder, WireFrame, WireReader};
use crate::store::{EventSnapshot, Seat};

/// Size of an endpoint name field on the wire, including the terminator.
pub const CLIENT_PIPE_MAX_LEN: usize = 40;

/// Default upper bound on seats in a single RESERVE.
pub const MAX_RESERVATION_SIZE: usize = 256;

/// Single-byte tag identifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Setup = b'1',
    Quit = b'2',
    Create = b'3',
    Reserve = b'4',
    Show = b'5',
    List = b'6',
}

impl OpCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Setup => "SETUP",
            OpCode::Quit => "QUIT",
            OpCode::Create => "CREATE",
            OpCode::Reserve => "RESERVE",
            OpCode::Show => "SHOW",
            OpCode::List => "LIST",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = EmsError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            b'1' => Ok(OpCode::Setup),
            b'2' => Ok(OpCode::Quit),
            b'3' => Ok(OpCode::Create),
            b'4' => Ok(OpCode::Reserve),
            b'5' => Ok(OpCode::Show),
            b'6' => Ok(OpCode::List),
            other => Err(EmsError::Protocol(format!("unknown opcode 0x{:02x}", other))),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome code carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Failed,
}

impl ResultCode {
    pub fn to_wire(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::Failed => 1,
        }
    }

    pub fn from_wire(value: i32) -> Self {
        if value == 0 {
            ResultCode::Ok
        } else {
            ResultCode::Failed
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    /// Receive the leading result field of a response.
    fn read<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        Ok(Self::from_wire(reader.read_frame(4)?.get_i32()?))
    }
}

/// Take `count` values of one field type from `frame`.
fn take_all<T>(frame: &mut WireFrame, count: usize, mut get: impl FnMut(&mut WireFrame) -> Result<T>) -> Result<Vec<T>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(count)
        .map_err(|e| EmsError::Allocation(format!("{} fields: {}", count, e)))?;
    for _ in 0..count {
        values.push(get(frame)?);
    }
    Ok(values)
}

/// Byte length of `count` fields of `width` bytes each.
fn array_len(count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .ok_or_else(|| EmsError::Protocol(format!("{} fields of {} bytes overflow", count, width)))
}

impl<T> From<&Result<T>> for ResultCode {
    fn from(result: &Result<T>) -> Self {
        if result.is_ok() {
            ResultCode::Ok
        } else {
            ResultCode::Failed
        }
    }
}

/// Session setup sent on the server's well-known endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    /// Endpoint the client writes requests to
    pub request_path: String,
    /// Endpoint the client reads responses from
    pub response_path: String,
}

impl SetupRequest {
    pub fn new(request_path: impl Into<String>, response_path: impl Into<String>) -> Self {
        Self {
            request_path: request_path.into(),
            response_path: response_path.into(),
        }
    }

    /// Encode including the opcode byte.
    pub fn encode(&self, order: ByteOrder) -> Result<Bytes> {
        let mut enc = WireEncoder::with_capacity(order, 1 + 2 * CLIENT_PIPE_MAX_LEN);
        enc.put_u8(OpCode::Setup.as_byte());
        enc.put_fixed_str(&self.request_path, CLIENT_PIPE_MAX_LEN)?;
        enc.put_fixed_str(&self.response_path, CLIENT_PIPE_MAX_LEN)?;
        Ok(enc.finish())
    }

    /// Decode the fields following an already consumed SETUP opcode.
    pub fn decode_body<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        let mut frame = reader.read_frame(2 * CLIENT_PIPE_MAX_LEN)?;
        Ok(Self {
            request_path: frame.get_fixed_str(CLIENT_PIPE_MAX_LEN)?,
            response_path: frame.get_fixed_str(CLIENT_PIPE_MAX_LEN)?,
        })
    }
}

/// Session id assigned by the worker that claimed the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupResponse {
    pub session_id: i32,
}

impl SetupResponse {
    pub fn encode(&self, order: ByteOrder) -> Bytes {
        let mut enc = WireEncoder::with_capacity(order, 4);
        enc.put_i32(self.session_id);
        enc.finish()
    }

    pub fn decode<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        Ok(Self {
            session_id: reader.read_frame(4)?.get_i32()?,
        })
    }
}

/// A request on an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Create { event_id: u32, rows: usize, cols: usize },
    Reserve { event_id: u32, seats: Vec<Seat> },
    Show { event_id: u32 },
    List,
    Quit,
}

impl Request {
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Create { .. } => OpCode::Create,
            Request::Reserve { .. } => OpCode::Reserve,
            Request::Show { .. } => OpCode::Show,
            Request::List => OpCode::List,
            Request::Quit => OpCode::Quit,
        }
    }

    /// Encode including the opcode byte. RESERVE sends all rows, then all
    /// columns.
    pub fn encode(&self, order: ByteOrder) -> Bytes {
        let mut enc = WireEncoder::new(order);
        enc.put_u8(self.opcode().as_byte());
        match self {
            Request::Create { event_id, rows, cols } => {
                enc.put_u32(*event_id).put_usize(*rows).put_usize(*cols);
            }
            Request::Reserve { event_id, seats } => {
                enc.put_u32(*event_id).put_usize(seats.len());
                for seat in seats {
                    enc.put_usize(seat.row);
                }
                for seat in seats {
                    enc.put_usize(seat.col);
                }
            }
            Request::Show { event_id } => {
                enc.put_u32(*event_id);
            }
            Request::List | Request::Quit => {}
        }
        enc.finish()
    }

    /// Decode the fields following an already consumed `opcode`.
    ///
    /// A RESERVE announcing more than `max_seats` seats has its coordinate
    /// arrays drained so the stream stays aligned, then fails with a
    /// protocol error.
    pub fn decode_body<R: Read>(opcode: OpCode, reader: &mut WireReader<R>, max_seats: usize) -> Result<Self> {
        match opcode {
            OpCode::Create => {
                let mut frame = reader.read_frame(4 + 2 * USIZE_WIDTH)?;
                Ok(Request::Create {
                    event_id: frame.get_u32()?,
                    rows: frame.get_usize()?,
                    cols: frame.get_usize()?,
                })
            }
            OpCode::Reserve => {
                let mut header = reader.read_frame(4 + USIZE_WIDTH)?;
                let event_id = header.get_u32()?;
                let count = header.get_usize()?;
                let payload = count
                    .checked_mul(2 * USIZE_WIDTH)
                    .ok_or_else(|| EmsError::Transport(format!("seat count {} cannot be drained", count)))?;

                if count > max_seats {
                    reader.skip(payload)?;
                    return Err(EmsError::Protocol(format!(
                        "reservation of {} seats exceeds limit of {}",
                        count, max_seats
                    )));
                }

                let mut coords = reader.read_frame(payload)?;
                let rows = take_all(&mut coords, count, WireFrame::get_usize)?;
                let cols = take_all(&mut coords, count, WireFrame::get_usize)?;
                let seats = rows.into_iter().zip(cols).map(|(row, col)| Seat::new(row, col)).collect();
                Ok(Request::Reserve { event_id, seats })
            }
            OpCode::Show => Ok(Request::Show {
                event_id: reader.read_frame(4)?.get_u32()?,
            }),
            OpCode::List => Ok(Request::List),
            OpCode::Quit => Ok(Request::Quit),
            OpCode::Setup => Err(EmsError::Protocol("SETUP received on an established session".into())),
        }
    }
}

/// Result-only response to CREATE and RESERVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub result: ResultCode,
}

impl StatusResponse {
    pub fn new(result: ResultCode) -> Self {
        Self { result }
    }

    pub fn encode(&self, order: ByteOrder) -> Bytes {
        let mut enc = WireEncoder::with_capacity(order, 4);
        enc.put_i32(self.result.to_wire());
        enc.finish()
    }

    pub fn decode<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        Ok(Self {
            result: ResultCode::read(reader)?,
        })
    }
}

/// Response to SHOW.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowResponse {
    Found { rows: usize, cols: usize, seats: Vec<u32> },
    Failed,
}

impl From<&Result<EventSnapshot>> for ShowResponse {
    fn from(result: &Result<EventSnapshot>) -> Self {
        match result {
            Ok(snap) => ShowResponse::Found {
                rows: snap.rows,
                cols: snap.cols,
                seats: snap.seats.clone(),
            },
            Err(_) => ShowResponse::Failed,
        }
    }
}

impl ShowResponse {
    pub fn encode(&self, order: ByteOrder) -> Bytes {
        match self {
            ShowResponse::Found { rows, cols, seats } => {
                let mut enc = WireEncoder::with_capacity(order, 4 + 2 * USIZE_WIDTH + 4 * seats.len());
                enc.put_i32(ResultCode::Ok.to_wire()).put_usize(*rows).put_usize(*cols);
                for &seat in seats {
                    enc.put_u32(seat);
                }
                enc.finish()
            }
            ShowResponse::Failed => {
                let mut enc = WireEncoder::with_capacity(order, 4);
                enc.put_i32(ResultCode::Failed.to_wire());
                enc.finish()
            }
        }
    }

    pub fn decode<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        if !ResultCode::read(reader)?.is_ok() {
            return Ok(ShowResponse::Failed);
        }
        let mut dims = reader.read_frame(2 * USIZE_WIDTH)?;
        let rows = dims.get_usize()?;
        let cols = dims.get_usize()?;
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| EmsError::Protocol(format!("grid {}x{} overflows", rows, cols)))?;

        let mut grid = reader.read_frame(array_len(len, 4)?)?;
        let seats = take_all(&mut grid, len, WireFrame::get_u32)?;
        Ok(ShowResponse::Found { rows, cols, seats })
    }
}

/// Response to LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListResponse {
    Found { ids: Vec<u32> },
    Failed,
}

impl From<&Result<Vec<u32>>> for ListResponse {
    fn from(result: &Result<Vec<u32>>) -> Self {
        match result {
            Ok(ids) => ListResponse::Found { ids: ids.clone() },
            Err(_) => ListResponse::Failed,
        }
    }
}

impl ListResponse {
    pub fn encode(&self, order: ByteOrder) -> Bytes {
        match self {
            ListResponse::Found { ids } => {
                let mut enc = WireEncoder::with_capacity(order, 4 + USIZE_WIDTH + 4 * ids.len());
                enc.put_i32(ResultCode::Ok.to_wire()).put_usize(ids.len());
                for &id in ids {
                    enc.put_u32(id);
                }
                enc.finish()
            }
            ListResponse::Failed => {
                let mut enc = WireEncoder::with_capacity(order, 4);
                enc.put_i32(ResultCode::Failed.to_wire());
                enc.finish()
            }
        }
    }

    pub fn decode<R: Read>(reader: &mut WireReader<R>) -> Result<Self> {
        if !ResultCode::read(reader)?.is_ok() {
            return Ok(ListResponse::Failed);
        }
        let count = reader.read_frame(USIZE_WIDTH)?.get_usize()?;
        let mut frame = reader.read_frame(array_len(count, 4)?)?;
        let ids = take_all(&mut frame, count, WireFrame::get_u32)?;
        Ok(ListResponse::Found { ids })
    }
}
