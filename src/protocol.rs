//! Host wire protocol: framing, inbound command parsing, and outbound
//! report encoding.
//!
//! Every frame in either direction starts with a 4-byte header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 1    | tag, always `0xA5` |
//! | 1      | 2    | length word, little-endian: bit 15 set for string frames, bits 0..=14 the payload length |
//! | 3      | 1    | reserved, always `0x00` |
//!
//! String frames carry a UTF-8 command line (`start`, `motor-move 10 -5`,
//! ...). Binary frames carry a little-endian payload beginning with a
//! `u16` message id. Outbound ids live in the `0x000x` range, inbound
//! command ids in the `0x010x` range, so a captured byte stream is
//! unambiguous about direction.
//!
//! The transport below this module is a byte pipe; on a corrupt header
//! the receiver discards bytes one at a time until [`resync`] finds a
//! plausible frame start.

use heapless::Vec;

use crate::config::ConfigKey;
use crate::error::{Error, ProtocolError, Result};
use crate::fixed::PixelSample;

// ============================================================================
// Framing
// ============================================================================

/// First byte of every frame.
pub const HEADER_TAG: u8 = 0xA5;

/// Header size in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload the 15-bit length word can describe.
pub const MAX_PAYLOAD: usize = 0x7FFF;

/// Size of the outbound frame buffer. A full-width line block is the
/// largest frame the device emits.
pub const TX_BUF_LEN: usize = 512;

const LEN_STRING_BIT: u16 = 0x8000;

/// Outbound message id: status report.
pub const MSG_STATUS: u16 = 0x0001;
/// Outbound message id: line block.
pub const MSG_LINE: u16 = 0x0002;
/// Outbound message id: scan-done marker.
pub const MSG_DONE: u16 = 0x0003;

/// Inbound message id: begin or resume a scan.
pub const CMD_START: u16 = 0x0101;
/// Inbound message id: stop the scan and home.
pub const CMD_STOP: u16 = 0x0102;
/// Inbound message id: pause at the next movement boundary.
pub const CMD_PAUSE: u16 = 0x0103;
/// Inbound message id: request a status report.
pub const CMD_REPORT: u16 = 0x0104;
/// Inbound message id: liveness ping.
pub const CMD_PING: u16 = 0x0105;
/// Inbound message id: relative manual motor move.
pub const CMD_MOTOR_MOVE: u16 = 0x0106;
/// Inbound message id: set a configuration parameter.
pub const CMD_CONFIG: u16 = 0x0107;

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Whether the payload is a UTF-8 command line.
    pub is_string: bool,
    /// Payload length in bytes.
    pub len: u16,
}

/// Encodes a frame header.
pub fn encode_header(is_string: bool, len: u16) -> [u8; HEADER_LEN] {
    debug_assert!(len as usize <= MAX_PAYLOAD);
    let word = if is_string { len | LEN_STRING_BIT } else { len };
    let [lo, hi] = word.to_le_bytes();
    [HEADER_TAG, lo, hi, 0x00]
}

/// Decodes a frame header from the front of `bytes`.
///
/// Returns [`ProtocolError::Truncated`] when fewer than
/// [`HEADER_LEN`] bytes are available and [`ProtocolError::BadHeader`]
/// on a wrong tag or a non-zero reserved byte.
pub fn decode_header(bytes: &[u8]) -> core::result::Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }
    if bytes[0] != HEADER_TAG || bytes[3] != 0x00 {
        return Err(ProtocolError::BadHeader);
    }
    let word = u16::from_le_bytes([bytes[1], bytes[2]]);
    Ok(FrameHeader {
        is_string: word & LEN_STRING_BIT != 0,
        len: word & !LEN_STRING_BIT,
    })
}

/// Number of leading bytes to discard so that `bytes` starts at a
/// plausible frame boundary.
///
/// A position qualifies when a full header decodes there, or when the
/// buffer ends with a partial header that still begins with the tag
/// byte (more data may complete it). Returns `bytes.len()` when no
/// position qualifies.
pub fn resync(bytes: &[u8]) -> usize {
    for skip in 0..bytes.len() {
        let rest = &bytes[skip..];
        match decode_header(rest) {
            Ok(_) => return skip,
            Err(ProtocolError::Truncated) if rest[0] == HEADER_TAG => return skip,
            Err(_) => {}
        }
    }
    bytes.len()
}

// ============================================================================
// Inbound commands
// ============================================================================

/// A parsed host command, from either the string or the binary surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Begin a scan, or resume a paused one.
    Start,
    /// Abort the scan, discard partial data, home the axes.
    Stop,
    /// Pause at the next movement boundary.
    Pause,
    /// Emit a status report.
    Report,
    /// Liveness check; answered with a `pong` string frame.
    Ping,
    /// Relative manual move, in steps, while idle.
    MotorMove {
        /// X-axis step delta.
        x: i32,
        /// Y-axis step delta.
        y: i32,
    },
    /// Set one configuration parameter.
    Config {
        /// Which parameter.
        key: ConfigKey,
        /// Parameter values; length equals [`ConfigKey::arity`].
        values: Vec<u32, 2>,
    },
}

fn parse_i32(token: &str) -> core::result::Result<i32, ProtocolError> {
    token.parse().map_err(|_| ProtocolError::BadArgument)
}

fn parse_u32(token: &str) -> core::result::Result<u32, ProtocolError> {
    token.parse().map_err(|_| ProtocolError::BadArgument)
}

/// Parses a string-frame command line.
///
/// Tokens are whitespace-separated; trailing garbage is an error, not
/// ignored.
pub fn parse_string_command(line: &str) -> core::result::Result<Command, ProtocolError> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or(ProtocolError::UnknownCommand)?;
    let command = match name {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "pause" => Command::Pause,
        "report" => Command::Report,
        "ping" => Command::Ping,
        "motor-move" => {
            let x = parse_i32(tokens.next().ok_or(ProtocolError::BadArgument)?)?;
            let y = parse_i32(tokens.next().ok_or(ProtocolError::BadArgument)?)?;
            Command::MotorMove { x, y }
        }
        "config" => {
            let key_name = tokens.next().ok_or(ProtocolError::BadArgument)?;
            let key = ConfigKey::from_name(key_name).ok_or(ProtocolError::BadArgument)?;
            let mut values = Vec::new();
            for _ in 0..key.arity() {
                let v = parse_u32(tokens.next().ok_or(ProtocolError::BadArgument)?)?;
                values.push(v).map_err(|_| ProtocolError::BadArgument)?;
            }
            Command::Config { key, values }
        }
        _ => return Err(ProtocolError::UnknownCommand),
    };
    if tokens.next().is_some() {
        return Err(ProtocolError::BadArgument);
    }
    Ok(command)
}

/// Parses a binary-frame command payload.
pub fn parse_binary_command(payload: &[u8]) -> core::result::Result<Command, ProtocolError> {
    let mut r = Reader::new(payload);
    let id = r.u16()?;
    let command = match id {
        CMD_START => Command::Start,
        CMD_STOP => Command::Stop,
        CMD_PAUSE => Command::Pause,
        CMD_REPORT => Command::Report,
        CMD_PING => Command::Ping,
        CMD_MOTOR_MOVE => Command::MotorMove {
            x: r.i32()?,
            y: r.i32()?,
        },
        CMD_CONFIG => {
            let key = ConfigKey::from_id(r.u16()?).ok_or(ProtocolError::BadArgument)?;
            let mut values = Vec::new();
            for _ in 0..key.arity() {
                values.push(r.u32()?).map_err(|_| ProtocolError::BadArgument)?;
            }
            Command::Config { key, values }
        }
        _ => return Err(ProtocolError::UnknownCommand),
    };
    if !r.is_empty() {
        return Err(ProtocolError::BadArgument);
    }
    Ok(command)
}

// ============================================================================
// Outbound reports
// ============================================================================

bitflags::bitflags! {
    /// Status bits reported to the host.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        /// Sensor is in high-precision mode.
        const PRECISION_HIGH = 1 << 0;
        /// Controller is idle (no scan, homing, or pause in progress).
        const IDLE = 1 << 1;
        /// Sensor session is initialized.
        const SENSOR_INITIALIZED = 1 << 2;
        /// Scan is paused.
        const PAUSED = 1 << 3;
        /// A fault was recorded since the last scan began.
        const FAULT = 1 << 4;
    }
}

/// Snapshot of device state for the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusReport {
    /// Steps per pixel, X and Y.
    pub steps_per_pixel: (u16, u16),
    /// Image resolution in pixels.
    pub image_size: (u32, u32),
    /// Scan origin offset in steps.
    pub begin_offset: (u32, u32),
    /// Sensor frame delay in microseconds.
    pub measure_delay_us: u32,
    /// Degrees per step calibration.
    pub angle_per_step: (f32, f32),
    /// Current logical motor position in steps.
    pub motor_position: (i32, i32),
    /// Microseconds since the current scan began, 0 when no scan is
    /// active.
    pub elapsed_time_us: i64,
    /// Status bits.
    pub flags: StatusFlags,
}

struct Writer<const N: usize> {
    buf: Vec<u8, N>,
}

impl<const N: usize> Writer<N> {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf
            .extend_from_slice(bytes)
            .map_err(|_| Error::ResourceExhausted)
    }

    fn u16(&mut self, v: u16) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn u32(&mut self, v: u32) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn i32(&mut self, v: i32) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn i64(&mut self, v: i64) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn f32(&mut self, v: f32) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    /// Rewrites the length word in the already-emitted header.
    fn finish(mut self, is_string: bool) -> Result<Vec<u8, N>> {
        let payload = self.buf.len() - HEADER_LEN;
        if payload > MAX_PAYLOAD {
            return Err(Error::ResourceExhausted);
        }
        let header = encode_header(is_string, payload as u16);
        self.buf[..HEADER_LEN].copy_from_slice(&header);
        Ok(self.buf)
    }
}

fn frame_writer<const N: usize>() -> Result<Writer<N>> {
    let mut w = Writer::new();
    // Placeholder header, patched by finish() once the length is known.
    w.bytes(&[0u8; HEADER_LEN])?;
    Ok(w)
}

/// Encodes a complete status-report frame, header included.
pub fn encode_status_frame(report: &StatusReport) -> Result<Vec<u8, TX_BUF_LEN>> {
    let mut w = frame_writer()?;
    w.u16(MSG_STATUS)?;
    w.u16(report.steps_per_pixel.0)?;
    w.u16(report.steps_per_pixel.1)?;
    w.u32(report.image_size.0)?;
    w.u32(report.image_size.1)?;
    w.u32(report.begin_offset.0)?;
    w.u32(report.begin_offset.1)?;
    w.u32(report.measure_delay_us)?;
    w.f32(report.angle_per_step.0)?;
    w.f32(report.angle_per_step.1)?;
    w.i32(report.motor_position.0)?;
    w.i32(report.motor_position.1)?;
    w.i64(report.elapsed_time_us)?;
    // Flags byte padded to a four-byte record boundary.
    w.bytes(&[report.flags.bits(), 0, 0, 0])?;
    w.finish(false)
}

/// Encodes a complete line-block frame, header included.
///
/// `samples` must hold one full image row; partial rows are never
/// transmitted.
pub fn encode_line_frame(
    line_index: u32,
    x_offset: u32,
    samples: &[PixelSample],
) -> Result<Vec<u8, TX_BUF_LEN>> {
    let mut w = frame_writer()?;
    w.u16(MSG_LINE)?;
    w.u32(line_index)?;
    w.u32(x_offset)?;
    w.u32(samples.len() as u32)?;
    for sample in samples {
        w.i32(sample.range.raw())?;
        w.u16(sample.amplitude.raw())?;
    }
    w.finish(false)
}

/// Encodes the scan-done marker frame.
pub fn encode_done_frame() -> Result<Vec<u8, TX_BUF_LEN>> {
    let mut w = frame_writer()?;
    w.u16(MSG_DONE)?;
    w.finish(false)
}

/// Encodes a string frame (used for `pong`).
pub fn encode_string_frame(text: &str) -> Result<Vec<u8, TX_BUF_LEN>> {
    let mut w = frame_writer()?;
    w.bytes(text.as_bytes())?;
    w.finish(true)
}

// ============================================================================
// Payload decoding (host side, also used by the tests)
// ============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, n: usize) -> core::result::Result<&'a [u8], ProtocolError> {
        if self.bytes.len() < n {
            return Err(ProtocolError::Truncated);
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn u16(&mut self) -> core::result::Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> core::result::Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> core::result::Result<i32, ProtocolError> {
        self.u32().map(|v| v as i32)
    }

    fn i64(&mut self) -> core::result::Result<i64, ProtocolError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_le_bytes(raw))
    }

    fn f32(&mut self) -> core::result::Result<f32, ProtocolError> {
        self.u32().map(f32::from_bits)
    }

    fn u8(&mut self) -> core::result::Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }
}

/// Decodes a status-report payload (message id included).
pub fn decode_status_payload(
    payload: &[u8],
) -> core::result::Result<StatusReport, ProtocolError> {
    let mut r = Reader::new(payload);
    if r.u16()? != MSG_STATUS {
        return Err(ProtocolError::UnknownCommand);
    }
    Ok(StatusReport {
        steps_per_pixel: (r.u16()?, r.u16()?),
        image_size: (r.u32()?, r.u32()?),
        begin_offset: (r.u32()?, r.u32()?),
        measure_delay_us: r.u32()?,
        angle_per_step: (r.f32()?, r.f32()?),
        motor_position: (r.i32()?, r.i32()?),
        elapsed_time_us: r.i64()?,
        flags: {
            let flags = StatusFlags::from_bits_truncate(r.u8()?);
            r.take(3)?;
            flags
        },
    })
}

/// Decoded line block.
#[derive(Clone, Debug, PartialEq)]
pub struct LineBlock {
    /// Row index within the image.
    pub line_index: u32,
    /// Column of the first sample.
    pub x_offset: u32,
    /// One full image row, left to right.
    pub samples: Vec<PixelSample, { crate::capture::MAX_LINE_WIDTH }>,
}

/// Decodes a line-block payload (message id included).
pub fn decode_line_payload(payload: &[u8]) -> core::result::Result<LineBlock, ProtocolError> {
    let mut r = Reader::new(payload);
    if r.u16()? != MSG_LINE {
        return Err(ProtocolError::UnknownCommand);
    }
    let line_index = r.u32()?;
    let x_offset = r.u32()?;
    let count = r.u32()?;
    let mut samples = Vec::new();
    for _ in 0..count {
        let range = r.i32()?;
        let amplitude = r.u16()?;
        samples
            .push(PixelSample::from_raw(range, amplitude))
            .map_err(|_| ProtocolError::BadArgument)?;
    }
    Ok(LineBlock {
        line_index,
        x_offset,
        samples,
    })
}
