//! Wire format shared with the PLC.
//!
//! - Commands: 2-byte frames, `01 00` begins a session, `00 00` ends it.
//! - Velocity (inbound) and force telemetry (outbound): 4-byte big-endian IEEE-754 `f32`.

/// Length of a command frame.
pub const COMMAND_FRAME_LEN: usize = 2;

/// Length of a float frame.
pub const FLOAT_FRAME_LEN: usize = 4;

/// A session command from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start logging.
    Begin,
    /// Stop logging after the grace period.
    End,
}

impl Command {
    /// Frame meaning [`Command::Begin`].
    pub const BEGIN_FRAME: [u8; COMMAND_FRAME_LEN] = [0x01, 0x00];
    /// Frame meaning [`Command::End`].
    pub const END_FRAME: [u8; COMMAND_FRAME_LEN] = [0x00, 0x00];

    /// Decode a frame; anything but the two known payloads is `None`.
    pub fn decode(frame: [u8; COMMAND_FRAME_LEN]) -> Option<Self> {
        match frame {
            Self::BEGIN_FRAME => Some(Command::Begin),
            Self::END_FRAME => Some(Command::End),
            _ => None,
        }
    }

    /// Encode to the wire frame.
    pub fn encode(self) -> [u8; COMMAND_FRAME_LEN] {
        match self {
            Command::Begin => Self::BEGIN_FRAME,
            Command::End => Self::END_FRAME,
        }
    }
}

/// Encode a value as a big-endian `f32` frame.
pub fn encode_f32(value: f32) -> [u8; FLOAT_FRAME_LEN] {
    value.to_be_bytes()
}

/// Decode a big-endian `f32` frame. Any length other than 4 is invalid.
pub fn decode_f32(bytes: &[u8]) -> Option<f32> {
    <[u8; FLOAT_FRAME_LEN]>::try_from(bytes)
        .ok()
        .map(f32::from_be_bytes)
}

/// Reassembles fixed-size frames from a byte stream, so a read that returns half a
/// frame does not lose it.
#[derive(Debug, Default)]
pub struct FrameAssembler<const N: usize> {
    pending: Vec<u8>,
}

impl<const N: usize> FrameAssembler<N> {
    /// Empty assembler.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(N),
        }
    }

    /// Feed bytes, returning every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<[u8; N]> {
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() / N * N;
        let frames = self.pending[..complete]
            .chunks_exact(N)
            .filter_map(|chunk| <[u8; N]>::try_from(chunk).ok())
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
