//! Frame layer for the 280's serial controller.
//!
//! Every exchange is a framed packet: `0xFE 0xFE <len> <cmd> <data...> 0xFA`
//! where `len` counts the command byte, the data bytes and the footer.
//! Values are big-endian `i16`: joint and rotation angles in centidegrees,
//! linear coordinates in tenths of a millimetre.

use thiserror::Error;

pub const FRAME_HEADER: u8 = 0xFE;
pub const FRAME_FOOTER: u8 = 0xFA;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("unexpected payload length {got} for {command:?}, wanted {want}")]
    PayloadLength {
        command: CommandId,
        want: usize,
        got: usize,
    },
    #[error("frame footer missing")]
    MissingFooter,
    #[error("reply carries command {got:#04x}, expected {want:#04x}")]
    CommandMismatch { want: u8, got: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetAngles = 0x20,
    SendAngles = 0x22,
    GetCoords = 0x23,
    SendCoords = 0x25,
    Stop = 0x29,
    IsMoving = 0x2B,
    SetGripperState = 0x66,
    IsGripperMoving = 0x69,
    SetColor = 0x6A,
}

/// Wrap a command and its payload into a wire frame.
pub fn frame(command: CommandId, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    out.push(FRAME_HEADER);
    out.push(FRAME_HEADER);
    out.push((data.len() + 2) as u8);
    out.push(command as u8);
    out.extend_from_slice(data);
    out.push(FRAME_FOOTER);
    out
}

pub fn encode_angle(degrees: f64) -> [u8; 2] {
    (((degrees * 100.0).round()) as i16).to_be_bytes()
}

pub fn decode_angle(bytes: [u8; 2]) -> f64 {
    i16::from_be_bytes(bytes) as f64 / 100.0
}

pub fn encode_coord(millimetres: f64) -> [u8; 2] {
    (((millimetres * 10.0).round()) as i16).to_be_bytes()
}

pub fn decode_coord(bytes: [u8; 2]) -> f64 {
    i16::from_be_bytes(bytes) as f64 / 10.0
}

pub fn encode_angles(angles: &[f64; 6]) -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    for angle in angles {
        data.extend_from_slice(&encode_angle(*angle));
    }
    data
}

pub fn decode_angles(data: &[u8]) -> Result<[f64; 6], FrameError> {
    if data.len() != 12 {
        return Err(FrameError::PayloadLength {
            command: CommandId::GetAngles,
            want: 12,
            got: data.len(),
        });
    }
    let mut angles = [0.0; 6];
    for (i, chunk) in data.chunks_exact(2).enumerate() {
        angles[i] = decode_angle([chunk[0], chunk[1]]);
    }
    Ok(angles)
}

/// Payload for a coordinate frame: x, y, z then the three rotation angles.
pub fn encode_coords(position: &[f64; 3], rotation: &[f64; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    for coord in position {
        data.extend_from_slice(&encode_coord(*coord));
    }
    for angle in rotation {
        data.extend_from_slice(&encode_angle(*angle));
    }
    data
}

pub fn decode_coords(data: &[u8]) -> Result<([f64; 3], [f64; 3]), FrameError> {
    if data.len() != 12 {
        return Err(FrameError::PayloadLength {
            command: CommandId::GetCoords,
            want: 12,
            got: data.len(),
        });
    }
    let position = [
        decode_coord([data[0], data[1]]),
        decode_coord([data[2], data[3]]),
        decode_coord([data[4], data[5]]),
    ];
    let rotation = [
        decode_angle([data[6], data[7]]),
        decode_angle([data[8], data[9]]),
        decode_angle([data[10], data[11]]),
    ];
    Ok((position, rotation))
}
