//! Boundary to the physical arm controller.
//!
//! [`DeviceLink`] is the vendor command set the rest of the crate programs
//! against: angle and coordinate get/set, motion stop, gripper state and the
//! indicator LED. [`SerialDeviceLink`] implements it over the 280's serial
//! protocol. Each call is one blocking request (and, for queries, one reply)
//! on the wire; callers that need the link from several tasks go through
//! [`crate::connection::ConnectionManager`].

use crate::protocol::{self, CommandId, FrameError};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed when talking to arm")]
    IoError(#[from] std::io::Error),
    #[error("failed to open serial port")]
    SerialError(#[from] tokio_serial::Error),
    #[error("malformed frame from arm")]
    FrameError(#[from] FrameError),
}

type Result<T> = std::result::Result<T, DriverError>;

/// Cartesian state as the device reports it: millimetres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceCoords {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

/// Command set of the hardware controller.
///
/// Angles are degrees, speeds are percentages in 1..=100 and `mode` selects
/// the firmware's interpolation (0 angular, 1 linear).
#[async_trait]
pub trait DeviceLink: Send {
    async fn set_color(&mut self, r: u8, g: u8, b: u8) -> Result<()>;
    async fn get_angles(&mut self) -> Result<[f64; 6]>;
    async fn send_angles(&mut self, angles: &[f64; 6], speed: u8) -> Result<()>;
    async fn get_coords(&mut self) -> Result<DeviceCoords>;
    async fn send_coords(&mut self, coords: &DeviceCoords, speed: u8, mode: u8) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
    async fn is_moving(&mut self) -> Result<bool>;
    async fn set_gripper_state(&mut self, state: u8, speed: u8) -> Result<bool>;
    async fn is_gripper_moving(&mut self) -> Result<bool>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh device links on demand so the connection lifecycle can be
/// exercised without hardware.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DeviceLink>>;
}

pub struct SerialLinkFactory {
    port: String,
    baud: u32,
}

impl SerialLinkFactory {
    pub fn new(port: &str, baud: u32) -> SerialLinkFactory {
        SerialLinkFactory {
            port: port.to_owned(),
            baud,
        }
    }
}

#[async_trait]
impl LinkFactory for SerialLinkFactory {
    async fn open(&self) -> Result<Box<dyn DeviceLink>> {
        let link = SerialDeviceLink::open(&self.port, self.baud).await?;
        Ok(Box::new(link))
    }
}

pub struct SerialDeviceLink {
    stream: SerialStream,
}

impl SerialDeviceLink {
    pub async fn open(port: &str, baud: u32) -> Result<SerialDeviceLink> {
        let stream = tokio_serial::new(port, baud).open_native_async()?;
        Ok(SerialDeviceLink { stream })
    }

    async fn command(&mut self, command: CommandId, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(&protocol::frame(command, data))
            .await?;
        Ok(())
    }

    async fn query(&mut self, command: CommandId, data: &[u8]) -> Result<Vec<u8>> {
        self.command(command, data).await?;
        self.read_reply(command).await
    }

    /// Read one reply frame, skipping any noise before the header pair.
    async fn read_reply(&mut self, command: CommandId) -> Result<Vec<u8>> {
        loop {
            if self.stream.read_u8().await? != protocol::FRAME_HEADER {
                continue;
            }
            if self.stream.read_u8().await? != protocol::FRAME_HEADER {
                continue;
            }
            let len = self.stream.read_u8().await? as usize;
            if len < 2 {
                continue;
            }
            let mut body = vec![0u8; len];
            self.stream.read_exact(&mut body).await?;
            let footer = body.pop();
            if footer != Some(protocol::FRAME_FOOTER) {
                return Err(FrameError::MissingFooter.into());
            }
            let got = body.remove(0);
            if got != command as u8 {
                return Err(FrameError::CommandMismatch {
                    want: command as u8,
                    got,
                }
                .into());
            }
            return Ok(body);
        }
    }
}

#[async_trait]
impl DeviceLink for SerialDeviceLink {
    async fn set_color(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.command(CommandId::SetColor, &[r, g, b]).await
    }

    async fn get_angles(&mut self) -> Result<[f64; 6]> {
        let data = self.query(CommandId::GetAngles, &[]).await?;
        Ok(protocol::decode_angles(&data)?)
    }

    async fn send_angles(&mut self, angles: &[f64; 6], speed: u8) -> Result<()> {
        let mut data = protocol::encode_angles(angles);
        data.push(speed);
        self.command(CommandId::SendAngles, &data).await
    }

    async fn get_coords(&mut self) -> Result<DeviceCoords> {
        let data = self.query(CommandId::GetCoords, &[]).await?;
        let (position, rotation) = protocol::decode_coords(&data)?;
        Ok(DeviceCoords {
            x: position[0],
            y: position[1],
            z: position[2],
            rx: rotation[0],
            ry: rotation[1],
            rz: rotation[2],
        })
    }

    async fn send_coords(&mut self, coords: &DeviceCoords, speed: u8, mode: u8) -> Result<()> {
        let mut data = protocol::encode_coords(
            &[coords.x, coords.y, coords.z],
            &[coords.rx, coords.ry, coords.rz],
        );
        data.push(speed);
        data.push(mode);
        self.command(CommandId::SendCoords, &data).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.command(CommandId::Stop, &[]).await
    }

    async fn is_moving(&mut self) -> Result<bool> {
        let data = self.query(CommandId::IsMoving, &[]).await?;
        Ok(data.first() == Some(&1))
    }

    async fn set_gripper_state(&mut self, state: u8, speed: u8) -> Result<bool> {
        let data = self.query(CommandId::SetGripperState, &[state, speed]).await?;
        Ok(data.first() == Some(&1))
    }

    async fn is_gripper_moving(&mut self) -> Result<bool> {
        let data = self.query(CommandId::IsGripperMoving, &[]).await?;
        Ok(data.first() == Some(&1))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }
}
