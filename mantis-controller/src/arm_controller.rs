//! Arm resource adapter: poses and joint angles over the shared link.
//!
//! Translates between the device's Euler-angle boundary (degrees) and the
//! orientation encodings in [`crate::spatial`]. One policy is inherited from
//! the reference firmware module and kept deliberately: commands issued
//! after [`CobotArm::close`] do not error. Reads return harmless defaults
//! and writes are dropped with a warning, trading correctness for caller
//! liveness. Callers that need to know should check [`CobotArm::is_connected`].

use crate::arm_config::ArmConfig;
use crate::connection::{ConnectionError, ConnectionHandle, ConnectionManager, SharedLink};
use crate::device_link::{DeviceCoords, DriverError};
use crate::spatial::{EulerAngles, OrientationValue, OrientationVector, SpatialError};
use nalgebra as na;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArmError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] crate::arm_config::ConfigError),
    #[error(transparent)]
    Orientation(#[from] SpatialError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

type Result<T> = std::result::Result<T, ArmError>;

/// End effector pose: position in millimetres plus an orientation in any of
/// the supported encodings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    pub position: na::Vector3<f64>,
    pub orientation: OrientationValue,
}

impl Pose {
    pub fn new(position: na::Vector3<f64>, orientation: OrientationValue) -> Pose {
        Pose {
            position,
            orientation,
        }
    }
}

/// Joint angles in degrees, index-correlated to physical joints 1-6.
///
/// Valid ranges are enforced by the firmware, not here: joint 1 ±168°,
/// joint 2 ±135°, joint 3 ±150°, joint 4 ±145°, joint 5 ±165°, joint 6 ±180°.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointPositions {
    pub angles: [f64; 6],
}

impl JointPositions {
    pub fn new(angles: [f64; 6]) -> JointPositions {
        JointPositions { angles }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinematicsFormat {
    Urdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GripperState {
    Open = 0,
    Closed = 1,
}

/// Commands carried over the arm's generic command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmCommand {
    IsGripperMoving,
    SetGripperState { state: GripperState, speed: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    GripperMoving(bool),
    GripperStateSet(bool),
}

pub struct CobotArm {
    handle: Option<ConnectionHandle>,
    config: ArmConfig,
}

impl CobotArm {
    /// Validate the configuration and become an owner of the shared link.
    pub async fn connect(config: ArmConfig, manager: &ConnectionManager) -> Result<CobotArm> {
        config.validate()?;
        let handle = manager.acquire().await?;
        Ok(CobotArm {
            handle: Some(handle),
            config,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn link(&self) -> Option<&SharedLink> {
        self.handle.as_ref().map(ConnectionHandle::link)
    }

    /// Current cartesian pose; orientation is reported as an orientation
    /// vector. Returns the default pose while disconnected.
    pub async fn end_position(&self) -> Result<Pose> {
        let Some(link) = self.link() else {
            tracing::warn!("pose requested while disconnected, returning default");
            return Ok(Pose::default());
        };
        let coords = link.lock().await.get_coords().await?;
        let euler = euler_from_device(&coords);
        let orientation = OrientationValue::OrientationVector(OrientationVector::from_euler(&euler));
        Ok(Pose::new(
            na::Vector3::new(coords.x, coords.y, coords.z),
            orientation,
        ))
    }

    /// Move to a cartesian pose with the configured default speed. The
    /// firmware interpolates linearly (mode 1).
    pub async fn move_to_position(&self, pose: &Pose) -> Result<()> {
        let Some(link) = self.link() else {
            tracing::warn!("move requested while disconnected, dropping command");
            return Ok(());
        };
        tracing::info!(
            x = pose.position.x,
            y = pose.position.y,
            z = pose.position.z,
            "moving to pose"
        );
        let euler = pose.orientation.euler()?;
        let coords = device_coords(&pose.position, &euler);
        link.lock()
            .await
            .send_coords(&coords, self.config.default_speed, 1)
            .await?;
        Ok(())
    }

    /// Joint angles as reported by the device, degrees. Returns all zeros
    /// while disconnected.
    pub async fn joint_positions(&self) -> Result<JointPositions> {
        let Some(link) = self.link() else {
            tracing::warn!("joint positions requested while disconnected, returning default");
            return Ok(JointPositions::default());
        };
        let angles = link.lock().await.get_angles().await?;
        Ok(JointPositions::new(angles))
    }

    /// Forward joint targets unchanged, with the configured default speed.
    pub async fn move_to_joint_positions(&self, positions: &JointPositions) -> Result<()> {
        let Some(link) = self.link() else {
            tracing::warn!("joint move requested while disconnected, dropping command");
            return Ok(());
        };
        tracing::info!(angles = ?positions.angles, "moving to joint positions");
        link.lock()
            .await
            .send_angles(&positions.angles, self.config.default_speed)
            .await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let Some(link) = self.link() else {
            return Ok(());
        };
        link.lock().await.stop().await?;
        Ok(())
    }

    pub async fn is_moving(&self) -> Result<bool> {
        let Some(link) = self.link() else {
            return Ok(false);
        };
        Ok(link.lock().await.is_moving().await?)
    }

    /// Kinematic model of the arm, served as a packaged asset.
    pub fn kinematics(&self) -> (KinematicsFormat, &'static [u8]) {
        (
            KinematicsFormat::Urdf,
            include_bytes!("../assets/mantis_280.urdf"),
        )
    }

    /// Generic command channel used by attachments such as the gripper.
    /// While disconnected, commands are dropped and answered with `None`.
    pub async fn command(&self, command: ArmCommand) -> Result<Option<CommandReply>> {
        let Some(link) = self.link() else {
            tracing::warn!(?command, "command issued while disconnected, dropping");
            return Ok(None);
        };
        tracing::debug!(?command, "dispatching command");
        let reply = match command {
            ArmCommand::IsGripperMoving => {
                CommandReply::GripperMoving(link.lock().await.is_gripper_moving().await?)
            }
            ArmCommand::SetGripperState { state, speed } => CommandReply::GripperStateSet(
                link.lock()
                    .await
                    .set_gripper_state(state as u8, speed)
                    .await?,
            ),
        };
        Ok(Some(reply))
    }

    /// Stop motion and give up ownership of the link. The port itself only
    /// closes when the last owner is gone.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.link().lock().await.stop().await?;
            handle.release().await?;
        }
        Ok(())
    }
}

// The device reports rotations about its x, y and z axes; in the controller
// frame those are pitch, yaw and roll respectively.
fn euler_from_device(coords: &DeviceCoords) -> EulerAngles {
    EulerAngles::from_degrees(coords.rz, coords.rx, coords.ry)
}

fn device_coords(position: &na::Vector3<f64>, euler: &EulerAngles) -> DeviceCoords {
    let (roll, pitch, yaw) = euler.to_degrees();
    DeviceCoords {
        x: position.x,
        y: position.y,
        z: position.z,
        rx: pitch,
        ry: yaw,
        rz: roll,
    }
}
