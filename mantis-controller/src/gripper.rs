//! Gripper resource riding on the arm's command channel.
//!
//! The gripper has no serial link of its own; every operation is an
//! [`ArmCommand`] dispatched through a shared [`CobotArm`], so the gripper
//! stays alive exactly as long as the arm's connection does.

use crate::arm_config::GripperConfig;
use crate::arm_controller::{ArmCommand, ArmError, CobotArm, CommandReply, GripperState};
use std::sync::Arc;
use tokio::sync::Mutex;

/// An arm shared between resources, in the usual one-lock-per-device shape.
pub type SharedArm = Arc<Mutex<CobotArm>>;

pub struct CobotGripper {
    arm: SharedArm,
    config: GripperConfig,
}

impl CobotGripper {
    pub fn new(arm: SharedArm, config: GripperConfig) -> Result<CobotGripper, ArmError> {
        config.validate()?;
        Ok(CobotGripper { arm, config })
    }

    /// Open fully. Completion is reported by [`CobotGripper::is_moving`].
    pub async fn open(&self) -> Result<(), ArmError> {
        self.set_state(GripperState::Open).await?;
        Ok(())
    }

    /// Close fully; `true` when the firmware accepted the command. The 280's
    /// gripper has no force feedback, so a grab is a full close.
    pub async fn grab(&self) -> Result<bool, ArmError> {
        self.set_state(GripperState::Closed).await
    }

    pub async fn is_moving(&self) -> Result<bool, ArmError> {
        let reply = self
            .arm
            .lock()
            .await
            .command(ArmCommand::IsGripperMoving)
            .await?;
        Ok(matches!(reply, Some(CommandReply::GripperMoving(true))))
    }

    /// The firmware cannot halt the gripper mid-travel; it always finishes
    /// its last commanded move.
    pub async fn stop(&self) -> Result<(), ArmError> {
        tracing::debug!("gripper stop requested, firmware finishes the move");
        Ok(())
    }

    async fn set_state(&self, state: GripperState) -> Result<bool, ArmError> {
        let reply = self
            .arm
            .lock()
            .await
            .command(ArmCommand::SetGripperState {
                state,
                speed: self.config.default_speed,
            })
            .await?;
        Ok(matches!(reply, Some(CommandReply::GripperStateSet(true))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_config::ArmConfig;
    use crate::connection::ConnectionManager;
    use crate::device_link::mock::MockLinkFactory;

    async fn gripper_with_mock() -> (
        CobotGripper,
        std::sync::Arc<crate::device_link::mock::MockState>,
    ) {
        let (factory, state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);
        let arm = CobotArm::connect(ArmConfig::default(), &manager)
            .await
            .unwrap();
        let gripper = CobotGripper::new(Arc::new(Mutex::new(arm)), GripperConfig::default())
            .unwrap();
        (gripper, state)
    }

    #[tokio::test]
    async fn grab_closes_at_configured_speed() {
        let (gripper, state) = gripper_with_mock().await;
        assert!(gripper.grab().await.unwrap());
        assert_eq!(*state.gripper_calls.lock().unwrap(), vec![(1, 50)]);
    }

    #[tokio::test]
    async fn open_then_grab_sends_both_states() {
        let (gripper, state) = gripper_with_mock().await;
        gripper.open().await.unwrap();
        gripper.grab().await.unwrap();
        assert_eq!(
            *state.gripper_calls.lock().unwrap(),
            vec![(0, 50), (1, 50)]
        );
    }

    #[tokio::test]
    async fn is_moving_reflects_device_state() {
        let (gripper, state) = gripper_with_mock().await;
        assert!(!gripper.is_moving().await.unwrap());
        state
            .gripper_moving
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(gripper.is_moving().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_speed_is_rejected_at_construction() {
        let (factory, _state) = MockLinkFactory::new();
        let manager = ConnectionManager::new(factory);
        let arm = CobotArm::connect(ArmConfig::default(), &manager)
            .await
            .unwrap();
        let result = CobotGripper::new(
            Arc::new(Mutex::new(arm)),
            GripperConfig { default_speed: 101 },
        );
        assert!(result.is_err());
    }
}
