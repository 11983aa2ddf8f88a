//! Driver for the myCobot 280 six axis arm.
//!
//! The crate is split along the path a command takes to the hardware:
//! [`arm_controller`] and [`gripper`] are the resource-level interfaces,
//! [`connection`] shares the single physical link between them, and
//! [`device_link`] plus [`protocol`] speak the vendor's serial protocol.
//! [`spatial`] holds the pure orientation math used at the cartesian
//! boundary.

pub mod arm_config;
pub mod arm_controller;
pub mod connection;
pub mod device_link;
pub mod gripper;
pub mod protocol;
pub mod spatial;
