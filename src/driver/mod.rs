//! Sensor drivers
//!
//! [`bus`] is the register transport, [`lidar_lite`] the device protocol on top of it.

pub mod bus;
pub mod lidar_lite;

#[cfg(test)]
pub(crate) mod mock;

pub use bus::{BusError, BusStats, RegisterBus};
pub use lidar_lite::{BusSpeed, LidarError, LidarLite, Preset};
