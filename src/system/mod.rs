//! Shared system state
//!
//! Filtering, the distance cell shared between tasks and the persisted
//! configuration.

pub mod config;
pub mod kalman;
pub mod measurement;
pub mod storage;

pub use config::{ScaleDivisor, SettingKey, Settings, ZoneThresholds};
pub use kalman::{KalmanConfig, ScalarKalman};
pub use measurement::{DistanceCell, SharedDistance};
pub use storage::{FlashStore, MemoryStore, SettingsStore, StoreError};
