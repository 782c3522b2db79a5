//! Long-running loops
//!
//! Hardware independent; the firmware wraps each in an embassy task.

pub mod acquisition;
pub mod distance_report;

pub use acquisition::{Acquisition, AcquisitionConfig};
pub use distance_report::{DistanceReport, DistanceReporter};
